//! Document submission to the CRPT registry API.
//!
//! Submissions go through a shared rate limiter, are wrapped into the
//! wire envelope and posted over a pluggable [`Transport`].

mod client;
pub mod envelope;
mod token;
mod transport;

pub use client::{parse_response, ApiClient};
pub use envelope::{Document, DocumentEnvelope, DOCUMENT_FORMAT, DOC_TYPE};
pub use token::TokenStore;
pub use transport::{HttpTransport, Transport, TransportResponse, CREATE_PATH};
