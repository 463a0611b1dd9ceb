//! crpt-api - Rate-limited CRPT registry client
//!
//! This crate submits "goods introduction" documents to the CRPT registry
//! API. Outbound requests pass through a sliding window rate limiter that
//! admits at most N requests per rolling window and makes excess callers
//! wait with bounded backoff.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use api::ApiClient;
pub use error::{CrptError, ErrorKind, Result};
