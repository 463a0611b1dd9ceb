//! Error types for the CRPT API client.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used as the source of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for CRPT API client operations.
///
/// Every stage of a submission reports through this one type. Use
/// [`CrptError::kind`] to branch on the failure class without
/// destructuring.
#[derive(Error, Debug)]
pub enum CrptError {
    /// Invalid client or limiter configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No bearer token has been set
    #[error("Authentication token must be set before submitting documents")]
    Unauthenticated,

    /// Waiting for rate admission was cancelled
    #[error("Cancelled while waiting for rate limit admission")]
    Cancelled,

    /// The admission deadline passed before a slot freed up
    #[error("No rate limit slot became available within {0:?}")]
    DeadlineExceeded(Duration),

    /// The document could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP I/O failure (connection refused, timeout, protocol error)
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: BoxError,
    },

    /// The API answered with a status other than 200 or 201
    #[error("Failed to create document: HTTP {status} - {body}")]
    Api { status: u16, body: String },

    /// The API answered successfully but the body carried no identifier
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure classes of [`CrptError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidArgument,
    Unauthenticated,
    Cancelled,
    DeadlineExceeded,
    Serialization,
    Transport,
    Api,
    InvalidResponse,
}

impl CrptError {
    /// Create a transport error wrapping the underlying cause.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        CrptError::Transport {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Get the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrptError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CrptError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CrptError::Unauthenticated => ErrorKind::Unauthenticated,
            CrptError::Cancelled => ErrorKind::Cancelled,
            CrptError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            CrptError::Serialization(_) => ErrorKind::Serialization,
            CrptError::Transport { .. } => ErrorKind::Transport,
            CrptError::Api { .. } => ErrorKind::Api,
            CrptError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Whether the caller gave up waiting for admission.
    ///
    /// `true` means the request was never sent.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrptError::Cancelled | CrptError::DeadlineExceeded(_))
    }
}

/// Result type alias for CRPT API client operations.
pub type Result<T> = std::result::Result<T, CrptError>;
