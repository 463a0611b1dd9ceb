//! Rate-limited client for the document creation API.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::envelope;
use super::token::TokenStore;
use super::transport::{HttpTransport, Transport, TransportResponse};
use crate::config::{ApiConfig, ClientConfig};
use crate::error::{CrptError, Result};
use crate::ratelimit::{LimiterConfig, RateLimiter};

/// Field of a JSON response object holding the document identifier.
const ID_FIELD: &str = "id";

/// Client for submitting goods introduction documents.
///
/// Safe to share between tasks. Every submission passes through the same
/// rate limiter before it is sent.
pub struct ApiClient<T: Transport = HttpTransport> {
    limiter: RateLimiter,
    transport: T,
    token: TokenStore,
    acquire_timeout: Option<Duration>,
}

impl ApiClient<HttpTransport> {
    /// Create a client for the default API allowing `max_requests` per `window`.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        let limiter_config = LimiterConfig::new(window, max_requests)?;
        let transport = HttpTransport::from_config(&ApiConfig::default())?;
        Ok(Self::with_transport(limiter_config, transport))
    }

    /// Create a client from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let limiter_config = config.rate_limiting.limiter_config()?;
        let transport = HttpTransport::from_config(&config.api)?;

        let mut client = Self::with_transport(limiter_config, transport);
        client.acquire_timeout = config.rate_limiting.acquire_timeout();
        Ok(client)
    }
}

impl<T: Transport> ApiClient<T> {
    /// Create a client sending through `transport`.
    pub fn with_transport(config: LimiterConfig, transport: T) -> Self {
        Self {
            limiter: RateLimiter::new(config),
            transport,
            token: TokenStore::new(),
            acquire_timeout: None,
        }
    }

    /// Give up waiting for a rate limit slot after `timeout`.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the bearer token used for every following submission.
    ///
    /// Tokens are valid for 10 hours. Refreshing them is up to the caller.
    pub fn set_token<'a>(&self, token: impl Into<Option<&'a str>>) -> Result<()> {
        self.token.set(token)?;
        debug!("Authentication token updated");
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_set()
    }

    /// Get the rate limiter shared by all submissions.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit a goods introduction document and return its identifier.
    ///
    /// `document` must serialize to a JSON object. It is sent with
    /// `doc_type` set to `LP_INTRODUCE_GOODS`; the caller's value is not
    /// modified. Waits for a rate limit slot if necessary.
    pub async fn submit<D>(&self, document: &D, signature: &str) -> Result<String>
    where
        D: Serialize + ?Sized,
    {
        self.submit_with_cancel(document, signature, &CancellationToken::new())
            .await
    }

    /// Like [`submit`](Self::submit), but stops waiting for a rate limit
    /// slot with [`CrptError::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation has no effect after the request has been admitted.
    pub async fn submit_with_cancel<D>(
        &self,
        document: &D,
        signature: &str,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        D: Serialize + ?Sized,
    {
        let token = self.token.get().ok_or(CrptError::Unauthenticated)?;

        let admitted = match self.acquire_timeout {
            Some(timeout) => {
                self.limiter
                    .acquire_before(Instant::now() + timeout, cancel)
                    .await?
            }
            None => self.limiter.acquire_with_cancel(cancel).await?,
        };
        debug!(admitted = ?admitted, "Rate limit slot acquired");

        let envelope = envelope::build(document, signature)?;
        let response = self.transport.send(&envelope, &token).await?;
        let id = parse_response(response)?;

        info!(document_id = %id, "Document created");
        Ok(id)
    }
}

/// Extract the document identifier from a creation response.
///
/// The body is either a JSON object with an `id` field or the bare
/// identifier, optionally as a JSON string literal.
pub fn parse_response(response: TransportResponse) -> Result<String> {
    let TransportResponse { status, body } = response;
    if status != 200 && status != 201 {
        warn!(status = status, body = %body, "Document creation rejected");
        return Err(CrptError::Api { status, body });
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(CrptError::InvalidResponse(
            "response body is empty".to_string(),
        ));
    }

    if body.starts_with('{') && body.ends_with('}') {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            CrptError::InvalidResponse(format!("malformed JSON response {}: {}", body, e))
        })?;
        return match value.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            _ => Err(CrptError::InvalidResponse(format!(
                "response object has no string `{}` field: {}",
                ID_FIELD, body
            ))),
        };
    }

    if body.starts_with('"') {
        if let Ok(id) = serde_json::from_str::<String>(body) {
            return Ok(id);
        }
    }

    Ok(body.to_string())
}
