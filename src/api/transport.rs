//! HTTP transport for document creation requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret as _, SecretString};
use tracing::{debug, error};
use url::Url;

use super::envelope::DocumentEnvelope;
use crate::config::ApiConfig;
use crate::error::{CrptError, Result};

/// Path of the document creation endpoint, relative to the base URL.
pub const CREATE_PATH: &str = "/doc/create";
const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";
const ACCEPT_ANY: &str = "*/*";

/// Raw HTTP response. Status and body are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Trait for sending envelopes to the registry.
///
/// This lets the client run against the real HTTP API or a stub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `envelope` authorized with `token`.
    async fn send(
        &self,
        envelope: &DocumentEnvelope,
        token: &SecretString,
    ) -> Result<TransportResponse>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport posting to `{base_url}/doc/create`.
    pub fn new(base_url: &Url, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CrptError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(client, base_url, request_timeout)
    }

    /// Create a transport using an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: &Url,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: create_endpoint(base_url)?,
            request_timeout,
        })
    }

    /// Create a transport from the API section of the client configuration.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(
            &config.base_url()?,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    /// The URL documents are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        envelope: &DocumentEnvelope,
        token: &SecretString,
    ) -> Result<TransportResponse> {
        let body = serde_json::to_vec(envelope)?;

        debug!(
            endpoint = %self.endpoint,
            bytes = body.len(),
            "Sending document"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header(ACCEPT, ACCEPT_ANY)
            .bearer_auth(token.expose_secret())
            .timeout(self.request_timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = %self.endpoint, "HTTP request failed");
                CrptError::transport(format!("HTTP request to {} failed", self.endpoint), e)
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CrptError::transport("Failed to read response body", e))?;

        Ok(TransportResponse { status, body })
    }
}

/// Append the creation path to `base_url`, keeping any path prefix.
fn create_endpoint(base_url: &Url) -> Result<Url> {
    let joined = format!("{}{}", base_url.as_str().trim_end_matches('/'), CREATE_PATH);
    Url::parse(&joined)
        .map_err(|e| CrptError::InvalidConfig(format!("Invalid base URL {}: {}", base_url, e)))
}
