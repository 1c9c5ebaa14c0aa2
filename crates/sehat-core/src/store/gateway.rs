//! HTTP transport for gateway retrieval.
//!
//! The transport is a trait so the fallback policy in
//! [`crate::store::ContentStore::fetch`] can be exercised against scripted
//! responses without sockets.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a single gateway attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt exceeded the per-attempt timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Http(String),

    /// The gateway answered with a non-success status.
    #[error("gateway returned HTTP {0}")]
    Status(u16),

    /// The response body was not parseable JSON.
    #[error("response parse error: {0}")]
    Parse(String),
}

/// A single bounded HTTP GET returning parsed JSON.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Fetches `url` and parses the body as JSON, failing after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for timeouts, transport failures,
    /// non-success statuses, and unparseable bodies.
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, TransportError>;
}

/// Production transport backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpGatewayTransport {
    client: reqwest::Client,
}

impl HttpGatewayTransport {
    /// Creates a transport with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))
    }
}
