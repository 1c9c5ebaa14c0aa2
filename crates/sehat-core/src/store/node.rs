//! Local content-addressable node backend.
//!
//! Talks to a local node's HTTP API: `POST /api/v0/add?pin=true` (multipart)
//! for both files and JSON documents, and `POST /api/v0/cat?arg=<cid>` as the
//! backend's native retrieval route, tried before any public gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::gateway::TransportError;
use super::{ContentBackend, StoreError, StoreMode};
use crate::record::FileAttachment;

/// Local node backend.
#[derive(Debug, Clone)]
pub struct NodeBackend {
    client: reqwest::Client,
    api_base: String,
}

impl NodeBackend {
    /// Creates a backend for a node API base such as `http://localhost:5001`.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_base.trim_end_matches('/'))
    }

    async fn add(&self, part: reqwest::multipart::Part) -> Result<String, StoreError> {
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(self.endpoint("/api/v0/add?pin=true"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Upload(format!("local node unreachable: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("node add response: {e}")))?;

        if !status.is_success() {
            return Err(StoreError::Upload(format!(
                "local node returned HTTP {status}: {body}"
            )));
        }

        // Kubo answers {"Name":..,"Hash":..,"Size":..}; accept the common
        // variants the same way the pinning path does.
        ["Hash", "hash", "Cid", "cid"]
            .iter()
            .find_map(|field| body.get(field))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| StoreError::Parse(format!("node add response carries no hash: {body}")))
    }
}

#[async_trait]
impl ContentBackend for NodeBackend {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    async fn put_file(&self, file: &FileAttachment) -> Result<String, StoreError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| StoreError::Upload(format!("invalid mime type: {e}")))?;
        debug!(file = %file.file_name, "local node file add");
        self.add(part).await
    }

    async fn put_json(&self, value: &Value) -> Result<String, StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Parse(e.to_string()))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("record.json")
            .mime_str("application/json")
            .map_err(|e| StoreError::Upload(e.to_string()))?;
        debug!("local node JSON add");
        self.add(part).await
    }

    async fn native_fetch(
        &self,
        cid: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        let url = format!("{}?arg={cid}", self.endpoint("/api/v0/cat"));
        debug!(%cid, "local node cat");

        let response = self
            .client
            .post(&url)
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TransportError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let backend = NodeBackend::new("http://localhost:5001/");
        assert_eq!(
            backend.endpoint("/api/v0/add?pin=true"),
            "http://localhost:5001/api/v0/add?pin=true"
        );
    }
}
