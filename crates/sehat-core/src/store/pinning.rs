//! Hosted pinning service backend.
//!
//! Talks to a Pinata-compatible pinning HTTP API: multipart file uploads to
//! `/pinning/pinFileToIPFS` and JSON uploads to `/pinning/pinJSONToIPFS`,
//! bearer-token authenticated. Responses are expected to carry the content id
//! in an `IpfsHash` field, but common casing variants are accepted.
//!
//! The hosted service has no native retrieval API worth preferring; fetches
//! go through the gateway chain, with the service's dedicated gateway first.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::gateway::TransportError;
use super::{ContentBackend, StoreError, StoreMode};
use crate::record::FileAttachment;

/// Hosted pinning backend.
#[derive(Debug, Clone)]
pub struct PinningBackend {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl PinningBackend {
    /// Creates a backend for the given API base and bearer token.
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_base.trim_end_matches('/'))
    }

    async fn read_hash(response: reqwest::Response) -> Result<String, StoreError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("pinning response: {e}")))?;

        if !status.is_success() {
            return Err(StoreError::Upload(format!(
                "pinning service returned HTTP {status}: {body}"
            )));
        }

        extract_hash(&body).ok_or_else(|| {
            StoreError::Parse(format!("pinning response carries no content id: {body}"))
        })
    }
}

/// Pulls the content id out of a pinning response, tolerating the casing
/// variants seen across service versions.
fn extract_hash(body: &Value) -> Option<String> {
    ["IpfsHash", "ipfsHash", "hash", "cid"]
        .iter()
        .find_map(|field| body.get(field))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait]
impl ContentBackend for PinningBackend {
    fn mode(&self) -> StoreMode {
        StoreMode::Hosted
    }

    async fn put_file(&self, file: &FileAttachment) -> Result<String, StoreError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| StoreError::Upload(format!("invalid mime type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        debug!(file = %file.file_name, size = file.bytes.len(), "pinning file upload");
        let response = self
            .client
            .post(self.endpoint("/pinning/pinFileToIPFS"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?;

        Self::read_hash(response).await
    }

    async fn put_json(&self, value: &Value) -> Result<String, StoreError> {
        debug!("pinning JSON upload");
        let response = self
            .client
            .post(self.endpoint("/pinning/pinJSONToIPFS"))
            .bearer_auth(&self.token)
            .json(value)
            .send()
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?;

        Self::read_hash(response).await
    }

    async fn native_fetch(
        &self,
        _cid: &str,
        _timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extract_hash_accepts_casing_variants() {
        assert_eq!(
            extract_hash(&json!({"IpfsHash": "QmA"})).as_deref(),
            Some("QmA")
        );
        assert_eq!(
            extract_hash(&json!({"ipfsHash": "QmB"})).as_deref(),
            Some("QmB")
        );
        assert_eq!(extract_hash(&json!({"hash": "QmC"})).as_deref(), Some("QmC"));
        assert_eq!(extract_hash(&json!({"cid": "QmD"})).as_deref(), Some("QmD"));
    }

    #[test]
    fn extract_hash_trims_and_rejects_empty() {
        assert_eq!(
            extract_hash(&json!({"IpfsHash": "  QmE  "})).as_deref(),
            Some("QmE")
        );
        assert_eq!(extract_hash(&json!({"IpfsHash": ""})), None);
        assert_eq!(extract_hash(&json!({"unrelated": "QmF"})), None);
    }

    #[test]
    fn preferred_casing_wins_when_several_present() {
        let body = json!({"IpfsHash": "QmPreferred", "cid": "QmOther"});
        assert_eq!(extract_hash(&body).as_deref(), Some("QmPreferred"));
    }
}
