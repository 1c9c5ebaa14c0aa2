//! In-process mock content store.
//!
//! The mock keeps uploaded JSON documents in a shared map under randomly
//! generated CID-like keys, optionally persisted to a JSON file between runs
//! (the local-storage analogue of the browser deployment). Persistence is
//! best effort and non-atomic across processes by design: the last writer to
//! the file wins, and a corrupt or missing file degrades to an empty store
//! rather than an error.
//!
//! File attachment bytes are not retained; the mock hands back a generated
//! content id so the write path exercises the same shape as real backends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use super::gateway::TransportError;
use super::{ContentBackend, StoreError, StoreMode};
use crate::record::FileAttachment;

/// Length of the random suffix after the `Qm` prefix.
const MOCK_CID_SUFFIX_LEN: usize = 13;

/// Mock backend holding documents in memory.
#[derive(Debug, Default)]
pub struct MockBackend {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    path: Option<PathBuf>,
}

impl MockBackend {
    /// Creates a memory-only mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock store persisted to `path`, loading any existing
    /// entries. A missing or corrupt file yields an empty store.
    #[must_use]
    pub fn with_persistence(path: PathBuf) -> Self {
        let entries = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<HashMap<String, Value>>(&bytes).ok())
            .unwrap_or_default();
        Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(path),
        }
    }

    /// Returns the number of stored documents.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns true when no documents are stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    fn generate_cid() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(MOCK_CID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!("Qm{}", suffix.to_lowercase())
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let snapshot = self.entries.read().expect("lock poisoned").clone();
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    debug!(path = %path.display(), error = %e, "mock store persistence skipped");
                }
            }
            Err(e) => debug!(error = %e, "mock store serialization skipped"),
        }
    }
}

impl Clone for MockBackend {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            path: self.path.clone(),
        }
    }
}

#[async_trait]
impl ContentBackend for MockBackend {
    fn mode(&self) -> StoreMode {
        StoreMode::Mock
    }

    async fn put_file(&self, _file: &FileAttachment) -> Result<String, StoreError> {
        Ok(Self::generate_cid())
    }

    async fn put_json(&self, value: &Value) -> Result<String, StoreError> {
        let cid = Self::generate_cid();
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(cid.clone(), value.clone());
        self.persist();
        Ok(cid)
    }

    async fn native_fetch(
        &self,
        cid: &str,
        _timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(cid)
            .cloned()
            .map(Some)
            .ok_or_else(|| TransportError::Http("content not found in mock storage".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn put_then_native_fetch_round_trips() {
        let backend = MockBackend::new();
        let doc = json!({"name": "A", "disease": "Flu"});

        let cid = backend.put_json(&doc).await.unwrap();
        assert!(cid.starts_with("Qm"));
        assert!(cid.len() >= super::super::cid::MIN_CID_LEN);

        let fetched = backend
            .native_fetch(&cid, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(fetched, Some(doc));
    }

    #[tokio::test]
    async fn missing_cid_is_an_error() {
        let backend = MockBackend::new();
        let result = backend
            .native_fetch("QmDoesNotExist00", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }

    #[tokio::test]
    async fn clone_shares_entries() {
        let a = MockBackend::new();
        let b = a.clone();
        let cid = a.put_json(&json!({"k": 1})).await.unwrap();
        assert!(b
            .native_fetch(&cid, Duration::from_secs(1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock-store.json");

        let cid = {
            let backend = MockBackend::with_persistence(path.clone());
            backend.put_json(&json!({"name": "persisted"})).await.unwrap()
        };

        let reopened = MockBackend::with_persistence(path);
        let fetched = reopened
            .native_fetch(&cid, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["name"], "persisted");
    }

    #[test]
    fn corrupt_persistence_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock-store.json");
        std::fs::write(&path, b"not json").unwrap();

        let backend = MockBackend::with_persistence(path);
        assert!(backend.is_empty());
    }
}
