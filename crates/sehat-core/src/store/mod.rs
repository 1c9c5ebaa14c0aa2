//! Content store adapter.
//!
//! Uploads patient documents and attachments to one of three backends and
//! resolves content ids back to JSON through a prioritized chain of retrieval
//! routes. The backend is chosen once from configuration — hosted pinning
//! service over local node over in-process mock — and stays fixed for the
//! process lifetime; [`ContentStore::mode`] makes the choice observable so
//! callers can branch on it (a "view file" link only means something outside
//! mock mode).
//!
//! Upload is all-or-nothing per record: every attachment is validated before
//! any network call, attachments upload first (aborting on the first
//! failure), and only then does the combined JSON document go up. A record is
//! never committed with a subset of its files. Fetch tries the backend's
//! native route, then each configured public gateway in listed order, each
//! attempt bounded by a fixed timeout; the first parseable response wins.

mod cid;
mod gateway;
mod mock;
mod node;
mod pinning;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use cid::MIN_CID_LEN;
pub use gateway::{GatewayTransport, HttpGatewayTransport, TransportError};
pub use mock::MockBackend;
pub use node::NodeBackend;
pub use pinning::PinningBackend;

use crate::config::StorageConfig;
use crate::record::{ContentRecord, FileAttachment, FileRef, PatientRecord, RecordMetadata};

/// Errors raised by the content store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An attachment exceeds the configured size limit. Caught before any
    /// network call.
    #[error("file '{file_name}' exceeds maximum size: {size} > {max} bytes")]
    FileTooLarge {
        /// Offending file name.
        file_name: String,
        /// Actual size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// An attachment's MIME type is outside the allowed set. Caught before
    /// any network call.
    #[error("file '{file_name}' has disallowed type '{mime_type}'")]
    FileTypeNotAllowed {
        /// Offending file name.
        file_name: String,
        /// Declared MIME type.
        mime_type: String,
    },

    /// The content id is too short or empty after normalization. Caught
    /// before any network call.
    #[error("malformed content id: '{0}'")]
    MalformedCid(String),

    /// An upload attempt failed; the whole operation was aborted.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Every retrieval route was exhausted.
    #[error("all retrieval routes failed for {cid}: {last_error}")]
    Retrieval {
        /// The content id that could not be resolved.
        cid: String,
        /// The last underlying error.
        last_error: String,
    },

    /// A response or document could not be (de)serialized.
    #[error("content store parse error: {0}")]
    Parse(String),
}

impl StoreError {
    /// True for failures caught by input validation before any I/O.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. } | Self::FileTypeNotAllowed { .. } | Self::MalformedCid(_)
        )
    }
}

/// The active content store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Hosted pinning service.
    Hosted,
    /// Local content-addressable node.
    Local,
    /// In-process mock.
    Mock,
}

impl StoreMode {
    /// Selects the backend for a configuration: hosted pinning wins over a
    /// local node, which wins over the mock. Deterministic for a given
    /// configuration.
    #[must_use]
    pub fn select(config: &StorageConfig) -> Self {
        if config.pinning_token.is_some() {
            Self::Hosted
        } else if config.use_local_node {
            Self::Local
        } else {
            Self::Mock
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hosted => "hosted",
            Self::Local => "local",
            Self::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Result of a successful record upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Content id of the combined JSON document.
    pub cid: String,

    /// Serialized size of the combined document in bytes.
    pub size_bytes: u64,
}

/// A content store backend: raw puts plus an optional native retrieval
/// route.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Returns the mode this backend implements.
    fn mode(&self) -> StoreMode;

    /// Uploads a single attachment, returning its content id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Upload`] when the backend rejects or cannot
    /// receive the file.
    async fn put_file(&self, file: &FileAttachment) -> Result<String, StoreError>;

    /// Uploads a JSON document, returning its content id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Upload`] when the backend rejects or cannot
    /// receive the document.
    async fn put_json(&self, value: &Value) -> Result<String, StoreError>;

    /// Attempts the backend's own retrieval route.
    ///
    /// `Ok(None)` means the backend has no native route and retrieval should
    /// move straight to the gateway chain.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the native attempt was made and
    /// failed; the caller records it and continues with the gateways.
    async fn native_fetch(
        &self,
        cid: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError>;
}

/// Policy knobs for the adapter, split from [`StorageConfig`] so tests can
/// assemble an adapter around doubles.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Gateway bases tried in order after the native route.
    pub gateways: Vec<String>,

    /// Gateway used for browsable URLs.
    pub primary_gateway: String,

    /// Maximum accepted attachment size in bytes.
    pub max_file_bytes: u64,

    /// Accepted attachment MIME types.
    pub allowed_mime_types: Vec<String>,

    /// Per-attempt retrieval timeout.
    pub fetch_timeout: Duration,
}

impl StoreOptions {
    /// Derives options from a storage configuration.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        let primary_gateway = match StoreMode::select(config) {
            StoreMode::Hosted => config.pinning_gateway.clone(),
            StoreMode::Local => format!("{}/ipfs/", config.node_api_base()),
            StoreMode::Mock => config
                .gateways
                .first()
                .cloned()
                .unwrap_or_else(|| config.pinning_gateway.clone()),
        };
        Self {
            gateways: config.gateways.clone(),
            primary_gateway,
            max_file_bytes: config.max_file_bytes,
            allowed_mime_types: config.allowed_mime_types.clone(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }
}

/// The content store adapter.
pub struct ContentStore {
    backend: Arc<dyn ContentBackend>,
    transport: Arc<dyn GatewayTransport>,
    options: StoreOptions,
}

impl ContentStore {
    /// Assembles an adapter from explicit parts. Test seam; production code
    /// goes through [`ContentStore::from_config`].
    #[must_use]
    pub fn new(
        backend: Arc<dyn ContentBackend>,
        transport: Arc<dyn GatewayTransport>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backend,
            transport,
            options,
        }
    }

    /// Builds the adapter for a configuration, selecting the backend by the
    /// fixed precedence hosted > local > mock.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        let backend: Arc<dyn ContentBackend> = match StoreMode::select(config) {
            StoreMode::Hosted => Arc::new(PinningBackend::new(
                config.pinning_api.clone(),
                config
                    .pinning_token
                    .clone()
                    .unwrap_or_default(),
            )),
            StoreMode::Local => Arc::new(NodeBackend::new(config.node_api_base())),
            StoreMode::Mock => match &config.mock_store_path {
                Some(path) => Arc::new(MockBackend::with_persistence(path.clone())),
                None => Arc::new(MockBackend::new()),
            },
        };
        Self::new(
            backend,
            Arc::new(HttpGatewayTransport::new()),
            StoreOptions::from_config(config),
        )
    }

    /// Returns the active backend mode.
    #[must_use]
    pub fn mode(&self) -> StoreMode {
        self.backend.mode()
    }

    /// Uploads a patient record with its attachments and returns the content
    /// id of the combined document.
    ///
    /// Attachments are validated up front, uploaded one by one (each yielding
    /// its own content id), embedded as [`FileRef`]s, and the combined JSON
    /// document is uploaded last. Zero attachments is valid.
    ///
    /// # Errors
    ///
    /// - [`StoreError::FileTooLarge`] / [`StoreError::FileTypeNotAllowed`]
    ///   before any network call when an attachment fails validation
    /// - [`StoreError::Upload`] when any upload fails; the whole operation
    ///   aborts and nothing references what was already uploaded
    pub async fn upload(
        &self,
        patient: &PatientRecord,
        files: &[FileAttachment],
    ) -> Result<UploadReceipt, StoreError> {
        for file in files {
            self.validate(file)?;
        }

        let mut refs = Vec::with_capacity(files.len());
        for file in files {
            let content_id = self.backend.put_file(file).await.map_err(|e| match e {
                StoreError::Upload(msg) => {
                    StoreError::Upload(format!("file '{}': {msg}", file.file_name))
                }
                other => other,
            })?;
            debug!(file = %file.file_name, %content_id, "attachment uploaded");
            refs.push(FileRef {
                content_id,
                file_name: file.file_name.clone(),
                mime_type: file.mime_type.clone(),
                size_bytes: file.size_bytes(),
            });
        }

        let record = ContentRecord {
            patient: patient.clone(),
            files: refs,
            metadata: RecordMetadata::stamp(),
        };
        let value = serde_json::to_value(&record).map_err(|e| StoreError::Parse(e.to_string()))?;
        let size_bytes =
            serde_json::to_vec(&value).map_err(|e| StoreError::Parse(e.to_string()))?.len() as u64;

        let cid = self.backend.put_json(&value).await?;
        debug!(%cid, size_bytes, mode = %self.mode(), "record uploaded");
        Ok(UploadReceipt { cid, size_bytes })
    }

    /// Resolves a content id to its JSON document.
    ///
    /// Tries the backend's native route first, then each configured gateway
    /// in listed order, sequentially, each attempt bounded by the per-attempt
    /// timeout. In mock mode there is nothing behind the gateways, so
    /// retrieval is native-only.
    ///
    /// # Errors
    ///
    /// - [`StoreError::MalformedCid`] for ids failing normalization
    /// - [`StoreError::Retrieval`] carrying the last underlying error once
    ///   every route is exhausted
    pub async fn fetch(&self, cid: &str) -> Result<Value, StoreError> {
        let cid = cid::normalize(cid).ok_or_else(|| StoreError::MalformedCid(cid.to_string()))?;
        let mut last_error: Option<String> = None;

        match self.backend.native_fetch(&cid, self.options.fetch_timeout).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                debug!(%cid, error = %e, "native retrieval failed");
                last_error = Some(e.to_string());
            }
        }

        if self.mode() == StoreMode::Mock {
            return Err(StoreError::Retrieval {
                cid,
                last_error: last_error
                    .unwrap_or_else(|| "content not found in mock storage".to_string()),
            });
        }

        for base in &self.options.gateways {
            let Some(url) = cid::gateway_url(base, &cid) else {
                continue;
            };
            debug!(%url, "trying gateway");
            match self.transport.get_json(&url, self.options.fetch_timeout).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(%url, error = %e, "gateway attempt failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(StoreError::Retrieval {
            cid,
            last_error: last_error.unwrap_or_else(|| "no retrieval routes configured".to_string()),
        })
    }

    /// Builds a browsable URL for a content id against the primary gateway.
    /// Pure, no I/O; `None` for malformed ids.
    #[must_use]
    pub fn gateway_url(&self, cid: &str) -> Option<String> {
        cid::gateway_url(&self.options.primary_gateway, cid)
    }

    fn validate(&self, file: &FileAttachment) -> Result<(), StoreError> {
        let size = file.size_bytes();
        if size > self.options.max_file_bytes {
            return Err(StoreError::FileTooLarge {
                file_name: file.file_name.clone(),
                size,
                max: self.options.max_file_bytes,
            });
        }
        if !self
            .options
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&file.mime_type))
        {
            return Err(StoreError::FileTypeNotAllowed {
                file_name: file.file_name.clone(),
                mime_type: file.mime_type.clone(),
            });
        }
        Ok(())
    }
}

/// Formats a byte count for display, e.g. `2.5 MB`.
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = (bytes as f64).log(1024.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);
    format!("{} {}", (value * 100.0).round() / 100.0, UNITS[exponent])
}
