//! Record service.
//!
//! Composes the content store, the ledger client, and the history cache into
//! the three operations callers actually perform: submit a record, read the
//! current record, and reconstruct the full history. The raw patient
//! identifier stays inside this module; everything past the boundary works
//! with the derived [`RecordKey`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::crypto::RecordKey;
use crate::history::{self, HistoryCache};
use crate::ledger::{Ledger, LedgerError, RpcLedger};
use crate::record::{FileAttachment, IdentifierError, PatientId, PatientRecord};
use crate::store::{ContentStore, StoreError, StoreMode};

/// Errors raised by record operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The patient identifier failed validation.
    #[error("invalid patient identifier: {0}")]
    Identifier(#[from] IdentifierError),

    /// A content store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RecordError {
    /// True when the error means "no record exists for this identifier".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_not_found())
    }
}

/// Result of a successful record submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Content id of the stored record document.
    pub cid: String,

    /// Transaction hash of the confirmed pointer write.
    pub tx_hash: String,

    /// Block the pointer write landed in.
    pub block_number: u64,
}

/// One version of a record's history, newest first in the returned list.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    /// Content id of this version.
    pub cid: String,

    /// Write timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// The resolved record document; `None` when retrieval failed, so one
    /// unreachable version never hides the rest of the history.
    pub data: Option<Value>,
}

/// High-level record operations over store, ledger and cache.
pub struct RecordService {
    store: ContentStore,
    ledger: Arc<dyn Ledger>,
    cache: HistoryCache,
}

impl RecordService {
    /// Assembles a service from explicit parts.
    #[must_use]
    pub fn new(store: ContentStore, ledger: Arc<dyn Ledger>, cache: HistoryCache) -> Self {
        Self {
            store,
            ledger,
            cache,
        }
    }

    /// Builds the production wiring for a configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let cache = config
            .cache
            .path
            .as_ref()
            .map_or_else(HistoryCache::new, HistoryCache::with_persistence);
        Self::new(
            ContentStore::from_config(&config.storage),
            Arc::new(RpcLedger::from_config(&config.ledger)),
            cache,
        )
    }

    /// Returns the active content store mode.
    #[must_use]
    pub fn store_mode(&self) -> StoreMode {
        self.store.mode()
    }

    /// Builds a browsable URL for a stored content id. `None` for malformed
    /// ids; meaningless in mock mode, which callers can detect via
    /// [`RecordService::store_mode`].
    #[must_use]
    pub fn view_url(&self, cid: &str) -> Option<String> {
        self.store.gateway_url(cid)
    }

    /// Submits a record: uploads the document with its attachments, then
    /// writes the resulting content id as the ledger pointer for the
    /// identifier's derived key.
    ///
    /// The two steps are not atomic. A ledger failure after a successful
    /// upload leaves the content stored but unreferenced, which is harmless
    /// in a content-addressed store, and the caller may retry the whole
    /// submission.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Identifier`] for an invalid identifier, before any
    ///   network call
    /// - [`RecordError::Store`] when validation or upload fails; the ledger
    ///   is never touched
    /// - [`RecordError::Ledger`] when the pointer write fails
    #[instrument(skip_all, fields(mode = %self.store.mode()))]
    pub async fn submit_record(
        &self,
        identifier: &str,
        patient: &PatientRecord,
        files: &[FileAttachment],
    ) -> Result<SubmitReceipt, RecordError> {
        let id = PatientId::new(identifier)?;
        let key = RecordKey::derive(id.as_str());

        let upload = self.store.upload(patient, files).await?;
        let receipt = self.ledger.write_pointer(key, &upload.cid).await?;
        self.cache.record(key, &upload.cid, now_ms());

        info!(
            cid = %upload.cid,
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "record submitted"
        );
        Ok(SubmitReceipt {
            cid: upload.cid,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        })
    }

    /// Reads the current record for an identifier: resolves the ledger
    /// pointer, then fetches the document it names.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Identifier`] for an invalid identifier
    /// - [`RecordError::Ledger`] with [`LedgerError::NotFound`] when no
    ///   record exists; check with [`RecordError::is_not_found`]
    /// - [`RecordError::Store`] when the pointed-to document cannot be
    ///   retrieved
    pub async fn current_record(&self, identifier: &str) -> Result<Value, RecordError> {
        let id = PatientId::new(identifier)?;
        let key = RecordKey::derive(id.as_str());

        let cid = self.ledger.read_pointer(key).await?;
        Ok(self.store.fetch(&cid).await?)
    }

    /// Reconstructs the full history for an identifier, newest first.
    ///
    /// Ledger events are merged with locally cached writes (the ledger wins
    /// for a shared content id), then each version's document is fetched
    /// best effort. An unreachable ledger degrades to cache-only history
    /// rather than failing the whole call.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Identifier`] for an invalid identifier
    /// - [`RecordError::Ledger`] for ledger failures other than an
    ///   unreachable endpoint
    #[instrument(skip(self))]
    pub async fn full_history(&self, identifier: &str) -> Result<Vec<HistoryItem>, RecordError> {
        let id = PatientId::new(identifier)?;
        let key = RecordKey::derive(id.as_str());

        let events = match self.ledger.scan_events(key).await {
            Ok(events) => events,
            Err(LedgerError::NetworkUnavailable(reason)) => {
                warn!(%reason, "ledger unreachable, serving cached history only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let cached = self.cache.list(key);
        let merged = history::merge(&events, &cached);

        let mut items = Vec::with_capacity(merged.len());
        for entry in merged {
            let data = match self.store.fetch(&entry.cid).await {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(cid = %entry.cid, error = %e, "history version unretrievable");
                    None
                }
            };
            items.push(HistoryItem {
                cid: entry.cid,
                timestamp_ms: entry.timestamp_ms,
                data,
            });
        }
        Ok(items)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
