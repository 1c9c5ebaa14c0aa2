//! Client library for content-addressed patient health records.
//!
//! `sehat-core` is the data layer of a patient record system in which the
//! records themselves live in a content-addressable store (a hosted pinning
//! service, a local node, or an in-process mock) and only a pointer to the
//! current record is held by a remote ledger, keyed by a one-way hash of the
//! patient identifier. The ledger keeps a single current pointer per key and
//! emits an append-only event per write, so a patient's full history is
//! reconstructed from the event log rather than from current state.
//!
//! # Architecture
//!
//! ```text
//! RecordService (orchestration)
//!     |
//!     +-- ContentStore (upload/fetch, gateway fallback)
//!     |       +-- PinningBackend | NodeBackend | MockBackend
//!     |
//!     +-- Ledger (pointer write/read, event scan)
//!     |       +-- RpcLedger | MemoryLedger
//!     |
//!     +-- HistoryCache (local, advisory write history)
//! ```
//!
//! Writes flow upload -> ledger write -> local cache record; the uploaded
//! document is immutable once stored (any change yields a different content
//! id). Reads resolve the current pointer and dereference it through a
//! prioritized chain of retrieval routes. History merges authoritative ledger
//! events with the advisory local cache, deduplicated by content id.
//!
//! No operation retries automatically; callers that want retry-with-backoff
//! build it above this layer.

pub mod config;
pub mod crypto;
pub mod history;
pub mod ledger;
pub mod record;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::{CacheConfig, Config, ConfigError, LedgerConfig, StorageConfig};
pub use crypto::RecordKey;
pub use history::{HistoryCache, HistoryEntry};
pub use ledger::{Ledger, LedgerError, LedgerEvent, SigningContext, WriteReceipt};
pub use record::{ContentRecord, FileAttachment, FileRef, PatientId, PatientRecord};
pub use service::{HistoryItem, RecordError, RecordService, SubmitReceipt};
pub use store::{ContentStore, StoreError, StoreMode, UploadReceipt};
