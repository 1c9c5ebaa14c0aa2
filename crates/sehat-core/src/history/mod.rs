//! Local history cache.
//!
//! The ledger event log is the authoritative record history; this cache is
//! advisory. It remembers writes observed by this process so history renders
//! instantly and survives a temporarily unreachable ledger, and it is folded
//! into ledger history by [`merge`], where a ledger event always outranks a
//! cached entry for the same content id.
//!
//! Persistence is best effort: a missing or corrupt cache file loads as
//! empty, and a failed flush is logged and swallowed. Losing the cache loses
//! nothing authoritative.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::RecordKey;
use crate::ledger::LedgerEvent;

/// One observed write for a record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Content id of the stored record.
    pub cid: String,

    /// When the write was observed, milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

type Entries = HashMap<String, Vec<HistoryEntry>>;

/// Advisory cache of writes observed by this process, keyed by record key.
#[derive(Debug, Default)]
pub struct HistoryCache {
    entries: Arc<RwLock<Entries>>,
    path: Option<PathBuf>,
}

impl HistoryCache {
    /// Creates an empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache backed by a JSON file at `path`.
    ///
    /// An unreadable or corrupt file loads as an empty cache.
    #[must_use]
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Entries>(&raw).ok())
            .unwrap_or_default();
        Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(path),
        }
    }

    /// Records an observed write. Idempotent per `(key, cid)`: replaying a
    /// write already present leaves the cache unchanged even when the
    /// timestamps differ.
    pub fn record(&self, key: RecordKey, cid: &str, timestamp_ms: u64) {
        {
            let mut entries = self.entries.write().expect("lock poisoned");
            let list = entries.entry(key.to_hex()).or_default();
            if list.iter().any(|e| e.cid == cid) {
                return;
            }
            list.push(HistoryEntry {
                cid: cid.to_string(),
                timestamp_ms,
            });
        }
        self.flush();
    }

    /// Returns the cached entries for `key`, in insertion order.
    #[must_use]
    pub fn list(&self, key: RecordKey) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(&key.to_hex())
            .cloned()
            .unwrap_or_default()
    }

    fn flush(&self) {
        let Some(path) = &self.path else { return };
        let entries = self.entries.read().expect("lock poisoned");
        match serde_json::to_string_pretty(&*entries) {
            Ok(raw) => {
                if let Err(error) = fs::write(path, raw) {
                    warn!(path = %path.display(), %error, "history cache flush failed");
                }
            }
            Err(error) => warn!(%error, "history cache serialization failed"),
        }
    }
}

impl Clone for HistoryCache {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            path: self.path.clone(),
        }
    }
}

/// Merges ledger events with cached entries into one history, newest first.
///
/// Entries are deduplicated by content id. When both sources carry the same
/// cid, the ledger timestamp wins: the ledger is authoritative and the cache
/// only ever recorded a local observation of the same write.
///
/// Ledger timestamps can be coarse (second resolution on chain), so equal
/// timestamps are routine for writes confirmed close together. Ties are
/// broken by block number, which preserves the ledger's write order; a
/// cached-only entry has no block and ranks below ledger entries at the
/// same timestamp.
#[must_use]
pub fn merge(ledger_events: &[LedgerEvent], cached: &[HistoryEntry]) -> Vec<HistoryEntry> {
    let mut by_cid: HashMap<&str, (HistoryEntry, u64)> = HashMap::new();

    for entry in cached {
        by_cid.insert(entry.cid.as_str(), (entry.clone(), 0));
    }
    for event in ledger_events {
        by_cid.insert(
            event.cid.as_str(),
            (
                HistoryEntry {
                    cid: event.cid.clone(),
                    timestamp_ms: event.timestamp_ms,
                },
                event.block_number,
            ),
        );
    }

    let mut merged: Vec<(HistoryEntry, u64)> = by_cid.into_values().collect();
    merged.sort_by(|(a, a_block), (b, b_block)| {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then(b_block.cmp(a_block))
            .then(b.cid.cmp(&a.cid))
    });
    merged.into_iter().map(|(entry, _)| entry).collect()
}
