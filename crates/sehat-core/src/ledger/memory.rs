//! In-memory ledger for tests and offline operation.
//!
//! Faithful to the remote ledger's semantics: one current pointer per key
//! with last-writer-wins overwrite, and one immutable event appended per
//! write. Events carry monotonically increasing block numbers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::{Ledger, LedgerError, LedgerEvent, WriteReceipt};
use crate::crypto::RecordKey;

#[derive(Debug, Default)]
struct Inner {
    pointers: HashMap<RecordKey, String>,
    events: Vec<LedgerEvent>,
    next_block: u64,
}

/// In-memory [`Ledger`] implementation.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a write with an explicit timestamp. Test hook for building
    /// histories with controlled ordering.
    pub fn write_pointer_at(&self, key: RecordKey, cid: &str, timestamp_ms: u64) -> WriteReceipt {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.next_block += 1;
        let block_number = inner.next_block;
        let tx_hash = format!("0x{block_number:064x}");

        inner.pointers.insert(key, cid.to_string());
        inner.events.push(LedgerEvent {
            key,
            cid: cid.to_string(),
            timestamp_ms,
            block_number,
            tx_hash: tx_hash.clone(),
        });

        WriteReceipt {
            tx_hash,
            block_number,
        }
    }

    /// Returns the total number of events across all keys.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.lock().expect("lock poisoned").events.len()
    }
}

impl Clone for MemoryLedger {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn write_pointer(&self, key: RecordKey, cid: &str) -> Result<WriteReceipt, LedgerError> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Ok(self.write_pointer_at(key, cid, timestamp_ms))
    }

    async fn read_pointer(&self, key: RecordKey) -> Result<String, LedgerError> {
        self.inner
            .lock()
            .expect("lock poisoned")
            .pointers
            .get(&key)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound { key: key.to_hex() })
    }

    async fn pointer_exists(&self, key: RecordKey) -> Result<bool, LedgerError> {
        Ok(self
            .inner
            .lock()
            .expect("lock poisoned")
            .pointers
            .contains_key(&key))
    }

    async fn scan_events(&self, key: RecordKey) -> Result<Vec<LedgerEvent>, LedgerError> {
        let inner = self.inner.lock().expect("lock poisoned");
        let mut events: Vec<LedgerEvent> = inner
            .events
            .iter()
            .filter(|e| e.key == key)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp_ms, e.block_number));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_before_write_is_not_found() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::derive("000000000000");

        let err = ledger.read_pointer(key).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!ledger.pointer_exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn write_overwrites_pointer_but_appends_events() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::derive("123456789012");

        ledger.write_pointer_at(key, "QmFirstPointer0", 100);
        ledger.write_pointer_at(key, "QmSecondPointer", 200);

        // Current state holds only the latest pointer.
        assert_eq!(ledger.read_pointer(key).await.unwrap(), "QmSecondPointer");

        // History holds both writes, oldest first.
        let events = ledger.scan_events(key).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].cid, "QmFirstPointer0");
        assert_eq!(events[1].cid, "QmSecondPointer");
        assert!(events[0].block_number < events[1].block_number);
    }

    #[tokio::test]
    async fn scan_filters_by_key() {
        let ledger = MemoryLedger::new();
        let a = RecordKey::derive("123456789012");
        let b = RecordKey::derive("999999999999");

        ledger.write_pointer_at(a, "QmPointerForA0", 100);
        ledger.write_pointer_at(b, "QmPointerForB0", 150);

        let events = ledger.scan_events(a).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, a);
    }

    #[tokio::test]
    async fn concurrent_writers_last_wins_history_kept() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::derive("123456789012");

        // Two admins racing on the same patient: pointer is last-writer-wins,
        // but neither write disappears from the event log.
        let l1 = ledger.clone();
        let l2 = ledger.clone();
        let (r1, r2) = tokio::join!(
            l1.write_pointer(key, "QmWriterOneCid0"),
            l2.write_pointer(key, "QmWriterTwoCid0"),
        );
        r1.unwrap();
        r2.unwrap();

        let current = ledger.read_pointer(key).await.unwrap();
        assert!(current == "QmWriterOneCid0" || current == "QmWriterTwoCid0");
        assert_eq!(ledger.scan_events(key).await.unwrap().len(), 2);
    }
}
