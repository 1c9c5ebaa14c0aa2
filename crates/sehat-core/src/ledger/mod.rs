//! Ledger client.
//!
//! The ledger is an opaque remote key-value store with an append-only event
//! log: one current pointer per record key, overwritten on every write
//! (last-writer-wins, no compare-and-swap — deliberate, since history is
//! never lost: every write also appends an immutable event), and one
//! `RecordAdded`/`RecordUpdated` event per write. The ordered event sequence
//! for a key is the authoritative history.
//!
//! [`Ledger`] is the trait seam; [`RpcLedger`] speaks JSON-RPC to a deployed
//! contract and [`MemoryLedger`] backs tests. No implementation retries
//! automatically, and no operation partially applies: a write either
//! confirms (one pointer update, one event) or fails with nothing to clean
//! up.

pub mod abi;
mod memory;
mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryLedger;
pub use rpc::{HttpJsonRpc, JsonRpcTransport, RpcError, RpcLedger, SigningContext};

use crate::crypto::RecordKey;

/// Errors raised by ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The signing identity is missing or lacks write permission.
    #[error("signing identity unavailable or not permitted: {0}")]
    Unauthorized(String),

    /// No pointer exists for the key. Expected-absent state, not a fault:
    /// callers branch on this, so it must stay distinguishable from
    /// transport failures.
    #[error("no record pointer exists for key {key}")]
    NotFound {
        /// Hex form of the key that has no pointer.
        key: String,
    },

    /// The ledger endpoint could not be reached.
    #[error("ledger endpoint unreachable: {0}")]
    NetworkUnavailable(String),

    /// The ledger reverted the transaction for a reason other than
    /// authorization.
    #[error("transaction rejected by ledger: {0}")]
    TransactionRejected(String),

    /// A confirmed receipt did not arrive within the configured window.
    #[error("timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout {
        /// Hash of the unconfirmed transaction.
        tx_hash: String,
    },

    /// The ledger answered with something the client cannot interpret.
    #[error("malformed ledger response: {0}")]
    Protocol(String),
}

impl LedgerError {
    /// True when the error is the expected-absent [`LedgerError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// One append-only ledger event, emitted once per pointer write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Record key the write targeted.
    pub key: RecordKey,

    /// Content id written as the new pointer.
    pub cid: String,

    /// Ledger timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// Block sequence number the event landed in.
    pub block_number: u64,

    /// Transaction hash of the write.
    pub tx_hash: String,
}

/// Receipt for a confirmed pointer write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Transaction hash.
    pub tx_hash: String,

    /// Block the transaction was confirmed in.
    pub block_number: u64,
}

/// The remote pointer ledger.
///
/// Every operation that touches the network may fail transiently; callers
/// decide whether to retry.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Writes `cid` as the current pointer for `key`, overwriting any
    /// previous pointer, and blocks until the write is confirmed once.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] when the signing identity is missing
    ///   or not permitted to write
    /// - [`LedgerError::NetworkUnavailable`] when the endpoint is
    ///   unreachable
    /// - [`LedgerError::TransactionRejected`] for any other revert
    async fn write_pointer(&self, key: RecordKey, cid: &str) -> Result<WriteReceipt, LedgerError>;

    /// Reads the current pointer for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] when no pointer exists yet —
    /// distinguishable from transport failure by construction.
    async fn read_pointer(&self, key: RecordKey) -> Result<String, LedgerError>;

    /// Probes whether a pointer exists for `key` without reading it.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the ledger cannot be queried.
    async fn pointer_exists(&self, key: RecordKey) -> Result<bool, LedgerError>;

    /// Scans the full event log from genesis and returns the events for
    /// `key`, oldest first.
    ///
    /// This is a linear scan with client-side filtering — acceptable at this
    /// event volume; a production-scale deployment would put an index or an
    /// off-chain event subscriber in front of it.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the log cannot be queried.
    async fn scan_events(&self, key: RecordKey) -> Result<Vec<LedgerEvent>, LedgerError>;
}
