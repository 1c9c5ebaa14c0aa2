//! JSON-RPC ledger client.
//!
//! Speaks JSON-RPC 2.0 to the node hosting the pointer contract. Signing is
//! delegated to the configured account's provider — an injected wallet or a
//! node-managed key — so writes go out as `eth_sendTransaction` from that
//! account and the client never touches key material. [`SigningContext`]
//! makes the "is a signer available" question an explicit capability query
//! instead of ambient state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use super::abi;
use super::{Ledger, LedgerError, LedgerEvent, WriteReceipt};
use crate::config::LedgerConfig;
use crate::crypto::RecordKey;

/// Gas limit attached to pointer writes.
const WRITE_GAS_LIMIT: u64 = 500_000;

/// Errors raised by the JSON-RPC transport.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The endpoint could not be reached.
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response was not a well-formed JSON-RPC envelope.
    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

/// A single JSON-RPC 2.0 request/response exchange.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    /// Issues `method` with `params` and returns the `result` value.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] for transport failures, node-side error
    /// objects, and malformed envelopes.
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Production transport over HTTP.
#[derive(Debug)]
pub struct HttpJsonRpc {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpJsonRpc {
    /// Creates a transport for a JSON-RPC endpoint URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl JsonRpcTransport for HttpJsonRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        if let Some(error) = body.get("error") {
            return Err(RpcError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Malformed("response carries neither result nor error".into()))
    }
}

/// Explicit signing capability.
///
/// Holds the account writes are sent from; the account's provider performs
/// the actual signing. An absent account means the context is read-only.
#[derive(Debug, Clone, Default)]
pub struct SigningContext {
    account: Option<String>,
}

impl SigningContext {
    /// A context that signs as `account`.
    #[must_use]
    pub fn injected(account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
        }
    }

    /// A context without write capability.
    #[must_use]
    pub const fn read_only() -> Self {
        Self { account: None }
    }

    /// True when a signer is available.
    #[must_use]
    pub const fn can_sign(&self) -> bool {
        self.account.is_some()
    }

    /// Returns the signing account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] when the context is read-only.
    pub fn signer(&self) -> Result<&str, LedgerError> {
        self.account.as_deref().ok_or_else(|| {
            LedgerError::Unauthorized("no signing account configured".to_string())
        })
    }
}

/// JSON-RPC backed [`Ledger`] implementation.
pub struct RpcLedger {
    rpc: Arc<dyn JsonRpcTransport>,
    contract: String,
    signing: SigningContext,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcLedger {
    /// Builds a client for a ledger configuration.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        let signing = config
            .account
            .clone()
            .map_or_else(SigningContext::read_only, SigningContext::injected);
        Self::with_transport(
            Arc::new(HttpJsonRpc::new(config.endpoint.clone())),
            config.contract_address.clone(),
            signing,
            Duration::from_secs(config.confirmation_timeout_secs),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Assembles a client from explicit parts. Test seam.
    #[must_use]
    pub fn with_transport(
        rpc: Arc<dyn JsonRpcTransport>,
        contract: impl Into<String>,
        signing: SigningContext,
        confirmation_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            rpc,
            contract: contract.into(),
            signing,
            confirmation_timeout,
            poll_interval,
        }
    }

    async fn eth_call(&self, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let params = json!([
            {"to": self.contract, "data": format!("0x{}", hex::encode(data))},
            "latest",
        ]);
        let result = self.rpc.request("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::Malformed("eth_call result is not a string".into()))?;
        abi::decode_hex(hex_str).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// Polls for the transaction receipt until it lands or the confirmation
    /// window closes.
    async fn await_receipt(&self, tx_hash: &str) -> Result<WriteReceipt, LedgerError> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;
        loop {
            let receipt = self
                .rpc
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .map_err(map_read_error)?;

            if !receipt.is_null() {
                let status = receipt.get("status").and_then(Value::as_str).unwrap_or("0x1");
                if status == "0x0" {
                    return Err(LedgerError::TransactionRejected(format!(
                        "transaction {tx_hash} reverted"
                    )));
                }
                let block_number = receipt
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .map_or(Ok(0), hex_to_u64)?;
                return Ok(WriteReceipt {
                    tx_hash: tx_hash.to_string(),
                    block_number,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    #[instrument(skip(self, cid), fields(key = %key))]
    async fn write_pointer(&self, key: RecordKey, cid: &str) -> Result<WriteReceipt, LedgerError> {
        let from = self.signing.signer()?;
        let data = abi::encode_write_pointer(&key, cid);
        let params = json!([{
            "from": from,
            "to": self.contract,
            "data": format!("0x{}", hex::encode(&data)),
            "gas": format!("0x{WRITE_GAS_LIMIT:x}"),
        }]);

        debug!(%cid, "submitting pointer write");
        let result = self
            .rpc
            .request("eth_sendTransaction", params)
            .await
            .map_err(map_write_error)?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| LedgerError::Protocol("transaction hash is not a string".into()))?
            .to_string();

        let receipt = self.await_receipt(&tx_hash).await?;
        debug!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "pointer write confirmed");
        Ok(receipt)
    }

    async fn read_pointer(&self, key: RecordKey) -> Result<String, LedgerError> {
        // The contract reverts on reads of absent keys, so probe existence
        // first and keep NotFound a first-class outcome rather than a
        // decoded revert.
        if !self.pointer_exists(key).await? {
            return Err(LedgerError::NotFound { key: key.to_hex() });
        }

        let data = abi::encode_read_pointer(&key);
        let output = match self.eth_call(&data).await {
            Ok(output) => output,
            // A revert despite the existence probe means the pointer vanished
            // between the two calls; still an absent key, not a fault.
            Err(RpcError::Rpc { message, .. }) if is_revert(&message) => {
                return Err(LedgerError::NotFound { key: key.to_hex() });
            }
            Err(e) => return Err(map_read_error(e)),
        };

        let cid = abi::decode_string_return(&output)
            .map_err(|e| LedgerError::Protocol(e.to_string()))?;
        if cid.trim().is_empty() {
            return Err(LedgerError::NotFound { key: key.to_hex() });
        }
        Ok(cid)
    }

    async fn pointer_exists(&self, key: RecordKey) -> Result<bool, LedgerError> {
        let data = abi::encode_pointer_exists(&key);
        let output = self.eth_call(&data).await.map_err(map_read_error)?;
        abi::decode_bool_return(&output).map_err(|e| LedgerError::Protocol(e.to_string()))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn scan_events(&self, key: RecordKey) -> Result<Vec<LedgerEvent>, LedgerError> {
        let added = format!("0x{}", hex::encode(abi::event_topic(abi::RECORD_ADDED_SIG)));
        let updated = format!("0x{}", hex::encode(abi::event_topic(abi::RECORD_UPDATED_SIG)));
        let params = json!([{
            "address": self.contract,
            "fromBlock": "0x0",
            "toBlock": "latest",
            "topics": [[added, updated]],
        }]);

        let result = self
            .rpc
            .request("eth_getLogs", params)
            .await
            .map_err(map_read_error)?;
        let logs = result
            .as_array()
            .ok_or_else(|| LedgerError::Protocol("log query result is not an array".into()))?;

        let mut events = Vec::new();
        for log in logs {
            let topics: Vec<String> = log
                .get("topics")
                .and_then(Value::as_array)
                .map(|t| {
                    t.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            let data = log.get("data").and_then(Value::as_str).unwrap_or("0x");

            let decoded = abi::decode_record_log(&topics, data)
                .map_err(|e| LedgerError::Protocol(e.to_string()))?;
            if decoded.key != key {
                continue;
            }

            let block_number = log
                .get("blockNumber")
                .and_then(Value::as_str)
                .map_or(Ok(0), hex_to_u64)?;
            let tx_hash = log
                .get("transactionHash")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            events.push(LedgerEvent {
                key: decoded.key,
                cid: decoded.cid,
                timestamp_ms: decoded.timestamp_secs.saturating_mul(1000),
                block_number,
                tx_hash,
            });
        }

        events.sort_by_key(|e| (e.timestamp_ms, e.block_number));
        debug!(count = events.len(), "event scan complete");
        Ok(events)
    }
}

fn is_revert(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("revert") || lower.contains("execution error")
}

fn is_authorization_revert(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("owner") || lower.contains("unauthorized") || lower.contains("not permitted")
}

fn map_read_error(error: RpcError) -> LedgerError {
    match error {
        RpcError::Transport(msg) => LedgerError::NetworkUnavailable(msg),
        RpcError::Rpc { message, .. } => LedgerError::TransactionRejected(message),
        RpcError::Malformed(msg) => LedgerError::Protocol(msg),
    }
}

fn map_write_error(error: RpcError) -> LedgerError {
    match error {
        RpcError::Transport(msg) => LedgerError::NetworkUnavailable(msg),
        RpcError::Rpc { message, .. } if is_revert(&message) => {
            if is_authorization_revert(&message) {
                LedgerError::Unauthorized(message)
            } else {
                LedgerError::TransactionRejected(message)
            }
        }
        RpcError::Rpc { message, .. } => LedgerError::TransactionRejected(message),
        RpcError::Malformed(msg) => LedgerError::Protocol(msg),
    }
}

fn hex_to_u64(s: &str) -> Result<u64, LedgerError> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16)
        .map_err(|e| LedgerError::Protocol(format!("bad hex quantity '{s}': {e}")))
}
