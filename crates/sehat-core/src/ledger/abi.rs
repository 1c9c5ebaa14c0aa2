//! Fixed contract ABI codec.
//!
//! The pointer contract exposes exactly three functions and two events; the
//! encoding here is bit-exact against that ABI and nothing else. Selectors
//! and event topics are the standard Keccak-256 prefixes of the canonical
//! signatures.

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::crypto::{RecordKey, KEY_SIZE};

/// One ABI word.
const WORD: usize = 32;

/// Canonical function signatures.
pub const WRITE_POINTER_SIG: &str = "writePointer(bytes32,string)";
/// Read the current pointer for a key; reverts when absent.
pub const READ_POINTER_SIG: &str = "readPointer(bytes32)";
/// Existence probe; never reverts.
pub const POINTER_EXISTS_SIG: &str = "pointerExists(bytes32)";

/// Canonical event signatures.
pub const RECORD_ADDED_SIG: &str = "RecordAdded(bytes32,string,uint256)";
/// Emitted on every overwrite of an existing pointer.
pub const RECORD_UPDATED_SIG: &str = "RecordUpdated(bytes32,string,uint256)";

/// Errors raised while decoding ABI payloads.
#[derive(Debug, Error)]
pub enum AbiError {
    /// Payload shorter or shaped differently than the ABI requires.
    #[error("abi decode error: {0}")]
    Decode(String),

    /// Hex payload could not be decoded.
    #[error("abi hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A decoded `RecordAdded`/`RecordUpdated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecordLog {
    /// Indexed record key from topic 1.
    pub key: RecordKey,
    /// Content id payload.
    pub cid: String,
    /// Ledger timestamp in seconds.
    pub timestamp_secs: u64,
}

/// Computes the 4-byte function selector for a canonical signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Computes the 32-byte topic hash for a canonical event signature.
#[must_use]
pub fn event_topic(signature: &str) -> [u8; WORD] {
    keccak(signature.as_bytes())
}

/// Encodes `writePointer(bytes32 key, string cid)` calldata.
#[must_use]
pub fn encode_write_pointer(key: &RecordKey, cid: &str) -> Vec<u8> {
    let cid_bytes = cid.as_bytes();
    let mut data = Vec::with_capacity(4 + WORD * 3 + padded_len(cid_bytes.len()));
    data.extend_from_slice(&selector(WRITE_POINTER_SIG));
    data.extend_from_slice(key.as_bytes());
    // Offset of the dynamic string, counted from the start of the arguments.
    data.extend_from_slice(&word_u64(2 * WORD as u64));
    data.extend_from_slice(&word_u64(cid_bytes.len() as u64));
    data.extend_from_slice(cid_bytes);
    data.resize(4 + WORD * 3 + padded_len(cid_bytes.len()), 0);
    data
}

/// Encodes `readPointer(bytes32 key)` calldata.
#[must_use]
pub fn encode_read_pointer(key: &RecordKey) -> Vec<u8> {
    encode_key_call(READ_POINTER_SIG, key)
}

/// Encodes `pointerExists(bytes32 key)` calldata.
#[must_use]
pub fn encode_pointer_exists(key: &RecordKey) -> Vec<u8> {
    encode_key_call(POINTER_EXISTS_SIG, key)
}

/// Decodes an ABI-encoded `string` return value.
///
/// # Errors
///
/// Returns [`AbiError::Decode`] when the payload is not a well-formed
/// single-string return.
pub fn decode_string_return(data: &[u8]) -> Result<String, AbiError> {
    if data.len() < 2 * WORD {
        return Err(AbiError::Decode(format!(
            "string return too short: {} bytes",
            data.len()
        )));
    }
    let offset = word_to_usize(&data[..WORD])?;
    if offset + WORD > data.len() {
        return Err(AbiError::Decode(format!("string offset {offset} out of range")));
    }
    let len = word_to_usize(&data[offset..offset + WORD])?;
    let start = offset + WORD;
    let end = start
        .checked_add(len)
        .ok_or_else(|| AbiError::Decode("string length overflow".to_string()))?;
    if end > data.len() {
        return Err(AbiError::Decode(format!(
            "string body truncated: need {end}, have {}",
            data.len()
        )));
    }
    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| AbiError::Decode(format!("string not UTF-8: {e}")))
}

/// Decodes an ABI-encoded `bool` return value.
///
/// # Errors
///
/// Returns [`AbiError::Decode`] when the payload is not a single word.
pub fn decode_bool_return(data: &[u8]) -> Result<bool, AbiError> {
    if data.len() < WORD {
        return Err(AbiError::Decode(format!(
            "bool return too short: {} bytes",
            data.len()
        )));
    }
    Ok(data[WORD - 1] != 0)
}

/// Decodes a `RecordAdded`/`RecordUpdated` log from its hex-encoded topics
/// and data, as delivered by the JSON-RPC log query.
///
/// The key is indexed (topic 1); the data section carries the non-indexed
/// `(string cid, uint256 timestamp)` pair.
///
/// # Errors
///
/// Returns [`AbiError`] for missing topics, bad hex, or malformed data.
pub fn decode_record_log(topics: &[String], data_hex: &str) -> Result<DecodedRecordLog, AbiError> {
    let key_topic = topics
        .get(1)
        .ok_or_else(|| AbiError::Decode("log carries no key topic".to_string()))?;
    let key_bytes = decode_hex(key_topic)?;
    let key_array: [u8; KEY_SIZE] = key_bytes
        .try_into()
        .map_err(|_| AbiError::Decode("key topic is not 32 bytes".to_string()))?;

    let data = decode_hex(data_hex)?;
    if data.len() < 2 * WORD {
        return Err(AbiError::Decode(format!(
            "log data too short: {} bytes",
            data.len()
        )));
    }
    // Head: [string offset][timestamp]; tail: string length + bytes.
    let cid = decode_string_at(&data, 0)?;
    let timestamp_secs = word_to_u64(&data[WORD..2 * WORD])?;

    Ok(DecodedRecordLog {
        key: RecordKey::from_bytes(key_array),
        cid,
        timestamp_secs,
    })
}

/// Decodes a dynamic string whose offset word sits at `head` in `data`.
fn decode_string_at(data: &[u8], head: usize) -> Result<String, AbiError> {
    if head + WORD > data.len() {
        return Err(AbiError::Decode("string head out of range".to_string()));
    }
    let offset = word_to_usize(&data[head..head + WORD])?;
    decode_string_return(&build_string_return(data, offset)?)
}

/// Re-frames a string at `offset` as a standalone string return so the
/// single decoder handles both shapes.
fn build_string_return(data: &[u8], offset: usize) -> Result<Vec<u8>, AbiError> {
    if offset > data.len() {
        return Err(AbiError::Decode(format!("string offset {offset} out of range")));
    }
    let mut framed = Vec::with_capacity(WORD + data.len() - offset);
    framed.extend_from_slice(&word_u64(WORD as u64));
    framed.extend_from_slice(&data[offset..]);
    Ok(framed)
}

/// Strips an optional `0x` prefix and hex-decodes.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, AbiError> {
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

fn encode_key_call(signature: &str, key: &RecordKey) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(key.as_bytes());
    data
}

fn keccak(input: &[u8]) -> [u8; WORD] {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    hasher.finalize().into()
}

fn word_u64(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_to_u64(word: &[u8]) -> Result<u64, AbiError> {
    if word.len() != WORD {
        return Err(AbiError::Decode("word is not 32 bytes".to_string()));
    }
    if word[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(AbiError::Decode("value exceeds u64 range".to_string()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

fn word_to_usize(word: &[u8]) -> Result<usize, AbiError> {
    usize::try_from(word_to_u64(word)?)
        .map_err(|_| AbiError::Decode("value exceeds usize range".to_string()))
}

const fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}
