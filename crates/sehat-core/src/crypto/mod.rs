//! Record key derivation.
//!
//! A patient identifier is never written to the ledger verbatim; the ledger
//! slot for a patient is addressed by the Keccak-256 hash of the identifier's
//! UTF-8 bytes. The same algorithm is used by the deployed contract, so the
//! derivation must stay bit-exact: the same identifier string resolves to the
//! same on-chain slot across clients and restarts.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Size of a record key in bytes.
pub const KEY_SIZE: usize = 32;

/// Errors that can occur when parsing a record key from hex.
#[derive(Debug, Error)]
pub enum KeyParseError {
    /// The hex string decodes to the wrong number of bytes.
    #[error("record key must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The string is not valid hex.
    #[error("record key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// The 32-byte ledger key derived from a patient identifier.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex, matching the
/// `bytes32` representation used in ledger calls and event topics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey([u8; KEY_SIZE]);

impl RecordKey {
    /// Derives the ledger key for a patient identifier.
    ///
    /// Keccak-256 over the raw UTF-8 bytes of the identifier. Deterministic:
    /// equal strings always produce equal keys.
    #[must_use]
    pub fn derive(identifier: &str) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(identifier.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Returns the `0x`-prefixed lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a key from hex, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`KeyParseError`] if the string is not valid hex or does not
    /// decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, KeyParseError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        let actual = bytes.len();
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KeyParseError::WrongLength {
            expected: KEY_SIZE,
            actual,
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self.to_hex())
    }
}

impl FromStr for RecordKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = RecordKey::derive("123456789012");
        let b = RecordKey::derive("123456789012");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_identifiers_distinct_keys() {
        assert_ne!(
            RecordKey::derive("123456789012"),
            RecordKey::derive("123456789013")
        );
    }

    #[test]
    fn keccak_known_vectors() {
        // Keccak-256 (not SHA3-256) of the empty string and "abc".
        assert_eq!(
            RecordKey::derive("").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            RecordKey::derive("abc").to_hex(),
            "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn hex_round_trip() {
        let key = RecordKey::derive("patient");
        let parsed = RecordKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);

        // Unprefixed hex parses too.
        let unprefixed = key.to_hex().trim_start_matches("0x").to_string();
        assert_eq!(RecordKey::from_hex(&unprefixed).unwrap(), key);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(matches!(
            RecordKey::from_hex("0x0123"),
            Err(KeyParseError::WrongLength { .. })
        ));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert!(matches!(
            RecordKey::from_hex("0xzz"),
            Err(KeyParseError::Hex(_))
        ));
    }

    #[test]
    fn serde_round_trip() {
        let key = RecordKey::derive("123456789012");
        let json = serde_json::to_string(&key).unwrap();
        let back: RecordKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    proptest! {
        #[test]
        fn derive_deterministic_for_all_strings(s in ".*") {
            prop_assert_eq!(RecordKey::derive(&s), RecordKey::derive(&s));
        }

        #[test]
        fn hex_round_trips_for_all_strings(s in ".*") {
            let key = RecordKey::derive(&s);
            prop_assert_eq!(RecordKey::from_hex(&key.to_hex()).unwrap(), key);
        }
    }
}
