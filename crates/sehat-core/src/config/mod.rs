//! Environment configuration.
//!
//! Configuration is an explicit value constructed once at startup (from a
//! TOML file or from `SEHAT_*` environment variables) and passed into the
//! component constructors, never read from ambient process state after that.
//! This keeps backend selection deterministic and lets tests inject doubles
//! per backend.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse failure.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field failed semantic validation.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger endpoint and signing identity.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Content store backends and retrieval gateways.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local history cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a field fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from `SEHAT_*` environment variables.
    ///
    /// Unset variables fall back to the same defaults as the TOML path.
    /// Recognized variables:
    ///
    /// - `SEHAT_LEDGER_ENDPOINT`, `SEHAT_CHAIN_ID`, `SEHAT_CONTRACT_ADDRESS`,
    ///   `SEHAT_ACCOUNT`
    /// - `SEHAT_PINNING_TOKEN`, `SEHAT_PINNING_API`, `SEHAT_PINNING_GATEWAY`
    /// - `SEHAT_USE_LOCAL_NODE`, `SEHAT_NODE_HOST`, `SEHAT_NODE_PORT`,
    ///   `SEHAT_NODE_PROTOCOL`
    /// - `SEHAT_GATEWAYS` (comma-separated), `SEHAT_MAX_FILE_BYTES`,
    ///   `SEHAT_ALLOWED_MIME_TYPES` (comma-separated)
    /// - `SEHAT_CACHE_PATH`, `SEHAT_MOCK_STORE_PATH`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a numeric variable does not
    /// parse or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SEHAT_LEDGER_ENDPOINT") {
            config.ledger.endpoint = v;
        }
        if let Ok(v) = std::env::var("SEHAT_CHAIN_ID") {
            config.ledger.chain_id = parse_var("SEHAT_CHAIN_ID", &v)?;
        }
        if let Ok(v) = std::env::var("SEHAT_CONTRACT_ADDRESS") {
            config.ledger.contract_address = v;
        }
        if let Ok(v) = std::env::var("SEHAT_ACCOUNT") {
            config.ledger.account = Some(v);
        }

        if let Ok(v) = std::env::var("SEHAT_PINNING_TOKEN") {
            if !v.is_empty() {
                config.storage.pinning_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("SEHAT_PINNING_API") {
            config.storage.pinning_api = v;
        }
        if let Ok(v) = std::env::var("SEHAT_PINNING_GATEWAY") {
            config.storage.pinning_gateway = v;
        }
        if let Ok(v) = std::env::var("SEHAT_USE_LOCAL_NODE") {
            config.storage.use_local_node = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SEHAT_NODE_HOST") {
            config.storage.node_host = v;
        }
        if let Ok(v) = std::env::var("SEHAT_NODE_PORT") {
            config.storage.node_port = parse_var("SEHAT_NODE_PORT", &v)?;
        }
        if let Ok(v) = std::env::var("SEHAT_NODE_PROTOCOL") {
            config.storage.node_protocol = v;
        }
        if let Ok(v) = std::env::var("SEHAT_GATEWAYS") {
            config.storage.gateways = split_list(&v);
        }
        if let Ok(v) = std::env::var("SEHAT_MAX_FILE_BYTES") {
            config.storage.max_file_bytes = parse_var("SEHAT_MAX_FILE_BYTES", &v)?;
        }
        if let Ok(v) = std::env::var("SEHAT_ALLOWED_MIME_TYPES") {
            config.storage.allowed_mime_types = split_list(&v);
        }
        if let Ok(v) = std::env::var("SEHAT_MOCK_STORE_PATH") {
            config.storage.mock_store_path = Some(PathBuf::from(v));
        }

        if let Ok(v) = std::env::var("SEHAT_CACHE_PATH") {
            config.cache.path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(format!("serialize failed: {e}")))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.account.is_some() {
            let addr = self.ledger.contract_address.trim();
            if addr.is_empty() {
                return Err(ConfigError::Validation(
                    "ledger.account is set but ledger.contract_address is empty".to_string(),
                ));
            }
            if !addr.starts_with("0x") || addr.len() != 42 {
                return Err(ConfigError::Validation(format!(
                    "ledger.contract_address is not a 20-byte 0x address: {addr}"
                )));
            }
        }
        if self.storage.gateways.is_empty() {
            return Err(ConfigError::Validation(
                "storage.gateways must list at least one gateway base".to_string(),
            ));
        }
        if self.storage.max_file_bytes == 0 {
            return Err(ConfigError::Validation(
                "storage.max_file_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ledger endpoint and signing identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Expected chain identifier.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Address of the record pointer contract.
    #[serde(default)]
    pub contract_address: String,

    /// Sending account. Signing is delegated to the account's provider
    /// (an injected wallet or a node-managed key); absent means read-only.
    #[serde(default)]
    pub account: Option<String>,

    /// Maximum seconds to wait for one confirmation of a write.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Receipt poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chain_id: default_chain_id(),
            contract_address: String::new(),
            account: None,
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Content store backend and retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bearer token for the hosted pinning service. Presence of a token
    /// selects the hosted backend.
    #[serde(default)]
    pub pinning_token: Option<String>,

    /// Hosted pinning API base URL.
    #[serde(default = "default_pinning_api")]
    pub pinning_api: String,

    /// Dedicated gateway of the hosted pinning service.
    #[serde(default = "default_pinning_gateway")]
    pub pinning_gateway: String,

    /// Selects the local node backend when no pinning token is configured.
    #[serde(default)]
    pub use_local_node: bool,

    /// Local node host.
    #[serde(default = "default_node_host")]
    pub node_host: String,

    /// Local node API port.
    #[serde(default = "default_node_port")]
    pub node_port: u16,

    /// Local node protocol (`http` or `https`).
    #[serde(default = "default_node_protocol")]
    pub node_protocol: String,

    /// Public gateway bases tried in order after the native route.
    #[serde(default = "default_gateways")]
    pub gateways: Vec<String>,

    /// Maximum accepted size for a single attachment, in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// MIME types accepted for attachments.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,

    /// Per-attempt retrieval timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Persistence file for the mock backend. Absent keeps the mock
    /// memory-only.
    #[serde(default)]
    pub mock_store_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pinning_token: None,
            pinning_api: default_pinning_api(),
            pinning_gateway: default_pinning_gateway(),
            use_local_node: false,
            node_host: default_node_host(),
            node_port: default_node_port(),
            node_protocol: default_node_protocol(),
            gateways: default_gateways(),
            max_file_bytes: default_max_file_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            mock_store_path: None,
        }
    }
}

impl StorageConfig {
    /// Returns the local node API base URL, e.g. `http://localhost:5001`.
    #[must_use]
    pub fn node_api_base(&self) -> String {
        format!(
            "{}://{}:{}",
            self.node_protocol, self.node_host, self.node_port
        )
    }
}

/// Local history cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persistence file for cache entries. Absent keeps the cache
    /// memory-only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{name} is not a valid number: {value}")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:7545".to_string()
}

const fn default_chain_id() -> u64 {
    1337
}

const fn default_confirmation_timeout_secs() -> u64 {
    120
}

const fn default_poll_interval_ms() -> u64 {
    500
}

fn default_pinning_api() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_pinning_gateway() -> String {
    "https://gateway.pinata.cloud/ipfs/".to_string()
}

fn default_node_host() -> String {
    "localhost".to_string()
}

const fn default_node_port() -> u16 {
    5001
}

fn default_node_protocol() -> String {
    "http".to_string()
}

fn default_gateways() -> Vec<String> {
    vec![
        "https://gateway.pinata.cloud/ipfs/".to_string(),
        "https://ipfs.io/ipfs/".to_string(),
        "https://cloudflare-ipfs.com/ipfs/".to_string(),
    ]
}

const fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "image/jpeg".to_string(),
        "image/jpg".to_string(),
        "image/png".to_string(),
    ]
}

const fn default_fetch_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.ledger.endpoint, "http://127.0.0.1:7545");
        assert_eq!(config.ledger.chain_id, 1337);
        assert_eq!(config.storage.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.storage.gateways.len(), 3);
        assert!(config.storage.pinning_token.is_none());
        assert!(config.cache.path.is_none());
    }

    #[test]
    fn toml_overrides_apply() {
        let config = Config::from_toml(
            r#"
            [ledger]
            endpoint = "https://rpc.sepolia.org"
            chain_id = 11155111
            contract_address = "0x001fE43aEFC1D497e0ae6eBD0cD1Fa7fF53e96AC"
            account = "0x0F305835cCe0c988e42bA59bf3ef8b16AB47a076"

            [storage]
            pinning_token = "jwt-token"
            max_file_bytes = 1048576
            gateways = ["https://ipfs.io/ipfs/"]

            [cache]
            path = "/tmp/sehat-history.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.chain_id, 11_155_111);
        assert_eq!(config.storage.pinning_token.as_deref(), Some("jwt-token"));
        assert_eq!(config.storage.gateways, vec!["https://ipfs.io/ipfs/"]);
        assert_eq!(config.storage.max_file_bytes, 1_048_576);
    }

    #[test]
    fn signing_account_requires_contract_address() {
        let err = Config::from_toml(
            r#"
            [ledger]
            account = "0x0F305835cCe0c988e42bA59bf3ef8b16AB47a076"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn malformed_contract_address_rejected() {
        let err = Config::from_toml(
            r#"
            [ledger]
            account = "0x0F305835cCe0c988e42bA59bf3ef8b16AB47a076"
            contract_address = "not-an-address"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn empty_gateway_list_rejected() {
        let err = Config::from_toml("[storage]\ngateways = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn node_api_base_joins_parts() {
        let storage = StorageConfig::default();
        assert_eq!(storage.node_api_base(), "http://localhost:5001");
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.ledger.chain_id, config.ledger.chain_id);
        assert_eq!(back.storage.gateways, config.storage.gateways);
    }
}
