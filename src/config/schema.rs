//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the anchor
//! service. All types derive Serde traits for deserialization from config
//! files. Secrets are never part of the file; sections only name the
//! environment variables holding them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::daily_key::DEFAULT_MAX_FUTURE_DAYS;
use crate::crypto::KeyDerivation;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AnchorConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    pub timeouts: TimeoutConfig,

    /// Daily key derivation.
    pub keys: KeysConfig,

    pub pipeline: PipelineConfig,

    /// Fan-out to ledger back ends.
    pub dispatch: DispatchConfig,

    pub evm: EvmConfig,

    pub move_call: MoveCallConfig,

    pub feeless: FeelessConfig,

    /// Receipt persistence.
    pub storage: StorageConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            tls: None,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one HTTP request, dispatch included.
    pub request_secs: u64,

    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            shutdown_grace_secs: 30,
        }
    }
}

/// Daily key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeysConfig {
    /// `direct` or `chained`. Applies to sealing and opening alike.
    pub derivation: KeyDerivation,

    /// Environment variable holding the hex master key.
    pub master_key_env: String,

    /// Vehicle used when a request does not name one.
    pub default_vehicle_id: String,

    /// Enrollment date (YYYY-MM-DD) for vehicles without their own entry.
    /// Only used by the chained derivation.
    pub enrollment_date: Option<String>,

    /// Per-vehicle enrollment dates.
    pub enrollments: HashMap<String, String>,

    /// Chained keys are refused for days further than this past today (UTC).
    pub max_future_days: u32,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            derivation: KeyDerivation::Direct,
            master_key_env: "ANCHOR_MASTER_KEY".to_string(),
            default_vehicle_id: "vehicle-123".to_string(),
            enrollment_date: None,
            enrollments: HashMap::new(),
            max_future_days: DEFAULT_MAX_FUTURE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seal flagged blocks before dispatch. Disable when producers encrypt.
    pub encrypt_on_ingest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encrypt_on_ingest: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default per-backend deadline, retries included.
    pub call_timeout_ms: u64,

    /// Payloads longer than this are split into groups.
    pub max_group_bytes: usize,

    /// Size of each group once splitting kicks in.
    pub group_bytes: usize,

    pub retry: RetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            max_group_bytes: 4096,
            group_bytes: 20,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for unavailable back ends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts, first one included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// EVM contract back end.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvmConfig {
    pub enabled: bool,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Chain ID used for EIP-155 signing.
    pub chain_id: u64,

    /// Address of the sensor batch registry contract.
    pub contract_address: String,

    /// Environment variable holding the signing key.
    pub private_key_env: String,

    /// Number of block confirmations to wait for.
    pub confirmation_blocks: u64,

    /// Seconds to wait for the receipt before giving up.
    pub confirmation_timeout_secs: u64,

    /// Explorer URL with a `{ref}` placeholder.
    pub explorer_url: String,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "https://json-rpc.evm.testnet.iotaledger.net".to_string(),
            chain_id: 1075,
            contract_address: String::new(),
            private_key_env: "ANCHOR_EVM_PRIVATE_KEY".to_string(),
            confirmation_blocks: 1,
            confirmation_timeout_secs: 60,
            explorer_url: "https://explorer.evm.testnet.iotaledger.net/tx/{ref}".to_string(),
        }
    }
}

/// Move object-transaction back end.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MoveCallConfig {
    pub enabled: bool,

    /// Full node JSON-RPC endpoint.
    pub rpc_url: String,

    pub package_id: String,

    pub module: String,

    pub function: String,

    /// Pass the vehicle id as the first Move argument.
    pub include_vehicle_id: bool,

    pub gas_budget: u64,

    /// Environment variable holding the hex Ed25519 secret key.
    pub private_key_env: String,

    /// HTTP timeout for each RPC request.
    pub rpc_timeout_secs: u64,

    /// Explorer URL with a `{ref}` placeholder.
    pub explorer_url: String,
}

impl Default for MoveCallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "https://fullnode.devnet.sui.io:443".to_string(),
            package_id: String::new(),
            module: "SensorData".to_string(),
            function: "send_sensor_data".to_string(),
            include_vehicle_id: false,
            gas_budget: 10_000_000,
            private_key_env: "ANCHOR_MOVE_PRIVATE_KEY".to_string(),
            rpc_timeout_secs: 30,
            explorer_url: "https://suiscan.xyz/devnet/tx/{ref}?network=devnet".to_string(),
        }
    }
}

/// Feeless tagged-data back end driven by a helper process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeelessConfig {
    pub enabled: bool,

    /// Helper executable.
    pub program: String,

    /// Arguments placed before `vehicleId hexData [timestamp]`.
    pub args: Vec<String>,

    /// Pass the timestamp as a third argument.
    pub include_timestamp: bool,

    /// Explorer URL with a `{ref}` placeholder.
    pub explorer_url: String,
}

impl Default for FeelessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "python3".to_string(),
            args: vec!["python/send_iota.py".to_string()],
            include_timestamp: true,
            explorer_url: "https://explorer.iota.org/iota-testnet/block/{ref}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record feeless receipts.
    pub enabled: bool,

    /// SQLite database path.
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: "data/receipts.db".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
