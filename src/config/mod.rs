//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AnchorConfig (validated, immutable)
//!     → lifecycle::startup builds keys, adapters and storage from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets are read from environment variables named in the config

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AnchorConfig, DispatchConfig, EvmConfig, FeelessConfig, KeysConfig, ListenerConfig,
    MoveCallConfig, RetryConfig, TimeoutConfig,
};
