//! Telemetry anchoring service library.
//!
//! Vehicle sensor readings arrive as hex strings of 40-bit blocks. Blocks
//! flagged sensitive are sealed with a per-day AES-CTR key, and the
//! resulting payload is anchored on one or more ledgers (EVM contract,
//! Move call, feeless tangle) concurrently.

// Core data path
pub mod codec;
pub mod crypto;
pub mod pipeline;

// Ledger fan-out
pub mod dispatch;
pub mod ledger;
pub mod storage;

// Service plumbing
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::AnchorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
