//! Key derivation and selective encryption.
//!
//! # Data Flow
//! ```text
//! MasterKey ──┬─ Direct ──► SHA256(master || day)            (32 bytes)
//!             └─ Chained ─► key_cache (vehicle, enrollment)  (16 bytes)
//!                                    │
//!                                 DailyKey
//!                                    │
//! TelemetryBlock[] ── selective (AES-CTR, zero IV, flagged only) ──► sealed blocks
//! ```

pub mod daily_key;
pub mod key_cache;
pub mod selective;
pub mod types;

pub use daily_key::{DailyKey, KeyDerivation, KeySchedule, MasterKey};
pub use key_cache::ChainedKeyCache;
pub use selective::{open_block, open_blocks, seal_block, seal_blocks, OpenedBlock, Verdict};
pub use types::{CryptoError, CryptoResult};
