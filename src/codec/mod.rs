//! Telemetry codec subsystem.
//!
//! # Data Flow
//! ```text
//! hex string ("0x" optional, whitespace ignored)
//!     → block.rs (split into 40-bit blocks, 10 hex digits each)
//!     → [crypto::selective seals/opens flagged blocks]
//!     → reading.rs (interpret clear payloads by sensor type)
//!
//! LoRa radio frames (20 bytes, 2-byte IV prefix):
//!     → frame.rs (parse, seal, open)
//! ```
//!
//! # Bit Layout
//! ```text
//!  bit 0      bits 1-3    bits 4-7      bits 8-39
//! ┌────────┬───────────┬────────────┬──────────────────┐
//! │ flag   │ reserved  │ sensorType │ sensorData (32)  │  clear
//! ├────────┼───────────┴────────────┴──────────────────┤
//! │ flag=1 │ AES-CTR ciphertext of bits 1-39 (39)      │  encrypted
//! └────────┴───────────────────────────────────────────┘
//! ```

pub mod block;
pub mod frame;
pub mod reading;
pub mod types;

pub use block::{decode, encode, normalize_hex, TelemetryBlock};
pub use frame::{iv_from_prefix, LoraFrame};
pub use reading::SensorReading;
pub use types::{CodecError, CodecResult};
