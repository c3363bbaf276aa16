//! Telemetry block codec.
//!
//! Converts between hex payloads and ordered sequences of 40-bit
//! [`TelemetryBlock`]s. Pure and stateless.
//!
//! # Design Decisions
//! - A block is stored as the low 40 bits of a `u64`; bit 0 of the wire
//!   layout is bit 39 of the integer.
//! - Reserved bits are kept verbatim so `encode(decode(h))` reproduces `h`.
//! - Sensor fields are only meaningful on clear blocks, so the accessors
//!   return `Option`.

use serde::Serialize;

use super::types::{CodecError, CodecResult};

/// Bytes per block on the wire.
pub const BLOCK_BYTES: usize = 5;

/// Hex digits per block on the wire.
pub const BLOCK_HEX_LEN: usize = BLOCK_BYTES * 2;

/// Mask selecting bits 1-39 (everything except the encryption flag).
pub const PAYLOAD_MASK: u64 = (1 << 39) - 1;

const BLOCK_MASK: u64 = (1 << 40) - 1;
const ENCRYPTED_FLAG: u64 = 1 << 39;

/// One 40-bit telemetry unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TelemetryBlock(u64);

impl TelemetryBlock {
    /// Build a block from raw bits. Anything above bit 40 is dropped.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits & BLOCK_MASK)
    }

    /// A clear block carrying `sensor_type` (low nibble) and `sensor_data`.
    pub fn clear(sensor_type: u8, sensor_data: u32) -> Self {
        Self(((u64::from(sensor_type) & 0xF) << 32) | u64::from(sensor_data))
    }

    /// A block flagged for encryption whose payload is still clear.
    ///
    /// This is what a producer emits before the batch is sealed.
    pub fn sensitive(sensor_type: u8, sensor_data: u32) -> Self {
        Self(ENCRYPTED_FLAG | Self::clear(sensor_type, sensor_data).0)
    }

    /// Assemble a block from its flag and 39-bit payload.
    pub fn with_payload(encrypted: bool, payload: u64) -> Self {
        let flag = if encrypted { ENCRYPTED_FLAG } else { 0 };
        Self(flag | (payload & PAYLOAD_MASK))
    }

    pub fn from_bytes(bytes: [u8; BLOCK_BYTES]) -> Self {
        let mut wide = [0u8; 8];
        wide[3..].copy_from_slice(&bytes);
        Self(u64::from_be_bytes(wide))
    }

    pub fn to_bytes(self) -> [u8; BLOCK_BYTES] {
        let wide = self.0.to_be_bytes();
        let mut out = [0u8; BLOCK_BYTES];
        out.copy_from_slice(&wide[3..]);
        out
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Bit 0: set when bits 1-39 hold ciphertext (or are awaiting encryption).
    pub fn is_encrypted(self) -> bool {
        self.0 & ENCRYPTED_FLAG != 0
    }

    /// Bits 1-39.
    pub fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// Bits 1-3. Zero for every block the firmware produces.
    pub fn reserved(self) -> u8 {
        payload_reserved(self.payload())
    }

    /// Bits 4-7 of a clear block.
    pub fn sensor_type(self) -> Option<u8> {
        (!self.is_encrypted()).then(|| payload_sensor_type(self.payload()))
    }

    /// Bits 8-39 of a clear block.
    pub fn sensor_data(self) -> Option<u32> {
        (!self.is_encrypted()).then(|| payload_sensor_data(self.payload()))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl Serialize for TelemetryBlock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Reserved bits of a 39-bit payload.
pub fn payload_reserved(payload: u64) -> u8 {
    ((payload >> 36) & 0x7) as u8
}

/// Sensor type nibble of a 39-bit payload.
pub fn payload_sensor_type(payload: u64) -> u8 {
    ((payload >> 32) & 0xF) as u8
}

/// Sensor data word of a 39-bit payload.
pub fn payload_sensor_data(payload: u64) -> u32 {
    (payload & 0xFFFF_FFFF) as u32
}

/// Strip whitespace and an optional `0x`/`0X` prefix, lowercase the rest.
///
/// No validation happens here; [`decode`] rejects non-hex characters.
pub fn normalize_hex(input: &str) -> String {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    digits.to_ascii_lowercase()
}

/// Decode a hex payload into blocks, preserving order.
pub fn decode(input: &str) -> CodecResult<Vec<TelemetryBlock>> {
    let digits = normalize_hex(input);

    if digits.len() % BLOCK_HEX_LEN != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "{} hex digits is not a multiple of {}",
            digits.len(),
            BLOCK_HEX_LEN
        )));
    }

    let bytes = hex::decode(&digits).map_err(|e| CodecError::MalformedPayload(e.to_string()))?;

    Ok(bytes
        .chunks_exact(BLOCK_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; BLOCK_BYTES];
            raw.copy_from_slice(chunk);
            TelemetryBlock::from_bytes(raw)
        })
        .collect())
}

/// Encode blocks as lowercase hex, 10 digits per block.
pub fn encode(blocks: &[TelemetryBlock]) -> String {
    blocks.iter().map(|b| b.to_hex()).collect()
}
