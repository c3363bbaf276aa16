//! LoRa radio frame.
//!
//! ```text
//! offset  size  content
//!  0      2     IV prefix (message counter, little endian)
//!  2      1     clear section length (6)
//!  3      1     0x01 temperature marker
//!  4      1     temperature °C (u8)
//!  5      1     0x03 gyro marker
//!  6      3     gyro x, y, z (i8, hundredths of rad/s)
//!  9      11    AES-128-CTR ciphertext of:
//!                 0x04, acceleration (u8),
//!                 0x05, latitude (i32 LE, 1e-7 deg), longitude (i32 LE, 1e-7 deg)
//! ```
//!
//! The CTR IV is the 2-byte prefix zero-extended to 16 bytes. The key is the
//! vehicle's chained daily key.

use serde::Serialize;

use super::types::{CodecError, CodecResult};
use crate::crypto::selective::{apply_keystream, Verdict};
use crate::crypto::{CryptoResult, DailyKey};

pub const FRAME_LEN: usize = 20;
pub const IV_PREFIX_LEN: usize = 2;
pub const SEALED_LEN: usize = 11;

const CLEAR_SECTION_LEN: u8 = 6;
const MARKER_TEMPERATURE: u8 = 0x01;
const MARKER_GYRO: u8 = 0x03;
const MARKER_ACCELERATION: u8 = 0x04;
const MARKER_POSITION: u8 = 0x05;
const SEALED_OFFSET: usize = FRAME_LEN - SEALED_LEN;
const COORD_SCALE: f64 = 1e7;

/// Zero-extend an IV prefix to a full 16-byte CTR IV.
///
/// Prefixes longer than 16 bytes are truncated.
pub fn iv_from_prefix(prefix: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    let n = prefix.len().min(iv.len());
    iv[..n].copy_from_slice(&prefix[..n]);
    iv
}

/// Readings sent in the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReadings {
    pub temperature_c: u8,
    pub gyro_raw: [i8; 3],
}

impl ClearReadings {
    pub fn gyro(&self) -> [f64; 3] {
        self.gyro_raw.map(|v| f64::from(v) / 100.0)
    }
}

/// Readings carried in the encrypted section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SealedReadings {
    pub acceleration: u8,
    pub latitude_e7: i32,
    pub longitude_e7: i32,
}

impl SealedReadings {
    pub fn latitude(&self) -> f64 {
        f64::from(self.latitude_e7) / COORD_SCALE
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.longitude_e7) / COORD_SCALE
    }

    fn to_plaintext(self) -> [u8; SEALED_LEN] {
        let mut out = [0u8; SEALED_LEN];
        out[0] = MARKER_ACCELERATION;
        out[1] = self.acceleration;
        out[2] = MARKER_POSITION;
        out[3..7].copy_from_slice(&self.latitude_e7.to_le_bytes());
        out[7..11].copy_from_slice(&self.longitude_e7.to_le_bytes());
        out
    }

    fn from_plaintext(plain: &[u8; SEALED_LEN]) -> Self {
        let mut lat = [0u8; 4];
        let mut lon = [0u8; 4];
        lat.copy_from_slice(&plain[3..7]);
        lon.copy_from_slice(&plain[7..11]);
        Self {
            acceleration: plain[1],
            latitude_e7: i32::from_le_bytes(lat),
            longitude_e7: i32::from_le_bytes(lon),
        }
    }
}

/// Result of decrypting a frame's sealed section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpenedFrame {
    pub counter: u16,
    pub clear: ClearReadings,
    pub sealed: SealedReadings,
    pub verdict: Verdict,
}

/// A 20-byte radio frame with its sealed section still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoraFrame {
    pub counter: u16,
    pub clear: ClearReadings,
    sealed: [u8; SEALED_LEN],
}

impl LoraFrame {
    /// Build a frame, encrypting `sealed` under `key`.
    pub fn seal(
        counter: u16,
        clear: ClearReadings,
        sealed: SealedReadings,
        key: &DailyKey,
    ) -> CryptoResult<Self> {
        let mut section = sealed.to_plaintext();
        apply_keystream(key, &iv_from_prefix(&counter.to_le_bytes()), &mut section)?;
        Ok(Self {
            counter,
            clear,
            sealed: section,
        })
    }

    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != FRAME_LEN {
            return Err(CodecError::InvalidFrame(format!(
                "expected {FRAME_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[2] != CLEAR_SECTION_LEN {
            return Err(CodecError::InvalidFrame(format!(
                "clear section length {} (expected {CLEAR_SECTION_LEN})",
                bytes[2]
            )));
        }
        if bytes[3] != MARKER_TEMPERATURE || bytes[5] != MARKER_GYRO {
            return Err(CodecError::InvalidFrame(
                "missing temperature or gyro marker".to_string(),
            ));
        }

        let mut sealed = [0u8; SEALED_LEN];
        sealed.copy_from_slice(&bytes[SEALED_OFFSET..]);

        Ok(Self {
            counter: u16::from_le_bytes([bytes[0], bytes[1]]),
            clear: ClearReadings {
                temperature_c: bytes[4],
                gyro_raw: [bytes[6] as i8, bytes[7] as i8, bytes[8] as i8],
            },
            sealed,
        })
    }

    pub fn parse_hex(input: &str) -> CodecResult<Self> {
        let digits = super::block::normalize_hex(input);
        let bytes = hex::decode(&digits).map_err(|e| CodecError::InvalidFrame(e.to_string()))?;
        Self::parse(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[..IV_PREFIX_LEN].copy_from_slice(&self.counter.to_le_bytes());
        out[2] = CLEAR_SECTION_LEN;
        out[3] = MARKER_TEMPERATURE;
        out[4] = self.clear.temperature_c;
        out[5] = MARKER_GYRO;
        for (slot, v) in out[6..9].iter_mut().zip(self.clear.gyro_raw) {
            *slot = v as u8;
        }
        out[SEALED_OFFSET..].copy_from_slice(&self.sealed);
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn iv(&self) -> [u8; 16] {
        iv_from_prefix(&self.counter.to_le_bytes())
    }

    /// Decrypt the sealed section.
    ///
    /// Missing section markers after decryption mean the key (or day) is
    /// wrong; the recovered values are still returned.
    pub fn open(&self, key: &DailyKey) -> CryptoResult<OpenedFrame> {
        let mut plain = self.sealed;
        apply_keystream(key, &self.iv(), &mut plain)?;

        let verdict = if plain[0] == MARKER_ACCELERATION && plain[2] == MARKER_POSITION {
            Verdict::Plausible
        } else {
            Verdict::LikelyWrongKey
        };

        Ok(OpenedFrame {
            counter: self.counter,
            clear: self.clear,
            sealed: SealedReadings::from_plaintext(&plain),
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DailyKey {
        DailyKey::from_hex("69d027673b6343c535970f73fcc42126").unwrap()
    }

    fn sample() -> (ClearReadings, SealedReadings) {
        (
            ClearReadings {
                temperature_c: 23,
                gyro_raw: [-5, 12, 0],
            },
            SealedReadings {
                acceleration: 12,
                latitude_e7: 455_170_000,
                longitude_e7: -122_400_000,
            },
        )
    }

    #[test]
    fn test_iv_from_prefix() {
        let iv = iv_from_prefix(&[0xAA, 0xBB]);
        assert_eq!(hex::encode(iv), "aabb0000000000000000000000000000");
    }

    #[test]
    fn test_seal_known_vector() {
        let (clear, sealed) = sample();
        let frame = LoraFrame::seal(0x0102, clear, sealed, &key()).unwrap();
        assert_eq!(
            frame.to_hex(),
            "020106011703fb0c0017e3e70b2f616dfc9d7e29"
        );
    }

    #[test]
    fn test_parse_and_open() {
        let (clear, sealed) = sample();
        let bytes = LoraFrame::seal(7, clear, sealed, &key()).unwrap().to_bytes();

        let frame = LoraFrame::parse(&bytes).unwrap();
        assert_eq!(frame.counter, 7);
        assert_eq!(frame.clear, clear);
        assert_eq!(frame.clear.gyro(), [-0.05, 0.12, 0.0]);

        let opened = frame.open(&key()).unwrap();
        assert_eq!(opened.verdict, Verdict::Plausible);
        assert_eq!(opened.sealed, sealed);
        assert_eq!(opened.sealed.latitude(), 45.517);
    }

    #[test]
    fn test_open_with_wrong_key() {
        let (clear, sealed) = sample();
        let frame = LoraFrame::seal(7, clear, sealed, &key()).unwrap();
        let wrong = DailyKey::new(vec![0x42; 16]).unwrap();
        assert_eq!(frame.open(&wrong).unwrap().verdict, Verdict::LikelyWrongKey);
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(matches!(
            LoraFrame::parse(&[0u8; 19]),
            Err(CodecError::InvalidFrame(_))
        ));

        let mut bytes = [0u8; FRAME_LEN];
        bytes[2] = 6;
        assert!(LoraFrame::parse(&bytes).is_err());

        bytes[3] = MARKER_TEMPERATURE;
        bytes[5] = MARKER_GYRO;
        assert!(LoraFrame::parse(&bytes).is_ok());
    }
}
