//! Selective block encryption.
//!
//! Only blocks whose flag bit is set are touched. The 39 payload bits are
//! left-aligned into 5 bytes (one zero padding bit at the end), run through
//! AES-CTR, and the first 39 output bits replace the payload. The flag bit
//! itself is never encrypted. Decryption is the same operation.
//!
//! # Security
//! Every block of a day is encrypted under the same key with the same
//! all-zero IV, so the keystream repeats: XOR of two ciphertexts from one
//! day equals XOR of their plaintexts. This is required for compatibility
//! with deployed firmware and consumers. Do not reuse the construction for
//! anything that needs confidentiality against a passive observer.

use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use serde::Serialize;

use super::daily_key::DailyKey;
use super::types::{CryptoError, CryptoResult};
use crate::codec::block::{payload_reserved, payload_sensor_type, PAYLOAD_MASK};
use crate::codec::reading::{is_known_sensor_type, SensorReading};
use crate::codec::TelemetryBlock;

type Aes128Ctr = Ctr128BE<Aes128>;
type Aes256Ctr = Ctr128BE<Aes256>;

/// IV used for block encryption.
pub const ZERO_IV: [u8; 16] = [0u8; 16];

/// XOR the AES-CTR keystream for `key` and `iv` into `buf`.
pub fn apply_keystream(key: &DailyKey, iv: &[u8; 16], buf: &mut [u8]) -> CryptoResult<()> {
    let key = key.as_bytes();
    match key.len() {
        16 => Aes128Ctr::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .apply_keystream(buf),
        32 => Aes256Ctr::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .apply_keystream(buf),
        n => return Err(CryptoError::InvalidKeyLength(n)),
    }
    Ok(())
}

/// Run a 39-bit payload through the block cipher construction.
///
/// Encryption and decryption are the same call.
pub fn transform_payload(payload: u64, key: &DailyKey) -> CryptoResult<u64> {
    let shifted = ((payload & PAYLOAD_MASK) << 1).to_be_bytes();
    let mut buf = [0u8; 5];
    buf.copy_from_slice(&shifted[3..]);

    apply_keystream(key, &ZERO_IV, &mut buf)?;

    let mut wide = [0u8; 8];
    wide[3..].copy_from_slice(&buf);
    Ok((u64::from_be_bytes(wide) >> 1) & PAYLOAD_MASK)
}

/// Encrypt a flagged block. Clear blocks are returned unchanged.
pub fn seal_block(block: TelemetryBlock, key: &DailyKey) -> CryptoResult<TelemetryBlock> {
    if !block.is_encrypted() {
        return Ok(block);
    }
    let ciphertext = transform_payload(block.payload(), key)?;
    Ok(TelemetryBlock::with_payload(true, ciphertext))
}

/// Encrypt every flagged block in place. Returns how many were sealed.
pub fn seal_blocks(blocks: &mut [TelemetryBlock], key: &DailyKey) -> CryptoResult<usize> {
    let mut sealed = 0;
    for block in blocks.iter_mut().filter(|b| b.is_encrypted()) {
        *block = seal_block(*block, key)?;
        sealed += 1;
    }
    Ok(sealed)
}

/// How much to trust a decrypted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Plausible,
    /// Recovered fields look like noise; the day or key is probably wrong.
    LikelyWrongKey,
}

/// Classify a recovered 39-bit payload.
pub fn classify(payload: u64) -> Verdict {
    if payload_reserved(payload) == 0 && is_known_sensor_type(payload_sensor_type(payload)) {
        Verdict::Plausible
    } else {
        Verdict::LikelyWrongKey
    }
}

/// A block after the consumer has applied the day key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedBlock {
    pub encrypted: bool,
    /// Clear 39-bit payload (recovered, for encrypted blocks).
    pub payload: u64,
    pub reading: SensorReading,
    pub verdict: Verdict,
}

impl OpenedBlock {
    pub fn is_suspect(&self) -> bool {
        self.verdict == Verdict::LikelyWrongKey
    }
}

/// Decrypt a block if flagged and interpret it.
///
/// Clear blocks never depend on the key and are always `Plausible`.
pub fn open_block(block: TelemetryBlock, key: &DailyKey) -> CryptoResult<OpenedBlock> {
    if !block.is_encrypted() {
        return Ok(OpenedBlock {
            encrypted: false,
            payload: block.payload(),
            reading: SensorReading::from_payload(block.payload()),
            verdict: Verdict::Plausible,
        });
    }

    let payload = transform_payload(block.payload(), key)?;
    Ok(OpenedBlock {
        encrypted: true,
        payload,
        reading: SensorReading::from_payload(payload),
        verdict: classify(payload),
    })
}

pub fn open_blocks(blocks: &[TelemetryBlock], key: &DailyKey) -> CryptoResult<Vec<OpenedBlock>> {
    blocks.iter().map(|b| open_block(*b, key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn key16() -> DailyKey {
        DailyKey::from_hex("69d027673b6343c535970f73fcc42126").unwrap()
    }

    fn key32() -> DailyKey {
        DailyKey::from_hex("336bdc84bbc80dc79c77928319ce19627ad3bbce5f6263ad3ce8b1834f0abfba")
            .unwrap()
    }

    #[test]
    fn test_seal_known_vectors() {
        let block = TelemetryBlock::from_bits(0x81_1602_0053);
        assert_eq!(seal_block(block, &key16()).unwrap().to_hex(), "eb2d4db46e");
        assert_eq!(seal_block(block, &key32()).unwrap().to_hex(), "83ff6fcffc");

        let accel = TelemetryBlock::sensitive(2, 981);
        assert_eq!(seal_block(accel, &key32()).unwrap().to_hex(), "80e96dcc7a");
    }

    #[test]
    fn test_clear_blocks_untouched() {
        let mut blocks = vec![
            TelemetryBlock::clear(1, 0x1602_0053),
            TelemetryBlock::sensitive(2, 981),
            TelemetryBlock::clear(3, 7),
        ];
        let original = blocks.clone();

        let sealed = seal_blocks(&mut blocks, &key16()).unwrap();
        assert_eq!(sealed, 1);
        assert_eq!(blocks[0], original[0]);
        assert_ne!(blocks[1], original[1]);
        assert!(blocks[1].is_encrypted());
        assert_eq!(blocks[2], original[2]);
    }

    #[test]
    fn test_open_recovers_reading() {
        let sealed = seal_block(TelemetryBlock::sensitive(2, 981), &key16()).unwrap();
        let opened = open_block(sealed, &key16()).unwrap();
        assert!(opened.encrypted);
        assert_eq!(opened.verdict, Verdict::Plausible);
        assert_eq!(opened.reading, SensorReading::Acceleration { magnitude: 9.81 });
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(TelemetryBlock::clear(1, 0).payload()), Verdict::Plausible);
        assert_eq!(classify(TelemetryBlock::clear(0, 0).payload()), Verdict::LikelyWrongKey);
        assert_eq!(classify(TelemetryBlock::clear(7, 0).payload()), Verdict::LikelyWrongKey);
        let reserved = TelemetryBlock::from_bits(0x11_0000_0000);
        assert_eq!(classify(reserved.payload()), Verdict::LikelyWrongKey);
    }

    #[test]
    fn test_wrong_key_mostly_flagged() {
        let mut rng = StdRng::seed_from_u64(7);
        let sealed = seal_block(TelemetryBlock::sensitive(1, 0x0898_1130), &key16()).unwrap();

        let trials = 200;
        let mut flagged = 0;
        for _ in 0..trials {
            let mut bytes = vec![0u8; 16];
            rng.fill(&mut bytes[..]);
            let wrong = DailyKey::new(bytes).unwrap();
            if open_block(sealed, &wrong).unwrap().is_suspect() {
                flagged += 1;
            }
        }
        // A random payload passes with probability 3/128.
        assert!(flagged * 100 >= trials * 60, "only {flagged}/{trials} flagged");
    }

    #[test]
    fn test_rejects_bad_key_length() {
        // DailyKey enforces the length at construction.
        assert_eq!(
            DailyKey::new(vec![0u8; 20]).unwrap_err(),
            CryptoError::InvalidKeyLength(20)
        );
    }

    proptest! {
        #[test]
        fn test_transform_is_involution(
            payload in 0u64..(1 << 39),
            key in proptest::collection::vec(any::<u8>(), 16..=16),
            wide in any::<bool>(),
        ) {
            let key = if wide {
                DailyKey::new([key.clone(), key].concat()).unwrap()
            } else {
                DailyKey::new(key).unwrap()
            };
            let block = TelemetryBlock::with_payload(true, payload);
            let sealed = seal_block(block, &key).unwrap();
            prop_assert!(sealed.is_encrypted());
            let opened = open_block(sealed, &key).unwrap();
            prop_assert_eq!(opened.payload, payload);
        }
    }
}
