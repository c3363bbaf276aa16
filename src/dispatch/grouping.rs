//! Payload grouping.
//!
//! Payloads up to `max_group_bytes` go out as a single group with no IV.
//! Longer payloads are cut into `group_bytes` chunks (the last may be
//! shorter), each carrying the CTR IV rebuilt from its first two bytes.

use crate::codec::block::normalize_hex;
use crate::codec::frame::{iv_from_prefix, IV_PREFIX_LEN};
use crate::codec::{CodecError, CodecResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadGroup {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub iv: Option<[u8; 16]>,
}

impl PayloadGroup {
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn iv_hex(&self) -> Option<String> {
        self.iv.map(hex::encode)
    }
}

/// Split a hex payload into dispatch groups.
pub fn split_payload(
    payload: &str,
    group_bytes: usize,
    max_group_bytes: usize,
) -> CodecResult<Vec<PayloadGroup>> {
    let bytes = hex::decode(normalize_hex(payload))
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;

    if bytes.len() <= max_group_bytes || group_bytes == 0 {
        return Ok(vec![PayloadGroup {
            index: 0,
            bytes,
            iv: None,
        }]);
    }

    Ok(bytes
        .chunks(group_bytes)
        .enumerate()
        .map(|(index, chunk)| PayloadGroup {
            index,
            bytes: chunk.to_vec(),
            iv: Some(iv_from_prefix(&chunk[..chunk.len().min(IV_PREFIX_LEN)])),
        })
        .collect())
}
