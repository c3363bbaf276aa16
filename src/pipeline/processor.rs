//! Producer and consumer paths over the key schedule.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::batch::SensorBatch;
use super::types::PipelineResult;
use crate::codec;
use crate::crypto::{open_blocks, KeySchedule, OpenedBlock};

/// Summary of a producer-side pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub processed: String,
    pub blocks: usize,
    pub encrypted_blocks: usize,
}

/// Seals incoming batches and opens stored payloads.
#[derive(Debug, Clone)]
pub struct Pipeline {
    keys: Arc<KeySchedule>,
    encrypt_on_ingest: bool,
}

impl Pipeline {
    pub fn new(keys: Arc<KeySchedule>, encrypt_on_ingest: bool) -> Self {
        Self {
            keys,
            encrypt_on_ingest,
        }
    }

    pub fn keys(&self) -> &KeySchedule {
        &self.keys
    }

    /// Decode and (if enabled) seal a payload. The batch comes back `Processed`.
    pub fn ingest(&self, vehicle_id: &str, timestamp: u64, payload: &str) -> PipelineResult<SensorBatch> {
        let mut batch = SensorBatch::from_hex(vehicle_id, timestamp, payload)?;

        if self.encrypt_on_ingest {
            let sealed = batch.seal(&self.keys)?;
            tracing::debug!(
                vehicle_id,
                blocks = batch.blocks().len(),
                sealed,
                "Sealed batch"
            );
        } else {
            batch.accept_as_is()?;
        }

        Ok(batch)
    }

    /// Producer pass without dispatch.
    pub fn process(&self, vehicle_id: &str, timestamp: u64, payload: &str) -> PipelineResult<ProcessOutcome> {
        let batch = self.ingest(vehicle_id, timestamp, payload)?;
        Ok(ProcessOutcome {
            processed: batch.to_hex(),
            blocks: batch.blocks().len(),
            encrypted_blocks: batch.flagged_count(),
        })
    }

    /// Consumer pass: decrypt flagged blocks with the key for `day`.
    pub fn open(&self, vehicle_id: &str, day: NaiveDate, payload: &str) -> PipelineResult<Vec<OpenedBlock>> {
        let blocks = codec::decode(payload)?;
        let key = self.keys.key_for_day(vehicle_id, day)?;
        let opened = open_blocks(&blocks, &key)?;

        let suspect = opened.iter().filter(|b| b.is_suspect()).count();
        if suspect > 0 {
            tracing::warn!(
                vehicle_id,
                suspect,
                blocks = opened.len(),
                "Decrypted blocks look invalid; key or day may be wrong"
            );
        }

        Ok(opened)
    }
}
