//! Sensor batch lifecycle.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::types::{BatchState, PipelineError, PipelineResult};
use crate::codec::{self, TelemetryBlock};
use crate::crypto::{seal_blocks, KeySchedule};

/// Epoch values above this are taken as milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// One ingest unit: ordered blocks from a vehicle at a point in time.
#[derive(Debug, Clone)]
pub struct SensorBatch {
    vehicle_id: String,
    timestamp: u64,
    blocks: Vec<TelemetryBlock>,
    state: BatchState,
}

impl SensorBatch {
    pub fn new(vehicle_id: impl Into<String>, timestamp: u64, blocks: Vec<TelemetryBlock>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            timestamp,
            blocks,
            state: BatchState::Received,
        }
    }

    /// Decode a hex payload into a freshly received batch.
    pub fn from_hex(
        vehicle_id: impl Into<String>,
        timestamp: u64,
        payload: &str,
    ) -> PipelineResult<Self> {
        let vehicle_id = vehicle_id.into();
        if vehicle_id.trim().is_empty() {
            return Err(PipelineError::MissingVehicleId);
        }
        let blocks = codec::decode(payload)?;
        Ok(Self::new(vehicle_id, timestamp, blocks))
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn blocks(&self) -> &[TelemetryBlock] {
        &self.blocks
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn flagged_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_encrypted()).count()
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.blocks)
    }

    /// Encrypt flagged blocks with the day's key and mark the batch processed.
    pub fn seal(&mut self, keys: &KeySchedule) -> PipelineResult<usize> {
        self.expect_state(BatchState::Received, BatchState::Processed)?;
        let sealed = if self.flagged_count() == 0 {
            0
        } else {
            let key = keys.key_for_timestamp(&self.vehicle_id, self.timestamp)?;
            seal_blocks(&mut self.blocks, &key)?
        };
        self.state = BatchState::Processed;
        Ok(sealed)
    }

    /// Mark the batch processed without touching its blocks.
    ///
    /// Used when the producer already encrypted the payload.
    pub fn accept_as_is(&mut self) -> PipelineResult<()> {
        self.advance(BatchState::Processed)
    }

    /// Enter dispatch and return the payload to send.
    pub fn begin_dispatch(&mut self) -> PipelineResult<String> {
        self.advance(BatchState::Dispatching)?;
        Ok(self.to_hex())
    }

    /// Finish dispatch. The batch is consumed; only its final state remains.
    pub fn complete(mut self) -> PipelineResult<BatchState> {
        self.advance(BatchState::Completed)?;
        Ok(self.state)
    }

    fn advance(&mut self, to: BatchState) -> PipelineResult<()> {
        self.expect_state(
            match to {
                BatchState::Processed => BatchState::Received,
                BatchState::Dispatching => BatchState::Processed,
                BatchState::Completed => BatchState::Dispatching,
                BatchState::Received => {
                    return Err(PipelineError::InvalidTransition {
                        from: self.state,
                        to,
                    })
                }
            },
            to,
        )?;
        self.state = to;
        Ok(())
    }

    fn expect_state(&self, from: BatchState, to: BatchState) -> PipelineResult<()> {
        if self.state == from {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}

/// Parse an ingest timestamp into epoch seconds.
///
/// Accepts epoch seconds, epoch milliseconds, RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare `YYYY-MM-DD`.
pub fn parse_timestamp(input: &str) -> PipelineResult<u64> {
    let trimmed = input.trim();
    let invalid = || PipelineError::InvalidTimestamp(input.to_string());

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let value: u64 = trimmed.parse().map_err(|_| invalid())?;
        return Ok(normalize_epoch(value));
    }

    let secs = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        dt.timestamp()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc().timestamp()
    } else if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        crate::crypto::daily_key::day_start_epoch(day)
    } else {
        return Err(invalid());
    };

    u64::try_from(secs).map_err(|_| invalid())
}

/// Interpret a numeric timestamp, converting milliseconds to seconds.
pub fn normalize_epoch(value: u64) -> u64 {
    if value > MILLIS_THRESHOLD {
        value / 1000
    } else {
        value
    }
}
