//! Request bodies accepted by the HTTP API.

use serde::Deserialize;

use crate::dispatch::BackendSelection;
use crate::pipeline::batch::normalize_epoch;
use crate::pipeline::{parse_timestamp, PipelineError, PipelineResult};

/// Either epoch seconds/milliseconds or a date string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Number(u64),
    Text(String),
}

impl TimestampInput {
    pub fn to_epoch_secs(&self) -> PipelineResult<u64> {
        match self {
            Self::Number(value) => Ok(normalize_epoch(*value)),
            Self::Text(text) => parse_timestamp(text),
        }
    }
}

/// `POST /sendTx`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTxRequest {
    pub payload: Option<String>,
    pub timestamp: Option<TimestampInput>,
    pub vehicle_id: Option<String>,
    /// Back-end ids or kinds. Absent or empty means all.
    pub backends: Option<Vec<String>>,
    /// Legacy numeric selector: 1 EVM, 2 Move, 3 feeless, 4 all.
    pub network: Option<u8>,
    pub timeout_ms: Option<u64>,
}

impl SendTxRequest {
    pub fn selection(&self) -> PipelineResult<BackendSelection> {
        if self.backends.as_ref().is_some_and(|b| !b.is_empty()) {
            return Ok(BackendSelection::from_list(self.backends.clone()));
        }
        let only = |kind: &str| Ok(BackendSelection::Only(vec![kind.to_string()]));
        match self.network {
            None | Some(4) => Ok(BackendSelection::All),
            Some(1) => only("evm"),
            Some(2) => only("move"),
            Some(3) => only("feeless"),
            Some(n) => Err(PipelineError::InvalidSelection(format!(
                "network {n} (choose 1, 2, 3 or 4)"
            ))),
        }
    }
}

/// `POST /api/v1/process`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub data: String,
    pub vehicle_id: Option<String>,
    pub timestamp: Option<TimestampInput>,
}

/// `POST /api/v1/decode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub payload: String,
    /// `YYYY-MM-DD`; defaults to today (UTC).
    pub date: Option<String>,
    pub vehicle_id: Option<String>,
}

/// `GET /api/blocks?limit=N`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlocksQuery {
    pub limit: Option<usize>,
}
