//! Response bodies and error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::codec::SensorReading;
use crate::crypto::{CryptoError, OpenedBlock, Verdict};
use crate::dispatch::{BackendKind, DispatchReport, DispatchStatus};
use crate::dispatch::types::GroupReport;
use crate::pipeline::PipelineError;
use crate::storage::StorageError;

/// Errors surfaced to HTTP callers as `{ "error": message }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(
                PipelineError::InvalidTimestamp(_)
                | PipelineError::InvalidSelection(_)
                | PipelineError::MissingVehicleId
                | PipelineError::Crypto(
                    CryptoError::InvalidTimestamp(_)
                    | CryptoError::InvalidDate(_)
                    | CryptoError::DayTooFarAhead { .. },
                ),
            ) => StatusCode::BAD_REQUEST,
            Self::Pipeline(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Explorer links of the first successful reference per family.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Links {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm: Option<String>,
    #[serde(rename = "move", skip_serializing_if = "Option::is_none")]
    pub move_call: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeless: Option<String>,
}

/// `POST /sendTx` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTxResponse {
    pub message: String,
    pub vehicle_id: String,
    pub timestamp: u64,
    pub evm_tx_hash: Option<String>,
    pub move_digest: Option<String>,
    pub feeless_block: Option<String>,
    pub status: DispatchStatus,
    pub groups: Vec<GroupReport>,
    pub links: Links,
}

impl From<DispatchReport> for SendTxResponse {
    fn from(report: DispatchReport) -> Self {
        let owned = |kind| report.first_reference(kind).map(str::to_string);
        let link = |kind| report.first_link(kind).map(str::to_string);

        let message = match report.status {
            DispatchStatus::AllSucceeded => "Sensor data sent successfully to all selected ledgers",
            DispatchStatus::PartialFailure => "Sensor data sent to some ledgers; see groups for failures",
            DispatchStatus::AllFailed => "Sensor data could not be sent to any ledger",
            DispatchStatus::NothingToDo => "No ledger back end selected",
        };

        Self {
            message: message.to_string(),
            evm_tx_hash: owned(BackendKind::Evm),
            move_digest: owned(BackendKind::Move),
            feeless_block: owned(BackendKind::Feeless),
            links: Links {
                evm: link(BackendKind::Evm),
                move_call: link(BackendKind::Move),
                feeless: link(BackendKind::Feeless),
            },
            vehicle_id: report.vehicle_id,
            timestamp: report.timestamp,
            status: report.status,
            groups: report.groups,
        }
    }
}

/// One block of a `POST /api/v1/decode` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedBlock {
    pub index: usize,
    pub encrypted: bool,
    pub sensor: &'static str,
    pub reading: SensorReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

impl DecodedBlock {
    pub fn new(index: usize, opened: &OpenedBlock) -> Self {
        Self {
            index,
            encrypted: opened.encrypted,
            sensor: opened.reading.label(),
            reading: opened.reading.clone(),
            warning: match opened.verdict {
                Verdict::LikelyWrongKey => Some("LikelyWrongKey"),
                Verdict::Plausible => None,
            },
        }
    }
}

/// `POST /api/v1/decode` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResponse {
    pub vehicle_id: String,
    pub date: NaiveDate,
    pub blocks: Vec<DecodedBlock>,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backends: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchResult;
    use crate::pipeline::BatchState;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::InvalidTimestamp("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        let far_ahead = PipelineError::Crypto(CryptoError::DayTooFarAhead {
            day: NaiveDate::MAX,
            limit: 2,
        });
        assert_eq!(ApiError::from(far_ahead).status(), StatusCode::BAD_REQUEST);
        let bad_key = PipelineError::Crypto(CryptoError::InvalidKeyLength(7));
        assert_eq!(
            ApiError::from(bad_key).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let malformed = PipelineError::Codec(crate::codec::CodecError::MalformedPayload("odd".into()));
        assert_eq!(
            ApiError::from(malformed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_send_tx_response_from_report() {
        let report = DispatchReport {
            vehicle_id: "VEH-001".to_string(),
            timestamp: 1,
            state: BatchState::Completed,
            status: DispatchStatus::PartialFailure,
            groups: vec![GroupReport {
                index: 0,
                hex: "0116020053".to_string(),
                iv: None,
                results: vec![
                    DispatchResult::succeeded(
                        "evm",
                        BackendKind::Evm,
                        "0xabc".to_string(),
                        Some("https://explorer/tx/0xabc".to_string()),
                        5,
                    ),
                    DispatchResult::failed(
                        "move",
                        BackendKind::Move,
                        crate::dispatch::DispatchErrorKind::BackendUnavailable,
                        "down",
                        5,
                    ),
                ],
            }],
        };

        let response = SendTxResponse::from(report);
        assert_eq!(response.evm_tx_hash.as_deref(), Some("0xabc"));
        assert!(response.move_digest.is_none());
        assert_eq!(
            response.links.evm.as_deref(),
            Some("https://explorer/tx/0xabc")
        );

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], "PartialFailure");
        assert!(body["links"].get("move").is_none());
    }
}
