//! Route handlers.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use super::request::{BlocksQuery, DecodeRequest, ProcessRequest, SendTxRequest, TimestampInput};
use super::response::{
    ApiError, ApiResult, DecodeResponse, DecodedBlock, HealthResponse, SendTxResponse,
};
use super::server::AppState;
use crate::crypto::daily_key::parse_day;
use crate::pipeline::{PipelineError, ProcessOutcome};
use crate::storage::Receipt;

const DEFAULT_BLOCKS_LIMIT: usize = 100;
const MAX_BLOCKS_LIMIT: usize = 1000;

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

fn vehicle_or_default(state: &AppState, vehicle_id: Option<String>) -> Result<String, ApiError> {
    let vehicle_id = vehicle_id.unwrap_or_else(|| state.default_vehicle_id.to_string());
    if vehicle_id.trim().is_empty() {
        return Err(PipelineError::MissingVehicleId.into());
    }
    Ok(vehicle_id)
}

/// `POST /sendTx`: seal the payload and anchor it on the selected ledgers.
pub async fn send_tx(
    State(state): State<AppState>,
    Json(request): Json<SendTxRequest>,
) -> ApiResult<Json<SendTxResponse>> {
    let (Some(payload), Some(timestamp)) = (
        request.payload.as_deref().filter(|p| !p.trim().is_empty()),
        request.timestamp.as_ref(),
    ) else {
        return Err(ApiError::BadRequest("Missing payload or timestamp".to_string()));
    };

    let timestamp = timestamp.to_epoch_secs()?;
    let selection = request.selection()?;
    let vehicle_id = vehicle_or_default(&state, request.vehicle_id.clone())?;

    tracing::info!(
        vehicle_id = %vehicle_id,
        timestamp,
        payload_len = payload.len(),
        "Received anchoring request"
    );

    let batch = state.pipeline.ingest(&vehicle_id, timestamp, payload)?;
    let report = state
        .coordinator
        .dispatch_batch(batch, &selection, request.timeout_ms.map(Duration::from_millis))
        .await?;

    Ok(Json(report.into()))
}

/// `POST /api/v1/process`: producer pass without dispatch.
pub async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessOutcome>> {
    let vehicle_id = vehicle_or_default(&state, request.vehicle_id)?;
    let timestamp = request
        .timestamp
        .as_ref()
        .map(TimestampInput::to_epoch_secs)
        .transpose()?
        .unwrap_or_else(now_secs);

    let outcome = state.pipeline.process(&vehicle_id, timestamp, &request.data)?;
    Ok(Json(outcome))
}

/// `POST /api/v1/decode`: consumer pass with the key for `date`.
pub async fn decode(
    State(state): State<AppState>,
    Json(request): Json<DecodeRequest>,
) -> ApiResult<Json<DecodeResponse>> {
    let vehicle_id = vehicle_or_default(&state, request.vehicle_id)?;
    let date = match request.date.as_deref() {
        Some(text) => parse_day(text).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => Utc::now().date_naive(),
    };

    let opened = state.pipeline.open(&vehicle_id, date, &request.payload)?;
    let blocks: Vec<DecodedBlock> = opened
        .iter()
        .enumerate()
        .map(|(index, block)| DecodedBlock::new(index, block))
        .collect();
    let warnings = blocks.iter().filter(|b| b.warning.is_some()).count();

    Ok(Json(DecodeResponse {
        vehicle_id,
        date,
        blocks,
        warnings,
    }))
}

/// `GET /api/blocks`: feeless receipts, newest first.
pub async fn blocks(
    State(state): State<AppState>,
    Query(query): Query<BlocksQuery>,
) -> ApiResult<Json<Vec<Receipt>>> {
    let store = state
        .receipts
        .clone()
        .ok_or_else(|| ApiError::Unavailable("Receipt storage is disabled".to_string()))?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_BLOCKS_LIMIT)
        .min(MAX_BLOCKS_LIMIT);
    let receipts = tokio::task::spawn_blocking(move || store.recent(limit))
        .await
        .map_err(|e| ApiError::Unavailable(format!("Receipt query aborted: {e}")))??;
    Ok(Json(receipts))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backends: state
            .coordinator
            .adapters()
            .iter()
            .map(|a| a.id().to_string())
            .collect(),
    })
}
