//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the master key and build the key schedule
//! - Construct the enabled ledger adapters from their config sections
//! - Open the receipt store
//! - Assemble the shared [`AppState`]
//!
//! Any failure here is fatal: the service never starts half-configured.

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::StorageConfig;
use crate::config::{AnchorConfig, KeysConfig};
use crate::crypto::daily_key::parse_day;
use crate::crypto::{CryptoError, KeySchedule, MasterKey};
use crate::dispatch::{DispatchCoordinator, DispatchSettings, LedgerAdapter};
use crate::http::AppState;
use crate::ledger::{
    EvmAdapter, FeelessAdapter, LedgerError, MoveCallAdapter, MoveSigner, Wallet,
};
use crate::pipeline::Pipeline;
use crate::storage::{ReceiptStore, StorageError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Key setup failed: {0}")]
    Keys(#[from] CryptoError),

    #[error("Backend '{backend}' failed to initialize: {source}")]
    Ledger {
        backend: &'static str,
        source: LedgerError,
    },

    #[error("Receipt store failed to open: {0}")]
    Storage(#[from] StorageError),
}

/// Apply the derivation variant and enrollment dates to `master`.
pub fn build_key_schedule(master: MasterKey, keys: &KeysConfig) -> Result<KeySchedule, CryptoError> {
    let mut schedule =
        KeySchedule::new(master, keys.derivation).with_max_future_days(keys.max_future_days);

    if let Some(date) = &keys.enrollment_date {
        schedule = schedule.with_default_enrollment(parse_day(date)?);
    }
    for (vehicle_id, date) in &keys.enrollments {
        schedule = schedule.with_enrollment(vehicle_id.clone(), parse_day(date)?);
    }

    Ok(schedule)
}

/// Build every enabled adapter. Secrets come from the configured env vars.
pub async fn build_adapters(config: &AnchorConfig) -> Result<Vec<Arc<dyn LedgerAdapter>>, StartupError> {
    let mut adapters: Vec<Arc<dyn LedgerAdapter>> = Vec::new();

    if config.evm.enabled {
        let ledger = |source| StartupError::Ledger {
            backend: "evm",
            source,
        };
        let wallet = Wallet::from_env(&config.evm.private_key_env, config.evm.chain_id).map_err(ledger)?;
        let adapter = EvmAdapter::new("evm", &config.evm, &wallet).map_err(ledger)?;

        match adapter.verify_chain_id().await {
            Ok(()) => {}
            Err(e @ LedgerError::ChainMismatch { .. }) => return Err(ledger(e)),
            Err(e) => tracing::warn!(error = %e, "Could not verify EVM chain id; continuing"),
        }
        adapters.push(Arc::new(adapter));
    }

    if config.move_call.enabled {
        let ledger = |source| StartupError::Ledger {
            backend: "move",
            source,
        };
        let signer = MoveSigner::from_env(&config.move_call.private_key_env).map_err(ledger)?;
        let adapter = MoveCallAdapter::new("move", &config.move_call, signer).map_err(ledger)?;
        adapters.push(Arc::new(adapter));
    }

    if config.feeless.enabled {
        let adapter = FeelessAdapter::new("feeless", &config.feeless).map_err(|source| {
            StartupError::Ledger {
                backend: "feeless",
                source,
            }
        })?;
        adapters.push(Arc::new(adapter));
    }

    if adapters.is_empty() {
        tracing::warn!("No ledger back end enabled; /sendTx will report NothingToDo");
    }
    Ok(adapters)
}

pub fn open_receipts(storage: &StorageConfig) -> Result<Option<Arc<ReceiptStore>>, StorageError> {
    if !storage.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(ReceiptStore::open(&storage.database_path)?)))
}

/// Assemble handler state from already-built parts.
pub fn assemble_state(
    config: &AnchorConfig,
    keys: KeySchedule,
    adapters: Vec<Arc<dyn LedgerAdapter>>,
    receipts: Option<Arc<ReceiptStore>>,
) -> AppState {
    let pipeline = Pipeline::new(Arc::new(keys), config.pipeline.encrypt_on_ingest);

    let settings = DispatchSettings::from_config(&config.dispatch, &config.timeouts);
    let mut coordinator = DispatchCoordinator::new(adapters, settings);
    if let Some(store) = &receipts {
        coordinator = coordinator.with_receipts(store.clone());
    }

    AppState {
        pipeline: Arc::new(pipeline),
        coordinator: Arc::new(coordinator),
        receipts,
        default_vehicle_id: Arc::from(config.keys.default_vehicle_id.as_str()),
    }
}

/// Build the full service state from a validated configuration.
pub async fn build_state(config: &AnchorConfig) -> Result<AppState, StartupError> {
    let master = MasterKey::from_env(&config.keys.master_key_env)?;
    let keys = build_key_schedule(master, &config.keys)?;
    tracing::info!(derivation = keys.derivation().as_str(), "Key schedule ready");

    let adapters = build_adapters(config).await?;
    let receipts = open_receipts(&config.storage)?;

    tracing::info!(
        backends = ?adapters.iter().map(|a| a.id().to_string()).collect::<Vec<_>>(),
        storage = receipts.is_some(),
        "Services initialized"
    );

    Ok(assemble_state(config, keys, adapters, receipts))
}
