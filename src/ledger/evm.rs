//! EVM contract back end.
//!
//! Calls `receiveSensorBatch(uint256 timestamp, string hexData)` on the
//! registry contract, waits for the receipt and returns the transaction
//! hash. Nonce, gas and chain id are filled by the provider.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;

use super::types::{LedgerError, LedgerResult};
use super::wallet::Wallet;
use crate::config::EvmConfig;
use crate::dispatch::adapter::{render_link, LedgerAdapter};
use crate::dispatch::types::{BackendKind, Submission};

sol! {
    #[sol(rpc)]
    contract SensorBatchRegistry {
        event SensorBatchReceived(uint256 dateKey, uint256 timestamp, string hexData);

        function receiveSensorBatch(uint256 timestamp, string hexData) external;
    }
}

pub struct EvmAdapter {
    id: String,
    provider: DynProvider,
    contract: Address,
    config: EvmConfig,
}

impl EvmAdapter {
    pub fn new(id: impl Into<String>, config: &EvmConfig, wallet: &Wallet) -> LedgerResult<Self> {
        let url: url::Url = config.rpc_url.parse().map_err(|e| {
            LedgerError::Config(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let contract: Address = config.contract_address.trim().parse().map_err(|e| {
            LedgerError::Config(format!(
                "Invalid contract address '{}': {}",
                config.contract_address, e
            ))
        })?;

        let provider = ProviderBuilder::new()
            .wallet(wallet.to_ethereum_wallet())
            .connect_http(url);

        Ok(Self {
            id: id.into(),
            provider: DynProvider::new(provider),
            contract,
            config: config.clone(),
        })
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> LedgerResult<()> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if actual != self.config.chain_id {
            return Err(LedgerError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerAdapter for EvmAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Evm
    }

    async fn submit(&self, submission: &Submission) -> LedgerResult<String> {
        let registry = SensorBatchRegistry::new(self.contract, self.provider.clone());

        let pending = registry
            .receiveSensorBatch(U256::from(submission.timestamp), submission.hex.clone())
            .send()
            .await
            .map_err(classify_send_error)?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(backend = %self.id, tx_hash = %tx_hash, "EVM transaction sent");

        let receipt = pending
            .with_required_confirmations(self.config.confirmation_blocks)
            .with_timeout(Some(Duration::from_secs(self.config.confirmation_timeout_secs)))
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Unconfirmed(format!("{tx_hash}: {e}")))?;

        if !receipt.status() {
            return Err(LedgerError::Rejected(format!("Transaction {tx_hash} reverted")));
        }

        Ok(tx_hash.to_string())
    }

    fn explorer_link(&self, reference: &str) -> Option<String> {
        render_link(&self.config.explorer_url, reference)
    }
}

/// Node error responses (reverts during estimation, bad nonce) are
/// rejections; transport failures mean the node never saw the call.
fn classify_send_error(error: alloy::contract::Error) -> LedgerError {
    match error {
        alloy::contract::Error::TransportError(rpc) => match rpc.as_error_resp() {
            Some(payload) => LedgerError::Rejected(payload.message.to_string()),
            None => LedgerError::Unavailable(rpc.to_string()),
        },
        other => LedgerError::Rejected(other.to_string()),
    }
}
