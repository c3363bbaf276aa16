//! Move object-transaction back end.
//!
//! # Data Flow
//! ```text
//! Submission
//!     → unsafe_moveCall (node builds the transaction, returns BCS bytes)
//!     → MoveSigner: Ed25519 over Blake2b-256([0,0,0] || tx_bytes)
//!     → sui_executeTransactionBlock (WaitForLocalExecution)
//!     → digest, once effects report success
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{LedgerError, LedgerResult};
use crate::config::MoveCallConfig;
use crate::dispatch::adapter::{render_link, LedgerAdapter};
use crate::dispatch::types::{BackendKind, Submission};

type Blake2b256 = Blake2b<U32>;

/// Ed25519 signature scheme flag.
const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for transaction data: scope, version, app id.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Ed25519 key used to sign Move transactions.
pub struct MoveSigner {
    key: SigningKey,
}

impl MoveSigner {
    /// Accepts a 32-byte seed, a 33-byte flagged key, or a 64-byte keypair.
    pub fn from_hex(secret_hex: &str) -> LedgerResult<Self> {
        let trimmed = secret_hex.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::Wallet(format!("Invalid Move private key: {e}")))?;

        let seed: &[u8] = match bytes.len() {
            32 => &bytes,
            33 if bytes[0] == ED25519_FLAG => &bytes[1..],
            64 => &bytes[..32],
            n => {
                return Err(LedgerError::Wallet(format!(
                    "Invalid Move private key length: {n} bytes"
                )))
            }
        };

        let mut secret = [0u8; 32];
        secret.copy_from_slice(seed);
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn from_env(var: &str) -> LedgerResult<Self> {
        let value = std::env::var(var)
            .map_err(|_| LedgerError::Wallet(format!("Environment variable {var} not set")))?;
        Self::from_hex(&value)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// `0x` + hex(Blake2b-256(flag || public key)).
    pub fn address(&self) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update([ED25519_FLAG]);
        hasher.update(self.public_key());
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    /// Serialized signature (`flag || sig || pubkey`, base64) over `tx_bytes`.
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(TRANSACTION_INTENT);
        hasher.update(tx_bytes);
        let digest = hasher.finalize();

        let signature = self.key.sign(&digest);

        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(&self.public_key());
        BASE64.encode(serialized)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuiltTransaction {
    tx_bytes: String,
}

#[derive(Deserialize)]
struct ExecutedTransaction {
    digest: String,
    effects: Option<TransactionEffects>,
}

#[derive(Deserialize)]
struct TransactionEffects {
    status: ExecutionStatus,
}

#[derive(Deserialize)]
struct ExecutionStatus {
    status: String,
    error: Option<String>,
}

/// Which phase a request belongs to decides how transport errors map.
#[derive(Clone, Copy)]
enum Phase {
    Build,
    Execute,
}

pub struct MoveCallAdapter {
    id: String,
    http: reqwest::Client,
    signer: MoveSigner,
    config: MoveCallConfig,
}

impl MoveCallAdapter {
    pub fn new(id: impl Into<String>, config: &MoveCallConfig, signer: MoveSigner) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .map_err(|e| LedgerError::Config(format!("HTTP client: {e}")))?;

        tracing::info!(address = %signer.address(), "Move signer initialized");

        Ok(Self {
            id: id.into(),
            http,
            signer,
            config: config.clone(),
        })
    }

    fn call_arguments(&self, submission: &Submission) -> Vec<Value> {
        let mut args = Vec::with_capacity(3);
        if self.config.include_vehicle_id {
            args.push(json!(submission.vehicle_id));
        }
        args.push(json!(submission.timestamp.to_string()));
        args.push(json!(submission.hex));
        args
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        phase: Phase,
        method: &str,
        params: Value,
    ) -> LedgerResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let transport_error = |e: reqwest::Error| match phase {
            Phase::Build => LedgerError::Unavailable(format!("{method}: {e}")),
            Phase::Execute => LedgerError::Unconfirmed(format!("{method}: {e}")),
        };

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let message = format!("{method}: HTTP {status}");
            return Err(match phase {
                Phase::Build => LedgerError::Unavailable(message),
                Phase::Execute => LedgerError::Unconfirmed(message),
            });
        }

        let body: RpcResponse<T> = response.json().await.map_err(transport_error)?;

        if let Some(error) = body.error {
            return Err(LedgerError::Rejected(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        body.result
            .ok_or_else(|| LedgerError::Rejected(format!("{method} returned no result")))
    }
}

#[async_trait]
impl LedgerAdapter for MoveCallAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Move
    }

    async fn submit(&self, submission: &Submission) -> LedgerResult<String> {
        let built: BuiltTransaction = self
            .rpc(
                Phase::Build,
                "unsafe_moveCall",
                json!([
                    self.signer.address(),
                    self.config.package_id,
                    self.config.module,
                    self.config.function,
                    [],
                    self.call_arguments(submission),
                    null,
                    self.config.gas_budget.to_string(),
                ]),
            )
            .await?;

        let tx_bytes = BASE64
            .decode(&built.tx_bytes)
            .map_err(|e| LedgerError::Rejected(format!("Node returned invalid txBytes: {e}")))?;
        let signature = self.signer.sign_transaction(&tx_bytes);

        let executed: ExecutedTransaction = self
            .rpc(
                Phase::Execute,
                "sui_executeTransactionBlock",
                json!([
                    built.tx_bytes,
                    [signature],
                    { "showEffects": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await?;

        if let Some(effects) = executed.effects {
            if effects.status.status != "success" {
                return Err(LedgerError::Rejected(format!(
                    "Transaction {} failed: {}",
                    executed.digest,
                    effects.status.error.unwrap_or(effects.status.status)
                )));
            }
        }

        Ok(executed.digest)
    }

    fn explorer_link(&self, reference: &str) -> Option<String> {
        render_link(&self.config.explorer_url, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_HEX: &str = "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";

    #[test]
    fn test_address_derivation() {
        let signer = MoveSigner::from_hex(SEED_HEX).unwrap();
        assert_eq!(
            hex::encode(signer.public_key()),
            "79b5562e8fe654f94078b112e8a98ba7901f853ae695bed7e0e3910bad049664"
        );
        assert_eq!(
            signer.address(),
            "0x7573c697fa68450f04fa0dee2d39dcdc8a5ccf5db547f3e47638a6f8eeeec110"
        );
    }

    #[test]
    fn test_signature_vector() {
        let signer = MoveSigner::from_hex(SEED_HEX).unwrap();
        assert_eq!(
            signer.sign_transaction(b"hello-tx"),
            "AOTTVRHRxZyAXyo6t6ep9y/DSvqO6TCCp2GHM+BaKSCR4qVmbGBQkds9eycjDuNJzv8nuk4NnDCRLdevsBR85Qp5tVYuj+ZU+UB4sRLoqYunkB+FOuaVvtfg45ELrQSWZA=="
        );
    }

    #[test]
    fn test_key_formats() {
        let flagged = format!("00{SEED_HEX}");
        let keypair = format!("{SEED_HEX}{}", "00".repeat(32));
        let reference = MoveSigner::from_hex(SEED_HEX).unwrap().address();

        assert_eq!(MoveSigner::from_hex(&flagged).unwrap().address(), reference);
        assert_eq!(MoveSigner::from_hex(&keypair).unwrap().address(), reference);
        assert!(MoveSigner::from_hex("abcd").is_err());
        assert!(MoveSigner::from_hex("zz").is_err());
    }

    #[test]
    fn test_call_arguments() {
        let config = MoveCallConfig {
            include_vehicle_id: true,
            ..MoveCallConfig::default()
        };
        let adapter =
            MoveCallAdapter::new("move", &config, MoveSigner::from_hex(SEED_HEX).unwrap()).unwrap();
        let args = adapter.call_arguments(&Submission {
            vehicle_id: "VEH-001".to_string(),
            timestamp: 42,
            hex: "ab".to_string(),
        });
        assert_eq!(args, vec![json!("VEH-001"), json!("42"), json!("ab")]);
    }
}
