//! Ledger back-end error definitions.

use thiserror::Error;

use crate::dispatch::types::DispatchErrorKind;

/// Errors raised by ledger adapters.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// RPC endpoint unreachable or refused the request before acceptance.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Submission was sent but its outcome could not be confirmed in time.
    #[error("Submission not confirmed: {0}")]
    Unconfirmed(String),

    /// The ledger accepted the request but rejected the transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The feeless helper failed to start, exited non-zero, or printed garbage.
    #[error("Helper process failed: {0}")]
    HelperProcess(String),

    /// Invalid signing key or key derivation failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Invalid adapter configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// Map onto the kind reported to callers.
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            Self::Unavailable(_) | Self::Wallet(_) | Self::Config(_) => {
                DispatchErrorKind::BackendUnavailable
            }
            Self::Unconfirmed(_) => DispatchErrorKind::BackendTimeout,
            Self::Rejected(_) | Self::ChainMismatch { .. } => DispatchErrorKind::BackendRejected,
            Self::HelperProcess(_) => DispatchErrorKind::HelperProcessFailure,
        }
    }

    /// Only failures that happened before the ledger saw the submission are
    /// safe to resend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
