//! Pipeline types.

use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::CryptoError;

/// Batch lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Received,
    Processed,
    Dispatching,
    Completed,
}

impl BatchState {
    /// The only state reachable from `self`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Processed),
            Self::Processed => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Invalid batch transition from {from:?} to {to:?}")]
    InvalidTransition { from: BatchState, to: BatchState },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Vehicle id must not be empty")]
    MissingVehicleId,

    #[error("Invalid backend selection: {0}")]
    InvalidSelection(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        let mut state = BatchState::Received;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                BatchState::Received,
                BatchState::Processed,
                BatchState::Dispatching,
                BatchState::Completed
            ]
        );
    }
}
