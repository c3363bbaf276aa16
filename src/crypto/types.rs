//! Crypto error definitions.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// AES-CTR keys must be 16 or 32 bytes.
    #[error("Invalid key length: {0} bytes (expected 16 or 32)")]
    InvalidKeyLength(usize),

    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Wide enough for any signed or unsigned epoch value.
    #[error("Timestamp {0} is outside the supported range")]
    InvalidTimestamp(i128),

    /// Chained keys are only derived up to a few days past today.
    #[error("Day {day} is more than {limit} days ahead of today")]
    DayTooFarAhead { day: NaiveDate, limit: u32 },

    /// Chained derivation needs the vehicle's enrollment date.
    #[error("No enrollment date configured for vehicle '{0}'")]
    UnknownEnrollment(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
