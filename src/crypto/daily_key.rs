//! Daily key derivation.
//!
//! # Responsibilities
//! - Hold the master secret ([`MasterKey`]) and derived keys ([`DailyKey`]),
//!   both zeroized on drop and redacted from `Debug`.
//! - Derive the key for a UTC calendar day using one of two variants:
//!   - **Direct**: `SHA256(master || "YYYY-MM-DD")`, 32 bytes.
//!   - **Chained**: a per-vehicle hash chain starting at the enrollment
//!     date, 16 bytes per link. See [`chain_seed`] and [`chain_step`].
//! - [`KeySchedule`] applies the configured variant for both sealing and
//!   opening, so producers and consumers always agree.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::key_cache::ChainedKeyCache;
use super::types::{CryptoError, CryptoResult};
use crate::observability::metrics;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Length of each link of the chained derivation.
pub const CHAINED_KEY_LEN: usize = 16;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Default for [`KeySchedule::with_max_future_days`].
pub const DEFAULT_MAX_FUTURE_DAYS: u32 = 2;

/// Long-lived secret every daily key is derived from.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidMasterKey("key is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded secret (optional `0x` prefix).
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let trimmed = encoded.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(digits).map_err(|e| CryptoError::InvalidMasterKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Load the secret from an environment variable holding hex.
    pub fn from_env(var: &str) -> CryptoResult<Self> {
        let value = std::env::var(var)
            .map_err(|_| CryptoError::InvalidMasterKey(format!("{var} is not set")))?;
        Self::from_hex(&value)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey(<redacted>, {} bytes)", self.0.len())
    }
}

/// Symmetric key valid for one UTC day. Always 16 or 32 bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DailyKey(Vec<u8>);

impl DailyKey {
    pub fn new(bytes: Vec<u8>) -> CryptoResult<Self> {
        match bytes.len() {
            16 | 32 => Ok(Self(bytes)),
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    }

    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let trimmed = encoded.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|_| CryptoError::InvalidKeyLength(digits.len() / 2))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for DailyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DailyKey(<redacted>, {} bytes)", self.0.len())
    }
}

/// Which derivation a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    #[default]
    Direct,
    Chained,
}

impl KeyDerivation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Chained => "chained",
        }
    }
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(input: &str) -> CryptoResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
        .map_err(|_| CryptoError::InvalidDate(input.to_string()))
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// UTC day containing `epoch_secs`.
pub fn day_of(epoch_secs: i64) -> CryptoResult<NaiveDate> {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.date_naive())
        .ok_or(CryptoError::InvalidTimestamp(i128::from(epoch_secs)))
}

/// Epoch seconds of 00:00:00 UTC on `day`.
pub fn day_start_epoch(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Whole days from `init` to `target`, clamped at zero.
pub fn days_between(init: NaiveDate, target: NaiveDate) -> u64 {
    let diff = day_start_epoch(target) - day_start_epoch(init);
    diff.div_euclid(SECONDS_PER_DAY).max(0) as u64
}

pub fn derive_direct(master: &MasterKey, day: NaiveDate) -> DailyKey {
    let mut hasher = Sha256::new();
    hasher.update(master.as_bytes());
    hasher.update(format_day(day).as_bytes());
    DailyKey(hasher.finalize().to_vec())
}

/// First link of the chain: `SHA256(master || vehicle || BE64(init))[0:16]`.
pub fn chain_seed(master: &MasterKey, vehicle_id: &str, init_epoch: i64) -> [u8; CHAINED_KEY_LEN] {
    chain_hash(master.as_bytes(), vehicle_id, init_epoch)
}

/// Next link: `SHA256(prev || vehicle || BE64(epoch))[0:16]`, where `epoch`
/// is the start of the day being derived.
pub fn chain_step(
    prev: &[u8; CHAINED_KEY_LEN],
    vehicle_id: &str,
    epoch: i64,
) -> [u8; CHAINED_KEY_LEN] {
    chain_hash(prev, vehicle_id, epoch)
}

fn chain_hash(secret: &[u8], vehicle_id: &str, epoch: i64) -> [u8; CHAINED_KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(vehicle_id.as_bytes());
    hasher.update((epoch as u64).to_be_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; CHAINED_KEY_LEN];
    out.copy_from_slice(&digest[..CHAINED_KEY_LEN]);
    out
}

/// Walk the chain from link `from_day` (holding `key`) up to `to_day`.
pub(crate) fn advance_chain(
    mut key: [u8; CHAINED_KEY_LEN],
    vehicle_id: &str,
    init_epoch: i64,
    from_day: u64,
    to_day: u64,
) -> [u8; CHAINED_KEY_LEN] {
    for i in from_day..to_day {
        let epoch = init_epoch + (i as i64 + 1) * SECONDS_PER_DAY;
        key = chain_step(&key, vehicle_id, epoch);
    }
    key
}

/// Uncached chained derivation.
pub fn derive_chained(
    master: &MasterKey,
    vehicle_id: &str,
    init: NaiveDate,
    target: NaiveDate,
) -> DailyKey {
    let init_epoch = day_start_epoch(init);
    let seed = chain_seed(master, vehicle_id, init_epoch);
    let key = advance_chain(seed, vehicle_id, init_epoch, 0, days_between(init, target));
    DailyKey(key.to_vec())
}

pub(crate) fn chained_key(bytes: [u8; CHAINED_KEY_LEN]) -> DailyKey {
    DailyKey(bytes.to_vec())
}

/// The deployment's key policy: master secret, variant, enrollment dates.
pub struct KeySchedule {
    master: MasterKey,
    derivation: KeyDerivation,
    default_enrollment: Option<NaiveDate>,
    enrollments: HashMap<String, NaiveDate>,
    max_future_days: u32,
    cache: ChainedKeyCache,
}

impl KeySchedule {
    pub fn new(master: MasterKey, derivation: KeyDerivation) -> Self {
        Self {
            master,
            derivation,
            default_enrollment: None,
            enrollments: HashMap::new(),
            max_future_days: DEFAULT_MAX_FUTURE_DAYS,
            cache: ChainedKeyCache::new(),
        }
    }

    /// Enrollment date for vehicles without an explicit entry.
    pub fn with_default_enrollment(mut self, day: NaiveDate) -> Self {
        self.default_enrollment = Some(day);
        self
    }

    pub fn with_enrollment(mut self, vehicle_id: impl Into<String>, day: NaiveDate) -> Self {
        self.enrollments.insert(vehicle_id.into(), day);
        self
    }

    /// Latest chained day accepted, counted from today (UTC).
    pub fn with_max_future_days(mut self, days: u32) -> Self {
        self.max_future_days = days;
        self
    }

    pub fn derivation(&self) -> KeyDerivation {
        self.derivation
    }

    pub fn cache(&self) -> &ChainedKeyCache {
        &self.cache
    }

    pub fn enrollment_for(&self, vehicle_id: &str) -> CryptoResult<NaiveDate> {
        self.enrollments
            .get(vehicle_id)
            .copied()
            .or(self.default_enrollment)
            .ok_or_else(|| CryptoError::UnknownEnrollment(vehicle_id.to_string()))
    }

    /// Key for `vehicle_id` on `day` under the configured variant.
    pub fn key_for_day(&self, vehicle_id: &str, day: NaiveDate) -> CryptoResult<DailyKey> {
        match self.derivation {
            KeyDerivation::Direct => {
                metrics::record_key_derivation(KeyDerivation::Direct.as_str(), false);
                Ok(derive_direct(&self.master, day))
            }
            KeyDerivation::Chained => {
                self.check_horizon(day, Utc::now().date_naive())?;
                let init = self.enrollment_for(vehicle_id)?;
                Ok(self.cache.get_or_derive(&self.master, vehicle_id, init, day))
            }
        }
    }

    /// Chain walks grow with the day index, so far-future days are refused.
    fn check_horizon(&self, day: NaiveDate, today: NaiveDate) -> CryptoResult<()> {
        let latest = today
            .checked_add_days(Days::new(u64::from(self.max_future_days)))
            .unwrap_or(NaiveDate::MAX);
        if day > latest {
            return Err(CryptoError::DayTooFarAhead {
                day,
                limit: self.max_future_days,
            });
        }
        Ok(())
    }

    /// Key for the UTC day containing `timestamp` (epoch seconds).
    pub fn key_for_timestamp(&self, vehicle_id: &str, timestamp: u64) -> CryptoResult<DailyKey> {
        let secs = i64::try_from(timestamp)
            .map_err(|_| CryptoError::InvalidTimestamp(i128::from(timestamp)))?;
        self.key_for_day(vehicle_id, day_of(secs)?)
    }
}

impl fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySchedule")
            .field("derivation", &self.derivation)
            .field("default_enrollment", &self.default_enrollment)
            .field("enrollments", &self.enrollments.len())
            .field("max_future_days", &self.max_future_days)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_HEX: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    fn master() -> MasterKey {
        MasterKey::from_hex(MASTER_HEX).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_direct_known_vector() {
        let key = derive_direct(&master(), day("2025-03-14"));
        assert_eq!(
            key.to_hex(),
            "336bdc84bbc80dc79c77928319ce19627ad3bbce5f6263ad3ce8b1834f0abfba"
        );
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_direct_is_deterministic_and_day_sensitive() {
        let a = derive_direct(&master(), day("2025-03-14"));
        let b = derive_direct(&master(), day("2025-03-14"));
        let c = derive_direct(&master(), day("2025-03-15"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chained_known_vectors() {
        let init = day("2025-03-10");
        let k0 = derive_chained(&master(), "VEH-001", init, init);
        assert_eq!(k0.to_hex(), "69d027673b6343c535970f73fcc42126");

        let k4 = derive_chained(&master(), "VEH-001", init, day("2025-03-14"));
        assert_eq!(k4.to_hex(), "b105bea90cc80fbe1a9b94351072f0c8");
        assert_eq!(k4.len(), CHAINED_KEY_LEN);
    }

    #[test]
    fn test_chained_clamps_days_before_enrollment() {
        let init = day("2025-03-10");
        let before = derive_chained(&master(), "VEH-001", init, day("2025-01-01"));
        let k0 = derive_chained(&master(), "VEH-001", init, init);
        assert_eq!(before, k0);
    }

    #[test]
    fn test_chained_depends_on_vehicle() {
        let init = day("2025-03-10");
        let a = derive_chained(&master(), "VEH-001", init, init);
        let b = derive_chained(&master(), "VEH-002", init, init);
        assert_ne!(a, b);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(day("2025-03-10"), day("2025-03-14")), 4);
        assert_eq!(days_between(day("2025-03-10"), day("2025-03-10")), 0);
        assert_eq!(days_between(day("2025-03-10"), day("2024-12-31")), 0);
    }

    #[test]
    fn test_day_of_timestamp() {
        // 2025-03-14T23:59:59Z
        assert_eq!(day_of(1_741_996_799).unwrap(), day("2025-03-14"));
        assert_eq!(day_of(1_741_996_800).unwrap(), day("2025-03-15"));
    }

    #[test]
    fn test_daily_key_rejects_bad_length() {
        assert_eq!(
            DailyKey::new(vec![0u8; 24]).unwrap_err(),
            CryptoError::InvalidKeyLength(24)
        );
        assert!(DailyKey::new(vec![0u8; 16]).is_ok());
        assert!(DailyKey::new(vec![0u8; 32]).is_ok());
    }

    #[test]
    fn test_master_key_parsing() {
        assert!(MasterKey::from_hex("0xabcd").is_ok());
        assert!(MasterKey::from_hex("").is_err());
        assert!(MasterKey::from_hex("xyz").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let rendered = format!("{:?}", master());
        assert!(!rendered.contains("0011"));
        let key = derive_direct(&master(), day("2025-03-14"));
        assert!(!format!("{key:?}").contains("336b"));
    }

    #[test]
    fn test_schedule_direct_ignores_vehicle() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Direct);
        let a = schedule.key_for_day("VEH-001", day("2025-03-14")).unwrap();
        let b = schedule.key_for_day("VEH-002", day("2025-03-14")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_schedule_chained_requires_enrollment() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Chained);
        let err = schedule.key_for_day("VEH-001", day("2025-03-14")).unwrap_err();
        assert_eq!(err, CryptoError::UnknownEnrollment("VEH-001".to_string()));

        let schedule = schedule.with_enrollment("VEH-001", day("2025-03-10"));
        let key = schedule.key_for_day("VEH-001", day("2025-03-14")).unwrap();
        assert_eq!(key.to_hex(), "b105bea90cc80fbe1a9b94351072f0c8");
    }

    #[test]
    fn test_schedule_timestamp_uses_utc_day() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Direct);
        // 2025-03-14T12:00:00Z
        let key = schedule.key_for_timestamp("VEH-001", 1_741_953_600).unwrap();
        assert_eq!(key, derive_direct(&master(), day("2025-03-14")));
    }

    #[test]
    fn test_chained_refuses_far_future_days() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Chained)
            .with_default_enrollment(day("2025-03-10"));

        // Year 5138, below the millisecond threshold.
        let err = schedule.key_for_timestamp("any-vehicle", 99_999_999_999).unwrap_err();
        assert!(matches!(err, CryptoError::DayTooFarAhead { limit: 2, .. }));

        let err = schedule.key_for_day("other-vehicle", day("9999-12-31")).unwrap_err();
        assert!(matches!(err, CryptoError::DayTooFarAhead { .. }));
        assert!(schedule.cache().is_empty());
    }

    #[test]
    fn test_horizon_counts_from_today() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Chained).with_max_future_days(1);
        let today = day("2025-03-14");
        assert!(schedule.check_horizon(day("2025-03-15"), today).is_ok());
        assert!(schedule.check_horizon(day("2020-01-01"), today).is_ok());
        assert_eq!(
            schedule.check_horizon(day("2025-03-16"), today).unwrap_err(),
            CryptoError::DayTooFarAhead {
                day: day("2025-03-16"),
                limit: 1
            }
        );
    }

    #[test]
    fn test_direct_has_no_horizon() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Direct);
        assert!(schedule.key_for_day("VEH-001", day("9999-12-31")).is_ok());
    }

    #[test]
    fn test_out_of_range_timestamp_reports_value() {
        let schedule = KeySchedule::new(master(), KeyDerivation::Direct);
        assert_eq!(
            schedule.key_for_timestamp("VEH-001", u64::MAX).unwrap_err(),
            CryptoError::InvalidTimestamp(i128::from(u64::MAX))
        );
        assert_eq!(
            day_of(i64::MAX).unwrap_err(),
            CryptoError::InvalidTimestamp(i128::from(i64::MAX))
        );
    }
}
