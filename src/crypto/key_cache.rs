//! Memoized chained-key derivation.
//!
//! # Design Decisions
//! - Two `DashMap`s shared behind `Arc`, so clones observe the same cache:
//!   - `keys`: finished keys per (vehicle, enrollment, day index).
//!   - `checkpoints`: highest link derived so far per chain, so a new day
//!     only walks forward from the nearest known link.
//! - Misses walk the chain without holding any map lock, then store the
//!   result with `entry().or_insert()`. Concurrent callers for the same day
//!   may both walk; they produce the same key and the first insert wins.
//! - Both maps are bounded: reaching `max_entries` memoized keys resets the
//!   cache, and later misses walk again from the seed.
//! - Day indices are clamped at zero, so any date before enrollment shares
//!   the seed key's slot.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;

use super::daily_key::{
    advance_chain, chain_seed, chained_key, day_start_epoch, days_between, DailyKey, KeyDerivation,
    MasterKey, CHAINED_KEY_LEN,
};
use crate::observability::metrics;

/// Default for [`ChainedKeyCache::with_max_entries`].
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

type ChainId = (String, i64);
type MemoKey = (String, i64, u64);

#[derive(Clone, Copy)]
struct Checkpoint {
    day: u64,
    key: [u8; CHAINED_KEY_LEN],
}

/// Shared cache of chained daily keys.
#[derive(Clone)]
pub struct ChainedKeyCache {
    keys: Arc<DashMap<MemoKey, [u8; CHAINED_KEY_LEN]>>,
    checkpoints: Arc<DashMap<ChainId, Checkpoint>>,
    max_entries: usize,
}

impl Default for ChainedKeyCache {
    fn default() -> Self {
        Self {
            keys: Arc::default(),
            checkpoints: Arc::default(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl ChainedKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Return the chained key for `target`, deriving and storing it on a miss.
    pub fn get_or_derive(
        &self,
        master: &MasterKey,
        vehicle_id: &str,
        init: NaiveDate,
        target: NaiveDate,
    ) -> DailyKey {
        let init_epoch = day_start_epoch(init);
        let day = days_between(init, target);
        let memo_key = (vehicle_id.to_string(), init_epoch, day);

        if let Some(hit) = self.keys.get(&memo_key) {
            metrics::record_key_derivation(KeyDerivation::Chained.as_str(), true);
            return chained_key(*hit);
        }

        if self.keys.len() >= self.max_entries {
            tracing::warn!(entries = self.keys.len(), "Chained key cache full, resetting");
            self.clear();
        }
        let derived = self.derive_from_checkpoint(master, vehicle_id, init_epoch, day);
        let key = *self.keys.entry(memo_key).or_insert(derived);

        metrics::record_key_derivation(KeyDerivation::Chained.as_str(), false);
        tracing::debug!(vehicle_id, day, "Derived chained daily key");

        chained_key(key)
    }

    fn derive_from_checkpoint(
        &self,
        master: &MasterKey,
        vehicle_id: &str,
        init_epoch: i64,
        day: u64,
    ) -> [u8; CHAINED_KEY_LEN] {
        let chain: ChainId = (vehicle_id.to_string(), init_epoch);

        let start = self
            .checkpoints
            .get(&chain)
            .map(|cp| *cp)
            .filter(|cp| cp.day <= day);

        let (from_day, seed) = match start {
            Some(cp) => (cp.day, cp.key),
            None => (0, chain_seed(master, vehicle_id, init_epoch)),
        };

        let key = advance_chain(seed, vehicle_id, init_epoch, from_day, day);

        self.checkpoints
            .entry(chain)
            .and_modify(|cp| {
                if day > cp.day {
                    *cp = Checkpoint { day, key };
                }
            })
            .or_insert(Checkpoint { day, key });

        key
    }

    /// Number of memoized keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Highest day index derived for a chain, if any.
    pub fn checkpoint_day(&self, vehicle_id: &str, init: NaiveDate) -> Option<u64> {
        self.checkpoints
            .get(&(vehicle_id.to_string(), day_start_epoch(init)))
            .map(|cp| cp.day)
    }

    pub fn clear(&self) {
        self.keys.clear();
        self.checkpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::daily_key::{derive_chained, parse_day};

    fn master() -> MasterKey {
        MasterKey::from_hex("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff")
            .unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_cached_matches_uncached_in_any_order() {
        let cache = ChainedKeyCache::new();
        let init = day("2025-03-10");
        let order = [
            "2025-03-20",
            "2025-03-12",
            "2025-03-10",
            "2025-03-25",
            "2025-03-12",
            "2025-03-21",
            "2025-02-01",
        ];

        for target in order {
            let cached = cache.get_or_derive(&master(), "VEH-001", init, day(target));
            let fresh = derive_chained(&master(), "VEH-001", init, day(target));
            assert_eq!(cached, fresh, "mismatch for {target}");
        }
    }

    #[test]
    fn test_checkpoint_tracks_highest_day() {
        let cache = ChainedKeyCache::new();
        let init = day("2025-03-10");

        cache.get_or_derive(&master(), "VEH-001", init, day("2025-03-15"));
        assert_eq!(cache.checkpoint_day("VEH-001", init), Some(5));

        cache.get_or_derive(&master(), "VEH-001", init, day("2025-03-12"));
        assert_eq!(cache.checkpoint_day("VEH-001", init), Some(5));

        cache.get_or_derive(&master(), "VEH-001", init, day("2025-03-30"));
        assert_eq!(cache.checkpoint_day("VEH-001", init), Some(20));
    }

    #[test]
    fn test_memo_is_shared_between_clones() {
        let cache = ChainedKeyCache::new();
        let clone = cache.clone();
        let init = day("2025-03-10");

        cache.get_or_derive(&master(), "VEH-001", init, day("2025-03-11"));
        assert_eq!(clone.len(), 1);

        clone.get_or_derive(&master(), "VEH-001", init, day("2025-03-11"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(clone.is_empty());
    }

    #[test]
    fn test_vehicles_do_not_share_chains() {
        let cache = ChainedKeyCache::new();
        let init = day("2025-03-10");
        let a = cache.get_or_derive(&master(), "VEH-001", init, day("2025-03-12"));
        let b = cache.get_or_derive(&master(), "VEH-002", init, day("2025-03-12"));
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_derivations_agree() {
        let cache = ChainedKeyCache::new();
        let init = day("2025-03-10");
        let mut handles = Vec::new();

        for i in 0..16u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let offset = chrono::Days::new(u64::from(i % 8) * 3);
                let target = init + offset;
                let key = cache.get_or_derive(&master(), "VEH-001", init, target);
                (target, key)
            }));
        }

        for handle in handles {
            let (target, key) = handle.await.unwrap();
            assert_eq!(key, derive_chained(&master(), "VEH-001", init, target));
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_reset_when_full_keeps_results_correct() {
        let cache = ChainedKeyCache::new().with_max_entries(3);
        let init = day("2025-03-10");

        for vehicle in ["V1", "V2", "V3", "V4", "V5"] {
            let key = cache.get_or_derive(&master(), vehicle, init, day("2025-03-13"));
            assert_eq!(key, derive_chained(&master(), vehicle, init, day("2025-03-13")));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.checkpoint_day("V1", init), None);
        assert_eq!(cache.checkpoint_day("V5", init), Some(3));
    }
}
