//! FX rate caching with lazy expiry.
//!
//! Entries are never evicted. A lookup treats an entry older than the expiry
//! window as a miss and leaves it in place; the next store for the pair
//! overwrites it. There is no size bound.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use fxgate_common::{CurrencyPair, SharedClock, Timestamp};
use rust_decimal::Decimal;
use tracing::debug;

/// Cached rate entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub rate: Decimal,
    pub fetched_at: Timestamp,
}

impl CachedRate {
    fn is_fresh(&self, now: Timestamp, expiry: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < expiry
    }
}

/// Thread-safe rate cache keyed by `FROM_TO`.
pub struct RateCache {
    entries: DashMap<String, CachedRate>,
    expiry: Duration,
    clock: SharedClock,
}

impl RateCache {
    /// Create a cache whose entries expire `expiry` after they were stored.
    pub fn new(expiry: Duration, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            expiry,
            clock,
        }
    }

    /// Get a rate if one was stored less than `expiry` ago.
    pub fn lookup(&self, pair: &CurrencyPair) -> Option<Decimal> {
        let key = pair.cache_key();
        // Copy out under the shard lock so rate and timestamp are read together.
        let entry = self.entries.get(&key).map(|e| *e);

        match entry {
            Some(entry) if entry.is_fresh(self.clock.now(), self.expiry) => {
                debug!(pair = %pair, "Cache hit");
                Some(entry.rate)
            }
            Some(_) => {
                debug!(pair = %pair, "Cache entry expired");
                None
            }
            None => {
                debug!(pair = %pair, "Cache miss");
                None
            }
        }
    }

    /// Store a rate stamped with the current time, replacing any entry.
    pub fn store(&self, pair: &CurrencyPair, rate: Decimal) {
        let entry = CachedRate {
            rate,
            fetched_at: self.clock.now(),
        };
        self.entries.insert(pair.cache_key(), entry);
    }

    /// Raw entry for a pair, stale or not.
    pub fn entry(&self, pair: &CurrencyPair) -> Option<CachedRate> {
        self.entries.get(&pair.cache_key()).map(|e| *e)
    }

    /// Expiry window.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Get the number of entries in cache, including stale ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total = self.entries.len();
        let fresh = self
            .entries
            .iter()
            .filter(|e| e.is_fresh(now, self.expiry))
            .count();

        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            stale_entries: total - fresh,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fxgate_common::{Clock, Currency, ManualClock};
    use rust_decimal_macros::dec;

    fn setup(expiry_secs: i64) -> (Arc<ManualClock>, RateCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        ));
        let cache = RateCache::new(Duration::seconds(expiry_secs), clock.clone());
        (clock, cache)
    }

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::eur())
    }

    #[test]
    fn test_store_then_lookup() {
        let (_, cache) = setup(60);
        cache.store(&usd_eur(), dec!(0.92));

        assert_eq!(cache.lookup(&usd_eur()), Some(dec!(0.92)));
    }

    #[test]
    fn test_cache_miss() {
        let (_, cache) = setup(60);
        assert!(cache.lookup(&usd_eur()).is_none());
    }

    #[test]
    fn test_cache_expiry_boundary() {
        let (clock, cache) = setup(60);
        cache.store(&usd_eur(), dec!(0.92));

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.lookup(&usd_eur()), Some(dec!(0.92)));

        // Exactly at the expiry window the entry is gone.
        clock.advance(Duration::seconds(1));
        assert!(cache.lookup(&usd_eur()).is_none());
    }

    #[test]
    fn test_stale_entry_is_kept_until_overwritten() {
        let (clock, cache) = setup(60);
        cache.store(&usd_eur(), dec!(0.92));
        clock.advance(Duration::seconds(120));

        assert!(cache.lookup(&usd_eur()).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().stale_entries, 1);

        cache.store(&usd_eur(), dec!(0.95));
        assert_eq!(cache.lookup(&usd_eur()), Some(dec!(0.95)));
        assert_eq!(cache.entry(&usd_eur()).unwrap().fetched_at, clock.now());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_directional() {
        let (_, cache) = setup(60);
        cache.store(&usd_eur(), dec!(0.92));

        assert!(cache.lookup(&usd_eur().inverse()).is_none());
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let (_, cache) = setup(60);
        cache.store(&usd_eur(), dec!(0.92));

        let lower = CurrencyPair::new(Currency::new("usd"), Currency::new("eur"));
        assert!(cache.lookup(&lower).is_none());
    }

    #[test]
    fn test_zero_expiry_never_hits() {
        let (_, cache) = setup(0);
        cache.store(&usd_eur(), dec!(0.92));

        assert!(cache.lookup(&usd_eur()).is_none());
    }
}
