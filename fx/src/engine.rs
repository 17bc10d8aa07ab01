//! Rate resolution: cache first, upstream on miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fxgate_common::CurrencyPair;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, SharedRateCache};
use crate::conversion::ConversionResult;
use crate::error::FxResult;
use crate::provider::RateProvider;

/// Configuration for the FX engine.
#[derive(Debug, Clone)]
pub struct FxEngineConfig {
    /// Serialize concurrent misses for the same pair so only one of them
    /// reaches the upstream.
    pub coalesce_fetches: bool,
}

impl Default for FxEngineConfig {
    fn default() -> Self {
        Self {
            coalesce_fetches: true,
        }
    }
}

/// A resolved rate and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub from_cache: bool,
}

/// Resolves rates through the cache and the upstream provider.
pub struct FxEngine {
    provider: Arc<dyn RateProvider>,
    cache: SharedRateCache,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    upstream_fetches: AtomicU64,
    upstream_failures: AtomicU64,
    config: FxEngineConfig,
}

impl FxEngine {
    /// Create a new FX engine over a shared cache.
    pub fn new(
        provider: Arc<dyn RateProvider>,
        cache: SharedRateCache,
        config: FxEngineConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            inflight: DashMap::new(),
            upstream_fetches: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            config,
        }
    }

    /// Get the current rate for a currency pair.
    ///
    /// The cache is written only when the rate came from a fetch made by this
    /// call. Failures leave the cache untouched.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<RateQuote> {
        if let Some(rate) = self.cache.lookup(pair) {
            return Ok(Self::cached(pair, rate));
        }

        if !self.config.coalesce_fetches {
            return self.fetch_and_store(pair).await;
        }

        let gate = InflightGate::acquire(&self.inflight, pair.cache_key());
        let _guard = gate.lock().await;

        // Whoever held the gate before us may have filled the cache.
        if let Some(rate) = self.cache.lookup(pair) {
            debug!("Rate filled by concurrent fetch");
            return Ok(Self::cached(pair, rate));
        }

        self.fetch_and_store(pair).await
    }

    /// Convert `amount` along `pair`.
    pub async fn convert(&self, pair: &CurrencyPair, amount: Decimal) -> FxResult<ConversionResult> {
        let quote = self.get_rate(pair).await?;
        ConversionResult::from_quote(quote, amount)
    }

    /// Shared cache handle.
    pub fn cache(&self) -> &SharedRateCache {
        &self.cache
    }

    /// Name of the upstream provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Get engine statistics.
    pub fn stats(&self) -> FxEngineStats {
        FxEngineStats {
            cache: self.cache.stats(),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }

    async fn fetch_and_store(&self, pair: &CurrencyPair) -> FxResult<RateQuote> {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);

        let rate = match self.provider.fetch_rates(&pair.base).await {
            Ok(table) => table.resolve(&pair.quote),
            Err(e) => Err(e),
        }
        .map_err(|e| {
            if !e.is_invalid_pair() {
                self.upstream_failures.fetch_add(1, Ordering::Relaxed);
            }
            warn!(
                provider = self.provider.name(),
                error = %e,
                "Could not resolve rate from upstream"
            );
            e
        })?;

        self.cache.store(pair, rate);
        debug!(rate = %rate, "Stored upstream rate");

        Ok(RateQuote {
            pair: pair.clone(),
            rate,
            from_cache: false,
        })
    }

    fn cached(pair: &CurrencyPair, rate: Decimal) -> RateQuote {
        RateQuote {
            pair: pair.clone(),
            rate,
            from_cache: true,
        }
    }
}

/// Per-pair fetch gate. The map entry is removed once the last holder is
/// done, so pairs that never resolve do not accumulate.
struct InflightGate<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    gate: Arc<Mutex<()>>,
}

impl<'a> InflightGate<'a> {
    fn acquire(map: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
        let gate = map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { map, key, gate }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for InflightGate<'_> {
    fn drop(&mut self) {
        // The map and this handle are the only owners left.
        self.map.remove_if(&self.key, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2
        });
    }
}

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct FxEngineStats {
    pub cache: CacheStats,
    pub upstream_fetches: u64,
    pub upstream_failures: u64,
}
