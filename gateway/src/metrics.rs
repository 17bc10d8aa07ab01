//! Metrics collection for gateway monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fxgate_fx::engine::FxEngineStats;

use crate::error::RejectionKind;

/// Gateway metrics.
pub struct Metrics {
    /// Conversion requests received.
    pub conversions_total: AtomicU64,
    /// Conversions answered successfully.
    pub conversions_success: AtomicU64,
    /// Successful conversions served from cache.
    pub cache_hits: AtomicU64,
    /// Successful conversions that needed an upstream fetch.
    pub cache_misses: AtomicU64,
    pub rejected_credentials: AtomicU64,
    pub rejected_rate_limit: AtomicU64,
    pub rejected_currency_pair: AtomicU64,
    /// Upstream unavailable or malformed.
    pub rejected_upstream: AtomicU64,
    pub rejected_storage: AtomicU64,
    /// Users registered.
    pub users_registered: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            conversions_total: AtomicU64::new(0),
            conversions_success: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            rejected_credentials: AtomicU64::new(0),
            rejected_rate_limit: AtomicU64::new(0),
            rejected_currency_pair: AtomicU64::new(0),
            rejected_upstream: AtomicU64::new(0),
            rejected_storage: AtomicU64::new(0),
            users_registered: AtomicU64::new(0),
        }
    }

    /// Increment conversion received.
    pub fn conversion_received(&self) {
        self.conversions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record conversion success.
    pub fn conversion_success(&self, from_cache: bool) {
        self.conversions_success.fetch_add(1, Ordering::Relaxed);
        if from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rejected conversion.
    pub fn conversion_rejected(&self, kind: RejectionKind) {
        let counter = match kind {
            RejectionKind::InvalidCredentials => &self.rejected_credentials,
            RejectionKind::RateLimitExceeded => &self.rejected_rate_limit,
            RejectionKind::InvalidCurrencyPair => &self.rejected_currency_pair,
            RejectionKind::UpstreamUnavailable | RejectionKind::UpstreamMalformed => {
                &self.rejected_upstream
            }
            RejectionKind::Storage => &self.rejected_storage,
            RejectionKind::InvalidRequest | RejectionKind::Conflict => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a registration.
    pub fn user_registered(&self) {
        self.users_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversions_total: self.conversions_total.load(Ordering::Relaxed),
            conversions_success: self.conversions_success.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            rejected_credentials: self.rejected_credentials.load(Ordering::Relaxed),
            rejected_rate_limit: self.rejected_rate_limit.load(Ordering::Relaxed),
            rejected_currency_pair: self.rejected_currency_pair.load(Ordering::Relaxed),
            rejected_upstream: self.rejected_upstream.load(Ordering::Relaxed),
            rejected_storage: self.rejected_storage.load(Ordering::Relaxed),
            users_registered: self.users_registered.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self, fx: &FxEngineStats) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP fxgate_conversions_total Total conversion requests
# TYPE fxgate_conversions_total counter
fxgate_conversions_total {}

# HELP fxgate_conversions_success Successful conversions
# TYPE fxgate_conversions_success counter
fxgate_conversions_success {}

# HELP fxgate_conversions_cached Successful conversions served from cache
# TYPE fxgate_conversions_cached counter
fxgate_conversions_cached {}

# HELP fxgate_conversions_fetched Successful conversions that fetched upstream
# TYPE fxgate_conversions_fetched counter
fxgate_conversions_fetched {}

# HELP fxgate_rejections_total Rejected conversions by reason
# TYPE fxgate_rejections_total counter
fxgate_rejections_total{{reason="invalid_credentials"}} {}
fxgate_rejections_total{{reason="rate_limit_exceeded"}} {}
fxgate_rejections_total{{reason="invalid_currency_pair"}} {}
fxgate_rejections_total{{reason="upstream"}} {}
fxgate_rejections_total{{reason="storage"}} {}

# HELP fxgate_users_registered Users registered
# TYPE fxgate_users_registered counter
fxgate_users_registered {}

# HELP fxgate_upstream_fetches Upstream fetch attempts
# TYPE fxgate_upstream_fetches counter
fxgate_upstream_fetches {}

# HELP fxgate_upstream_failures Upstream fetches that failed
# TYPE fxgate_upstream_failures counter
fxgate_upstream_failures {}

# HELP fxgate_cache_entries Rate cache entries
# TYPE fxgate_cache_entries gauge
fxgate_cache_entries{{state="fresh"}} {}
fxgate_cache_entries{{state="stale"}} {}
"#,
            snapshot.conversions_total,
            snapshot.conversions_success,
            snapshot.cache_hits,
            snapshot.cache_misses,
            snapshot.rejected_credentials,
            snapshot.rejected_rate_limit,
            snapshot.rejected_currency_pair,
            snapshot.rejected_upstream,
            snapshot.rejected_storage,
            snapshot.users_registered,
            fx.upstream_fetches,
            fx.upstream_failures,
            fx.cache.fresh_entries,
            fx.cache.stale_entries,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub conversions_total: u64,
    pub conversions_success: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rejected_credentials: u64,
    pub rejected_rate_limit: u64,
    pub rejected_currency_pair: u64,
    pub rejected_upstream: u64,
    pub rejected_storage: u64,
    pub users_registered: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
