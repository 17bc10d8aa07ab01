//! Conversion request orchestration.
//!
//! A conversion runs authenticate, load history, rate-limit check, rate
//! resolution and audit append in that order. A rejection at any step ends
//! the request; only fully successful conversions are appended to the log.

use std::sync::Arc;

use fxgate_common::{ApiKey, ConversionRecord, Currency, CurrencyPair, NewUser, SharedClock, User};
use fxgate_fx::{ConversionResult, FxEngine, FxEngineConfig, RateCache, RateProvider};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::metrics::SharedMetrics;
use crate::rate_limiter::RateLimiter;
use crate::store::{GatewayStore, KeyValidator, RequestLog, UserRegistry};

/// Shared gateway handle.
pub type SharedGateway = Arc<Gateway>;

/// The currency conversion gateway.
pub struct Gateway {
    /// Users and request history.
    store: Arc<dyn GatewayStore>,
    /// Daily limit policy.
    limiter: RateLimiter,
    /// Cache-first rate resolution.
    fx: Arc<FxEngine>,
    clock: SharedClock,
    metrics: SharedMetrics,
}

impl Gateway {
    /// Assemble a gateway from its parts.
    pub fn new(
        store: Arc<dyn GatewayStore>,
        limiter: RateLimiter,
        fx: Arc<FxEngine>,
        clock: SharedClock,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            limiter,
            fx,
            clock,
            metrics,
        }
    }

    /// Build a gateway and its rate cache from configuration.
    pub fn from_config(
        config: &GatewayConfig,
        store: Arc<dyn GatewayStore>,
        provider: Arc<dyn RateProvider>,
        clock: SharedClock,
    ) -> std::result::Result<Self, String> {
        config.validate()?;

        let expiry = config
            .cache
            .expiry()
            .ok_or_else(|| "Cache expiry out of range".to_string())?;
        let cache = Arc::new(RateCache::new(expiry, clock.clone()));
        let fx = FxEngine::new(
            provider,
            cache,
            FxEngineConfig {
                coalesce_fetches: config.cache.coalesce_fetches,
            },
        );
        let limiter = RateLimiter::new(config.rate_limits.clone(), clock.clone());

        Ok(Self::new(
            store,
            limiter,
            Arc::new(fx),
            clock,
            SharedMetrics::default(),
        ))
    }

    /// Convert `amount` from one currency to another on behalf of `api_key`.
    #[instrument(skip(self, amount, api_key), fields(api_key = %api_key))]
    pub async fn convert(
        &self,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
        api_key: &ApiKey,
    ) -> Result<ConversionResult> {
        self.metrics.conversion_received();
        let pair = CurrencyPair::new(from_currency, to_currency);

        let outcome = self.process(&pair, amount, api_key).await;

        match &outcome {
            Ok(result) => {
                self.metrics.conversion_success(result.from_cache);
                info!(
                    pair = %pair,
                    amount = %amount,
                    converted_amount = %result.converted_amount,
                    from_cache = result.from_cache,
                    "Conversion completed"
                );
            }
            Err(e) => {
                self.metrics.conversion_rejected(e.kind());
                warn!(pair = %pair, code = e.error_code(), error = %e, "Conversion rejected");
            }
        }

        outcome
    }

    async fn process(
        &self,
        pair: &CurrencyPair,
        amount: Decimal,
        api_key: &ApiKey,
    ) -> Result<ConversionResult> {
        let key = self.authenticate(api_key).await?;

        let history = self.store.requests_for_key(&key).await?;
        let decision = self.limiter.check(&history);
        if decision.exceeded {
            return Err(GatewayError::RateLimitExceeded {
                count: decision.count,
                limit: decision.limit,
            });
        }

        let result = self
            .fx
            .convert(pair, amount)
            .await
            .map_err(|e| GatewayError::from_fx(e, pair))?;

        // A failed append fails the request but leaves the cached rate in place.
        let record = ConversionRecord::new(
            key,
            pair.base.clone(),
            pair.quote.clone(),
            amount,
            result.converted_amount,
            result.to_json(),
            self.clock.now(),
        );
        self.store.append(record).await?;

        Ok(result)
    }

    async fn authenticate(&self, api_key: &ApiKey) -> Result<ApiKey> {
        if api_key.is_blank() {
            return Err(GatewayError::InvalidCredentials);
        }

        self.store
            .validate(api_key)
            .await?
            .ok_or(GatewayError::InvalidCredentials)
    }

    /// Register a new user.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn register_user(&self, user: NewUser) -> Result<User> {
        if user.username.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("Username is required".to_string()));
        }
        if user.api_key.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("API key is required".to_string()));
        }
        if !user.has_valid_email() {
            return Err(GatewayError::InvalidRequest("Invalid email address".to_string()));
        }

        let created = self.store.register(user, self.clock.now()).await?;
        self.metrics.user_registered();
        info!(user_id = %created.id, "User registered");
        Ok(created)
    }

    /// FX engine handle.
    pub fn fx(&self) -> &Arc<FxEngine> {
        &self.fx
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Metrics in Prometheus text format.
    pub fn prometheus(&self) -> String {
        self.metrics.to_prometheus(&self.fx.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RateLimitConfig};
    use crate::memory_store::InMemoryStore;
    use crate::store::{StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use fxgate_common::{ManualClock, Timestamp};
    use fxgate_fx::MockRateProvider;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    const KEY: &str = "valid-key";

    // Tuesday.
    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()
    }

    struct Harness {
        gateway: Gateway,
        store: Arc<InMemoryStore>,
        provider: Arc<MockRateProvider>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(limits: RateLimitConfig) -> Harness {
        let store = Arc::new(InMemoryStore::with_api_key(KEY));
        let provider = Arc::new(MockRateProvider::new("mock"));
        provider.set_rate("USD", "JPY", dec!(150));
        provider.set_rate("USD", "EUR", dec!(0.92));
        let clock = Arc::new(ManualClock::new(start()));

        let config = GatewayConfig {
            rate_limits: limits,
            cache: CacheConfig {
                expiry_seconds: 60,
                coalesce_fetches: true,
            },
            ..GatewayConfig::default()
        };
        let gateway =
            Gateway::from_config(&config, store.clone(), provider.clone(), clock.clone()).unwrap();

        Harness {
            gateway,
            store,
            provider,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(RateLimitConfig::default())
    }

    fn key() -> ApiKey {
        ApiKey::new(KEY)
    }

    impl Harness {
        async fn usd_jpy(&self, amount: Decimal) -> Result<ConversionResult> {
            self.gateway
                .convert(Currency::usd(), Currency::jpy(), amount, &key())
                .await
        }

        fn cached_usd_jpy(&self) -> Option<Decimal> {
            self.gateway
                .fx()
                .cache()
                .lookup(&CurrencyPair::new(Currency::usd(), Currency::jpy()))
        }
    }

    #[tokio::test]
    async fn test_first_conversion_fetches_and_records() {
        let h = harness();

        let result = assert_ok!(h.usd_jpy(dec!(10)).await);

        assert_eq!(result.converted_amount, dec!(1500));
        assert_eq!(result.rate, dec!(150));
        assert!(!result.from_cache);
        assert_eq!(h.cached_usd_jpy(), Some(dec!(150)));

        let records = h.store.records_for(&key());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].from_currency, Currency::usd());
        assert_eq!(records[0].to_currency, Currency::jpy());
        assert_eq!(records[0].amount, dec!(10));
        assert_eq!(records[0].converted_amount, dec!(1500));
        assert_eq!(records[0].timestamp, start());
        assert!(records[0].response_body.contains("\"from_cache\":false"));
    }

    #[tokio::test]
    async fn test_repeat_within_expiry_uses_cache() {
        let h = harness();

        assert_ok!(h.usd_jpy(dec!(10)).await);
        h.clock.advance(Duration::seconds(30));
        let second = assert_ok!(h.usd_jpy(dec!(2)).await);

        assert!(second.from_cache);
        assert_eq!(second.converted_amount, dec!(300));
        assert_eq!(h.provider.fetch_count(), 1);
        assert_eq!(h.store.records_for(&key()).len(), 2);
    }

    #[tokio::test]
    async fn test_expired_rate_is_refetched() {
        let h = harness();

        assert_ok!(h.usd_jpy(dec!(1)).await);
        h.clock.advance(Duration::seconds(60));
        h.provider.set_rate("USD", "JPY", dec!(151));

        let result = assert_ok!(h.usd_jpy(dec!(1)).await);
        assert!(!result.from_cache);
        assert_eq!(result.rate, dec!(151));
        assert_eq!(h.provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_credentials_leave_no_trace() {
        let h = harness();

        for bad in ["", "   ", "unknown-key"] {
            let err = assert_err!(
                h.gateway
                    .convert(Currency::usd(), Currency::jpy(), dec!(10), &ApiKey::new(bad))
                    .await
            );
            assert!(matches!(err, GatewayError::InvalidCredentials));
        }

        assert_eq!(h.store.record_count(), 0);
        assert_eq!(h.provider.fetch_count(), 0);
        assert!(h.cached_usd_jpy().is_none());
        assert_eq!(h.gateway.metrics().snapshot().rejected_credentials, 3);
    }

    #[tokio::test]
    async fn test_unknown_target_is_invalid_pair() {
        let h = harness();
        let pair = CurrencyPair::new(Currency::usd(), Currency::new("XYZ"));

        let err = assert_err!(
            h.gateway
                .convert(Currency::usd(), Currency::new("XYZ"), dec!(10), &key())
                .await
        );

        assert!(matches!(err, GatewayError::InvalidCurrencyPair(ref p) if *p == pair));
        assert!(h.gateway.fx().cache().lookup(&pair).is_none());
        assert_eq!(h.store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_base_is_invalid_pair() {
        let h = harness();

        let err = assert_err!(
            h.gateway
                .convert(Currency::new("XYZ"), Currency::usd(), dec!(10), &key())
                .await
        );

        assert!(matches!(err, GatewayError::InvalidCurrencyPair(_)));
        assert_eq!(h.store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failures_are_not_recorded() {
        let h = harness();

        h.provider.fail_unavailable();
        let err = assert_err!(h.usd_jpy(dec!(10)).await);
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));

        h.provider.fail_malformed();
        let err = assert_err!(h.usd_jpy(dec!(10)).await);
        assert!(matches!(err, GatewayError::UpstreamMalformed(_)));

        assert_eq!(h.store.record_count(), 0);
        assert!(h.cached_usd_jpy().is_none());

        h.provider.recover();
        assert_ok!(h.usd_jpy(dec!(10)).await);
        assert_eq!(h.store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_amount_is_rejected_without_record() {
        let h = harness();

        let err = assert_err!(h.usd_jpy(Decimal::MAX).await);

        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.store.record_count(), 0);

        // The rate itself was valid, so later conversions still work.
        let result = assert_ok!(h.usd_jpy(dec!(2)).await);
        assert_eq!(result.converted_amount, dec!(300));
        assert_eq!(h.store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_applied_after_limit_records() {
        let h = harness_with(RateLimitConfig {
            weekday_limit: 2,
            weekend_limit: 1,
        });

        // History of 0, 1 and 2 records is within a limit of 2.
        for _ in 0..3 {
            assert_ok!(h.usd_jpy(dec!(1)).await);
        }

        let err = assert_err!(h.usd_jpy(dec!(1)).await);
        assert!(matches!(
            err,
            GatewayError::RateLimitExceeded { count: 3, limit: 2 }
        ));
        assert_eq!(h.store.records_for(&key()).len(), 3);
        assert_eq!(h.provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_resets_at_midnight() {
        let h = harness_with(RateLimitConfig {
            weekday_limit: 0,
            weekend_limit: 0,
        });

        assert_ok!(h.usd_jpy(dec!(1)).await);
        assert_err!(h.usd_jpy(dec!(1)).await);

        // Wednesday 00:00 UTC.
        h.clock.set(Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());
        assert_ok!(h.usd_jpy(dec!(1)).await);
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_pair() {
        let h = harness_with(RateLimitConfig {
            weekday_limit: 0,
            weekend_limit: 0,
        });

        assert_ok!(h.usd_jpy(dec!(1)).await);
        let err = assert_err!(
            h.gateway
                .convert(Currency::usd(), Currency::new("XYZ"), dec!(1), &key())
                .await
        );
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let h = Arc::new(harness());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { h.usd_jpy(dec!(1)).await })
            })
            .collect();

        for task in tasks {
            assert_ok!(task.await.unwrap());
        }

        assert_eq!(h.provider.fetch_count(), 1);
        assert_eq!(h.store.records_for(&key()).len(), 8);
    }

    /// Store whose append always fails.
    struct BrokenLog(InMemoryStore);

    #[async_trait]
    impl KeyValidator for BrokenLog {
        async fn validate(&self, key: &ApiKey) -> StoreResult<Option<ApiKey>> {
            self.0.validate(key).await
        }
    }

    #[async_trait]
    impl RequestLog for BrokenLog {
        async fn requests_for_key(&self, key: &ApiKey) -> StoreResult<Vec<ConversionRecord>> {
            self.0.requests_for_key(key).await
        }

        async fn append(&self, _record: ConversionRecord) -> StoreResult<()> {
            Err(StoreError::Database("disk full".to_string()))
        }
    }

    #[async_trait]
    impl UserRegistry for BrokenLog {
        async fn register(&self, user: NewUser, created_at: Timestamp) -> StoreResult<User> {
            self.0.register(user, created_at).await
        }
    }

    #[tokio::test]
    async fn test_audit_failure_keeps_cached_rate() {
        let provider = Arc::new(MockRateProvider::new("mock"));
        provider.set_rate("USD", "JPY", dec!(150));
        let clock = Arc::new(ManualClock::new(start()));
        let gateway = Gateway::from_config(
            &GatewayConfig::default(),
            Arc::new(BrokenLog(InMemoryStore::with_api_key(KEY))),
            provider.clone(),
            clock,
        )
        .unwrap();

        let err = assert_err!(
            gateway
                .convert(Currency::usd(), Currency::jpy(), dec!(10), &key())
                .await
        );

        assert!(matches!(err, GatewayError::Storage(_)));
        assert_eq!(
            gateway
                .fx()
                .cache()
                .lookup(&CurrencyPair::new(Currency::usd(), Currency::jpy())),
            Some(dec!(150))
        );
        assert_eq!(gateway.metrics().snapshot().rejected_storage, 1);
    }

    #[tokio::test]
    async fn test_register_user() {
        let h = harness();

        let user = assert_ok!(
            h.gateway
                .register_user(NewUser {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    api_key: "alice-key".to_string(),
                })
                .await
        );
        assert_eq!(user.created_at, start());

        let result = assert_ok!(
            h.gateway
                .convert(Currency::usd(), Currency::eur(), dec!(100), &ApiKey::new("alice-key"))
                .await
        );
        assert_eq!(result.converted_amount, dec!(92));
    }

    #[tokio::test]
    async fn test_register_user_validation() {
        let h = harness();

        let bad = [
            ("", "a@example.com", "k"),
            ("bob", "not-an-email", "k"),
            ("bob", "b@example.com", "  "),
        ];
        for (username, email, api_key) in bad {
            let err = assert_err!(
                h.gateway
                    .register_user(NewUser {
                        username: username.to_string(),
                        email: email.to_string(),
                        api_key: api_key.to_string(),
                    })
                    .await
            );
            assert!(matches!(err, GatewayError::InvalidRequest(_)));
        }

        let err = assert_err!(
            h.gateway
                .register_user(NewUser {
                    username: "carol".to_string(),
                    email: "carol@example.com".to_string(),
                    api_key: KEY.to_string(),
                })
                .await
        );
        assert!(matches!(err, GatewayError::Conflict(ref m) if m == "API key already in use"));
    }
}
