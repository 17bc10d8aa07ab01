//! Rate provider trait and the rate table it returns.

use std::collections::HashMap;

use async_trait::async_trait;
use fxgate_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;

use crate::error::{FxError, FxResult};

/// Trait for upstream FX rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch every rate quoted against `base` in a single call.
    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateTable>;
}

/// All rates quoted against one base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    /// Base currency.
    pub base: Currency,
    /// Quote currency to rate.
    pub rates: HashMap<Currency, Decimal>,
    /// Quote currencies present upstream whose value could not be parsed.
    pub unparsable: Vec<Currency>,
}

impl RateTable {
    /// Create an empty table for `base`.
    pub fn new(base: Currency) -> Self {
        Self {
            base,
            rates: HashMap::new(),
            unparsable: Vec::new(),
        }
    }

    /// Builder-style insert.
    pub fn with_rate(mut self, quote: impl Into<Currency>, rate: Decimal) -> Self {
        self.rates.insert(quote.into(), rate);
        self
    }

    /// Resolve the rate for `quote`.
    ///
    /// A quote missing from the table is an unsupported pair; a quote the
    /// upstream listed with an unreadable value is a malformed response.
    pub fn resolve(&self, quote: &Currency) -> FxResult<Decimal> {
        if let Some(rate) = self.rates.get(quote) {
            return Ok(*rate);
        }

        if self.unparsable.contains(quote) {
            return Err(FxError::MalformedResponse(format!(
                "unparsable rate for {}",
                CurrencyPair::new(self.base.clone(), quote.clone())
            )));
        }

        Err(FxError::RateNotAvailable(CurrencyPair::new(
            self.base.clone(),
            quote.clone(),
        )))
    }

    /// Number of usable rates.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table has no usable rates.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Failure a [`MockRateProvider`] should simulate.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Malformed,
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    tables: dashmap::DashMap<Currency, RateTable>,
    failure: parking_lot::Mutex<Option<MockFailure>>,
    fetches: std::sync::atomic::AtomicUsize,
    delay: Option<std::time::Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            fetches: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a rate for a currency pair.
    pub fn set_rate(&self, base: &str, quote: &str, rate: Decimal) {
        self.tables
            .entry(Currency::new(base))
            .or_insert_with(|| RateTable::new(Currency::new(base)))
            .rates
            .insert(Currency::new(quote), rate);
    }

    /// Make every following fetch fail as if the upstream were down.
    pub fn fail_unavailable(&self) {
        *self.failure.lock() = Some(MockFailure::Unavailable);
    }

    /// Make every following fetch fail with an undecodable body.
    pub fn fail_malformed(&self) {
        *self.failure.lock() = Some(MockFailure::Malformed);
    }

    /// Stop failing.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Number of fetches served or attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateTable> {
        self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = *self.failure.lock();
        match failure {
            Some(MockFailure::Unavailable) => {
                return Err(FxError::ProviderUnavailable("connection refused".to_string()));
            }
            Some(MockFailure::Malformed) => {
                return Err(FxError::MalformedResponse("missing field `data`".to_string()));
            }
            None => {}
        }

        self.tables
            .get(base)
            .map(|t| t.clone())
            .ok_or_else(|| FxError::UnknownCurrency(base.clone()))
    }
}
