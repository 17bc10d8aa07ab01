//! fxgate FX layer
//!
//! Exchange-rate resolution for the conversion gateway.
//!
//! # Features
//!
//! - Upstream rate provider abstraction with a Coinbase implementation
//! - Lazily expiring in-memory rate cache
//! - Optional coalescing of concurrent upstream fetches for the same pair
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fxgate_common::{Currency, CurrencyPair, SystemClock};
//! use fxgate_fx::{CoinbaseRateProvider, FxEngine, FxEngineConfig, RateCache};
//!
//! let clock = SystemClock::shared();
//! let cache = Arc::new(RateCache::new(chrono::Duration::seconds(60), clock));
//! let engine = FxEngine::new(Arc::new(CoinbaseRateProvider::new()), cache, FxEngineConfig::default());
//!
//! let quote = engine.get_rate(&CurrencyPair::new(Currency::usd(), Currency::eur())).await?;
//! ```

pub mod cache;
pub mod coinbase;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod provider;

pub use cache::{CachedRate, RateCache, SharedRateCache};
pub use coinbase::CoinbaseRateProvider;
pub use conversion::ConversionResult;
pub use engine::{FxEngine, FxEngineConfig, RateQuote};
pub use error::{FxError, FxResult};
pub use provider::{RateProvider, RateTable};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockFailure, MockRateProvider};
