//! fxgate gateway
//!
//! Authenticates callers, enforces daily request limits, resolves exchange
//! rates through the shared cache and records every successful conversion.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod memory_store;
pub mod metrics;
pub mod pg_store;
pub mod rate_limiter;
pub mod store;

pub use config::{CacheConfig, GatewayConfig, RateLimitConfig};
pub use error::{GatewayError, RejectionKind, Result};
pub use gateway::{Gateway, SharedGateway};
pub use memory_store::InMemoryStore;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use pg_store::PgStore;
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use store::{GatewayStore, KeyValidator, RequestLog, StoreError, StoreResult, UserRegistry};
