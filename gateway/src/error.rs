//! Gateway error types.

use fxgate_common::CurrencyPair;
use fxgate_fx::FxError;
use thiserror::Error;

use crate::store::StoreError;

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    InvalidCredentials,
    RateLimitExceeded,
    InvalidCurrencyPair,
    UpstreamUnavailable,
    UpstreamMalformed,
    Storage,
    InvalidRequest,
    Conflict,
}

/// Main error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, blank or unknown API key.
    #[error("Invalid API Key")]
    InvalidCredentials,

    /// Daily request limit reached.
    #[error("Rate limit exceeded: {count} requests today, limit {limit}")]
    RateLimitExceeded { count: usize, limit: u32 },

    /// Upstream does not quote this pair.
    #[error("Invalid currency pair: {0}")]
    InvalidCurrencyPair(CurrencyPair),

    /// Upstream could not be reached.
    #[error("Rate provider unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream answered with unusable data.
    #[error("Rate provider returned malformed data: {0}")]
    UpstreamMalformed(String),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Request body failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Registration collides with an existing user.
    #[error("{0}")]
    Conflict(String),
}

impl GatewayError {
    /// Map an FX failure for `pair` into the gateway taxonomy.
    pub fn from_fx(err: FxError, pair: &CurrencyPair) -> Self {
        match err {
            FxError::RateNotAvailable(_) | FxError::UnknownCurrency(_) => {
                GatewayError::InvalidCurrencyPair(pair.clone())
            }
            FxError::ProviderUnavailable(msg) => GatewayError::UpstreamUnavailable(msg),
            FxError::MalformedResponse(msg) => GatewayError::UpstreamMalformed(msg),
            FxError::AmountOutOfRange(_) => {
                GatewayError::InvalidRequest("Amount out of range".to_string())
            }
        }
    }

    /// Rejection category.
    pub fn kind(&self) -> RejectionKind {
        match self {
            GatewayError::InvalidCredentials => RejectionKind::InvalidCredentials,
            GatewayError::RateLimitExceeded { .. } => RejectionKind::RateLimitExceeded,
            GatewayError::InvalidCurrencyPair(_) => RejectionKind::InvalidCurrencyPair,
            GatewayError::UpstreamUnavailable(_) => RejectionKind::UpstreamUnavailable,
            GatewayError::UpstreamMalformed(_) => RejectionKind::UpstreamMalformed,
            GatewayError::Storage(_) => RejectionKind::Storage,
            GatewayError::InvalidRequest(_) => RejectionKind::InvalidRequest,
            GatewayError::Conflict(_) => RejectionKind::Conflict,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            RejectionKind::RateLimitExceeded
                | RejectionKind::UpstreamUnavailable
                | RejectionKind::UpstreamMalformed
                | RejectionKind::Storage
        )
    }

    /// Stable error code for response bodies.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            RejectionKind::InvalidCredentials => "INVALID_CREDENTIALS",
            RejectionKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            RejectionKind::InvalidCurrencyPair => "INVALID_CURRENCY_PAIR",
            RejectionKind::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            RejectionKind::UpstreamMalformed => "UPSTREAM_MALFORMED",
            RejectionKind::Storage => "STORAGE_ERROR",
            RejectionKind::InvalidRequest => "INVALID_REQUEST",
            RejectionKind::Conflict => "CONFLICT",
        }
    }

    /// HTTP status for this rejection.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            RejectionKind::InvalidCredentials => 403,
            RejectionKind::RateLimitExceeded => 429,
            RejectionKind::InvalidCurrencyPair => 400,
            RejectionKind::UpstreamUnavailable => 503,
            RejectionKind::UpstreamMalformed => 502,
            RejectionKind::Storage => 500,
            RejectionKind::InvalidRequest => 400,
            RejectionKind::Conflict => 400,
        }
    }

    /// Human-readable detail for response bodies.
    pub fn detail(&self) -> String {
        match self {
            GatewayError::RateLimitExceeded { .. } => "Rate limit exceeded".to_string(),
            GatewayError::InvalidCurrencyPair(_) => "Invalid currency pair".to_string(),
            // Internal details stay in the logs.
            GatewayError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => GatewayError::Conflict(msg),
            other => GatewayError::Storage(other.to_string()),
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
