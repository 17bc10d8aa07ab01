//! FX error types.

use fxgate_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while resolving a rate.
#[derive(Debug, Error)]
pub enum FxError {
    /// The upstream quoted the base currency but not the requested target.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// The upstream does not recognise the base currency.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(Currency),

    /// The upstream could not be reached or failed server-side.
    #[error("Rate provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The upstream answered with something that is not a rate table.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// `amount * rate` does not fit in a decimal.
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(Decimal),
}

impl FxError {
    /// Whether the failure is about the requested pair rather than the provider.
    pub fn is_invalid_pair(&self) -> bool {
        matches!(
            self,
            FxError::RateNotAvailable(_) | FxError::UnknownCurrency(_)
        )
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
