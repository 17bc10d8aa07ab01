//! Conversion result type.

use fxgate_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::RateQuote;
use crate::error::{FxError, FxResult};

/// Outcome of a successful conversion, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub amount: Decimal,
    pub converted_amount: Decimal,
    pub rate: Decimal,
    /// Whether the rate came from the cache rather than a fresh upstream fetch.
    pub from_cache: bool,
}

impl ConversionResult {
    /// Apply a quote to an amount. No rounding is applied.
    pub fn from_quote(quote: RateQuote, amount: Decimal) -> FxResult<Self> {
        let converted_amount = amount
            .checked_mul(quote.rate)
            .ok_or(FxError::AmountOutOfRange(amount))?;

        Ok(Self {
            converted_amount,
            from_currency: quote.pair.base,
            to_currency: quote.pair.quote,
            amount,
            rate: quote.rate,
            from_cache: quote.from_cache,
        })
    }

    /// JSON body stored with the audit record.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "from_currency": self.from_currency,
            "to_currency": self.to_currency,
            "amount": self.amount,
            "converted_amount": self.converted_amount,
            "rate": self.rate,
            "from_cache": self.from_cache,
        })
        .to_string()
    }
}
