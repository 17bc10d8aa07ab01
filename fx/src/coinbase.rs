//! Coinbase exchange-rates client.
//!
//! `GET {base_url}?currency=USD` answers with
//! `{"data": {"currency": "USD", "rates": {"EUR": "0.92", ...}}}`, every rate
//! encoded as a decimal string.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use fxgate_common::Currency;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::provider::{RateProvider, RateTable};

/// Public Coinbase exchange-rates endpoint.
pub const COINBASE_API_URL: &str = "https://api.coinbase.com/v2/exchange-rates";

#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    data: ExchangeRatesData,
}

#[derive(Debug, Deserialize)]
struct ExchangeRatesData {
    currency: String,
    rates: HashMap<String, serde_json::Value>,
}

/// Rate provider backed by the Coinbase public API.
#[derive(Debug, Clone)]
pub struct CoinbaseRateProvider {
    client: Client,
    base_url: String,
}

impl Default for CoinbaseRateProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinbaseRateProvider {
    /// Create a provider against the public endpoint.
    pub fn new() -> Self {
        Self::with_base_url(COINBASE_API_URL)
    }

    /// Create a provider against a different endpoint (proxies, test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Endpoint in use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turn a response body into a rate table for `base`.
pub(crate) fn parse_rate_table(base: &Currency, body: &str) -> FxResult<RateTable> {
    let response: ExchangeRatesResponse = serde_json::from_str(body)
        .map_err(|e| FxError::MalformedResponse(e.to_string()))?;

    if response.data.currency != base.code() {
        return Err(FxError::MalformedResponse(format!(
            "asked for {} but rates are quoted against {}",
            base, response.data.currency
        )));
    }

    let mut table = RateTable::new(base.clone());
    for (code, value) in response.data.rates {
        match parse_rate(&value) {
            Some(rate) => {
                table.rates.insert(Currency::new(code), rate);
            }
            None => {
                debug!(base = %base, quote = %code, value = %value, "Skipping unparsable rate");
                table.unparsable.push(Currency::new(code));
            }
        }
    }

    Ok(table)
}

fn parse_rate(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

/// Map a non-success status to an error. Coinbase answers 400 for a currency
/// it does not know; any other failure status is the provider's problem.
fn status_error(status: StatusCode, base: &Currency) -> Option<FxError> {
    if status.is_success() {
        return None;
    }

    if status == StatusCode::BAD_REQUEST {
        debug!(status = %status, "Upstream rejected the base currency");
        return Some(FxError::UnknownCurrency(base.clone()));
    }

    warn!(status = %status, "Upstream returned an error status");
    Some(FxError::ProviderUnavailable(format!(
        "upstream returned {}",
        status
    )))
}

#[async_trait]
impl RateProvider for CoinbaseRateProvider {
    fn name(&self) -> &str {
        "coinbase"
    }

    #[instrument(skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateTable> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("currency", base.code())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Upstream request failed");
                FxError::ProviderUnavailable(e.to_string())
            })?;

        if let Some(err) = status_error(resp.status(), base) {
            return Err(err);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FxError::ProviderUnavailable(e.to_string()))?;

        let table = parse_rate_table(base, &body)?;
        debug!(rates = table.len(), "Fetched upstream rates");
        Ok(table)
    }
}
