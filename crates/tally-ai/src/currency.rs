//! Currency conversion
//!
//! Model prices are quoted in USD. Costs are shown in a display currency,
//! so every cost passes through a [`CurrencyConverter`] before it is stored.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default exchange-rate service root
pub const DEFAULT_EXCHANGE_RATE_URL: &str = "https://open.er-api.com/v6";

/// Converts an amount between two ISO 4217 currency codes
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64>;
}

/// Converter backed by an exchange-rate HTTP service
pub struct ExchangeRateConverter {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeRateConverter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_EXCHANGE_RATE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch the rate for one unit of `from` expressed in `to`
    pub async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let url = format!("{}/latest/{}", self.base_url, from.to_uppercase());
        tracing::debug!(%url, "fetching exchange rate");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), text));
        }

        let body: RatesResponse = response.json().await?;
        extract_rate(body, to)
    }
}

impl Default for ExchangeRateConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CurrencyConverter for ExchangeRateConverter {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }
        let rate = self.rate(from, to).await?;
        Ok(amount * rate)
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

fn extract_rate(body: RatesResponse, to: &str) -> Result<f64> {
    if body.result != "success" {
        return Err(Error::Currency(
            body.error_type.unwrap_or_else(|| body.result.clone()),
        ));
    }
    body.rates
        .get(&to.to_uppercase())
        .copied()
        .ok_or_else(|| Error::Currency(format!("no rate for {}", to)))
}

/// Converter with a fixed table of rates relative to a base currency
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    /// Code -> units per one USD
    rates: HashMap<String, f64>,
}

impl FixedRateConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register how many units of `code` one USD buys
    pub fn with_rate(mut self, code: &str, per_usd: f64) -> Self {
        self.rates.insert(code.to_uppercase(), per_usd);
        self
    }

    pub fn from_rates(rates: &HashMap<String, f64>) -> Self {
        rates
            .iter()
            .fold(Self::new(), |conv, (code, rate)| conv.with_rate(code, *rate))
    }

    fn per_usd(&self, code: &str) -> Result<f64> {
        let code = code.to_uppercase();
        if code == "USD" {
            return Ok(1.0);
        }
        match self.rates.get(&code) {
            Some(rate) if *rate > 0.0 => Ok(*rate),
            Some(_) => Err(Error::Currency(format!("non-positive rate for {}", code))),
            None => Err(Error::Currency(format!("no rate for {}", code))),
        }
    }
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }
        Ok(amount / self.per_usd(from)? * self.per_usd(to)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RatesResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extract_rate() {
        let body = parse(r#"{"result":"success","base_code":"USD","rates":{"USD":1,"JPY":151.5}}"#);
        assert_eq!(extract_rate(body, "jpy").unwrap(), 151.5);
    }

    #[test]
    fn test_extract_rate_missing_code() {
        let body = parse(r#"{"result":"success","rates":{"USD":1}}"#);
        assert!(matches!(extract_rate(body, "XYZ"), Err(Error::Currency(_))));
    }

    #[test]
    fn test_extract_rate_service_error() {
        let body = parse(r#"{"result":"error","error-type":"unsupported-code"}"#);
        let err = extract_rate(body, "JPY").unwrap_err();
        assert_eq!(err.to_string(), "Currency error: unsupported-code");
    }

    #[tokio::test]
    async fn test_fixed_rate_conversion() {
        let conv = FixedRateConverter::new().with_rate("JPY", 150.0).with_rate("EUR", 0.9);
        assert_eq!(conv.convert(2.0, "USD", "JPY").await.unwrap(), 300.0);
        assert!((conv.convert(0.9, "EUR", "USD").await.unwrap() - 1.0).abs() < 1e-12);
        assert!((conv.convert(0.9, "EUR", "JPY").await.unwrap() - 150.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fixed_rate_identity() {
        let conv = FixedRateConverter::new();
        assert_eq!(conv.convert(1.25, "GBP", "gbp").await.unwrap(), 1.25);
    }

    #[tokio::test]
    async fn test_fixed_rate_unknown_currency() {
        let conv = FixedRateConverter::new();
        assert!(matches!(
            conv.convert(1.0, "USD", "JPY").await,
            Err(Error::Currency(_))
        ));
    }

    #[tokio::test]
    async fn test_network_converter_identity_skips_request() {
        // Unroutable base URL: any request would fail
        let conv = ExchangeRateConverter::new().with_base_url("http://127.0.0.1:9");
        assert_eq!(conv.convert(3.0, "USD", "USD").await.unwrap(), 3.0);
    }
}
