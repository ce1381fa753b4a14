//! Cost accounting

use std::{collections::HashMap, sync::Arc, time::Duration};

use tally_ai::{CostInfo, CurrencyConverter, models};

use crate::error::{Error, Result};

/// Currency the provider quotes prices in
pub const NATIVE_CURRENCY: &str = "USD";

/// Model id to per-million-token USD rates
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    rates: HashMap<String, CostInfo>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every model in the built-in registry
    pub fn from_registry() -> Self {
        models::get_all_models()
            .into_iter()
            .fold(Self::new(), |table, m| table.with_model(m.id, m.cost))
    }

    /// Add or replace a model's rates
    pub fn with_model(mut self, model_id: impl Into<String>, cost: CostInfo) -> Self {
        self.rates.insert(model_id.into(), cost);
        self
    }

    pub fn get(&self, model_id: &str) -> Option<&CostInfo> {
        self.rates.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.rates.contains_key(model_id)
    }

    /// Priced model ids, sorted
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.rates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Prices a response from its token counts
pub struct CostCalculator {
    pricing: PricingTable,
    converter: Arc<dyn CurrencyConverter>,
    display_currency: String,
    timeout: Duration,
}

impl CostCalculator {
    pub fn new(
        pricing: PricingTable,
        converter: Arc<dyn CurrencyConverter>,
        display_currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            pricing,
            converter,
            display_currency: display_currency.into(),
            timeout,
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn display_currency(&self) -> &str {
        &self.display_currency
    }

    /// Cost in USD, without conversion
    pub fn native_cost(
        &self,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<f64> {
        let rates = self
            .pricing
            .get(model_id)
            .ok_or_else(|| Error::UnknownModel(model_id.to_string()))?;
        Ok(rates.input_per_token() * f64::from(prompt_tokens)
            + rates.output_per_token() * f64::from(completion_tokens))
    }

    /// Cost in the display currency
    pub async fn compute_cost(
        &self,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<f64> {
        let native = self.native_cost(model_id, prompt_tokens, completion_tokens)?;
        if native == 0.0 {
            return Ok(0.0);
        }

        let conversion =
            self.converter
                .convert(native, NATIVE_CURRENCY, &self.display_currency);
        let converted = tokio::time::timeout(self.timeout, conversion)
            .await
            .map_err(|_| {
                Error::Conversion(tally_ai::Error::Timeout(format!(
                    "currency conversion took longer than {}s",
                    self.timeout.as_secs_f32()
                )))
            })?
            .map_err(Error::Conversion)?;

        tracing::debug!(
            model = model_id,
            prompt_tokens,
            completion_tokens,
            native,
            converted,
            currency = %self.display_currency,
            "priced response"
        );
        Ok(converted)
    }
}

/// Symbol and decimal places used when displaying an amount
fn display_rule(currency: &str) -> (Option<&'static str>, usize) {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" => (Some("¥"), 2),
        "USD" => (Some("$"), 4),
        "EUR" => (Some("€"), 4),
        "GBP" => (Some("£"), 4),
        _ => (None, 4),
    }
}

/// Format an amount for display, e.g. `¥0.12` or `0.0034 CHF`
pub fn format_amount(amount: f64, currency: &str) -> String {
    let (symbol, places) = display_rule(currency);
    match symbol {
        Some(symbol) => format!("{symbol}{amount:.places$}"),
        None => format!("{amount:.places$} {}", currency.to_ascii_uppercase()),
    }
}

/// Cost line shown under an assistant reply
pub fn format_cost(amount: f64, currency: &str) -> String {
    format!("[API cost: {}]", format_amount(amount, currency))
}
