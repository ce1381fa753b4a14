//! Configuration file support

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tally_ai::CostInfo;
use tally_chat::{PricingTable, SessionConfig};

/// Configuration for tally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use
    pub model: Option<String>,
    /// Currency costs are shown in (ISO code)
    pub display_currency: Option<String>,
    /// Language thread titles are written in
    pub title_language: Option<String>,
    /// Model used for title synthesis
    pub title_model: Option<String>,
    /// Prior turns sent with each request
    pub context_turns: Option<usize>,
    /// Whether to use TUI mode by default
    pub tui: Option<bool>,
    /// Where conversation history is stored
    pub data_dir: Option<PathBuf>,
    pub stream_timeout_secs: Option<u64>,
    pub conversion_timeout_secs: Option<u64>,
    pub title_timeout_secs: Option<u64>,
    /// Completion API root
    pub base_url: Option<String>,
    /// Exchange rate API root
    pub exchange_rate_url: Option<String>,
    /// Units per USD; when set, no exchange rate service is called
    pub fixed_rates: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub api_keys: ApiKeys,
    /// Per-model rate overrides (USD per million tokens)
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverride>,
}

/// API key configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingOverride {
    pub input: f64,
    pub output: f64,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TALLY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing or broken file gives defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = SessionConfig::default();
        let default_config = Config {
            model: Some(tally_ai::models::DEFAULT_MODEL.to_string()),
            display_currency: Some(defaults.display_currency),
            title_language: Some(defaults.title_language),
            tui: Some(true),
            ..Default::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from config, falling back to `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        let from_config = self.api_keys.openai.as_deref();
        tally_ai::providers::get_api_key(from_config, "OPENAI_API_KEY").ok()
    }

    /// Built-in rates with this file's overrides applied
    pub fn pricing_table(&self) -> PricingTable {
        self.pricing
            .iter()
            .fold(PricingTable::from_registry(), |table, (model, rates)| {
                table.with_model(
                    model.clone(),
                    CostInfo {
                        input: rates.input,
                        output: rates.output,
                    },
                )
            })
    }

    /// Session settings, with `currency` (from the command line) winning
    pub fn session_config(&self, currency: Option<&str>) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            context_turns: self.context_turns.unwrap_or(defaults.context_turns),
            display_currency: currency
                .map(str::to_string)
                .or_else(|| self.display_currency.clone())
                .unwrap_or(defaults.display_currency)
                .to_ascii_uppercase(),
            title_model: self.title_model.clone().unwrap_or(defaults.title_model),
            title_language: self
                .title_language
                .clone()
                .unwrap_or(defaults.title_language),
            stream_timeout: self
                .stream_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stream_timeout),
            conversion_timeout: self
                .conversion_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.conversion_timeout),
            title_timeout: self
                .title_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.title_timeout),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tally configuration file
# Place at ~/.config/tally/config.toml (Linux) or set TALLY_CONFIG_PATH

# Default model
model = "gpt-4o-mini"

# Currency costs are shown in
display_currency = "JPY"

# Thread titles are written in this language, by this model
title_language = "Japanese"
title_model = "gpt-4o-mini"

# Prior turns sent with each request
context_turns = 9

# Full-screen UI (false for a plain prompt)
tui = true

# Where history is kept (default: ~/.local/share/tally)
# data_dir = "/home/me/.local/share/tally"

# Seconds without a chunk before a stream is abandoned
stream_timeout_secs = 60
conversion_timeout_secs = 10
title_timeout_secs = 20

# base_url = "https://api.openai.com/v1"
# exchange_rate_url = "https://open.er-api.com/v6"

# Fixed rates (units per USD) skip the exchange rate service
# [fixed_rates]
# JPY = 150.0

# API keys (optional - OPENAI_API_KEY works too)
[api_keys]
# openai = "sk-..."

# Rate overrides in USD per million tokens
# [pricing."gpt-4o"]
# input = 2.5
# output = 10.0
"#
}
