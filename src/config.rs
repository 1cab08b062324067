// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://www.cbr-xml-daily.ru/daily_json.js";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const ENDPOINT_ENV: &str = "CBR_RATES_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
    pub currencies: Vec<CurrencyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 10,
            output_dir: PathBuf::from("output"),
            currencies: vec![
                CurrencyConfig {
                    code: "USD".to_string(),
                    name: "Доллар США".to_string(),
                },
                CurrencyConfig {
                    code: "EUR".to_string(),
                    name: "Евро".to_string(),
                },
                CurrencyConfig {
                    code: "CNY".to_string(),
                    name: "Китайский юань".to_string(),
                },
            ],
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Override settings from the environment. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|e| !e.trim().is_empty()) {
            tracing::debug!(%endpoint, "endpoint overridden from environment");
            self.endpoint = endpoint;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if self.currencies.is_empty() {
            anyhow::bail!("at least one currency must be configured");
        }

        let mut seen = HashSet::new();
        for currency in &self.currencies {
            let valid = currency.code.len() == 3
                && currency.code.chars().all(|c| c.is_ascii_uppercase());
            if !valid {
                anyhow::bail!(
                    "currency code {:?} must be three uppercase letters",
                    currency.code
                );
            }
            if !seen.insert(currency.code.as_str()) {
                anyhow::bail!("currency {} is configured twice", currency.code);
            }
        }

        Ok(())
    }
}

/// Load the configuration, falling back to defaults when the file does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    let config = config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let config_str = toml::to_string_pretty(config)?;
    fs::write(path, config_str).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
