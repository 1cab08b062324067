// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::config::CurrencyConfig;
use crate::error::ParseError;

/// Daily rates document as published by the endpoint. Entries stay raw until
/// a tracked code is looked up, so a broken untracked currency is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct DailyRates {
    #[serde(rename = "Date", default, deserialize_with = "lenient_timestamp")]
    pub date: Option<DateTime<FixedOffset>>,
    #[serde(rename = "PreviousDate", default, deserialize_with = "lenient_timestamp")]
    pub previous_date: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Valute", default)]
    pub valute: HashMap<String, serde_json::Value>,
}

impl DailyRates {
    /// Typed entry for `code`: `None` if absent, `Err` if present but malformed
    pub fn entry(&self, code: &str) -> Option<Result<Valute, serde_json::Error>> {
        self.valute
            .get(code)
            .map(Valute::deserialize)
    }
}

/// Publication stamps are informational; anything that is not RFC 3339 reads as absent
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct Valute {
    #[serde(rename = "CharCode", default)]
    pub char_code: Option<String>,
    #[serde(rename = "Nominal", default)]
    pub nominal: Option<u32>,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Value", default)]
    pub value: Option<f64>,
    #[serde(rename = "Previous", default)]
    pub previous: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyRate {
    pub code: String,
    pub display_name: String,
    pub value: f64,
    pub previous: Option<f64>,
    pub nominal: u32,
    pub last_updated: Option<DateTime<Local>>,
}

impl CurrencyRate {
    fn new(config: &CurrencyConfig) -> Self {
        Self {
            code: config.code.clone(),
            display_name: config.name.clone(),
            value: 0.0,
            previous: None,
            nominal: 1,
            last_updated: None,
        }
    }

    /// Change against the previous publication, if the endpoint reported one
    pub fn change(&self) -> Option<f64> {
        self.previous.map(|previous| self.value - previous)
    }
}

/// Values read from one response, in table order, not yet applied
#[derive(Debug, Clone)]
pub struct StagedRates {
    quotes: Vec<Quote>,
    pub published: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
struct Quote {
    value: f64,
    previous: Option<f64>,
    nominal: u32,
}

impl StagedRates {
    pub fn len(&self) -> usize {
        self.quotes.len()
    }
}

/// Rates for a fixed set of currencies. Keys never change after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: Vec<CurrencyRate>,
}

impl RateTable {
    pub fn new(currencies: &[CurrencyConfig]) -> Self {
        Self {
            rates: currencies.iter().map(CurrencyRate::new).collect(),
        }
    }

    #[cfg(test)]
    pub fn get(&self, code: &str) -> Option<&CurrencyRate> {
        self.rates.iter().find(|rate| rate.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurrencyRate> {
        self.rates.iter()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.rates.iter().filter_map(|rate| rate.last_updated).max()
    }

    /// Look up every tracked currency in `document`. Fails on the first absent
    /// or unusable entry without touching the table.
    pub fn stage(&self, document: &DailyRates) -> Result<StagedRates, ParseError> {
        let mut quotes = Vec::with_capacity(self.rates.len());

        for rate in &self.rates {
            let entry = document
                .entry(&rate.code)
                .ok_or_else(|| ParseError::MissingCurrency(rate.code.clone()))?
                .map_err(|source| ParseError::InvalidEntry {
                    code: rate.code.clone(),
                    source,
                })?;
            let value = entry
                .value
                .ok_or_else(|| ParseError::MissingValue(rate.code.clone()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(ParseError::InvalidRate {
                    code: rate.code.clone(),
                    value,
                });
            }

            quotes.push(Quote {
                value,
                previous: entry.previous.filter(|p| p.is_finite() && *p >= 0.0),
                nominal: entry.nominal.filter(|n| *n > 0).unwrap_or(1),
            });
        }

        Ok(StagedRates {
            quotes,
            published: document.date,
        })
    }

    /// Apply staged values to every entry and stamp them. Stamps never move backwards.
    pub fn commit(&mut self, staged: StagedRates, now: DateTime<Local>) -> DateTime<Local> {
        debug_assert_eq!(staged.quotes.len(), self.rates.len());

        let mut stamped = now;
        for (rate, quote) in self.rates.iter_mut().zip(staged.quotes) {
            rate.value = quote.value;
            rate.previous = quote.previous;
            rate.nominal = quote.nominal;

            let stamp = match rate.last_updated {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            rate.last_updated = Some(stamp);
            stamped = stamped.max(stamp);
        }

        stamped
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use serde_json::json;

    pub(crate) const SAMPLE_RESPONSE: &str = r#"{
        "Date": "2024-06-01T11:30:00+03:00",
        "PreviousDate": "2024-05-31T11:30:00+03:00",
        "Timestamp": "2024-05-31T18:00:00+03:00",
        "Valute": {
            "AUD": {"ID": "R01010", "NumCode": "036", "CharCode": "AUD", "Nominal": 1, "Name": "Австралийский доллар", "Value": 59.9, "Previous": 60.1},
            "USD": {"ID": "R01235", "NumCode": "840", "CharCode": "USD", "Nominal": 1, "Name": "Доллар США", "Value": 90.5, "Previous": 89.9},
            "EUR": {"ID": "R01239", "NumCode": "978", "CharCode": "EUR", "Nominal": 1, "Name": "Евро", "Value": 98.25, "Previous": 98.5},
            "CNY": {"ID": "R01375", "NumCode": "156", "CharCode": "CNY", "Nominal": 1, "Name": "Китайский юань", "Value": 12.3, "Previous": 12.3}
        }
    }"#;

    fn table() -> RateTable {
        RateTable::new(&Config::default().currencies)
    }

    #[test]
    fn test_new_table_starts_at_zero() {
        let table = table();
        assert_eq!(table.len(), 3);
        for rate in table.iter() {
            assert_eq!(rate.value, 0.0);
            assert!(rate.last_updated.is_none());
        }
        assert_eq!(table.get("EUR").map(|r| r.display_name.as_str()), Some("Евро"));
        assert!(table.get("AUD").is_none());
    }

    #[test]
    fn test_stage_and_commit() -> anyhow::Result<()> {
        let document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE)?;
        let mut table = table();

        let staged = table.stage(&document)?;
        assert_eq!(staged.len(), 3);
        assert!(staged.published.is_some());

        let now = Local::now();
        table.commit(staged, now);

        assert_relative_eq!(table.get("USD").unwrap().value, 90.5);
        assert_relative_eq!(table.get("EUR").unwrap().value, 98.25);
        assert_relative_eq!(table.get("CNY").unwrap().value, 12.3);
        assert_relative_eq!(table.get("USD").unwrap().change().unwrap(), 0.6, epsilon = 1e-9);
        assert_eq!(table.len(), 3);
        assert_eq!(table.last_updated(), Some(now));
        Ok(())
    }

    #[test]
    fn test_stage_missing_currency_leaves_table_untouched() -> anyhow::Result<()> {
        let mut document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE)?;
        document.valute.remove("EUR");
        let table = table();

        let err = table.stage(&document).unwrap_err();
        assert!(matches!(err, ParseError::MissingCurrency(ref code) if code == "EUR"));
        assert_eq!(table, self::table());
        Ok(())
    }

    #[test]
    fn test_stage_rejects_negative_and_missing_values() -> anyhow::Result<()> {
        let mut document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE)?;
        document.valute.get_mut("CNY").unwrap()["Value"] = json!(-1.0);
        assert!(matches!(
            table().stage(&document),
            Err(ParseError::InvalidRate { ref code, .. }) if code == "CNY"
        ));

        document.valute.get_mut("CNY").unwrap().as_object_mut().unwrap().remove("Value");
        assert!(matches!(
            table().stage(&document),
            Err(ParseError::MissingValue(ref code)) if code == "CNY"
        ));
        Ok(())
    }

    #[test]
    fn test_malformed_untracked_entry_and_date_are_ignored() -> anyhow::Result<()> {
        let mut document: serde_json::Value = serde_json::from_str(SAMPLE_RESPONSE)?;
        document["Valute"]["AUD"]["Value"] = json!("n/a");
        document["Date"] = json!("2024-06-01");
        document["PreviousDate"] = json!(20240531);

        let document: DailyRates = serde_json::from_value(document)?;
        assert!(document.date.is_none());
        assert!(document.previous_date.is_none());

        let mut table = table();
        let staged = table.stage(&document)?;
        assert!(staged.published.is_none());
        table.commit(staged, Local::now());

        assert_relative_eq!(table.get("USD").unwrap().value, 90.5);
        assert_relative_eq!(table.get("EUR").unwrap().value, 98.25);
        assert_relative_eq!(table.get("CNY").unwrap().value, 12.3);
        Ok(())
    }

    #[test]
    fn test_malformed_tracked_entry_is_parse_error() -> anyhow::Result<()> {
        let mut document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE)?;
        document.valute.get_mut("EUR").unwrap()["Value"] = json!("n/a");

        let table = table();
        let err = table.stage(&document).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEntry { ref code, .. } if code == "EUR"));
        assert_eq!(table, self::table());
        Ok(())
    }

    #[test]
    fn test_document_without_valute_reports_first_currency() -> anyhow::Result<()> {
        let document: DailyRates = serde_json::from_str(r#"{"Date": "2024-06-01T11:30:00+03:00"}"#)?;
        let err = table().stage(&document).unwrap_err();
        assert!(matches!(err, ParseError::MissingCurrency(ref code) if code == "USD"));
        Ok(())
    }

    #[test]
    fn test_commit_stamps_never_go_backwards() -> anyhow::Result<()> {
        let document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE)?;
        let mut table = table();

        let later = Local::now();
        table.commit(table.stage(&document)?, later);

        let earlier = later - Duration::seconds(30);
        let stamped = table.commit(table.stage(&document)?, earlier);

        assert_eq!(stamped, later);
        for rate in table.iter() {
            assert_eq!(rate.last_updated, Some(later));
        }
        Ok(())
    }
}
