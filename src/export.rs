// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::NaiveDate;
use csv::Writer;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::models::RateTable;

pub const HEADER: [&str; 3] = ["Валюта", "Курс (руб)", "Дата"];

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
}

/// `currency_rates_<YYYYMMDD>.csv`
pub fn default_file_name(date: NaiveDate) -> String {
    format!("currency_rates_{}.csv", date.format("%Y%m%d"))
}

/// Two decimals with a `.` separator regardless of locale
pub fn format_rate(value: f64) -> String {
    format!("{:.2}", value)
}

/// Write the table to `path` as UTF-8 CSV: the fixed header, then one row per currency
pub fn export_rates(table: &RateTable, path: &Path, date: NaiveDate) -> Result<ExportSummary, ExportError> {
    let io_err = |source: std::io::Error| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source: csv::Error| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = File::create(path).map_err(io_err)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(HEADER).map_err(csv_err)?;

    let date = date.format("%Y-%m-%d").to_string();
    let mut rows = 0;
    for rate in table.iter() {
        writer
            .write_record([
                rate.display_name.as_str(),
                format_rate(rate.value).as_str(),
                date.as_str(),
            ])
            .map_err(csv_err)?;
        rows += 1;
    }

    writer.flush().map_err(io_err)?;
    tracing::info!(path = %path.display(), rows, "rates exported");

    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows,
    })
}

/// Ask `select` for a target (it gets the suggested file name) and export there.
/// `None` from the selector means the user backed out: nothing is written.
pub fn export_with<F>(table: &RateTable, date: NaiveDate, select: F) -> Result<Option<ExportSummary>, ExportError>
where
    F: FnOnce(&str) -> Option<PathBuf>,
{
    match select(&default_file_name(date)) {
        Some(path) => export_rates(table, &path, date).map(Some),
        None => {
            tracing::debug!("export cancelled");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::DailyRates;
    use crate::models::tests::SAMPLE_RESPONSE;
    use approx::assert_relative_eq;
    use chrono::Local;
    use csv::Reader;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize)]
    struct ExportedRow {
        #[serde(rename = "Валюта")]
        name: String,
        #[serde(rename = "Курс (руб)")]
        rate: f64,
        #[serde(rename = "Дата")]
        date: String,
    }

    fn sample_table() -> RateTable {
        let document: DailyRates = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let mut table = RateTable::new(&Config::default().currencies);
        let staged = table.stage(&document).unwrap();
        table.commit(staged, Local::now());
        table
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_export_writes_header_and_rows() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rates.csv");

        let summary = export_rates(&sample_table(), &path, date())?;
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.path, path);

        let content = String::from_utf8(fs::read(&path)?)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            [
                "Валюта,Курс (руб),Дата",
                "Доллар США,90.50,2024-06-01",
                "Евро,98.25,2024-06-01",
                "Китайский юань,12.30,2024-06-01",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_exported_values_read_back() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rates.csv");
        let table = sample_table();
        export_rates(&table, &path, date())?;

        let mut reader = Reader::from_path(&path)?;
        let rows: Vec<ExportedRow> = reader.deserialize().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), table.len());

        for (row, rate) in rows.iter().zip(table.iter()) {
            assert_eq!(row.name, rate.display_name);
            assert_relative_eq!(row.rate, rate.value, epsilon = 0.005);
            assert_eq!(row.date, "2024-06-01");
        }
        Ok(())
    }

    #[test]
    fn test_cancelled_selection_writes_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut would_be = PathBuf::new();

        let result = export_with(&sample_table(), date(), |name| {
            would_be = dir.path().join(name);
            None
        })?;

        assert!(result.is_none());
        assert_eq!(would_be, dir.path().join("currency_rates_20240601.csv"));
        assert!(!would_be.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_selected_path_is_used() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let result = export_with(&sample_table(), date(), |name| Some(dir.path().join("nested").join(name)))?;

        let summary = result.expect("export should run");
        assert_eq!(summary.path, dir.path().join("nested/currency_rates_20240601.csv"));
        assert!(summary.path.exists());
        Ok(())
    }

    #[test]
    fn test_unwritable_path_is_export_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        // the directory itself cannot be opened as a file
        let err = export_rates(&sample_table(), dir.path(), date()).unwrap_err();
        assert!(matches!(err, ExportError::Io { ref path, .. } if path == dir.path()));
        Ok(())
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(90.5), "90.50");
        assert_eq!(format_rate(12.346), "12.35");
        assert_eq!(format_rate(0.0), "0.00");
    }
}
