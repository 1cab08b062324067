// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures while talking to the rates endpoint
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// The response arrived but does not contain what we need
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("currency {0} is missing from the response")]
    MissingCurrency(String),

    #[error("currency {code} has a malformed entry: {source}")]
    InvalidEntry {
        code: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("currency {0} has no Value field")]
    MissingValue(String),

    #[error("currency {code} has an invalid rate: {value}")]
    InvalidRate { code: String, value: f64 },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("a refresh is already in progress")]
    InFlight,
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        NetworkError::Request(err)
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write CSV to {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
