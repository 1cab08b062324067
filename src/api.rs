// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::error::{FetchError, NetworkError, ParseError};
use crate::models::DailyRates;

/// Something that can produce the daily rates document
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_daily(&self) -> Result<DailyRates, FetchError>;
}

/// HTTP client for the daily JSON endpoint
#[derive(Clone)]
pub struct CbrClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl CbrClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, NetworkError> {
        Self::new(config.endpoint.clone(), config.timeout())
    }

    fn classify(&self, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            NetworkError::Timeout(self.timeout)
        } else {
            NetworkError::Request(err)
        }
    }
}

#[async_trait]
impl RateSource for CbrClient {
    async fn fetch_daily(&self) -> Result<DailyRates, FetchError> {
        tracing::debug!(endpoint = %self.endpoint, "requesting daily rates");

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "rates endpoint returned an error status");
            return Err(NetworkError::Status(status).into());
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        let document: DailyRates = serde_json::from_str(&text).map_err(ParseError::from)?;

        tracing::debug!(currencies = document.valute.len(), "daily rates received");
        Ok(document)
    }
}
