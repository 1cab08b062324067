// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, FixedOffset, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::api::RateSource;
use crate::error::{FetchError, NetworkError, ParseError};
use crate::models::{DailyRates, RateTable};

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub updated_at: DateTime<Local>,
    pub published: Option<DateTime<FixedOffset>>,
    pub currencies: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Parse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Idle,
    Fetching { started: DateTime<Local> },
    Updated(RefreshSummary),
    Failed { kind: FailureKind, message: String },
}

/// Fetch the daily document, giving up after `timeout`
pub async fn fetch_rates(
    source: &dyn RateSource,
    timeout: Duration,
) -> Result<DailyRates, FetchError> {
    match tokio::time::timeout(timeout, source.fetch_daily()).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout(timeout).into()),
    }
}

/// Stage every tracked currency from `document` and commit only if all of them resolved
pub fn apply_rates(table: &mut RateTable, document: &DailyRates) -> Result<RefreshSummary, ParseError> {
    let staged = table.stage(document)?;
    let currencies = staged.len();
    let published = staged.published;
    let updated_at = table.commit(staged, Local::now());

    Ok(RefreshSummary {
        updated_at,
        published,
        currencies,
    })
}

/// Owns the rate table and runs refreshes off the caller's task.
/// At most one refresh is in flight; the table is only written inside its commit.
pub struct RateSync {
    source: Arc<dyn RateSource>,
    table: Arc<RwLock<RateTable>>,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
    status: Arc<watch::Sender<SyncStatus>>,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RateSync {
    pub fn new(source: Arc<dyn RateSource>, table: RateTable, timeout: Duration) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);

        Self {
            source,
            table: Arc::new(RwLock::new(table)),
            timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// A consistent copy of the current table
    pub async fn snapshot(&self) -> RateTable {
        self.table.read().await.clone()
    }

    /// Like `snapshot`, but returns `None` instead of waiting on a commit in progress
    pub fn try_snapshot(&self) -> Option<RateTable> {
        self.table.try_read().ok().map(|table| table.clone())
    }

    /// Start a refresh in the background. Rejected while another one is running.
    pub fn spawn_refresh(&self) -> Result<JoinHandle<Result<RefreshSummary, FetchError>>, FetchError> {
        let guard = self.acquire()?;
        let source = Arc::clone(&self.source);
        let table = Arc::clone(&self.table);
        let status = Arc::clone(&self.status);
        let timeout = self.timeout;

        Ok(tokio::spawn(async move {
            let _guard = guard;
            run_refresh(source.as_ref(), &table, timeout, &status).await
        }))
    }

    /// Refresh and wait for the outcome
    pub async fn refresh_now(&self) -> Result<RefreshSummary, FetchError> {
        let _guard = self.acquire()?;
        run_refresh(self.source.as_ref(), &self.table, self.timeout, &self.status).await
    }

    fn acquire(&self) -> Result<InFlightGuard, FetchError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FetchError::InFlight);
        }

        self.status.send_replace(SyncStatus::Fetching {
            started: Local::now(),
        });
        Ok(InFlightGuard(Arc::clone(&self.in_flight)))
    }
}

async fn run_refresh(
    source: &dyn RateSource,
    table: &RwLock<RateTable>,
    timeout: Duration,
    status: &watch::Sender<SyncStatus>,
) -> Result<RefreshSummary, FetchError> {
    let result = match fetch_rates(source, timeout).await {
        Ok(document) => {
            let mut table = table.write().await;
            apply_rates(&mut table, &document).map_err(FetchError::from)
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(summary) => {
            tracing::info!(
                currencies = summary.currencies,
                published = ?summary.published,
                "rates updated"
            );
            status.send_replace(SyncStatus::Updated(summary.clone()));
        }
        Err(e) => {
            let kind = match e {
                FetchError::Parse(_) => FailureKind::Parse,
                _ => FailureKind::Network,
            };
            tracing::warn!(error = %e, ?kind, "rates refresh failed");
            status.send_replace(SyncStatus::Failed {
                kind,
                message: e.to_string(),
            });
        }
    }

    result
}
