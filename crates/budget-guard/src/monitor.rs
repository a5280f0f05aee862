//! Runpod account monitor
//!
//! Watches two account-wide signals next to the budget guards: the prepaid
//! balance and the number of always-on serverless workers. A balance below its
//! threshold is alerted on every check and, once per low-balance episode,
//! scales the configured endpoints down to zero workers. The episode ends when
//! the balance is back at or above the threshold.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn, Instrument};

use crate::alerting::{messages, Notifier};
use crate::config::{resolve_secret, MonitorConfig};
use crate::error::Result;
use crate::guard::panic_message;
use crate::providers::RunpodClient;
use crate::workers::{update_workers, WorkerAction, WorkersReport};

/// Outcome of one monitor check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountReport {
    /// Prepaid balance in dollars, `None` when not checked or unreadable
    pub balance: Option<f64>,
    /// Balance strictly below its threshold
    pub low_balance: bool,
    /// Endpoint deactivation triggered by this check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation: Option<WorkersReport>,
    /// Sum of `workersMin` over every endpoint
    pub active_workers: Option<i64>,
    /// Number of serverless endpoints
    pub endpoints: Option<usize>,
    /// Active workers strictly above their threshold
    pub workers_exceeded: bool,
}

/// Periodic balance and worker-count checks for one Runpod account
pub struct AccountMonitor {
    client: RunpodClient,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    balance_threshold: Option<f64>,
    deactivate_endpoints: Vec<String>,
    active_worker_threshold: Option<i64>,
    deactivated: bool,
}

impl AccountMonitor {
    /// Create a monitor with no checks enabled
    pub fn new(client: RunpodClient, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            notifier,
            poll_interval: Duration::from_secs(30),
            balance_threshold: None,
            deactivate_endpoints: Vec::new(),
            active_worker_threshold: None,
            deactivated: false,
        }
    }

    /// Build a monitor from configuration
    pub fn from_config(
        config: &MonitorConfig,
        http: &Client,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let api_key = resolve_secret(&config.api_key_env)?;
        let client = RunpodClient::new(http.clone(), &config.api_base, &api_key)?;

        let mut monitor = Self::new(client, notifier).with_poll_interval(config.poll_interval);
        if let Some(threshold) = config.balance_threshold {
            monitor = monitor.with_balance_threshold(threshold, config.deactivate_endpoints.clone());
        }
        if let Some(threshold) = config.active_worker_threshold {
            monitor = monitor.with_active_worker_threshold(threshold);
        }
        Ok(monitor)
    }

    /// Set the sleep between checks
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Alert below `threshold` dollars and deactivate `endpoints`
    #[must_use]
    pub fn with_balance_threshold(mut self, threshold: f64, endpoints: Vec<String>) -> Self {
        self.balance_threshold = Some(threshold);
        self.deactivate_endpoints = endpoints;
        self
    }

    /// Alert when more than `threshold` workers are always on
    #[must_use]
    pub fn with_active_worker_threshold(mut self, threshold: i64) -> Self {
        self.active_worker_threshold = Some(threshold);
        self
    }

    /// Run every enabled check once
    pub async fn check(&mut self) -> AccountReport {
        let mut report = AccountReport::default();

        if let Some(threshold) = self.balance_threshold {
            self.check_balance(threshold, &mut report).await;
        }
        if let Some(threshold) = self.active_worker_threshold {
            self.check_workers(threshold, &mut report).await;
        }

        report
    }

    async fn check_balance(&mut self, threshold: f64, report: &mut AccountReport) {
        let balance = match self.client.client_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                error!(error = %e, "Runpod balance check failed");
                self.notifier
                    .notify(&messages::monitor_check_failed("balance", &e))
                    .await;
                return;
            }
        };
        report.balance = Some(balance);

        if balance >= threshold {
            if self.deactivated {
                info!(balance, threshold, "Runpod balance recovered");
            }
            self.deactivated = false;
            return;
        }

        report.low_balance = true;
        error!(balance, threshold, "Runpod balance below threshold");
        self.notifier
            .notify(&messages::low_balance(balance, threshold))
            .await;

        if self.deactivated || self.deactivate_endpoints.is_empty() {
            return;
        }

        match update_workers(
            &self.client,
            &self.deactivate_endpoints,
            WorkerAction::Deactivate,
            self.notifier.as_ref(),
        )
        .await
        {
            Ok(workers) => {
                self.deactivated = workers.failures() == 0;
                report.deactivation = Some(workers);
            }
            // Already notified; retried on the next low check
            Err(e) => error!(error = %e, "Endpoint deactivation failed"),
        }
    }

    async fn check_workers(&self, threshold: i64, report: &mut AccountReport) {
        let endpoints = match self.client.endpoints().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, "Runpod worker count check failed");
                self.notifier
                    .notify(&messages::monitor_check_failed("worker count", &e))
                    .await;
                return;
            }
        };

        let active: i64 = endpoints
            .iter()
            .map(|endpoint| endpoint.workers_min.unwrap_or(0))
            .sum();
        report.active_workers = Some(active);
        report.endpoints = Some(endpoints.len());

        if active > threshold {
            report.workers_exceeded = true;
            warn!(active, threshold, endpoints = endpoints.len(), "Too many active workers");
            self.notifier
                .notify(&messages::active_workers_exceeded(active, threshold, endpoints.len()))
                .await;
        }
    }

    /// Check forever, sleeping `poll_interval` after each check
    pub async fn run(mut self) {
        info!(
            poll_interval = %humantime::format_duration(self.poll_interval),
            balance_threshold = ?self.balance_threshold,
            active_worker_threshold = ?self.active_worker_threshold,
            "Starting account monitor"
        );

        loop {
            let span = tracing::info_span!("account_check");
            let result = AssertUnwindSafe(self.check().instrument(span))
                .catch_unwind()
                .await;

            if let Err(panic) = result {
                let reason = panic_message(panic.as_ref());
                error!(reason = %reason, "Account check aborted");
                self.notifier
                    .notify(&messages::monitor_check_failed("account", &reason))
                    .await;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
