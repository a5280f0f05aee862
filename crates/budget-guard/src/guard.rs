//! Budget guard control loop
//!
//! A [`BudgetGuard`] owns one account's sources, thresholds, notifier and
//! kill switch. Each cycle aggregates today's spend, classifies it and lets
//! the [`MitigationController`] react; the guard then sleeps for its poll
//! interval. Cycles never overlap and a failing cycle never stops the loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn, Instrument};

use crate::alerting::{evaluate, messages, Notifier};
use crate::billing::{build_source, BillingSource, CostAggregator};
use crate::config::{DayBoundary, GuardConfig};
use crate::error::Result;
use crate::mitigation::{MitigationBackend, MitigationController, MitigationOutcome};
use crate::models::{AggregatedSpend, MitigationLatch, Severity, ThresholdConfig};

/// Summary of one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Guard name
    pub guard: String,
    /// 1-based cycle number
    pub cycle: u64,
    /// Today's aggregated spend
    pub spend: AggregatedSpend,
    /// Aggregated total in dollars
    pub total_dollars: f64,
    /// Classification of the total
    pub severity: Severity,
    /// What the kill switch did this cycle
    pub mitigation: MitigationOutcome,
    /// Latch state after the cycle
    pub latch: MitigationLatch,
}

/// One account's budget guard
pub struct BudgetGuard {
    name: String,
    thresholds: ThresholdConfig,
    poll_interval: Duration,
    day_boundary: DayBoundary,
    aggregator: CostAggregator,
    controller: MitigationController,
    notifier: Arc<dyn Notifier>,
    cycles: u64,
}

impl BudgetGuard {
    /// Assemble a guard from its parts
    pub fn new(
        name: impl Into<String>,
        thresholds: ThresholdConfig,
        sources: Vec<Arc<dyn BillingSource>>,
        controller: MitigationController,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let name = name.into();
        Self {
            aggregator: CostAggregator::new(name.clone(), sources),
            name,
            thresholds,
            poll_interval: Duration::from_secs(60),
            day_boundary: DayBoundary::default(),
            controller,
            notifier,
            cycles: 0,
        }
    }

    /// Build a guard from configuration
    ///
    /// Resolves every source credential; a missing one is a configuration error.
    pub fn from_config(
        config: &GuardConfig,
        http: &Client,
        backend: Arc<dyn MitigationBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let sources = config
            .sources
            .iter()
            .map(|source| build_source(source, http))
            .collect::<Result<Vec<_>>>()?;

        let controller =
            MitigationController::new(config.name.clone(), backend, config.targets.clone());

        Ok(Self::new(
            config.name.clone(),
            config.thresholds,
            sources,
            controller,
            notifier,
        )
        .with_poll_interval(config.poll_interval)
        .with_day_boundary(config.day_boundary))
    }

    /// Set the sleep between cycles
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the clock deciding "today"
    #[must_use]
    pub fn with_day_boundary(mut self, day_boundary: DayBoundary) -> Self {
        self.day_boundary = day_boundary;
        self
    }

    /// Guard name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current latch state
    pub fn latch(&self) -> MitigationLatch {
        self.controller.latch()
    }

    /// Run one cycle as of `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.cycles += 1;

        let today = self.day_boundary.date_at(now);
        let spend = self
            .aggregator
            .aggregate(today, now, self.notifier.as_ref())
            .await;
        let total_dollars = spend.total_dollars();
        let severity = evaluate(total_dollars, &self.thresholds);

        info!(
            guard = %self.name,
            date = %today,
            total_dollars,
            degraded = spend.degraded,
            severity = %severity,
            "Spend evaluated"
        );

        let mitigation = self
            .controller
            .handle(severity, &spend, &self.thresholds, self.notifier.as_ref())
            .await;

        CycleReport {
            guard: self.name.clone(),
            cycle: self.cycles,
            spend,
            total_dollars,
            severity,
            mitigation,
            latch: self.controller.latch(),
        }
    }

    /// Run cycles forever, sleeping `poll_interval` after each one
    ///
    /// A panic inside a cycle aborts only that cycle: it is logged, notified and
    /// followed by the usual sleep.
    pub async fn run(mut self) {
        info!(
            guard = %self.name,
            poll_interval = %humantime::format_duration(self.poll_interval),
            soft_dollars = self.thresholds.soft_dollars,
            hard_dollars = self.thresholds.hard_dollars,
            sources = self.aggregator.source_count(),
            targets = self.controller.targets().len(),
            "Starting budget guard"
        );
        warn!(
            guard = %self.name,
            "Kill switch latch is held in memory; a restart re-arms it"
        );

        loop {
            let span = tracing::info_span!("cycle", guard = %self.name, cycle = self.cycles + 1);

            let result = AssertUnwindSafe(self.run_cycle(Utc::now()).instrument(span))
                .catch_unwind()
                .await;

            if let Err(panic) = result {
                let reason = panic_message(panic.as_ref());
                error!(guard = %self.name, reason = %reason, "Cycle aborted");
                self.notifier
                    .notify(&messages::cycle_aborted(&self.name, &reason))
                    .await;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
