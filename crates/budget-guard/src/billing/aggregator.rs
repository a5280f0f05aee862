//! Spend aggregation across billing sources

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, warn};

use super::BillingSource;
use crate::alerting::{messages, Notifier};
use crate::models::{AggregatedSpend, CostSample, GapReason};

/// Sums today's cost over a fixed set of sources
///
/// Sources are queried one after the other. A failing source contributes
/// nothing, marks the aggregate degraded and is reported to the notifier; the
/// remaining sources are still processed.
pub struct CostAggregator {
    guard: String,
    sources: Vec<Arc<dyn BillingSource>>,
}

impl CostAggregator {
    /// Create an aggregator for a guard
    pub fn new(guard: impl Into<String>, sources: Vec<Arc<dyn BillingSource>>) -> Self {
        Self {
            guard: guard.into(),
            sources,
        }
    }

    /// Number of configured sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Aggregate the cost of `today`
    ///
    /// `today` is the guard's date at `now`. A source with a day boundary of
    /// its own is looked up at its date for `now` instead, so a provider that
    /// buckets by UTC is read from the UTC bucket that is still filling.
    ///
    /// A source that answers without an entry for its date is treated as "no
    /// spend yet": it marks the aggregate degraded and is logged, but it is not
    /// reported as a failure. Only failed calls are notified.
    pub async fn aggregate(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
        notifier: &dyn Notifier,
    ) -> AggregatedSpend {
        let mut spend = AggregatedSpend::empty(today);

        for source in &self.sources {
            let date = source
                .day_boundary()
                .map_or(today, |boundary| boundary.date_at(now));
            match source.fetch().await {
                Ok(report) => match report.cost_for(date) {
                    Some(amount_cents) => {
                        debug!(
                            guard = %self.guard,
                            source = source.id(),
                            date = %date,
                            amount_cents,
                            "Billing source reported"
                        );
                        spend.push_sample(CostSample {
                            source_id: source.id().to_string(),
                            date,
                            amount_cents,
                        });
                    }
                    None => {
                        warn!(
                            guard = %self.guard,
                            source = source.id(),
                            date = %date,
                            latest = ?report.latest_date(),
                            "No cost entry for today yet"
                        );
                        spend.push_gap(source.id(), GapReason::NoEntryForDate);
                    }
                },
                Err(e) => {
                    error!(
                        guard = %self.guard,
                        source = source.id(),
                        error = %e,
                        "Billing source failed"
                    );
                    spend.push_gap(source.id(), GapReason::FetchFailed);
                    notifier
                        .notify(&messages::source_failed(&self.guard, source.id(), &e))
                        .await;
                }
            }
        }

        spend
    }
}
