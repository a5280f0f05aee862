//! Provider-backed billing sources

use chrono::NaiveDate;

use super::{BillingSource, FetchError};
use crate::config::DayBoundary;
use crate::models::{cents_from_fractional, dollars_to_cents, CostReport};
use crate::providers::{CerebriumClient, RunpodClient};

/// Runpod account billing, from the daily GraphQL summary
///
/// Summary buckets start at midnight UTC, so by default "today" is the UTC
/// date whatever the guard's clock says.
pub struct RunpodBillingSource {
    id: String,
    client: RunpodClient,
    day_boundary: DayBoundary,
}

impl RunpodBillingSource {
    /// Create a source using UTC days
    pub fn new(id: String, client: RunpodClient) -> Self {
        Self {
            id,
            client,
            day_boundary: DayBoundary::Utc,
        }
    }

    /// Override the bucket clock
    #[must_use]
    pub fn with_day_boundary(mut self, day_boundary: DayBoundary) -> Self {
        self.day_boundary = day_boundary;
        self
    }
}

#[async_trait::async_trait]
impl BillingSource for RunpodBillingSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn day_boundary(&self) -> Option<DayBoundary> {
        Some(self.day_boundary)
    }

    async fn fetch(&self) -> Result<CostReport, FetchError> {
        let summary = self.client.billing_summary().await?;

        let mut report = CostReport::new();
        for entry in &summary {
            report.add(entry.date()?, dollars_to_cents(entry.total_dollars()));
        }
        Ok(report)
    }
}

/// Cerebrium application billing, from the REST cost report
pub struct CerebriumBillingSource {
    id: String,
    client: CerebriumClient,
    day_boundary: Option<DayBoundary>,
}

impl CerebriumBillingSource {
    /// Create a source following the guard's clock
    pub fn new(id: String, client: CerebriumClient) -> Self {
        Self {
            id,
            client,
            day_boundary: None,
        }
    }

    /// Pin the cost dates to a clock of their own
    #[must_use]
    pub fn with_day_boundary(mut self, day_boundary: Option<DayBoundary>) -> Self {
        self.day_boundary = day_boundary;
        self
    }
}

#[async_trait::async_trait]
impl BillingSource for CerebriumBillingSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn day_boundary(&self) -> Option<DayBoundary> {
        self.day_boundary
    }

    async fn fetch(&self) -> Result<CostReport, FetchError> {
        let costs = self.client.app_costs().await?;

        let mut report = CostReport::new();
        for (day, cost) in &costs.costs {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                FetchError::MalformedResponse(format!("unparseable cost date '{day}': {e}"))
            })?;
            report.add(date, cents_from_fractional(cost.total_cost_cents.unwrap_or(0.0)));
        }
        Ok(report)
    }
}
