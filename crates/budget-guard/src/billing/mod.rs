//! Billing sources and spend aggregation
//!
//! A [`BillingSource`] returns one account's cost per calendar date. The
//! [`CostAggregator`] sums today's cost across every source of a guard and
//! keeps going when individual sources fail.

mod aggregator;
mod sources;

pub use aggregator::CostAggregator;
pub use sources::{CerebriumBillingSource, RunpodBillingSource};

use std::sync::Arc;

use reqwest::Client;

pub use crate::providers::FetchError;

use crate::config::{resolve_secret, DayBoundary, SourceConfig};
use crate::error::Result;
use crate::models::CostReport;
use crate::providers::{CerebriumClient, RunpodClient};

/// A provider account that reports cost per date
#[async_trait::async_trait]
pub trait BillingSource: Send + Sync {
    /// Identifier used in logs and notifications
    fn id(&self) -> &str;

    /// Clock of the provider's daily buckets
    ///
    /// `None` means the buckets follow the guard's own clock.
    fn day_boundary(&self) -> Option<DayBoundary> {
        None
    }

    /// Fetch the current cost report
    async fn fetch(&self) -> std::result::Result<CostReport, FetchError>;
}

/// Build a source from configuration, resolving its credential
pub fn build_source(config: &SourceConfig, http: &Client) -> Result<Arc<dyn BillingSource>> {
    let api_key = resolve_secret(config.api_key_env())?;

    let source: Arc<dyn BillingSource> = match config {
        SourceConfig::Runpod {
            id,
            api_base,
            day_boundary,
            ..
        } => Arc::new(
            RunpodBillingSource::new(
                id.clone(),
                RunpodClient::new(http.clone(), api_base, &api_key)?,
            )
            .with_day_boundary(*day_boundary),
        ),
        SourceConfig::Cerebrium {
            id,
            api_base,
            project_id,
            app_id,
            day_boundary,
            ..
        } => Arc::new(
            CerebriumBillingSource::new(
                id.clone(),
                CerebriumClient::new(http.clone(), api_base, project_id, app_id, api_key)?,
            )
            .with_day_boundary(*day_boundary),
        ),
    };

    Ok(source)
}
