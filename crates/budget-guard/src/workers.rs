//! Serverless worker activation
//!
//! Scales the minimum worker count of selected Runpod serverless endpoints up
//! to one (activate) or down to zero (deactivate), keeping every other endpoint
//! setting as it is.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::alerting::Notifier;
use crate::error::{Error, Result};
use crate::providers::runpod::{EndpointInput, RunpodClient};

/// Direction of a worker update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkerAction {
    /// Keep one worker warm
    Activate,
    /// Scale to zero
    Deactivate,
}

impl WorkerAction {
    /// `workersMin` applied by this action
    pub fn workers_min(self) -> i64 {
        match self {
            Self::Activate => 1,
            Self::Deactivate => 0,
        }
    }
}

impl fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activate => write!(f, "Activate"),
            Self::Deactivate => write!(f, "Deactivate"),
        }
    }
}

/// Result for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointUpdate {
    /// Endpoint name
    pub endpoint: String,
    /// Requested worker minimum
    pub workers_min: i64,
    /// Failure reason, `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one activation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkersReport {
    /// Applied action
    pub action: WorkerAction,
    /// One entry per matched endpoint
    pub updates: Vec<EndpointUpdate>,
    /// Configured names with no matching endpoint
    pub missing: Vec<String>,
}

impl WorkersReport {
    /// Number of endpoints that could not be updated
    pub fn failures(&self) -> usize {
        self.updates.iter().filter(|u| u.error.is_some()).count()
    }
}

/// Apply `action` to every endpoint whose name is in `names`
///
/// Each endpoint result is notified. Failing to list the endpoints is returned
/// as an error after being notified; per-endpoint failures are only recorded
/// in the report.
pub async fn update_workers(
    client: &RunpodClient,
    names: &[String],
    action: WorkerAction,
    notifier: &dyn Notifier,
) -> Result<WorkersReport> {
    let workers_min = action.workers_min();

    let endpoints = match client.endpoints().await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            let message = format!("*{action}*: failed to list serverless endpoints: {e}");
            error!(error = %e, "Listing serverless endpoints failed");
            notifier.notify(&message).await;
            return Err(Error::external("runpod", e));
        }
    };

    let mut updates = Vec::new();
    for endpoint in endpoints.iter().filter(|e| names.contains(&e.name)) {
        let input = EndpointInput::with_workers_min(endpoint, workers_min);

        let (message, failure) = match client.save_endpoint(&input).await {
            Ok(saved) => {
                info!(endpoint = %saved.name, workers_min = ?saved.workers_min, "Endpoint updated");
                (
                    format!(
                        "*{action}*: Active worker set to `{workers_min}` for the endpoint: `{}`",
                        endpoint.name
                    ),
                    None,
                )
            }
            Err(e) => {
                error!(endpoint = %endpoint.name, error = %e, "Endpoint update failed");
                (
                    format!(
                        "*{action}*: Failed during the setting active worker to `{workers_min}` for `{}`: {e}",
                        endpoint.name
                    ),
                    Some(e.to_string()),
                )
            }
        };
        notifier.notify(&message).await;

        updates.push(EndpointUpdate {
            endpoint: endpoint.name.clone(),
            workers_min,
            error: failure,
        });
    }

    let missing: Vec<String> = names
        .iter()
        .filter(|name| !endpoints.iter().any(|e| &e.name == *name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Configured endpoints not found in the account");
    }

    Ok(WorkersReport {
        action,
        updates,
        missing,
    })
}
