//! Cerebrium cooldown updates
//!
//! Sets the scale-down cooldown of a fixed list of Cerebrium applications in
//! one pass. Every application is attempted and every result is notified.

use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::alerting::{messages, Notifier};
use crate::config::{resolve_secret, CooldownConfig};
use crate::error::Result;
use crate::providers::CerebriumAppSettings;

/// Shortest cooldown accepted, in seconds
pub const MIN_COOLDOWN_SECONDS: u64 = 30;

/// Parse a cooldown from the command line
pub fn parse_cooldown_seconds(value: &str) -> std::result::Result<u64, String> {
    let seconds: u64 = value
        .parse()
        .map_err(|_| format!("invalid integer value: {value}"))?;
    if seconds < MIN_COOLDOWN_SECONDS {
        return Err(format!(
            "cooldown period must be >= {MIN_COOLDOWN_SECONDS} seconds"
        ));
    }
    Ok(seconds)
}

/// Result for one application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownUpdate {
    /// Application settings URL
    pub app: String,
    /// Failure reason, `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one cooldown run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownReport {
    /// Requested cooldown
    pub seconds: u64,
    /// One entry per application, in configuration order
    pub updates: Vec<CooldownUpdate>,
}

impl CooldownReport {
    /// Number of applications that could not be updated
    pub fn failures(&self) -> usize {
        self.updates.iter().filter(|u| u.error.is_some()).count()
    }
}

/// Build one settings client per configured application
pub fn apps_from_config(config: &CooldownConfig, http: &Client) -> Result<Vec<CerebriumAppSettings>> {
    config
        .apps
        .iter()
        .map(|app| {
            let token = resolve_secret(&app.api_key_env)?;
            CerebriumAppSettings::new(http.clone(), &app.url, token)
        })
        .collect()
}

/// Set the cooldown of every application to `seconds`
pub async fn update_cooldown(
    apps: &[CerebriumAppSettings],
    seconds: u64,
    notifier: &dyn Notifier,
) -> CooldownReport {
    info!(seconds, apps = apps.len(), "Updating Cerebrium cooldown period");

    let mut updates = Vec::with_capacity(apps.len());
    for app in apps {
        let url = app.url().as_str();
        let (message, failure) = match app.set_cooldown_period(seconds).await {
            Ok(()) => {
                info!(app = url, seconds, "Cooldown period updated");
                (messages::cooldown_updated(seconds, url), None)
            }
            Err(e) => {
                error!(app = url, error = %e, "Cooldown period update failed");
                (messages::cooldown_failed(url, &e), Some(e.to_string()))
            }
        };
        notifier.notify(&message).await;

        updates.push(CooldownUpdate {
            app: url.to_string(),
            error: failure,
        });
    }

    CooldownReport { seconds, updates }
}
