//! Cerebrium REST API client

use std::collections::BTreeMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{decode_json, success_body, FetchError};
use crate::error::{Error, Result};

/// Cerebrium API client scoped to one application
pub struct CerebriumClient {
    http: Client,
    cost_url: Url,
    token: String,
}

impl CerebriumClient {
    /// Create a client for `{api_base}/v2/projects/{project_id}/apps/{app_id}/cost`
    pub fn new(
        http: Client,
        api_base: &str,
        project_id: &str,
        app_id: &str,
        token: String,
    ) -> Result<Self> {
        let mut cost_url = Url::parse(api_base)
            .map_err(|e| Error::config(format!("invalid Cerebrium api_base '{api_base}': {e}")))?;
        cost_url
            .path_segments_mut()
            .map_err(|()| Error::config(format!("Cerebrium api_base '{api_base}' cannot be a base URL")))?
            .pop_if_empty()
            .extend(["v2", "projects", project_id, "apps", app_id, "cost"]);

        Ok(Self {
            http,
            cost_url,
            token,
        })
    }

    /// URL queried by [`CerebriumClient::app_costs`]
    pub fn cost_url(&self) -> &Url {
        &self.cost_url
    }

    /// Cost report of the application, keyed by `YYYY-MM-DD`
    pub async fn app_costs(&self) -> std::result::Result<AppCosts, FetchError> {
        debug!(url = %self.cost_url, "Cerebrium cost request");

        let response = self
            .http
            .get(self.cost_url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;

        decode_json(response).await
    }
}

/// Settings endpoint of one Cerebrium application
pub struct CerebriumAppSettings {
    http: Client,
    url: Url,
    token: String,
}

impl CerebriumAppSettings {
    /// Create a client for the application settings `url`
    pub fn new(http: Client, url: &str, token: String) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::config(format!("invalid Cerebrium app url '{url}': {e}")))?;
        Ok(Self { http, url, token })
    }

    /// Application settings URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Set how long idle replicas stay up before scaling down
    pub async fn set_cooldown_period(&self, seconds: u64) -> std::result::Result<(), FetchError> {
        debug!(url = %self.url, seconds, "Cerebrium cooldown update");

        let response = self
            .http
            .patch(self.url.clone())
            .bearer_auth(&self.token)
            .json(&CooldownPatch {
                cooldown_period_seconds: seconds,
            })
            .send()
            .await?;

        success_body(response).await.map(drop)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CooldownPatch {
    cooldown_period_seconds: u64,
}

/// Body of the app cost endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AppCosts {
    /// Cost per `YYYY-MM-DD` date
    pub costs: BTreeMap<String, DayCost>,
}

/// Cost of one day
#[derive(Debug, Clone, Deserialize)]
pub struct DayCost {
    /// Total for the day in (fractional) cents
    #[serde(default)]
    pub total_cost_cents: Option<f64>,
}
