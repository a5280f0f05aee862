//! Configuration management for Budget Guard
//!
//! Configuration is read once at startup from a TOML file layered with
//! `BUDGET_GUARD__*` environment overrides. Credentials are never stored in the
//! file: sources and Slack name the environment variable that holds them, and
//! [`Config::load`] fails if any of those variables is missing.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{MitigationTarget, ThresholdConfig};

/// Default configuration file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "budget-guard.toml";

/// Prefix of environment overrides (`BUDGET_GUARD__HTTP__REQUEST_TIMEOUT=10s`)
pub const ENV_PREFIX: &str = "BUDGET_GUARD";

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound HTTP configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Slack notification sink (log-only when absent)
    #[serde(default)]
    pub slack: Option<SlackConfig>,

    /// Budget guards, one per monitored account
    #[serde(default)]
    pub guards: Vec<GuardConfig>,

    /// Worker activation tool
    #[serde(default)]
    pub workers: Option<WorkersConfig>,

    /// Runpod account monitor (balance and always-on workers)
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,

    /// Cerebrium cooldown update tool
    #[serde(default)]
    pub cooldown: Option<CooldownConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
            slack: None,
            guards: Vec::new(),
            workers: None,
            monitor: None,
            cooldown: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Append-only log file; stdout only when unset
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every external call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Slack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Environment variable holding the bot token
    pub token_env: String,
    /// Web API base URL
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

/// Which clock decides the billing date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    /// Local wall clock of the host
    #[default]
    Local,
    /// UTC
    Utc,
}

impl DayBoundary {
    /// Today's date according to this boundary
    pub fn today(self) -> NaiveDate {
        self.date_at(Utc::now())
    }

    /// Date of the instant `now` according to this boundary
    pub fn date_at(self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => now.with_timezone(&Local).date_naive(),
            Self::Utc => now.date_naive(),
        }
    }
}

/// One budget guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Name used in logs and notifications (e.g. "Runpod")
    pub name: String,
    /// Slack channel receiving this guard's notifications
    pub channel: String,
    /// Sleep between two cycles
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Clock used to decide which day's spend is checked
    #[serde(default)]
    pub day_boundary: DayBoundary,
    /// Soft and hard daily thresholds
    pub thresholds: ThresholdConfig,
    /// Billing sources summed every cycle
    pub sources: Vec<SourceConfig>,
    /// Rules deprioritized on a hard breach
    #[serde(default)]
    pub targets: Vec<MitigationTarget>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

/// A billing source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Runpod GraphQL billing summary
    Runpod {
        /// Source identifier
        id: String,
        /// Environment variable holding the API key
        api_key_env: String,
        /// API base URL
        #[serde(default = "default_runpod_api_base")]
        api_base: String,
        /// Clock of the billing buckets; Runpod reports UTC days
        #[serde(default = "default_runpod_day_boundary")]
        day_boundary: DayBoundary,
    },
    /// Cerebrium REST app cost report
    Cerebrium {
        /// Source identifier
        id: String,
        /// Environment variable holding the bearer token
        api_key_env: String,
        /// Project identifier
        project_id: String,
        /// Application identifier
        app_id: String,
        /// API base URL
        #[serde(default = "default_cerebrium_api_base")]
        api_base: String,
        /// Clock of the cost dates; the guard's clock when unset
        #[serde(default)]
        day_boundary: Option<DayBoundary>,
    },
}

impl SourceConfig {
    /// Source identifier
    pub fn id(&self) -> &str {
        match self {
            Self::Runpod { id, .. } | Self::Cerebrium { id, .. } => id,
        }
    }

    /// Environment variable holding the credential
    pub fn api_key_env(&self) -> &str {
        match self {
            Self::Runpod { api_key_env, .. } | Self::Cerebrium { api_key_env, .. } => api_key_env,
        }
    }

    /// Clock deciding which provider date is "today", if not the guard's
    pub fn day_boundary(&self) -> Option<DayBoundary> {
        match self {
            Self::Runpod { day_boundary, .. } => Some(*day_boundary),
            Self::Cerebrium { day_boundary, .. } => *day_boundary,
        }
    }
}

fn default_runpod_day_boundary() -> DayBoundary {
    DayBoundary::Utc
}

pub(crate) fn default_runpod_api_base() -> String {
    "https://api.runpod.io".to_string()
}

pub(crate) fn default_cerebrium_api_base() -> String {
    "https://rest.cerebrium.ai".to_string()
}

/// Worker activation tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Slack channel receiving activation results
    pub channel: String,
    /// Environment variable holding the Runpod API key
    pub api_key_env: String,
    /// Runpod API base URL
    #[serde(default = "default_runpod_api_base")]
    pub api_base: String,
    /// Names of the serverless endpoints to update
    pub endpoints: Vec<String>,
}

/// Runpod account monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Slack channel receiving monitor alerts
    pub channel: String,
    /// Environment variable holding the Runpod API key
    pub api_key_env: String,
    /// Runpod API base URL
    #[serde(default = "default_runpod_api_base")]
    pub api_base: String,
    /// Sleep between two checks
    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Alert when the prepaid balance drops below this many dollars
    #[serde(default)]
    pub balance_threshold: Option<f64>,
    /// Endpoints scaled to zero workers when the balance runs low
    #[serde(default)]
    pub deactivate_endpoints: Vec<String>,
    /// Alert when the sum of `workersMin` over all endpoints exceeds this
    #[serde(default)]
    pub active_worker_threshold: Option<i64>,
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(30)
}

/// Cerebrium cooldown tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Slack channel receiving update results
    pub channel: String,
    /// Applications to update
    pub apps: Vec<CooldownApp>,
}

/// One Cerebrium application settings URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownApp {
    /// Application settings URL receiving the PATCH
    pub url: String,
    /// Environment variable holding the project's bearer token
    pub api_key_env: String,
}

impl Config {
    /// Load configuration from a file (optional) and the environment
    ///
    /// A `.env` file in the working directory is read first; it may be
    /// absent but not malformed. When `path` is given the file must exist; the
    /// default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        check_dotenv(dotenvy::dotenv())?;

        let (file, required) = match path {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_FILE, false),
        };

        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(file)).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant that must hold before the loop starts
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        if self.http.request_timeout.is_zero() {
            return Err(Error::config("http.request_timeout must be greater than zero"));
        }

        let mut names = HashSet::new();
        for guard in &self.guards {
            if !names.insert(guard.name.as_str()) {
                return Err(Error::config(format!("duplicate guard name '{}'", guard.name)));
            }
            guard.validate()?;
        }

        if let Some(workers) = &self.workers {
            if workers.channel.trim().is_empty() {
                return Err(Error::config("workers.channel must not be empty"));
            }
            if workers.endpoints.is_empty() {
                return Err(Error::config("workers.endpoints must list at least one endpoint"));
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.validate()?;
        }
        if let Some(cooldown) = &self.cooldown {
            cooldown.validate()?;
        }

        Ok(())
    }

    /// Fail unless at least one guard is configured
    pub fn require_guards(&self) -> Result<&[GuardConfig]> {
        if self.guards.is_empty() {
            return Err(Error::config("no [[guards]] configured"));
        }
        Ok(&self.guards)
    }
}

impl GuardConfig {
    /// Validate this guard's settings
    pub fn validate(&self) -> Result<()> {
        let ctx = |msg: String| Error::config(format!("guard '{}': {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(Error::config("guard name must not be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(ctx("channel must not be empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ctx("poll_interval must be greater than zero".into()));
        }
        self.thresholds
            .validate()
            .map_err(|e| ctx(e.to_string()))?;

        if self.sources.is_empty() {
            return Err(ctx("at least one billing source is required".into()));
        }
        let mut ids = HashSet::new();
        for source in &self.sources {
            if source.id().trim().is_empty() {
                return Err(ctx("source id must not be empty".into()));
            }
            if !ids.insert(source.id()) {
                return Err(ctx(format!("duplicate source id '{}'", source.id())));
            }
        }

        for target in &self.targets {
            if target.target_id.trim().is_empty() {
                return Err(ctx(format!("target '{}' has an empty target_id", target.name)));
            }
            if target.region.trim().is_empty() {
                return Err(ctx(format!("target '{}' has an empty region", target.name)));
            }
        }

        Ok(())
    }
}

impl MonitorConfig {
    /// Validate the monitor settings
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(Error::config("monitor.channel must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("monitor.poll_interval must be greater than zero"));
        }
        if self.balance_threshold.is_none() && self.active_worker_threshold.is_none() {
            return Err(Error::config(
                "monitor needs balance_threshold or active_worker_threshold",
            ));
        }
        if let Some(threshold) = self.balance_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(Error::config(format!(
                    "monitor.balance_threshold must be a non-negative amount, got {threshold}"
                )));
            }
        }
        if self.balance_threshold.is_none() && !self.deactivate_endpoints.is_empty() {
            return Err(Error::config(
                "monitor.deactivate_endpoints requires balance_threshold",
            ));
        }
        if matches!(self.active_worker_threshold, Some(t) if t < 0) {
            return Err(Error::config("monitor.active_worker_threshold must not be negative"));
        }
        Ok(())
    }
}

impl CooldownConfig {
    /// Validate the cooldown tool settings
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(Error::config("cooldown.channel must not be empty"));
        }
        if self.apps.is_empty() {
            return Err(Error::config("cooldown.apps must list at least one application"));
        }
        for app in &self.apps {
            url::Url::parse(&app.url).map_err(|e| {
                Error::config(format!("cooldown app url '{}' is invalid: {e}", app.url))
            })?;
        }
        Ok(())
    }
}

/// Accept a missing `.env` file, reject an unreadable or malformed one
fn check_dotenv<T>(loaded: std::result::Result<T, dotenvy::Error>) -> Result<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(Error::config(format!("failed to read .env file: {e}"))),
    }
}

/// Read a credential from the environment
pub fn resolve_secret(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(Error::config(format!("environment variable {env_var} is empty"))),
        Err(_) => Err(Error::config(format!("environment variable {env_var} is not set"))),
    }
}
