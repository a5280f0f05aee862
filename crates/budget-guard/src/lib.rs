//! # Budget Guard
//!
//! Daily spend guard for managed compute providers.
//!
//! Budget Guard polls the billing APIs of one or more provider accounts, sums
//! today's spend, and compares it to a soft and a hard threshold. A soft
//! breach posts an alert to Slack; a hard breach also trips a kill switch that
//! moves load balancer rules to a new priority, once, until the process
//! restarts.
//!
//! ## Architecture
//!
//! - **Billing**: Runpod and Cerebrium sources, summed per guard
//! - **Alerting**: threshold evaluation and Slack delivery
//! - **Mitigation**: AWS ALB rule priorities behind a one-way latch
//! - **Guard**: the per-account control loop
//! - **Monitor**: Runpod balance and always-on worker checks
//! - **Workers**: manual scale up/down of serverless endpoints
//! - **Cooldown**: Cerebrium scale-down cooldown updates
//!
//! ## Quick Start
//!
//! ```bash
//! # Check configuration
//! budget-guard validate
//!
//! # Run one cycle without touching the load balancer
//! budget-guard check --dry-run
//!
//! # Run forever
//! budget-guard run
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod billing;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod guard;
pub mod mitigation;
pub mod models;
pub mod monitor;
pub mod providers;
pub mod telemetry;
pub mod workers;

pub use config::Config;
pub use error::{Error, Result};
pub use guard::{BudgetGuard, CycleReport};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{evaluate, Notifier};
    pub use crate::billing::{BillingSource, CostAggregator, FetchError};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::guard::{BudgetGuard, CycleReport};
    pub use crate::mitigation::{BackendError, MitigationBackend, MitigationController, MitigationOutcome};
    pub use crate::models::*;
}
