//! Kill switch: traffic rule reprioritization on a hard breach
//!
//! A [`MitigationBackend`] moves one traffic rule to a new priority. The
//! [`MitigationController`] decides when to call it and holds the latch that
//! prevents repeated calls once every target has been applied.

mod alb;
mod controller;

pub use alb::AlbRuleBackend;
pub use controller::{MitigationController, MitigationOutcome, TargetResult};

use tracing::warn;

use crate::models::MitigationTarget;

/// Errors from a backend call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Credentials are absent, expired or refused
    #[error("missing or rejected credentials: {0}")]
    MissingCredentials(String),

    /// The rule or priority does not exist or is not allowed
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Network failure or throttling; worth retrying next cycle
    #[error("transient connectivity failure: {0}")]
    TransientConnectivity(String),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

/// Applies a rule priority
///
/// Calls are idempotent at the backend: applying the same priority twice is a
/// no-op.
#[async_trait::async_trait]
pub trait MitigationBackend: Send + Sync {
    /// Move `target.target_id` in `target.region` to `target.desired_priority`
    async fn set_priority(&self, target: &MitigationTarget) -> Result<(), BackendError>;
}

/// Logs the change it would make and reports success
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend;

#[async_trait::async_trait]
impl MitigationBackend for DryRunBackend {
    async fn set_priority(&self, target: &MitigationTarget) -> Result<(), BackendError> {
        warn!(
            target = %target.name,
            rule = %target.target_id,
            region = %target.region,
            priority = target.desired_priority,
            "Dry run: rule priority not changed"
        );
        Ok(())
    }
}
