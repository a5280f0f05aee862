//! Kill switch state machine

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::{BackendError, MitigationBackend};
use crate::alerting::{messages, Notifier};
use crate::models::{AggregatedSpend, MitigationLatch, MitigationTarget, Severity, ThresholdConfig};

/// Result of one target's backend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetResult {
    /// Target name
    pub target: String,
    /// AWS region of the target
    pub region: String,
    /// Failure reason, `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetResult {
    /// Whether the call succeeded
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What the controller did in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MitigationOutcome {
    /// Spend below the soft threshold
    None,
    /// Soft breach notified
    Alerted,
    /// Hard breach notified, kill switch attempted on every target
    Attempted {
        /// Result per target, in order
        results: Vec<TargetResult>,
        /// Every target succeeded and the latch tripped
        activated: bool,
    },
    /// Hard breach notified, kill switch already latched
    AlreadyActivated,
}

/// Drives the kill switch for one guard
///
/// The latch starts [`MitigationLatch::Armed`]. On every hard cycle while
/// armed, every target is attempted in order; the latch moves to
/// [`MitigationLatch::Activated`] only when all of them succeed in the same
/// cycle. A partial failure leaves it armed and the next hard cycle retries all
/// targets.
pub struct MitigationController {
    guard: String,
    backend: Arc<dyn MitigationBackend>,
    targets: Vec<MitigationTarget>,
    latch: MitigationLatch,
}

impl MitigationController {
    /// Create an armed controller
    pub fn new(
        guard: impl Into<String>,
        backend: Arc<dyn MitigationBackend>,
        targets: Vec<MitigationTarget>,
    ) -> Self {
        Self {
            guard: guard.into(),
            backend,
            targets,
            latch: MitigationLatch::Armed,
        }
    }

    /// Current latch state
    pub fn latch(&self) -> MitigationLatch {
        self.latch
    }

    /// Configured targets
    pub fn targets(&self) -> &[MitigationTarget] {
        &self.targets
    }

    /// React to this cycle's severity
    pub async fn handle(
        &mut self,
        severity: Severity,
        spend: &AggregatedSpend,
        thresholds: &ThresholdConfig,
        notifier: &dyn Notifier,
    ) -> MitigationOutcome {
        match severity {
            Severity::Ok => MitigationOutcome::None,
            Severity::Soft => {
                let message = messages::soft_breach(&self.guard, spend, thresholds);
                warn!(guard = %self.guard, total_dollars = spend.total_dollars(), "{}", message);
                notifier.notify(&message).await;
                MitigationOutcome::Alerted
            }
            Severity::Hard => {
                let active = self.latch.is_activated();
                let message = messages::hard_breach(&self.guard, spend, thresholds, active);
                error!(guard = %self.guard, total_dollars = spend.total_dollars(), "{}", message);
                notifier.notify(&message).await;

                if active {
                    return MitigationOutcome::AlreadyActivated;
                }
                self.activate(notifier).await
            }
        }
    }

    async fn activate(&mut self, notifier: &dyn Notifier) -> MitigationOutcome {
        let mut results = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let outcome = self.backend.set_priority(target).await;

            let message = match &outcome {
                Ok(()) => {
                    info!(guard = %self.guard, target = %target.name, "Kill switch target applied");
                    messages::kill_switch_activated(&self.guard, target)
                }
                Err(e) => {
                    log_backend_error(&self.guard, target, e);
                    messages::kill_switch_failed(&self.guard, target, e)
                }
            };
            notifier.notify(&message).await;

            results.push(TargetResult {
                target: target.name.clone(),
                region: target.region.clone(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }

        let activated = results.iter().all(TargetResult::succeeded);
        if activated {
            self.latch.activate();
            info!(guard = %self.guard, targets = results.len(), "Kill switch latched");
        } else {
            warn!(
                guard = %self.guard,
                failed = results.iter().filter(|r| !r.succeeded()).count(),
                "Kill switch incomplete, retrying every target on the next hard cycle"
            );
        }

        MitigationOutcome::Attempted { results, activated }
    }
}

fn log_backend_error(guard: &str, target: &MitigationTarget, err: &BackendError) {
    match err {
        BackendError::MissingCredentials(_) => {
            error!(guard, target = %target.name, error = %err, "Kill switch credentials unavailable");
        }
        BackendError::InvalidTarget(_) => {
            error!(guard, target = %target.name, error = %err, "Kill switch target rejected");
        }
        BackendError::TransientConnectivity(_) | BackendError::Other(_) => {
            error!(guard, target = %target.name, error = %err, "Kill switch call failed");
        }
    }
}
