//! Kill switch data models

use serde::{Deserialize, Serialize};

/// A load balancer rule to deprioritize when the hard threshold is crossed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationTarget {
    /// Human-readable label used in notifications (e.g. "LFMH/ICO")
    pub name: String,
    /// Backend identifier of the rule (an ALB listener rule ARN)
    pub target_id: String,
    /// Region the rule lives in
    pub region: String,
    /// Priority the rule is moved to
    pub desired_priority: i32,
}

/// One-way switch recording that every target was mitigated successfully
///
/// Held in memory only: a process restart re-arms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MitigationLatch {
    /// Mitigation is attempted on the next hard breach
    #[default]
    Armed,
    /// Mitigation fully succeeded; no further backend calls
    Activated,
}

impl MitigationLatch {
    /// Whether the kill switch has been fully applied
    pub fn is_activated(self) -> bool {
        matches!(self, Self::Activated)
    }

    /// Move to `Activated`; there is no way back
    pub fn activate(&mut self) {
        *self = Self::Activated;
    }
}
