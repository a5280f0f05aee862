//! Chat message formatting

use crate::models::{AggregatedSpend, MitigationTarget, ThresholdConfig};

fn degraded_note(spend: &AggregatedSpend) -> String {
    if !spend.degraded {
        return String::new();
    }
    let missing: Vec<&str> = spend.gaps.iter().map(|g| g.source_id.as_str()).collect();
    format!(" (partial data, missing: {})", missing.join(", "))
}

/// Hard threshold crossed
pub fn hard_breach(
    guard: &str,
    spend: &AggregatedSpend,
    thresholds: &ThresholdConfig,
    kill_switch_active: bool,
) -> String {
    let mut message = format!(
        "`URGENT: CODE RED` {guard}: hard threshold for a single day's spend reached. \
         Amount spent on {}: `${:.2}`{}. Hard threshold is `${:.2}`.",
        spend.as_of_date,
        spend.total_dollars(),
        degraded_note(spend),
        thresholds.hard_dollars,
    );
    if kill_switch_active {
        message.push_str(" Kill switch already activated.");
    }
    message
}

/// Soft threshold crossed
pub fn soft_breach(guard: &str, spend: &AggregatedSpend, thresholds: &ThresholdConfig) -> String {
    format!(
        "`ALERT` {guard}: soft threshold reached. Amount spent on {}: `${:.2}`{}. \
         Soft threshold is `${:.2}`.",
        spend.as_of_date,
        spend.total_dollars(),
        degraded_note(spend),
        thresholds.soft_dollars,
    )
}

/// A billing source could not be read
pub fn source_failed(guard: &str, source_id: &str, error: &dyn std::fmt::Display) -> String {
    format!("{guard}: failed to fetch billing data from `{source_id}`: {error}")
}

/// One kill switch target applied
pub fn kill_switch_activated(guard: &str, target: &MitigationTarget) -> String {
    format!(
        "{guard}: {} kill switch activated (rule priority set to {} in {}).",
        target.name, target.desired_priority, target.region
    )
}

/// One kill switch target failed
pub fn kill_switch_failed(
    guard: &str,
    target: &MitigationTarget,
    error: &dyn std::fmt::Display,
) -> String {
    format!(
        "{guard}: UNABLE to ACTIVATE {} kill switch in {}: {error}",
        target.name, target.region
    )
}

/// A cycle stopped before completing
pub fn cycle_aborted(guard: &str, reason: &str) -> String {
    format!("{guard}: budget check cycle aborted: {reason}")
}

/// Runpod prepaid balance below its threshold
pub fn low_balance(balance: f64, threshold: f64) -> String {
    format!(
        "*ALERT!! ALERT!! ALERT!!*\nCurrent runpod balance `${balance:.2}` is less than the \
         threshold `${threshold:.2}`"
    )
}

/// Too many always-on workers across the account
pub fn active_workers_exceeded(active: i64, threshold: i64, endpoints: usize) -> String {
    format!(
        "Active worker count is: `{active}` which is more than the threshold configured i.e. \
         `{threshold}`. Total number of endpoints: `{endpoints}`"
    )
}

/// An account check could not run
pub fn monitor_check_failed(check: &str, error: &dyn std::fmt::Display) -> String {
    format!("Runpod {check} check failed: {error}")
}

/// Cooldown applied to one application
pub fn cooldown_updated(seconds: u64, app: &str) -> String {
    format!("Successfully updated cooldown period to `{seconds} seconds` for {app}")
}

/// Cooldown update failed for one application
pub fn cooldown_failed(app: &str, error: &dyn std::fmt::Display) -> String {
    format!("An error occurred while updating {app}: {error}")
}
