//! Alerting for Budget Guard
//!
//! Threshold evaluation, chat message formatting and best-effort notification delivery.

mod evaluator;
pub mod messages;
mod notifier;

pub use evaluator::evaluate;
pub use notifier::{Delivery, LogNotifier, NotificationError, Notifier, SlackApi, SlackNotifier};
