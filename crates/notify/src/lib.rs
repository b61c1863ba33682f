//! Alert dispatch for operational alerts (spec.md §4.9's diagnostics
//! thresholds, the scheduler's emergency trigger, and similar).
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and email notifier implementations
//! - Minijinja template rendering for alert messages
//! - `Dispatcher` that routes alerts to channels configured per alert kind
//! - `AlertStore` for reading/claiming pending `alert_events` rows

pub mod dispatcher;
pub mod email;
pub mod store;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use store::AlertStore;
pub use traits::{AlertEvent, Notification, Notifier, NotifyError};
