/// alertrelay - Alert notification dispatch
///
/// This library takes the result of an alert rule evaluation and fans it out
/// to the notification channels configured for that rule, applying
/// per-channel suppression and reporting the outcome of every delivery.
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod formatting;
pub mod internal_metrics;
pub mod notifiers;
pub mod outcome;
pub mod registry;
pub mod state;
pub mod suppression;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::NotifyError;
pub use outcome::{CycleKind, DeliveryStatus, DispatchOutcome, NotifierOutcome};
pub use registry::{NotifierPlugin, NotifierRegistry};
