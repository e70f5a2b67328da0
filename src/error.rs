//! Error taxonomy for the dispatch core.
//!
//! Setup-time errors (`Validation`, `UnknownType`, `DuplicateType`) surface
//! while the registry and notifier set are being built. Delivery-time errors
//! (`Transport`, `Timeout`) are captured per notifier into a
//! `DispatchOutcome` and never abort sibling notifiers.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Bad or missing notifier configuration.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A notifier config references a type that was never registered.
    #[error("unknown notifier type: {0}")]
    UnknownType(String),

    /// A notifier type was registered twice.
    #[error("notifier type already registered: {0}")]
    DuplicateType(String),

    /// The delivery attempt failed (network, auth, remote rejection).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The notifier did not complete within the configured bound.
    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),

    /// The rule has no enabled notifiers.
    #[error("no notifiers configured for rule {0}")]
    NoNotifiersConfigured(i64),

    #[error("failed to encode payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotifyError {
    /// Shorthand for a `Validation` error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Transport(e.to_string())
    }
}
