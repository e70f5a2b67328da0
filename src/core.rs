//! Core domain types and service traits for alertrelay
//!
//! This module defines the evaluation snapshot handed over by the host
//! evaluator, the persisted notifier configuration, and the `Notifier`
//! capability every delivery channel implements.

use crate::error::NotifyError;
use crate::suppression::SuppressionPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The state an alert rule evaluated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Ok,
    Alerting,
    NoData,
    Paused,
    Error,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Ok => "ok",
            AlertState::Alerting => "alerting",
            AlertState::NoData => "no_data",
            AlertState::Paused => "paused",
            AlertState::Error => "error",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single series that matched the rule condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvalMatch {
    pub metric: String,
    /// `None` when the series produced a null value.
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Immutable snapshot of one alert rule evaluation.
///
/// Constructed by the host evaluator and shared read-only (behind an `Arc`)
/// with every notifier invoked during a dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvalContext {
    pub rule_id: i64,
    pub rule_name: String,
    /// Free-form message configured on the rule.
    #[serde(default)]
    pub rule_message: String,
    pub state: AlertState,
    #[serde(default)]
    pub previous_state: AlertState,
    #[serde(default)]
    pub eval_matches: Vec<EvalMatch>,
    /// Notification title generated by the host, e.g. `[Alerting] cpu-high`.
    #[serde(default)]
    pub title: String,
    /// Link back to the rule, generated by the host.
    #[serde(default)]
    pub rule_url: String,
    pub eval_time: DateTime<Utc>,
    /// Ids of the notifiers attached to this rule. Default notifiers apply
    /// in addition to these.
    #[serde(default)]
    pub notifier_ids: Vec<i64>,
}

impl EvalContext {
    /// Creates a context for `rule_id` evaluated at the current time.
    pub fn new(rule_id: i64, rule_name: &str, state: AlertState) -> Self {
        Self {
            rule_id,
            rule_name: rule_name.to_string(),
            state,
            title: format!("[{}] {}", title_case(state), rule_name),
            eval_time: Utc::now(),
            ..Default::default()
        }
    }
}

fn title_case(state: AlertState) -> &'static str {
    match state {
        AlertState::Ok => "OK",
        AlertState::Alerting => "Alerting",
        AlertState::NoData => "No Data",
        AlertState::Paused => "Paused",
        AlertState::Error => "Error",
    }
}

/// Persisted notifier configuration, read-only to the dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifierConfig {
    pub id: i64,
    /// Registry discriminator, e.g. `amazonsns`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Default notifiers apply to every rule.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

fn enabled_by_default() -> bool {
    true
}

impl NotifierConfig {
    /// Returns a trimmed, non-empty setting value.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// The last notification decision recorded for a (rule, notifier) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRecord {
    pub state: AlertState,
    pub time: DateTime<Utc>,
}

/// Fields shared by every notifier variant.
#[derive(Debug, Clone)]
pub struct NotifierBase {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub is_default: bool,
    pub policy: SuppressionPolicy,
}

impl NotifierBase {
    pub fn new(config: &NotifierConfig, policy: SuppressionPolicy) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            kind: config.kind.clone(),
            is_default: config.is_default,
            policy,
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// A channel-specific delivery implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Identity and suppression policy of this notifier instance.
    fn base(&self) -> &NotifierBase;

    /// Decides whether this evaluation should be delivered, given the last
    /// recorded decision for the same rule.
    ///
    /// The default defers to the configured `SuppressionPolicy`; variants may
    /// override it for channel-specific suppression.
    fn should_notify(&self, ctx: &EvalContext, last: Option<&NotificationRecord>) -> bool {
        self.base().policy.should_notify(ctx, last)
    }

    /// Delivers the evaluation. Must not retry internally.
    ///
    /// # Returns
    /// * `Ok(())` if the remote side accepted the notification
    /// * `Err(NotifyError::Transport)` on any delivery failure
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError>;
}

impl fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.base().id)
            .field("name", &self.base().name)
            .field("type", &self.base().kind)
            .finish()
    }
}
