//! The per-cycle report handed back to the host evaluator.

use serde::Serialize;

/// Overall result of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    /// Every attempted notifier delivered.
    Success,
    /// At least one attempted notifier delivered.
    PartialSuccess,
    /// Every attempted notifier failed.
    Failed,
    /// No notifier was eligible after suppression.
    Skipped,
    NoNotifiersConfigured,
    /// The dispatcher was shutting down and did not start the cycle.
    Rejected,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::Success => "success",
            CycleKind::PartialSuccess => "partial_success",
            CycleKind::Failed => "failed",
            CycleKind::Skipped => "skipped",
            CycleKind::NoNotifiersConfigured => "no_notifiers_configured",
            CycleKind::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
    TimedOut { after_ms: u64 },
    /// Still running when the shutdown deadline passed.
    Abandoned,
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }

    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed { .. } => "failed",
            DeliveryStatus::TimedOut { .. } => "timed_out",
            DeliveryStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifierOutcome {
    pub notifier_id: i64,
    pub notifier_name: String,
    pub notifier_type: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub rule_id: i64,
    pub kind: CycleKind,
    /// One entry per attempted notifier, in configuration order.
    pub entries: Vec<NotifierOutcome>,
    /// Notifiers excluded by `should_notify`.
    pub skipped: Vec<i64>,
}

impl DispatchOutcome {
    /// Builds an outcome and derives its kind from the entries.
    pub fn from_entries(rule_id: i64, entries: Vec<NotifierOutcome>, skipped: Vec<i64>) -> Self {
        let delivered = entries.iter().filter(|e| e.status.is_delivered()).count();
        let kind = if entries.is_empty() {
            CycleKind::Skipped
        } else if delivered == entries.len() {
            CycleKind::Success
        } else if delivered > 0 {
            CycleKind::PartialSuccess
        } else {
            CycleKind::Failed
        };
        Self {
            rule_id,
            kind,
            entries,
            skipped,
        }
    }

    pub fn no_notifiers(rule_id: i64) -> Self {
        Self {
            rule_id,
            kind: CycleKind::NoNotifiersConfigured,
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn rejected(rule_id: i64) -> Self {
        Self {
            rule_id,
            kind: CycleKind::Rejected,
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_delivered()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NotifierOutcome> {
        self.entries.iter().filter(|e| !e.status.is_delivered())
    }
}
