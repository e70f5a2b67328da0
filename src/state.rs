//! Tracks the last notification decision per (rule, notifier) pair.

use crate::core::{AlertState, NotificationRecord};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

/// Concurrent store of the latest `NotificationRecord` for each
/// (rule id, notifier id) pair.
///
/// Records are overwritten on every decision and never removed by the
/// dispatch core. When a retention period is configured, pairs that have not
/// been touched for that long are pruned.
#[derive(Clone)]
pub struct StateTracker {
    records: Cache<(i64, i64), NotificationRecord>,
}

impl StateTracker {
    /// Creates a tracker that keeps records for the lifetime of the process.
    pub fn new() -> Self {
        Self {
            records: Cache::builder().build(),
        }
    }

    /// Creates a tracker that prunes pairs idle for longer than `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: Cache::builder().time_to_idle(retention).build(),
        }
    }

    /// Records the latest decision for the pair, replacing any previous one.
    ///
    /// A decision older than the stored one is ignored. Returns `false` in
    /// that case.
    pub async fn record_decision(
        &self,
        rule_id: i64,
        notifier_id: i64,
        state: AlertState,
        now: DateTime<Utc>,
    ) -> bool {
        let record = NotificationRecord { state, time: now };
        let result = self
            .records
            .entry((rule_id, notifier_id))
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if entry.value().time > now => Op::Nop,
                    _ => Op::Put(record),
                };
                std::future::ready(op)
            })
            .await;
        !matches!(result, CompResult::Unchanged(_))
    }

    /// Returns the last decision recorded for the pair, if any.
    pub async fn last_record(&self, rule_id: i64, notifier_id: i64) -> Option<NotificationRecord> {
        self.records.get(&(rule_id, notifier_id)).await
    }

    /// Number of live records, after applying pending evictions.
    pub async fn record_count(&self) -> u64 {
        self.records.run_pending_tasks().await;
        self.records.entry_count()
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
