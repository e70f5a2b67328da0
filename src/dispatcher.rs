//! The dispatch core.
//!
//! A `Dispatcher` owns the notifier instances built from configuration and
//! runs one dispatch cycle per evaluation:
//!
//! 1. **Resolving**: default notifiers plus those attached to the rule, in
//!    configuration order.
//! 2. **Filtering**: `should_notify` against the last recorded decision.
//! 3. **Invoking**: one task per eligible notifier, each bounded by the
//!    notify timeout.
//! 4. **Aggregating**: results in configuration order, regardless of
//!    completion order.
//! 5. **Done**: decisions recorded for every completed attempt.
//!
//! Cycles for the same rule are serialized; different rules run in parallel.

use crate::config::Config;
use crate::core::{EvalContext, Notifier, NotifierConfig};
use crate::error::NotifyError;
use crate::internal_metrics::Metrics;
use crate::outcome::{DeliveryStatus, DispatchOutcome, NotifierOutcome};
use crate::registry::NotifierRegistry;
use crate::state::StateTracker;
use crate::suppression::SuppressionPolicy;
use futures::FutureExt;
use moka::future::Cache;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, warn};

pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    disabled: HashSet<i64>,
    tracker: StateTracker,
    rule_locks: Cache<i64, Arc<Mutex<()>>>,
    notify_timeout: Duration,
    shutdown_grace: Duration,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Metrics,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("notifiers", &self.notifiers)
            .field("notify_timeout", &self.notify_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Number of enabled notifier instances.
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    pub fn state_tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Runs one dispatch cycle for `ctx` and reports the per-notifier results.
    ///
    /// Never fails: notifier errors are captured in the returned outcome.
    #[instrument(skip_all, fields(rule_id = ctx.rule_id, state = %ctx.state))]
    pub async fn dispatch(&self, ctx: EvalContext) -> DispatchOutcome {
        let rule_id = ctx.rule_id;
        if *self.shutdown_rx.borrow() {
            warn!("Dispatcher is shutting down, rejecting cycle.");
            self.metrics.increment_cycle("rejected");
            return DispatchOutcome::rejected(rule_id);
        }

        let lock = self
            .rule_locks
            .get_with(rule_id, async { Arc::new(Mutex::new(())) })
            .await;
        let _guard = lock.lock().await;

        let ctx = Arc::new(ctx);

        // Resolving
        let configured = self.resolve(&ctx);
        if configured.is_empty() {
            warn!("{}", NotifyError::NoNotifiersConfigured(rule_id));
            self.metrics.increment_cycle("no_notifiers_configured");
            return DispatchOutcome::no_notifiers(rule_id);
        }

        // Filtering
        let mut eligible = Vec::with_capacity(configured.len());
        let mut skipped = Vec::new();
        for notifier in configured {
            let id = notifier.base().id;
            let last = self.tracker.last_record(rule_id, id).await;
            if notifier.should_notify(&ctx, last.as_ref()) {
                eligible.push(notifier);
            } else {
                debug!(notifier_id = id, "Notification suppressed.");
                self.metrics.increment_suppressed(&notifier.base().kind);
                skipped.push(id);
            }
        }

        // Invoking
        let statuses = self.invoke(&ctx, &eligible).await;

        // Done
        let mut entries = Vec::with_capacity(eligible.len());
        for (notifier, status) in eligible.iter().zip(statuses) {
            let base = notifier.base();
            self.metrics.increment_notification(&base.kind, status.label());
            if status != DeliveryStatus::Abandoned
                && !self
                    .tracker
                    .record_decision(rule_id, base.id, ctx.state, ctx.eval_time)
                    .await
            {
                warn!(
                    notifier_id = base.id,
                    eval_time = %ctx.eval_time,
                    "Stale evaluation, keeping the newer notification record."
                );
            }
            entries.push(NotifierOutcome {
                notifier_id: base.id,
                notifier_name: base.name.clone(),
                notifier_type: base.kind.clone(),
                status,
            });
        }

        self.metrics.set_records(self.tracker.record_count().await);

        // Aggregating
        let outcome = DispatchOutcome::from_entries(rule_id, entries, skipped);
        self.metrics.increment_cycle(outcome.kind.as_str());
        info!(
            kind = outcome.kind.as_str(),
            attempted = outcome.entries.len(),
            delivered = outcome.delivered_count(),
            skipped = outcome.skipped.len(),
            "Dispatch cycle complete."
        );
        outcome
    }

    /// Default notifiers plus those attached to the rule, in configuration order.
    fn resolve(&self, ctx: &EvalContext) -> Vec<Arc<dyn Notifier>> {
        for id in &ctx.notifier_ids {
            if self.disabled.contains(id) {
                debug!(notifier_id = id, "Attached notifier is disabled.");
            } else if !self.notifiers.iter().any(|n| n.base().id == *id) {
                warn!(notifier_id = id, "Rule references an unknown notifier.");
            }
        }

        self.notifiers
            .iter()
            .filter(|n| n.base().is_default || ctx.notifier_ids.contains(&n.base().id))
            .cloned()
            .collect()
    }

    /// Runs every eligible notifier concurrently and returns their statuses
    /// in input order.
    async fn invoke(
        &self,
        ctx: &Arc<EvalContext>,
        eligible: &[Arc<dyn Notifier>],
    ) -> Vec<DeliveryStatus> {
        let mut statuses: Vec<Option<DeliveryStatus>> = vec![None; eligible.len()];
        let mut tasks = JoinSet::new();

        for (idx, notifier) in eligible.iter().enumerate() {
            let notifier = Arc::clone(notifier);
            let ctx = Arc::clone(ctx);
            let timeout = self.notify_timeout;
            let metrics = self.metrics.clone();

            tasks.spawn(async move {
                let start = Instant::now();
                let delivery = AssertUnwindSafe(notifier.notify(&ctx)).catch_unwind();
                let status = match tokio::time::timeout(timeout, delivery).await {
                    Ok(Ok(Ok(()))) => DeliveryStatus::Delivered,
                    Ok(Ok(Err(e))) => DeliveryStatus::Failed {
                        reason: e.to_string(),
                    },
                    Ok(Err(_)) => DeliveryStatus::Failed {
                        reason: "notifier panicked".to_string(),
                    },
                    Err(_) => DeliveryStatus::TimedOut {
                        after_ms: timeout.as_millis() as u64,
                    },
                };
                metrics.record_notify_duration(&notifier.base().kind, start.elapsed());
                (idx, status)
            });
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut watching = true;
        let mut deadline: Option<Instant> = None;
        if *shutdown_rx.borrow() {
            deadline = Some(Instant::now() + self.shutdown_grace);
            watching = false;
        }

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, status))) => statuses[idx] = Some(status),
                    // Aborted tasks are reported as abandoned below.
                    Some(Err(_)) => {}
                    None => break,
                },
                changed = shutdown_rx.changed(), if watching => {
                    match changed {
                        Ok(()) if *shutdown_rx.borrow() => {
                            info!(grace = ?self.shutdown_grace, "Shutdown requested during dispatch, waiting for in-flight notifiers.");
                            deadline = Some(Instant::now() + self.shutdown_grace);
                            watching = false;
                        }
                        Ok(()) => {}
                        Err(_) => watching = false,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(remaining = tasks.len(), "Shutdown deadline reached, abandoning in-flight notifiers.");
                    tasks.abort_all();
                    break;
                }
            }
        }

        statuses
            .into_iter()
            .map(|s| s.unwrap_or(DeliveryStatus::Abandoned))
            .collect()
    }
}

/// Builder for a `Dispatcher`.
///
/// Set the suppression policy before adding notifier configs: each notifier
/// captures the policy current at the time it is built.
pub struct DispatcherBuilder {
    notifiers: Vec<Arc<dyn Notifier>>,
    disabled: HashSet<i64>,
    policy: SuppressionPolicy,
    notify_timeout: Duration,
    shutdown_grace: Duration,
    tracker: Option<StateTracker>,
    shutdown_rx: Option<watch::Receiver<bool>>,
    metrics: Metrics,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        let defaults = crate::config::DispatchConfig::default();
        Self {
            notifiers: Vec::new(),
            disabled: HashSet::new(),
            policy: SuppressionPolicy::default(),
            notify_timeout: defaults.notify_timeout(),
            shutdown_grace: defaults.shutdown_grace(),
            tracker: None,
            shutdown_rx: None,
            metrics: Metrics::default(),
        }
    }

    /// Builds every configured notifier through `registry`.
    ///
    /// Fails on the first invalid or unknown notifier config.
    pub fn from_config(config: &Config, registry: &NotifierRegistry) -> Result<Self, NotifyError> {
        let tracker = match config.state.retention_seconds {
            Some(secs) => StateTracker::with_retention(Duration::from_secs(secs)),
            None => StateTracker::new(),
        };
        Self::new()
            .policy(SuppressionPolicy::from(&config.suppression))
            .notify_timeout(config.dispatch.notify_timeout())
            .shutdown_grace(config.dispatch.shutdown_grace())
            .state_tracker(tracker)
            .notifier_configs(registry, &config.notifiers)
    }

    pub fn policy(mut self, policy: SuppressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn state_tracker(mut self, tracker: StateTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validates and builds each config. Disabled configs are validated too
    /// but not dispatched to.
    pub fn notifier_configs(
        mut self,
        registry: &NotifierRegistry,
        configs: &[NotifierConfig],
    ) -> Result<Self, NotifyError> {
        for config in configs {
            let notifier = registry.build(config, self.policy.clone())?;
            if config.enabled {
                self.notifiers.push(notifier);
            } else {
                self.disabled.insert(config.id);
            }
        }
        Ok(self)
    }

    /// Adds an already constructed notifier.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn build(self) -> Result<Dispatcher, NotifyError> {
        let mut ids = HashSet::new();
        for notifier in &self.notifiers {
            if !ids.insert(notifier.base().id) {
                return Err(NotifyError::validation(format!(
                    "duplicate notifier id {}",
                    notifier.base().id
                )));
            }
        }

        let shutdown_rx = self.shutdown_rx.unwrap_or_else(|| {
            // No shutdown source: the sender is dropped and the receiver
            // keeps reporting `false`.
            watch::channel(false).1
        });

        Ok(Dispatcher {
            notifiers: self.notifiers,
            disabled: self.disabled,
            tracker: self.tracker.unwrap_or_default(),
            rule_locks: Cache::builder().build(),
            notify_timeout: self.notify_timeout,
            shutdown_grace: self.shutdown_grace,
            shutdown_rx,
            metrics: self.metrics,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
