#![allow(dead_code)]
use alertrelay::core::{AlertState, EvalContext, Notifier, NotifierBase, NotifierConfig};
use alertrelay::error::NotifyError;
use alertrelay::suppression::SuppressionPolicy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// What a `MockNotifier` does once its delay has elapsed.
#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Panic,
}

/// A notifier that counts its invocations, optionally sleeps, and then
/// succeeds or fails as configured.
pub struct MockNotifier {
    base: NotifierBase,
    behavior: Behavior,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    /// (rule id, state) of every successful delivery, in completion order.
    pub delivered: Arc<Mutex<Vec<(i64, AlertState)>>>,
    pub in_flight: Arc<AtomicUsize>,
    /// Highest number of concurrent `notify` calls observed.
    pub max_in_flight: Arc<AtomicUsize>,
}

impl MockNotifier {
    pub fn new(id: i64) -> Self {
        Self::with_policy(id, SuppressionPolicy::default())
    }

    pub fn with_policy(id: i64, policy: SuppressionPolicy) -> Self {
        let config = NotifierConfig {
            id,
            kind: "mock".to_string(),
            name: format!("mock-{id}"),
            is_default: true,
            enabled: true,
            settings: HashMap::new(),
        };
        Self {
            base: NotifierBase::new(&config, policy),
            behavior: Behavior::Succeed,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            delivered: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.behavior = Behavior::Fail(reason.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Only applies to rules that attach this notifier explicitly.
    pub fn attached_only(mut self) -> Self {
        self.base.is_default = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Succeed => {
                self.delivered.lock().unwrap().push((ctx.rule_id, ctx.state));
                Ok(())
            }
            Behavior::Fail(reason) => Err(NotifyError::Transport(reason.clone())),
            Behavior::Panic => panic!("mock notifier panicked"),
        }
    }
}
