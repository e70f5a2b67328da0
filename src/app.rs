//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{EvalContext, Notifier},
    dispatcher::{Dispatcher, DispatcherBuilder},
    internal_metrics::{Metrics, MetricsBuilder},
    outcome::DispatchOutcome,
    registry::{self, NotifierRegistry},
    task_manager::TaskManager,
};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Evaluations buffered per rule before reading input blocks.
const RULE_QUEUE_CAPACITY: usize = 256;

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    dispatcher: Arc<Dispatcher>,
    metrics_addr: Option<std::net::SocketAddr>,
    metrics_task: Option<JoinHandle<()>>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_addr
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Reads newline-delimited `EvalContext` JSON from `input`, dispatches each
    /// evaluation and writes every `DispatchOutcome` as a JSON line to
    /// `output`.
    ///
    /// Each rule gets its own worker, so evaluations of one rule are
    /// dispatched in input order while different rules run in parallel.
    /// Returns when the input is exhausted or shutdown is signalled, after
    /// all queued evaluations have been handled.
    pub async fn run<R, W>(self, input: R, output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outcome_tx, outcome_rx) = mpsc::channel::<DispatchOutcome>(1024);
        let writer = tokio::spawn(write_outcomes(outcome_rx, output));

        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        let mut watching = !*shutdown_rx.borrow();
        let mut lines = input.lines();
        let mut line_no = 0usize;
        let mut rule_queues: HashMap<i64, mpsc::Sender<EvalContext>> = HashMap::new();

        loop {
            let line = tokio::select! {
                biased;
                changed = shutdown_rx.changed(), if watching => {
                    match changed {
                        Ok(()) if *shutdown_rx.borrow() => {
                            info!("Shutdown signal received, no longer reading evaluations.");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => watching = false,
                    }
                    continue;
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                debug!("Input exhausted.");
                break;
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let ctx: EvalContext = match serde_json::from_str(&line) {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping malformed evaluation context");
                    continue;
                }
            };

            let rule_id = ctx.rule_id;
            let queue = rule_queues.entry(rule_id).or_insert_with(|| {
                let (tx, rx) = mpsc::channel(RULE_QUEUE_CAPACITY);
                self.task_manager.spawn(
                    format!("rule-worker-{rule_id}"),
                    run_rule_worker(self.dispatcher.clone(), rx, outcome_tx.clone()),
                );
                tx
            });
            if queue.send(ctx).await.is_err() {
                error!(line = line_no, "Rule worker has stopped, dropping evaluation.");
            }
        }

        // Closing the queues lets each worker drain and exit.
        drop(rule_queues);
        info!(
            workers = self.task_manager.active(),
            "Waiting for rule workers to finish."
        );
        self.task_manager.shutdown().await;
        drop(outcome_tx);
        writer.await??;
        if let Some(metrics_task) = self.metrics_task {
            metrics_task.abort();
        }
        info!("All dispatch cycles finished.");
        Ok(())
    }
}

/// Dispatches one rule's evaluations in the order they were queued.
async fn run_rule_worker(
    dispatcher: Arc<Dispatcher>,
    mut queue: mpsc::Receiver<EvalContext>,
    outcome_tx: mpsc::Sender<DispatchOutcome>,
) {
    while let Some(ctx) = queue.recv().await {
        let outcome = dispatcher.dispatch(ctx).await;
        if outcome_tx.send(outcome).await.is_err() {
            error!("Outcome writer has stopped, dropping outcome.");
        }
    }
}

async fn write_outcomes<W>(mut outcome_rx: mpsc::Receiver<DispatchOutcome>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(outcome) = outcome_rx.recv().await {
        let mut line = serde_json::to_vec(&outcome)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

/// Builder for the main application.
///
/// Separates constructing the components from running them and lets tests
/// swap in their own notifiers and metrics.
pub struct AppBuilder {
    config: Config,
    registry: Option<&'static NotifierRegistry>,
    notifier_override: Option<Vec<Arc<dyn Notifier>>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: None,
            notifier_override: None,
            metrics_override: None,
        }
    }

    /// Uses `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: &'static NotifierRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the configured notifiers, for testing.
    pub fn notifier_override(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifier_override = Some(notifiers);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx.clone());

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone())
                    .build(shutdown_rx.clone())
                    .await
            }
        };
        let (metrics_addr, metrics_task) = match metrics_server {
            Some((server, addr)) => {
                info!(%addr, "Serving metrics");
                (Some(addr), Some(tokio::spawn(server.run())))
            }
            None => (None, None),
        };

        // =========================================================================
        // 2. Build the Dispatcher
        // =========================================================================
        let builder = match self.notifier_override {
            Some(notifiers) => notifiers.into_iter().fold(
                DispatcherBuilder::new()
                    .policy((&config.suppression).into())
                    .notify_timeout(config.dispatch.notify_timeout())
                    .shutdown_grace(config.dispatch.shutdown_grace()),
                |builder, notifier| builder.notifier(notifier),
            ),
            None => {
                let registry = self
                    .registry
                    .or_else(registry::global)
                    .ok_or_else(|| anyhow!("notifier registry has not been installed"))?;
                DispatcherBuilder::from_config(&config, registry)?
            }
        };
        let dispatcher = builder
            .shutdown_rx(shutdown_rx)
            .metrics(metrics)
            .build()?;

        info!(
            notifiers = dispatcher.notifier_count(),
            "Dispatcher initialized."
        );

        Ok(App {
            task_manager,
            dispatcher: Arc::new(dispatcher),
            metrics_addr,
            metrics_task,
        })
    }
}
