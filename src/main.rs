//! alertrelay - Alert notification dispatcher
//!
//! Reads alert rule evaluations as newline-delimited JSON and dispatches each
//! one to its configured notification channels.

use alertrelay::{
    app::App,
    cli::Cli,
    config::Config,
    registry::{self, NotifierRegistry},
};
use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // Logs go to stderr; stdout carries the dispatch outcomes.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_writer(std::io::stderr)
        .init();

    let registry = registry::install(NotifierRegistry::with_builtin()?)?;

    if cli.list_types {
        let plugins: Vec<_> = registry.plugins().collect();
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    info!("alertrelay starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Notify Timeout: {}s", config.dispatch.notify_timeout_seconds);
    info!("Shutdown Grace: {}s", config.dispatch.shutdown_grace_seconds);
    match config.suppression.repeat_interval_seconds {
        Some(secs) => info!("Repeat Interval: {}s", secs),
        None => info!("Repeat Interval: Disabled"),
    }
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("Notifiers: {}", config.notifiers.len());
    info!("-------------------------------------------------------");

    // =========================================================================
    // Create Shutdown Channel
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Shutting down gracefully...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let app = App::builder(config)
        .registry(registry)
        .build(shutdown_rx)
        .await?;

    let output = tokio::io::stdout();
    match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            app.run(BufReader::new(file), output).await?;
        }
        None => {
            app.run(BufReader::new(tokio::io::stdin()), output).await?;
        }
    }

    info!("All tasks shut down. Exiting.");
    Ok(())
}
