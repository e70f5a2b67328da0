//! Configuration management for alertrelay
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer built-in defaults, an `alertrelay.toml` file,
//! `ALERTRELAY_`-prefixed environment variables, and command-line overrides.

use crate::cli::Cli;
use crate::core::NotifierConfig;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "alertrelay.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level (or `tracing` filter directive) for the application.
    pub log_level: String,
    /// Bounds applied to each dispatch cycle.
    pub dispatch: DispatchConfig,
    /// Default `should_notify` policy.
    pub suppression: SuppressionConfig,
    /// Notification state tracking.
    pub state: StateConfig,
    /// Prometheus metrics endpoint.
    pub metrics: MetricsConfig,
    /// Notification channels, in configuration order.
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Upper bound on a single notifier invocation.
    pub notify_timeout_seconds: u64,
    /// How long in-flight notifiers may keep running after shutdown is signalled.
    pub shutdown_grace_seconds: u64,
}

impl DispatchConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            notify_timeout_seconds: 30,
            shutdown_grace_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct SuppressionConfig {
    /// Re-send an unchanged state after this many seconds. When unset, an
    /// unchanged state is only notified once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval_seconds: Option<u64>,
    #[serde(default)]
    pub notify_on_no_data: bool,
    #[serde(default)]
    pub notify_on_paused: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct StateConfig {
    /// Prune (rule, notifier) records idle for this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: SocketAddr::from(([127, 0, 0, 1], 9464)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            dispatch: DispatchConfig::default(),
            suppression: SuppressionConfig::default(),
            state: StateConfig::default(),
            metrics: MetricsConfig::default(),
            notifiers: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file named by
    /// `--config` (or `alertrelay.toml`), environment variables, and CLI
    /// overrides, in increasing order of precedence.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. ALERTRELAY_DISPATCH__NOTIFY_TIMEOUT_SECONDS=10
            .merge(Env::prefixed("ALERTRELAY_").split("__"))
            .merge(cli)
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that cannot produce a working dispatcher.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.notify_timeout_seconds == 0 {
            bail!("dispatch.notify_timeout_seconds must be greater than zero");
        }
        let mut seen = std::collections::HashSet::new();
        for notifier in &self.notifiers {
            if !seen.insert(notifier.id) {
                bail!("duplicate notifier id {}", notifier.id);
            }
        }
        Ok(())
    }
}
