//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `alertrelay.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Dispatches alert evaluations to the configured notification channels.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read newline-delimited evaluation contexts from FILE instead of stdin.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Logging level or filter directive.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Per-notifier timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub notify_timeout: Option<u64>,

    /// Re-send an unchanged alert state after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub repeat_interval: Option<u64>,

    /// Print the registered notifier types and exit.
    #[arg(long)]
    pub list_types: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            insert_path(&mut dict, "log_level", Value::from(level.clone()));
        }

        if let Some(timeout) = self.notify_timeout {
            insert_path(
                &mut dict,
                "dispatch.notify_timeout_seconds",
                Value::from(timeout),
            );
        }

        if let Some(interval) = self.repeat_interval {
            insert_path(
                &mut dict,
                "suppression.repeat_interval_seconds",
                Value::from(interval),
            );
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

/// Inserts `value` at a dotted `path`, creating intermediate dictionaries.
fn insert_path(dict: &mut Dict, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            dict.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = dict
                .entry(head.to_string())
                .or_insert_with(|| Value::from(Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_nested() {
        let cli = Cli {
            notify_timeout: Some(3),
            ..Default::default()
        };
        let data = cli.data().unwrap();
        let dict = &data[&Profile::Default];

        let dispatch = dict["dispatch"].as_dict().unwrap();
        assert_eq!(dispatch["notify_timeout_seconds"].to_u128(), Some(3));
        assert!(!dict.contains_key("suppression"));
    }
}
