// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{LevelFilter, warn};
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::filter::FilterEngine;
use crate::reconciler::StateReconciler;

const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/svcwatch.yaml";
const FALLBACK_HOSTNAME: &str = "localhost";

fn system_hostname() -> String {
    match hostname::get().map(|name| name.into_string()) {
        Ok(Ok(name)) if !name.is_empty() => name,
        _ => {
            warn!("Could not resolve the system hostname, using {FALLBACK_HOSTNAME}");
            FALLBACK_HOSTNAME.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Prefix of every published topic, e.g. `systemctl/web-1/nginx.service/events`.
    pub topic_prefix: String,
    /// Second topic segment, so several hosts can share one sink. Defaults to
    /// the machine hostname.
    pub hostname: String,
    pub tick_interval_seconds: u64,
    pub stats_window_seconds: u64,
    /// How long a removed service is remembered. Zero forgets it on the next tick.
    pub destroyed_service_ttl_seconds: u64,
    pub service_allowlist: Vec<String>,
    pub service_denylist: Vec<String>,
    pub enable_events: bool,
    pub enable_stats: bool,
    /// Also list units that are loaded but not running.
    pub include_inactive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            topic_prefix: "systemctl".to_string(),
            hostname: system_hostname(),
            tick_interval_seconds: 5,
            stats_window_seconds: 30,
            destroyed_service_ttl_seconds: 86_400,
            service_allowlist: Vec::new(),
            service_denylist: Vec::new(),
            enable_events: true,
            enable_stats: true,
            include_inactive: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::Empty { field: "hostname" });
        }
        if self.tick_interval_seconds == 0 {
            return Err(ConfigError::NotPositive {
                field: "tick_interval_seconds",
            });
        }
        if self.enable_stats && self.stats_window_seconds == 0 {
            return Err(ConfigError::NotPositive {
                field: "stats_window_seconds",
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    /// Nothing to publish means nothing to run.
    pub fn is_enabled(&self) -> bool {
        self.enable_events || self.enable_stats
    }

    /// Build the reconciler described by this config. Fails on the first
    /// filter rule that is not a valid pattern.
    pub fn build_reconciler(&self) -> Result<StateReconciler, ConfigError> {
        self.validate()?;
        let filter = FilterEngine::new(&self.service_allowlist, &self.service_denylist)?;
        let window = self.enable_stats.then_some(self.stats_window_seconds);
        Ok(StateReconciler::new(
            filter,
            window,
            self.destroyed_service_ttl_seconds,
            self.enable_events,
        ))
    }
}

/// Resolution order: explicit path, then `DD_SVCWATCH_CONFIG`, then the
/// default location under /etc/datadog-agent.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var("DD_SVCWATCH_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads and validates the config file. A missing file is not an error: the
/// defaults are used instead.
pub fn load_config(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    let path = config_path(explicit);
    if !path.exists() {
        warn!("Config file not found at {}. Using defaults.", path.display());
        return Ok(Config::default());
    }
    let config = parse_config(&path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty file deserializes to null rather than an empty mapping.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a Go log level string. Unknown levels silently default to Info.
fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Priority: DD_LOG_LEVEL > LOG_LEVEL > config file > default Info
pub fn get_log_level(config: &Config) -> LevelFilter {
    if let Ok(level) = env::var("DD_LOG_LEVEL") {
        return parse_log_level(&level);
    }

    if let Ok(level) = env::var("LOG_LEVEL") {
        return parse_log_level(&level);
    }

    parse_log_level(&config.log_level)
}
