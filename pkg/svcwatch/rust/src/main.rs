// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dd_svcwatch::config::{get_log_level, load_config};
use dd_svcwatch::procfs::ProcfsSource;
use dd_svcwatch::systemctl::SystemctlSource;
use dd_svcwatch::{JsonLinesSink, Watcher};
use log::{LevelFilter, info};
use tokio::signal::unix::{SignalKind, signal};

/// Watches systemd services and reports lifecycle changes and resource usage.
#[derive(Debug, Parser)]
#[command(name = "svcwatch", version)]
struct Args {
    /// Path to the config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Overrides the configured level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

fn verbosity_level(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config).context("Failed to load svcwatch config")?;

    let level = verbosity_level(args.verbose).unwrap_or_else(|| get_log_level(&config));
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    info!("svcwatch starting (version {})", env!("CARGO_PKG_VERSION"));

    if !config.is_enabled() {
        info!("Both events and stats are disabled, nothing to do. Exiting.");
        return Ok(());
    }

    let reconciler = config
        .build_reconciler()
        .context("Invalid service filter configuration")?;
    let mut watcher = Watcher::new(
        SystemctlSource::new(config.include_inactive),
        ProcfsSource::default(),
        reconciler,
        JsonLinesSink::stdout(&config.topic_prefix, &config.hostname),
        config.tick_interval(),
    );

    if args.once {
        watcher.tick().await;
        return Ok(());
    }

    // Install handlers before the first tick so an early signal is not lost.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    watcher
        .run_until(async {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        })
        .await;

    info!("svcwatch shutting down");
    Ok(())
}
