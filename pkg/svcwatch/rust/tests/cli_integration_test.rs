// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

const SVCWATCH_BIN: &str = env!("CARGO_BIN_EXE_svcwatch");

fn run_with_config(yaml: &str) -> Output {
    let mut config = NamedTempFile::new().unwrap();
    config.write_all(yaml.as_bytes()).unwrap();

    Command::new(SVCWATCH_BIN)
        .arg("--config")
        .arg(config.path())
        .arg("--once")
        .env_remove("DD_LOG_LEVEL")
        .env_remove("LOG_LEVEL")
        .output()
        .expect("Failed to execute svcwatch")
}

#[test]
fn test_exits_cleanly_when_nothing_enabled() {
    let output = run_with_config("enable_events: false\nenable_stats: false\n");

    assert!(
        output.status.success(),
        "svcwatch should exit 0, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty(), "nothing should be published");
}

#[test]
fn test_invalid_pattern_is_fatal() {
    let output = run_with_config("service_allowlist:\n  - \"re:nginx(\"\n");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("nginx("),
        "error should name the bad rule, got: {stderr}"
    );
}

#[test]
fn test_zero_window_is_fatal() {
    let output = run_with_config("stats_window_seconds: 0\n");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("stats_window_seconds must be greater than zero"),
        "got: {stderr}"
    );
}

#[test]
fn test_unparsable_config_is_fatal() {
    let output = run_with_config("tick_interval_seconds: [\n");
    assert!(!output.status.success());
}
