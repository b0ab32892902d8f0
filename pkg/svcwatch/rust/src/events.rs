// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Payloads handed to the sink.
//!
//! Both shapes are flat and every field is always serialized, so consumers can
//! rely on a fixed schema. Absent values are written as `0` or `""`.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Active,
    Inactive,
}

impl ActivityState {
    /// Map a systemd `ActiveState` to the two states we track. Only `active`
    /// and `reloading` count as running.
    pub fn from_systemd(active: &str) -> Self {
        match active {
            "active" | "reloading" => ActivityState::Active,
            _ => ActivityState::Inactive,
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Active => write!(f, "active"),
            ActivityState::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Removed => write!(f, "removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub service: String,
    pub kind: EventKind,
    /// Unix seconds.
    pub timestamp: i64,
    pub activity_state: ActivityState,
    /// `0` when the unit has no main process.
    pub main_pid: i32,
    pub sub_state: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRecord {
    pub service: String,
    pub window_seconds: u64,
    pub avg_cpu_pct: f64,
    pub avg_mem_bytes: f64,
    /// Largest process tree seen during the window.
    pub process_count: usize,
    /// Unix seconds.
    pub timestamp: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_activity_state_from_systemd() {
        assert_eq!(ActivityState::from_systemd("active"), ActivityState::Active);
        assert_eq!(
            ActivityState::from_systemd("reloading"),
            ActivityState::Active
        );
        for state in ["inactive", "failed", "activating", "deactivating", ""] {
            assert_eq!(ActivityState::from_systemd(state), ActivityState::Inactive);
        }
    }

    #[test]
    fn test_lifecycle_event_schema_is_fixed() {
        let event = LifecycleEvent {
            service: "foo.service".to_string(),
            kind: EventKind::Removed,
            timestamp: 31,
            activity_state: ActivityState::Inactive,
            main_pid: 0,
            sub_state: String::new(),
            description: String::new(),
        };

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "service": "foo.service",
                "kind": "removed",
                "timestamp": 31,
                "activity_state": "inactive",
                "main_pid": 0,
                "sub_state": "",
                "description": "",
            })
        );
    }

    #[test]
    fn test_stats_record_schema_is_fixed() {
        let record = StatsRecord {
            service: "foo.service".to_string(),
            window_seconds: 30,
            avg_cpu_pct: 0.0,
            avg_mem_bytes: 0.0,
            process_count: 0,
            timestamp: 30,
        };

        let value: Value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys.len(),
            6,
            "all stats fields should be serialized: {keys:?}"
        );
        assert_eq!(value["process_count"], json!(0));
        assert_eq!(value["avg_cpu_pct"], json!(0.0));
    }
}
