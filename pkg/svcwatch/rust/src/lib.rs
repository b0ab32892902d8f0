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

pub mod config;
mod errors;
pub mod events;
pub mod filter;
pub mod metrics;
pub mod procfs;
pub mod reconciler;
pub mod sink;
pub mod systemctl;
pub mod tree;
pub mod watcher;

// Re-export the public API
pub use config::Config;
pub use errors::{CollectError, ConfigError};
pub use events::{ActivityState, EventKind, LifecycleEvent, StatsRecord};
pub use filter::{FilterEngine, Rule};
pub use metrics::MetricsAggregator;
pub use reconciler::{Observation, ServiceRecord, StateReconciler, TickOutput, UnitStatus};
pub use sink::{JsonLinesSink, Sink};
pub use tree::{Pid, ProcessSample, ProcessTable, resolve};
pub use watcher::{ProcessSource, UnitSource, Watcher};
