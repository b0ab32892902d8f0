// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{BTreeMap, HashSet};

use log::{debug, trace};
use time::{Duration, OffsetDateTime};

use crate::events::StatsRecord;
use crate::tree::{Pid, ProcessTable};

#[derive(Debug, Clone, PartialEq)]
pub struct WindowAccumulator {
    pub window_start: OffsetDateTime,
    pub sample_count: u64,
    pub cpu_sum: f64,
    pub memory_sum: f64,
    pub peak_process_count: usize,
}

impl WindowAccumulator {
    fn new(window_start: OffsetDateTime) -> Self {
        Self {
            window_start,
            sample_count: 0,
            cpu_sum: 0.0,
            memory_sum: 0.0,
            peak_process_count: 0,
        }
    }
}

/// Rolling per-service usage windows.
#[derive(Debug)]
pub struct MetricsAggregator {
    window: Duration,
    window_seconds: u64,
    accumulators: BTreeMap<String, WindowAccumulator>,
}

impl MetricsAggregator {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window: Duration::seconds(i64::try_from(window_seconds).unwrap_or(i64::MAX)),
            window_seconds,
            accumulators: BTreeMap::new(),
        }
    }

    /// Add one sample for `service`. An empty tree still counts as a sample
    /// with zero usage.
    pub fn record_tick(
        &mut self,
        service: &str,
        tree: &HashSet<Pid>,
        processes: &ProcessTable<'_>,
        now: OffsetDateTime,
    ) {
        let (cpu, memory) = tree
            .iter()
            .filter_map(|pid| processes.get(*pid))
            .fold((0.0, 0.0), |(cpu, memory), sample| {
                (cpu + sample.cpu_fraction, memory + sample.memory_bytes as f64)
            });

        let acc = self
            .accumulators
            .entry(service.to_string())
            .or_insert_with(|| WindowAccumulator::new(now));
        acc.sample_count += 1;
        acc.cpu_sum += cpu;
        acc.memory_sum += memory;
        acc.peak_process_count = acc.peak_process_count.max(tree.len());

        trace!(
            "[{service}] sample {}: {} pids, cpu={cpu:.4}, mem={memory}",
            acc.sample_count,
            tree.len()
        );
    }

    /// Close every window that has run for at least the configured length.
    pub fn flush_if_due(&mut self, now: OffsetDateTime) -> Vec<StatsRecord> {
        let mut records = Vec::new();
        let window = self.window;
        let window_seconds = self.window_seconds;

        self.accumulators.retain(|service, acc| {
            if now - acc.window_start < window {
                return true;
            }
            if acc.sample_count == 0 {
                debug!("[{service}] dropping window with no samples");
                return false;
            }

            let count = acc.sample_count as f64;
            records.push(StatsRecord {
                service: service.clone(),
                window_seconds,
                avg_cpu_pct: acc.cpu_sum / count * 100.0,
                avg_mem_bytes: acc.memory_sum / count,
                process_count: acc.peak_process_count,
                timestamp: now.unix_timestamp(),
            });
            *acc = WindowAccumulator::new(now);
            true
        });

        records
    }

    /// Forget a service's window without emitting anything for it.
    pub fn drop_service(&mut self, service: &str) {
        if self.accumulators.remove(service).is_some() {
            debug!("[{service}] dropped partial stats window");
        }
    }

    pub fn accumulator(&self, service: &str) -> Option<&WindowAccumulator> {
        self.accumulators.get(service)
    }
}
