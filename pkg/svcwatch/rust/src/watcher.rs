// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use time::OffsetDateTime;
use tokio::task;
use tokio::time::MissedTickBehavior;

use crate::errors::CollectError;
use crate::reconciler::{Observation, StateReconciler, TickOutput, UnitStatus};
use crate::sink::Sink;
use crate::tree::ProcessSample;

/// Produces one snapshot of every live process.
pub trait ProcessSource: Send + 'static {
    fn collect_process_snapshot(&mut self) -> Result<Vec<ProcessSample>, CollectError>;
}

/// Produces the current list of service units.
pub trait UnitSource: Send + 'static {
    fn collect_unit_listing(&mut self) -> Result<Vec<UnitStatus>, CollectError>;
}

/// Runs `f` against the source on the blocking pool. Both collectors shell out
/// or walk /proc, neither of which belongs on the runtime threads.
async fn collect_blocking<S, T, F>(source: &Arc<Mutex<S>>, f: F) -> Result<T, CollectError>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T, CollectError> + Send + 'static,
{
    let source = Arc::clone(source);
    task::spawn_blocking(move || {
        let mut guard = source
            .lock()
            .map_err(|_| CollectError::Join("collector lock poisoned".to_string()))?;
        f(&mut *guard)
    })
    .await
    .map_err(|e| CollectError::Join(e.to_string()))?
}

/// Drives the reconciler on a fixed interval and forwards its output to a sink.
pub struct Watcher<U, P, S> {
    units: Arc<Mutex<U>>,
    processes: Arc<Mutex<P>>,
    reconciler: StateReconciler,
    sink: S,
    interval: Duration,
}

impl<U, P, S> Watcher<U, P, S>
where
    U: UnitSource,
    P: ProcessSource,
    S: Sink,
{
    pub fn new(
        units: U,
        processes: P,
        reconciler: StateReconciler,
        sink: S,
        interval: Duration,
    ) -> Self {
        Self {
            units: Arc::new(Mutex::new(units)),
            processes: Arc::new(Mutex::new(processes)),
            reconciler,
            sink,
            interval,
        }
    }

    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Collect both sources concurrently. The process snapshot is only taken
    /// when stats are enabled.
    async fn observe(&self) -> Result<Observation, CollectError> {
        let units = collect_blocking(&self.units, |s| s.collect_unit_listing());
        if !self.reconciler.stats_enabled() {
            return Ok(Observation {
                units: units.await?,
                processes: None,
            });
        }

        let processes = collect_blocking(&self.processes, |s| s.collect_process_snapshot());
        let (units, processes) = tokio::join!(units, processes);
        Ok(Observation {
            units: units?,
            processes: Some(processes?),
        })
    }

    /// Run a single collect, reconcile and publish pass.
    pub async fn tick(&mut self) -> TickOutput {
        let observation = self.observe().await;
        let out = self.reconciler.tick(observation, OffsetDateTime::now_utc());

        for event in &out.events {
            info!("[{}] {}", event.service, event.kind);
            self.sink.publish_lifecycle(event);
        }
        for record in &out.stats {
            self.sink.publish_stats(record);
        }
        debug!(
            "tick done: {} events, {} stats records",
            out.events.len(),
            out.stats.len()
        );
        out
    }

    /// Tick until `shutdown` resolves. Shutdown is only observed between
    /// ticks, so a tick in progress always runs to completion.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, stopping watcher");
                    return;
                }
                _ = interval.tick() => {}
            }
            self.tick().await;
        }
    }
}
