// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;

use log::{debug, info, warn};
use time::{Duration, OffsetDateTime};

use crate::errors::CollectError;
use crate::events::{ActivityState, EventKind, LifecycleEvent, StatsRecord};
use crate::filter::FilterEngine;
use crate::metrics::MetricsAggregator;
use crate::tree::{Pid, ProcessSample, ProcessTable};

/// One entry of a unit listing, as reported by the service manager.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitStatus {
    pub name: String,
    pub activity: ActivityState,
    pub main_pid: Option<Pid>,
    pub sub_state: String,
    pub description: String,
}

/// Everything collected for a single tick. `processes` is `None` when stats
/// are disabled and no snapshot was taken.
#[derive(Debug, Default)]
pub struct Observation {
    pub units: Vec<UnitStatus>,
    pub processes: Option<Vec<ProcessSample>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub name: String,
    pub activity: ActivityState,
    pub main_pid: Option<Pid>,
    pub sub_state: String,
    pub description: String,
    pub first_observed: OffsetDateTime,
    pub last_observed: OffsetDateTime,
    pub tombstoned_at: Option<OffsetDateTime>,
}

impl ServiceRecord {
    fn new(unit: &UnitStatus, now: OffsetDateTime) -> Self {
        Self {
            name: unit.name.clone(),
            activity: unit.activity,
            main_pid: unit.main_pid,
            sub_state: unit.sub_state.clone(),
            description: unit.description.clone(),
            first_observed: now,
            last_observed: now,
            tombstoned_at: None,
        }
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }

    /// Only live, active services feed the stats windows.
    fn is_sampled(&self) -> bool {
        !self.is_tombstoned() && self.activity == ActivityState::Active
    }

    /// Copy the observable attributes from `unit`. Returns whether anything
    /// changed.
    fn apply(&mut self, unit: &UnitStatus, now: OffsetDateTime) -> bool {
        let changed = self.activity != unit.activity
            || self.main_pid != unit.main_pid
            || self.sub_state != unit.sub_state
            || self.description != unit.description;

        if changed {
            self.activity = unit.activity;
            self.main_pid = unit.main_pid;
            self.sub_state.clone_from(&unit.sub_state);
            self.description.clone_from(&unit.description);
        }
        self.last_observed = now;
        changed
    }

    fn event(&self, kind: EventKind, now: OffsetDateTime) -> LifecycleEvent {
        LifecycleEvent {
            service: self.name.clone(),
            kind,
            timestamp: now.unix_timestamp(),
            activity_state: self.activity,
            main_pid: self.main_pid.unwrap_or(0),
            sub_state: self.sub_state.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<LifecycleEvent>,
    pub stats: Vec<StatsRecord>,
    /// Set when the observation was unusable and the tick had no effect.
    pub skipped: bool,
}

impl TickOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Owns the authoritative service table and drives the lifecycle state
/// machine and the stats windows from it.
///
/// Per service: unseen -> tracked (active/inactive) -> tombstoned -> purged.
/// A tombstoned service that is reported again before the TTL runs out goes
/// back to tracked with an `updated` event.
#[derive(Debug)]
pub struct StateReconciler {
    filter: FilterEngine,
    records: HashMap<String, ServiceRecord>,
    aggregator: Option<MetricsAggregator>,
    tombstone_ttl: Duration,
    emit_events: bool,
}

impl StateReconciler {
    /// `window_seconds` of `None` disables stats entirely.
    pub fn new(
        filter: FilterEngine,
        window_seconds: Option<u64>,
        tombstone_ttl_seconds: u64,
        emit_events: bool,
    ) -> Self {
        Self {
            filter,
            records: HashMap::new(),
            aggregator: window_seconds.map(MetricsAggregator::new),
            tombstone_ttl: Duration::seconds(
                i64::try_from(tombstone_ttl_seconds).unwrap_or(i64::MAX),
            ),
            emit_events,
        }
    }

    pub fn stats_enabled(&self) -> bool {
        self.aggregator.is_some()
    }

    pub fn record(&self, name: &str) -> Option<&ServiceRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values()
    }

    pub fn aggregator(&self) -> Option<&MetricsAggregator> {
        self.aggregator.as_ref()
    }

    /// Run one reconciliation pass.
    ///
    /// A failed collection, a missing snapshot while stats are enabled, or an
    /// empty unit listing all skip the tick without touching any state.
    pub fn tick(
        &mut self,
        observation: Result<Observation, CollectError>,
        now: OffsetDateTime,
    ) -> TickOutput {
        let observation = match observation {
            Ok(observation) => observation,
            Err(e) => {
                warn!("skipping tick, collection failed: {e}");
                return TickOutput::skipped();
            }
        };

        if observation.units.is_empty() {
            warn!("skipping tick, unit listing came back empty");
            return TickOutput::skipped();
        }
        if self.stats_enabled() && observation.processes.is_none() {
            warn!("skipping tick, no process snapshot");
            return TickOutput::skipped();
        }

        let mut out = TickOutput::default();
        let candidates = self.candidates(&observation.units);

        self.purge_expired(now);
        self.reconcile(&candidates, now, &mut out.events);

        if let (Some(aggregator), Some(processes)) =
            (self.aggregator.as_mut(), observation.processes.as_deref())
        {
            let table = ProcessTable::new(processes);
            for record in self.records.values().filter(|r| r.is_sampled()) {
                let tree = table.resolve(record.main_pid);
                aggregator.record_tick(&record.name, &tree, &table, now);
            }
            out.stats = aggregator.flush_if_due(now);
        }

        if !self.emit_events {
            out.events.clear();
        }
        out
    }

    fn candidates<'a>(&self, units: &'a [UnitStatus]) -> HashMap<&'a str, &'a UnitStatus> {
        let mut candidates = HashMap::with_capacity(units.len());
        for unit in units {
            if !self.filter.is_included(&unit.name) {
                continue;
            }
            if candidates.insert(unit.name.as_str(), unit).is_some() {
                debug!("unit {} listed more than once, keeping last entry", unit.name);
            }
        }
        candidates
    }

    fn purge_expired(&mut self, now: OffsetDateTime) {
        let ttl = self.tombstone_ttl;
        self.records.retain(|name, record| match record.tombstoned_at {
            Some(at) if now - at >= ttl => {
                info!("[{name}] tombstone expired, forgetting service");
                false
            }
            _ => true,
        });
    }

    fn reconcile(
        &mut self,
        candidates: &HashMap<&str, &UnitStatus>,
        now: OffsetDateTime,
        events: &mut Vec<LifecycleEvent>,
    ) {
        // Event order: removals and reappearances, then attribute updates,
        // then additions. Each group is sorted by name.
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        let mut updates = Vec::new();

        for name in &names {
            let Some(record) = self.records.get_mut(name) else {
                continue;
            };
            match (candidates.get(name.as_str()), record.tombstoned_at) {
                (None, None) => {
                    info!("[{name}] no longer reported, marking removed");
                    record.tombstoned_at = Some(now);
                    events.push(record.event(EventKind::Removed, now));
                    if let Some(aggregator) = self.aggregator.as_mut() {
                        aggregator.drop_service(name);
                    }
                }
                (None, Some(_)) => {}
                (Some(unit), Some(_)) => {
                    info!("[{name}] reported again before tombstone expiry");
                    record.tombstoned_at = None;
                    record.apply(unit, now);
                    events.push(record.event(EventKind::Updated, now));
                }
                (Some(unit), None) => {
                    if record.apply(unit, now) {
                        debug!(
                            "[{name}] changed: {} pid={:?} sub={}",
                            record.activity, record.main_pid, record.sub_state
                        );
                        updates.push(record.event(EventKind::Updated, now));
                    }
                }
            }
        }
        events.append(&mut updates);

        let mut added: Vec<&UnitStatus> = candidates
            .values()
            .filter(|unit| !self.records.contains_key(&unit.name))
            .copied()
            .collect();
        added.sort_by(|a, b| a.name.cmp(&b.name));

        for unit in added {
            info!("[{}] discovered ({})", unit.name, unit.activity);
            let record = ServiceRecord::new(unit, now);
            events.push(record.event(EventKind::Created, now));
            self.records.insert(unit.name.clone(), record);
        }
    }
}
