// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{HashMap, HashSet, VecDeque};

pub type Pid = i32;

/// One process as seen in a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: Pid,
    pub ppid: Pid,
    pub command: String,
    /// Share of one CPU core used since the previous snapshot (1.0 = one full core).
    pub cpu_fraction: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
}

/// Index over one snapshot, built once per tick and shared by every service
/// resolved during that tick.
#[derive(Debug, Default)]
pub struct ProcessTable<'a> {
    by_pid: HashMap<Pid, &'a ProcessSample>,
    children: HashMap<Pid, Vec<Pid>>,
}

impl<'a> ProcessTable<'a> {
    pub fn new(snapshot: &'a [ProcessSample]) -> Self {
        let mut by_pid = HashMap::with_capacity(snapshot.len());
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();

        for sample in snapshot {
            // A pid listed twice keeps its first entry; the later one is stale.
            if by_pid.insert(sample.pid, sample).is_some() {
                continue;
            }
            if sample.ppid != sample.pid {
                children.entry(sample.ppid).or_default().push(sample.pid);
            }
        }

        Self { by_pid, children }
    }

    pub fn get(&self, pid: Pid) -> Option<&'a ProcessSample> {
        self.by_pid.get(&pid).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_pid.len()
    }

    /// Returns `main_pid` and all of its live descendants.
    ///
    /// An absent or unknown main pid yields the empty set: the service simply
    /// has no live processes in this snapshot.
    pub fn resolve(&self, main_pid: Option<Pid>) -> HashSet<Pid> {
        let mut tree = HashSet::new();
        let Some(main_pid) = main_pid else {
            return tree;
        };
        if !self.by_pid.contains_key(&main_pid) {
            return tree;
        }

        let mut queue = VecDeque::from([main_pid]);
        tree.insert(main_pid);

        while let Some(pid) = queue.pop_front() {
            let Some(children) = self.children.get(&pid) else {
                continue;
            };
            for &child in children {
                // insert() returning false means we've been here already,
                // which only happens on a corrupted (cyclic) snapshot.
                if tree.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        tree
    }
}

/// Convenience wrapper for resolving a single service against a raw snapshot.
pub fn resolve(main_pid: Option<Pid>, snapshot: &[ProcessSample]) -> HashSet<Pid> {
    ProcessTable::new(snapshot).resolve(main_pid)
}
