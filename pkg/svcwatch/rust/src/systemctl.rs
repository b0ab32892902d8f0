// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Unit listing through the `systemctl` command line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, trace};
use serde::Deserialize;

use crate::errors::CollectError;
use crate::events::ActivityState;
use crate::reconciler::UnitStatus;
use crate::tree::Pid;
use crate::watcher::UnitSource;

/// One row of `systemctl list-units --output=json`.
#[derive(Debug, Deserialize)]
struct ListedUnit {
    unit: String,
    load: String,
    active: String,
    sub: String,
    #[serde(default)]
    description: String,
}

fn parse_unit_listing(output: &str) -> Result<Vec<ListedUnit>, CollectError> {
    serde_json::from_str(output).map_err(|e| CollectError::Parse {
        context: "systemctl list-units output".to_string(),
        reason: e.to_string(),
    })
}

/// Parse `systemctl show --property=Id --property=MainPID` output for several
/// units. Blocks are separated by blank lines and the property order within a
/// block is not guaranteed. Units without a main process are left out.
fn parse_main_pids(output: &str) -> HashMap<String, Pid> {
    let mut pids = HashMap::new();

    for block in output.split("\n\n") {
        let mut id = None;
        let mut main_pid = None;
        for line in block.lines() {
            match line.split_once('=') {
                Some(("Id", value)) => id = Some(value.trim()),
                Some(("MainPID", value)) => main_pid = value.trim().parse::<Pid>().ok(),
                _ => {}
            }
        }
        match (id, main_pid) {
            (Some(id), Some(pid)) if pid > 0 => {
                pids.insert(id.to_string(), pid);
            }
            (Some(id), _) => trace!("{id} has no main process"),
            _ => {}
        }
    }

    pids
}

#[derive(Debug)]
pub struct SystemctlSource {
    binary: PathBuf,
    include_inactive: bool,
}

impl SystemctlSource {
    pub fn new(include_inactive: bool) -> Self {
        Self::with_binary("systemctl", include_inactive)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, include_inactive: bool) -> Self {
        Self {
            binary: binary.into(),
            include_inactive,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, CollectError> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| CollectError::Io {
                context: format!("running {command}"),
                source,
            })?;

        if !output.status.success() {
            return Err(CollectError::CommandFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn list_units(&self) -> Result<Vec<ListedUnit>, CollectError> {
        let mut args = vec!["list-units", "--type=service", "--output=json", "--no-pager"];
        if self.include_inactive {
            args.push("--all");
        }
        let units = parse_unit_listing(&self.run(&args)?)?;
        Ok(units.into_iter().filter(|u| u.load == "loaded").collect())
    }

    fn main_pids(&self, units: &[ListedUnit]) -> Result<HashMap<String, Pid>, CollectError> {
        if units.is_empty() {
            return Ok(HashMap::new());
        }
        let mut args = vec!["show", "--property=Id", "--property=MainPID", "--no-pager"];
        args.extend(units.iter().map(|u| u.unit.as_str()));
        Ok(parse_main_pids(&self.run(&args)?))
    }
}

impl UnitSource for SystemctlSource {
    fn collect_unit_listing(&mut self) -> Result<Vec<UnitStatus>, CollectError> {
        let units = self.list_units()?;
        let pids = self.main_pids(&units)?;
        debug!("systemctl listed {} loaded units", units.len());

        Ok(units
            .into_iter()
            .map(|u| UnitStatus {
                main_pid: pids.get(&u.unit).copied(),
                activity: ActivityState::from_systemd(&u.active),
                name: u.unit,
                sub_state: u.sub,
                description: u.description,
            })
            .collect())
    }
}
