// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use log::{debug, trace};

use crate::errors::CollectError;
use crate::tree::{Pid, ProcessSample};
use crate::watcher::ProcessSource;

/// Clock ticks per second used by /proc/<pid>/stat. USER_HZ is fixed at 100
/// on every Linux architecture the agent ships for.
const USER_HZ: f64 = 100.0;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }

        if env::var("DOCKER_DD_AGENT").is_ok() && Path::new("/host").exists() {
            return "/host/proc".into();
        }

        "/proc".into()
    })
}

/// Fields of /proc/<pid>/stat we care about.
#[derive(Debug, PartialEq)]
struct Stat {
    command: String,
    ppid: Pid,
    cpu_ticks: u64,
}

impl Stat {
    fn parse(contents: &str) -> Option<Self> {
        // comm may contain spaces and parentheses, so split on the last ')'.
        let open = contents.find('(')?;
        let close = contents.rfind(')')?;
        let command = contents.get(open + 1..close)?.to_string();
        let mut fields = contents.get(close + 1..)?.split_whitespace();

        // Field numbering as in proc(5): 3 = state, 4 = ppid, 14 = utime, 15 = stime.
        let _state = fields.next()?;
        let ppid = fields.next()?.parse().ok()?;
        let mut fields = fields.skip(9);
        let utime: u64 = fields.next()?.parse().ok()?;
        let stime: u64 = fields.next()?.parse().ok()?;

        Some(Stat {
            command,
            ppid,
            cpu_ticks: utime + stime,
        })
    }
}

/// Resident memory in bytes from /proc/<pid>/status. Kernel threads have no
/// VmRSS line and report zero.
fn parse_rss_bytes(status: &str) -> u64 {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map_or(0, |kb| kb * 1024)
}

/// Process snapshot collector reading /proc directly.
///
/// CPU usage is derived from the utime+stime delta since the previous scan, so
/// the first scan reports zero CPU for every process.
#[derive(Debug)]
pub struct ProcfsSource {
    root: PathBuf,
    previous_ticks: HashMap<Pid, u64>,
    previous_scan: Option<Instant>,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new(root_path())
    }
}

impl ProcfsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            previous_ticks: HashMap::new(),
            previous_scan: None,
        }
    }

    fn read_process(&self, pid: Pid) -> Option<(Stat, u64)> {
        let dir = self.root.join(pid.to_string());
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let stat = Stat::parse(&stat)?;
        // The process may exit between the two reads; treat that as no memory.
        let rss = fs::read_to_string(dir.join("status"))
            .map(|status| parse_rss_bytes(&status))
            .unwrap_or(0);
        Some((stat, rss))
    }

    fn scan(&mut self, elapsed_secs: Option<f64>) -> Result<Vec<ProcessSample>, CollectError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CollectError::Io {
            context: format!("reading {}", self.root.display()),
            source,
        })?;

        let mut samples = Vec::new();
        let mut ticks = HashMap::new();

        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<Pid>().ok())
            else {
                continue;
            };
            let Some((stat, memory_bytes)) = self.read_process(pid) else {
                trace!("pid {pid} vanished during scan");
                continue;
            };

            let cpu_fraction = match (elapsed_secs, self.previous_ticks.get(&pid)) {
                (Some(elapsed), Some(&before)) if elapsed > 0.0 => {
                    // A smaller value means the pid was reused; no baseline then.
                    stat.cpu_ticks.saturating_sub(before) as f64 / USER_HZ / elapsed
                }
                _ => 0.0,
            };

            ticks.insert(pid, stat.cpu_ticks);
            samples.push(ProcessSample {
                pid,
                ppid: stat.ppid,
                command: stat.command,
                cpu_fraction,
                memory_bytes,
            });
        }

        self.previous_ticks = ticks;
        debug!("scanned {} processes under {}", samples.len(), self.root.display());
        Ok(samples)
    }
}

impl ProcessSource for ProcfsSource {
    fn collect_process_snapshot(&mut self) -> Result<Vec<ProcessSample>, CollectError> {
        let now = Instant::now();
        let elapsed = self
            .previous_scan
            .map(|before| now.duration_since(before).as_secs_f64());
        let samples = self.scan(elapsed)?;
        self.previous_scan = Some(now);
        Ok(samples)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stat_line(pid: Pid, comm: &str, ppid: Pid, utime: u64, stime: u64) -> String {
        format!(
            "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194560 1000 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 100000 250 18446744073709551615"
        )
    }

    fn write_process(root: &Path, pid: Pid, comm: &str, ppid: Pid, ticks: u64, rss_kb: Option<u64>) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), stat_line(pid, comm, ppid, ticks, 0)).unwrap();
        let status = match rss_kb {
            Some(kb) => format!("Name:\t{comm}\nPPid:\t{ppid}\nVmRSS:\t    {kb} kB\n"),
            None => format!("Name:\t{comm}\nPPid:\t{ppid}\n"),
        };
        fs::write(dir.join("status"), status).unwrap();
    }

    #[test]
    fn test_parse_stat() {
        let stat = Stat::parse(&stat_line(4242, "nginx", 1, 150, 50)).unwrap();
        assert_eq!(
            stat,
            Stat {
                command: "nginx".to_string(),
                ppid: 1,
                cpu_ticks: 200,
            }
        );
    }

    #[test]
    fn test_parse_stat_command_with_parens_and_spaces() {
        let stat = Stat::parse(&stat_line(7, "tmux: server (1)", 3, 1, 2)).unwrap();
        assert_eq!(stat.command, "tmux: server (1)");
        assert_eq!(stat.ppid, 3);
        assert_eq!(stat.cpu_ticks, 3);
    }

    #[test]
    fn test_parse_stat_truncated() {
        assert!(Stat::parse("").is_none());
        assert!(Stat::parse("12 (foo) S 1 2 3").is_none());
        assert!(Stat::parse("12 foo S 1").is_none());
    }

    #[test]
    fn test_parse_rss_bytes() {
        assert_eq!(parse_rss_bytes("Name:\tfoo\nVmRSS:\t  2048 kB\n"), 2048 * 1024);
        assert_eq!(parse_rss_bytes("Name:\tkthreadd\n"), 0);
    }

    #[test]
    fn test_scan_fake_proc() {
        let root = TempDir::new().unwrap();
        write_process(root.path(), 1, "systemd", 0, 10, Some(4096));
        write_process(root.path(), 100, "nginx", 1, 20, Some(1024));
        write_process(root.path(), 2, "kthreadd", 0, 0, None);
        fs::create_dir_all(root.path().join("self")).unwrap();
        fs::write(root.path().join("uptime"), "1.0 1.0").unwrap();
        // Process that exited after its directory was listed.
        fs::create_dir_all(root.path().join("999")).unwrap();

        let mut source = ProcfsSource::new(root.path());
        let mut samples = source.collect_process_snapshot().unwrap();
        samples.sort_by_key(|s| s.pid);

        let pids: Vec<Pid> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![1, 2, 100]);
        assert_eq!(samples[2].ppid, 1);
        assert_eq!(samples[2].command, "nginx");
        assert_eq!(samples[2].memory_bytes, 1024 * 1024);
        assert_eq!(samples[1].memory_bytes, 0);
        assert!(samples.iter().all(|s| s.cpu_fraction == 0.0));
    }

    #[test]
    fn test_cpu_fraction_from_tick_delta() {
        let root = TempDir::new().unwrap();
        write_process(root.path(), 100, "worker", 1, 1000, Some(1));
        write_process(root.path(), 200, "idle", 1, 500, Some(1));

        let mut source = ProcfsSource::new(root.path());
        source.scan(None).unwrap();

        // 50 ticks over 2 seconds at 100Hz is a quarter of a core.
        write_process(root.path(), 100, "worker", 1, 1050, Some(1));
        // Pid reused by a fresh process with fewer ticks.
        write_process(root.path(), 200, "idle", 1, 10, Some(1));
        write_process(root.path(), 300, "new", 1, 70, Some(1));

        let mut samples = source.scan(Some(2.0)).unwrap();
        samples.sort_by_key(|s| s.pid);

        assert!((samples[0].cpu_fraction - 0.25).abs() < 1e-9);
        assert_eq!(samples[1].cpu_fraction, 0.0);
        assert_eq!(samples[2].cpu_fraction, 0.0);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let mut source = ProcfsSource::new("/nonexistent/proc");
        assert!(matches!(
            source.collect_process_snapshot(),
            Err(CollectError::Io { .. })
        ));
    }
}
