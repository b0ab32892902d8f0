// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::{self, Write};

use log::warn;
use serde::Serialize;

use crate::events::{LifecycleEvent, StatsRecord};

/// Destination for everything the reconciler produces.
pub trait Sink {
    fn publish_lifecycle(&mut self, event: &LifecycleEvent);
    fn publish_stats(&mut self, record: &StatsRecord);
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    topic: String,
    payload: &'a T,
}

/// Writes one `{"topic": ..., "payload": ...}` object per line.
///
/// Topics are `<prefix>/<hostname>/<service>/events` and
/// `<prefix>/<hostname>/<service>/stats`.
/// Write failures are logged and dropped; a sink never stops the watcher.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    /// `<prefix>/<hostname>`
    topic_base: String,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout(topic_prefix: &str, hostname: &str) -> Self {
        Self::new(io::stdout(), topic_prefix, hostname)
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, topic_prefix: &str, hostname: &str) -> Self {
        Self {
            writer,
            topic_base: format!("{topic_prefix}/{hostname}"),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write<T: Serialize>(&mut self, service: &str, channel: &str, payload: &T) {
        let envelope = Envelope {
            topic: format!("{}/{service}/{channel}", self.topic_base),
            payload,
        };
        let result = serde_json::to_writer(&mut self.writer, &envelope)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        if let Err(e) = result {
            warn!("[{service}] failed to publish {channel}: {e}");
        }
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn publish_lifecycle(&mut self, event: &LifecycleEvent) {
        self.write(&event.service, "events", event);
    }

    fn publish_stats(&mut self, record: &StatsRecord) {
        self.write(&record.service, "stats", record);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::events::{ActivityState, EventKind};
    use serde_json::Value;

    fn lines(buf: Vec<u8>) -> Vec<Value> {
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_envelopes_carry_topic_and_payload() {
        let mut sink = JsonLinesSink::new(Vec::new(), "systemctl", "web-1");
        sink.publish_lifecycle(&LifecycleEvent {
            service: "nginx.service".to_string(),
            kind: EventKind::Created,
            timestamp: 100,
            activity_state: ActivityState::Active,
            main_pid: 812,
            sub_state: "running".to_string(),
            description: "web".to_string(),
        });
        sink.publish_stats(&StatsRecord {
            service: "nginx.service".to_string(),
            window_seconds: 30,
            avg_cpu_pct: 1.5,
            avg_mem_bytes: 2048.0,
            process_count: 3,
            timestamp: 130,
        });

        let out = lines(sink.into_inner());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["topic"], "systemctl/web-1/nginx.service/events");
        assert_eq!(out[0]["payload"]["kind"], "created");
        assert_eq!(out[0]["payload"]["main_pid"], 812);
        assert_eq!(out[1]["topic"], "systemctl/web-1/nginx.service/stats");
        assert_eq!(out[1]["payload"]["process_count"], 3);
        assert_eq!(out[1]["payload"]["avg_cpu_pct"], 1.5);
    }

    #[test]
    fn test_hosts_sharing_a_prefix_get_distinct_topics() {
        let record = StatsRecord {
            service: "nginx.service".to_string(),
            window_seconds: 30,
            avg_cpu_pct: 0.0,
            avg_mem_bytes: 0.0,
            process_count: 1,
            timestamp: 30,
        };

        let mut web1 = JsonLinesSink::new(Vec::new(), "systemctl", "web-1");
        let mut web2 = JsonLinesSink::new(Vec::new(), "systemctl", "web-2");
        web1.publish_stats(&record);
        web2.publish_stats(&record);

        let web1 = lines(web1.into_inner());
        let web2 = lines(web2.into_inner());
        assert_eq!(web1[0]["topic"], "systemctl/web-1/nginx.service/stats");
        assert_eq!(web2[0]["topic"], "systemctl/web-2/nginx.service/stats");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let mut sink = JsonLinesSink::new(BrokenPipe, "systemctl", "web-1");
        sink.publish_stats(&StatsRecord {
            service: "a.service".to_string(),
            window_seconds: 1,
            avg_cpu_pct: 0.0,
            avg_mem_bytes: 0.0,
            process_count: 0,
            timestamp: 0,
        });
    }
}
