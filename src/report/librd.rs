//! Extraction of client statistics emitted by librdkafka.
//!
//! The client hands over a raw JSON document on every statistics tick.
//! The handler walks a configurable set of dotted paths at top level and
//! under each entry of the `brokers` map, and forwards whatever it finds
//! to the statsd sink. Unknown paths and malformed documents are skipped;
//! statistics never fail a run.

use crate::report::statsd::StatsdSink;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Dotted JSON paths to extract, split by scope.
#[derive(Debug, Clone)]
pub struct StatNames {
    pub top_level: Vec<String>,
    pub brokers: Vec<String>,
}

impl StatNames {
    pub fn counters() -> Self {
        Self {
            top_level: names(&["tx", "rx", "txmsgs", "rxmsgs"]),
            brokers: names(&["tx", "rx"]),
        }
    }

    pub fn gauges() -> Self {
        Self {
            top_level: names(&["msg_cnt", "msg_size"]),
            brokers: names(&[
                "outbuf_msg_cnt",
                "int_latency.p99",
                "int_latency.avg",
                "outbuf_latency.p99",
                "outbuf_latency.avg",
                "throttle.avg",
                "throttle.p99",
                "rtt.avg",
                "rtt.p99",
            ]),
        }
    }
}

fn names(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|n| (*n).to_string()).collect()
}

pub struct LibrdStatsHandler {
    sink: Arc<StatsdSink>,
    counters: StatNames,
    gauges: StatNames,
    tags: Vec<String>,
}

impl LibrdStatsHandler {
    pub fn new(sink: Arc<StatsdSink>, tags: Vec<String>) -> Self {
        Self {
            sink,
            counters: StatNames::counters(),
            gauges: StatNames::gauges(),
            tags,
        }
    }

    #[cfg(test)]
    fn with_names(sink: Arc<StatsdSink>, counters: StatNames, gauges: StatNames) -> Self {
        Self {
            sink,
            counters,
            gauges,
            tags: Vec::new(),
        }
    }

    /// Digest one raw statistics document.
    pub fn handle(&self, raw: &[u8]) {
        let stats: Value = match serde_json::from_slice(raw) {
            Ok(stats) => stats,
            Err(err) => {
                debug!(error = %err, "unparseable client statistics");
                return;
            }
        };
        for name in &self.counters.top_level {
            if let Some(value) = lookup(&stats, name).and_then(Value::as_u64) {
                self.sink.count(&format!("librd.{name}"), value, &self.tags);
            }
        }
        for name in &self.gauges.top_level {
            if let Some(value) = lookup(&stats, name).and_then(Value::as_f64) {
                self.sink.gauge(&format!("librd.{name}"), value, &self.tags);
            }
        }
        let Some(brokers) = stats.get("brokers").and_then(Value::as_object) else {
            return;
        };
        for (broker, entry) in brokers {
            let mut tags = self.tags.clone();
            tags.push(format!("broker:{broker}"));
            for name in &self.counters.brokers {
                if let Some(value) = lookup(entry, name).and_then(Value::as_u64) {
                    self.sink.count(&format!("librd.brokers.{name}"), value, &tags);
                }
            }
            for name in &self.gauges.brokers {
                if let Some(value) = lookup(entry, name).and_then(Value::as_f64) {
                    self.sink.gauge(&format!("librd.brokers.{name}"), value, &tags);
                }
            }
        }
    }
}

/// Resolve a dotted path like `int_latency.p99` against a JSON document.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    fn capture_sink() -> (Arc<StatsdSink>, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let port = receiver.local_addr().expect("addr").port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_millis(500)))
            .expect("timeout");
        let sink = StatsdSink::connect("127.0.0.1", port, "kafprobe").expect("connect");
        (Arc::new(sink), receiver)
    }

    fn drain(receiver: &UdpSocket) -> Vec<String> {
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        while let Ok((n, _)) = receiver.recv_from(&mut buf) {
            out.push(String::from_utf8(buf[..n].to_vec()).expect("utf8"));
        }
        out
    }

    #[test]
    fn dotted_lookup_walks_nested_objects() {
        let stats: Value = serde_json::from_str(r#"{"rtt":{"avg":12,"p99":80}}"#).expect("json");
        assert_eq!(lookup(&stats, "rtt.p99").and_then(Value::as_u64), Some(80));
        assert_eq!(lookup(&stats, "rtt.p50"), None);
        assert_eq!(lookup(&stats, "missing.avg"), None);
    }

    #[test]
    fn extracts_top_level_and_broker_scopes() {
        let (sink, receiver) = capture_sink();
        let handler = LibrdStatsHandler::with_names(
            sink,
            StatNames {
                top_level: names(&["txmsgs"]),
                brokers: names(&["tx"]),
            },
            StatNames {
                top_level: names(&["msg_cnt"]),
                brokers: names(&["rtt.avg"]),
            },
        );
        handler.handle(
            br#"{
                "txmsgs": 120,
                "msg_cnt": 4,
                "brokers": {
                    "localhost:9092/1": {"tx": 64, "rtt": {"avg": 7.5}}
                }
            }"#,
        );
        let datagrams = drain(&receiver);
        assert!(datagrams.contains(&"kafprobe.librd.txmsgs:120|c".to_string()));
        assert!(datagrams.contains(&"kafprobe.librd.msg_cnt:4|g".to_string()));
        assert!(datagrams
            .contains(&"kafprobe.librd.brokers.tx:64|c|#broker:localhost:9092/1".to_string()));
        assert!(datagrams
            .contains(&"kafprobe.librd.brokers.rtt.avg:7.5|g|#broker:localhost:9092/1".to_string()));
    }

    #[test]
    fn malformed_and_incomplete_documents_are_skipped() {
        let (sink, receiver) = capture_sink();
        let handler = LibrdStatsHandler::new(sink, Vec::new());
        handler.handle(b"not json at all");
        handler.handle(br#"{"unrelated": true}"#);
        assert!(drain(&receiver).is_empty());
    }

    #[test]
    fn default_name_sets_cover_the_interesting_paths() {
        let counters = StatNames::counters();
        assert!(counters.top_level.contains(&"txmsgs".to_string()));
        assert!(counters.brokers.contains(&"rx".to_string()));
        let gauges = StatNames::gauges();
        assert!(gauges.brokers.contains(&"int_latency.p99".to_string()));
        assert!(gauges.brokers.contains(&"throttle.avg".to_string()));
    }
}
