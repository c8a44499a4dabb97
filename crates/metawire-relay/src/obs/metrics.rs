//! Metrics registry for the relay.
//!
//! Counter and histogram types with dynamic labels backed by `DashMap`.
//! Label sets are sorted so rendering is deterministic per key. Histogram
//! buckets are fixed in microseconds.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_str(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self.map.entry(label_key(labels)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for one label set (0 when never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of distinct label sets seen.
    pub fn series(&self) -> usize {
        self.map.len()
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let labels = label_str(r.key());
            if labels.is_empty() {
                let _ = writeln!(out, "{name} {val}");
            } else {
                let _ = writeln!(out, "{name}{{{labels}}} {val}");
            }
        }
    }
}

// 10us, 50us, 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms
const BUCKETS_MICROS: [u64; 9] = [10, 50, 100, 500, 1_000, 5_000, 10_000, 50_000, 100_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 9],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration into the cumulative buckets (microsecond scale).
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(micros, Ordering::Relaxed);
        for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
            if micros <= le {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let hist = r.value();
            let labels = label_str(r.key());
            let prefix = if labels.is_empty() { String::new() } else { format!("{labels},") };

            for (bucket, le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
                let n = bucket.load(Ordering::Relaxed);
                let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"{le}\"}} {n}");
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            let _ = writeln!(out, "{name}_sum{{{labels}}} {}", hist.sum.load(Ordering::Relaxed));
            let _ = writeln!(out, "{name}_count{{{labels}}} {count}");
        }
    }
}

#[derive(Default)]
pub struct RelayMetrics {
    pub datagrams_received: CounterVec,
    pub datagrams_sent: CounterVec,
    /// Datagrams dropped before envelope decode, by reason.
    pub containers_rejected: CounterVec,
    /// Decode diagnostics, by kind.
    pub diagnostics: CounterVec,
    pub envelopes_dispatched: CounterVec,
    pub unknown_data_types: CounterVec,
    pub handler_errors: CounterVec,
    pub decode_duration: HistogramVec,
    draining: AtomicBool,
}

impl RelayMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all metrics plus caller-provided extra samples.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.datagrams_received.render("metawire_datagrams_received_total", &mut out);
        self.datagrams_sent.render("metawire_datagrams_sent_total", &mut out);
        self.containers_rejected.render("metawire_containers_rejected_total", &mut out);
        self.diagnostics.render("metawire_decode_diagnostics_total", &mut out);
        self.envelopes_dispatched.render("metawire_envelopes_dispatched_total", &mut out);
        self.unknown_data_types.render("metawire_unknown_data_type_total", &mut out);
        self.handler_errors.render("metawire_handler_errors_total", &mut out);
        self.decode_duration.render("metawire_decode_duration_micros", &mut out);

        let _ = writeln!(
            out,
            "# TYPE metawire_draining gauge\nmetawire_draining {}",
            u8::from(self.is_draining())
        );
        for (k, v) in extra {
            let _ = writeln!(out, "{k} {v}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_by_sorted_labels() {
        let c = CounterVec::default();
        c.inc(&[("a", "1"), ("b", "2")]);
        c.add(&[("b", "2"), ("a", "1")], 4);
        assert_eq!(c.get(&[("a", "1"), ("b", "2")]), 5);
        assert_eq!(c.get(&[("a", "x")]), 0);
    }

    #[test]
    fn render_prometheus_text() {
        let m = RelayMetrics::default();
        m.diagnostics.inc(&[("kind", "TRUNCATED_INPUT")]);
        m.datagrams_received.inc(&[]);
        m.decode_duration.observe(&[], Duration::from_micros(70));
        m.set_draining();

        let text = m.render(&[("metawire_schema_messages", 3)]);
        assert!(text.contains("metawire_decode_diagnostics_total{kind=\"TRUNCATED_INPUT\"} 1"));
        assert!(text.contains("metawire_datagrams_received_total 1"));
        assert!(text.contains("metawire_decode_duration_micros_bucket{le=\"50\"} 0"));
        assert!(text.contains("metawire_decode_duration_micros_bucket{le=\"100\"} 1"));
        assert!(text.contains("metawire_decode_duration_micros_count{} 1"));
        assert!(text.contains("metawire_draining 1"));
        assert!(text.contains("metawire_schema_messages 3"));
    }

    #[test]
    fn label_values_are_escaped() {
        let c = CounterVec::default();
        c.inc(&[("h", "a\"b")]);
        let mut out = String::new();
        c.render("x", &mut out);
        assert!(out.contains("x{h=\"a\\\"b\"} 1"));
    }
}
