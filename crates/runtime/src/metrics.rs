use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    ticks: AtomicU64,
    machine_faults: AtomicU64,
    control_ops: AtomicU64,
    rejected_ops: AtomicU64,
    dashboard_requests: AtomicU64,
    history_requests: AtomicU64,
    upstream_failures: AtomicU64,
    running_peak: AtomicU64,
}

impl MetricsRegistry {
    pub fn inc_ticks(&self, delta: u64) {
        self.inner.ticks.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_machine_faults(&self, delta: u64) {
        self.inner.machine_faults.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_control_ops(&self, delta: u64) {
        self.inner.control_ops.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_rejected_ops(&self, delta: u64) {
        self.inner.rejected_ops.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_dashboard_requests(&self, delta: u64) {
        self.inner.dashboard_requests.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_history_requests(&self, delta: u64) {
        self.inner.history_requests.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_upstream_failures(&self, delta: u64) {
        self.inner.upstream_failures.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn record_running_peak(&self, running: u64) {
        self.inner.running_peak.fetch_max(running, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            machine_faults: self.inner.machine_faults.load(Ordering::Relaxed),
            control_ops: self.inner.control_ops.load(Ordering::Relaxed),
            rejected_ops: self.inner.rejected_ops.load(Ordering::Relaxed),
            dashboard_requests: self.inner.dashboard_requests.load(Ordering::Relaxed),
            history_requests: self.inner.history_requests.load(Ordering::Relaxed),
            upstream_failures: self.inner.upstream_failures.load(Ordering::Relaxed),
            running_peak: self.inner.running_peak.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub machine_faults: u64,
    pub control_ops: u64,
    pub rejected_ops: u64,
    pub dashboard_requests: u64,
    pub history_requests: u64,
    pub upstream_failures: u64,
    pub running_peak: u64,
}

impl MetricsSnapshot {
    pub fn to_json_line(&self, label: &str, elapsed: Option<Duration>) -> String {
        #[derive(Serialize)]
        struct Line<'a> {
            label: &'a str,
            #[serde(flatten)]
            counters: &'a MetricsSnapshot,
            elapsed_ms: Option<u128>,
        }

        let payload = Line {
            label,
            counters: self,
            elapsed_ms: elapsed.map(|d| d.as_millis()),
        };
        serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
    }
}

pub struct RunTimer {
    start: Instant,
}

impl RunTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() {
        let metrics = MetricsRegistry::default();
        metrics.inc_ticks(3);
        metrics.inc_rejected_ops(1);
        metrics.record_running_peak(4);
        metrics.record_running_peak(2);
        let snap = metrics.snapshot();
        assert_eq!(snap.ticks, 3);
        assert_eq!(snap.running_peak, 4);

        let line: serde_json::Value =
            serde_json::from_str(&snap.to_json_line("t", Some(Duration::from_millis(5)))).unwrap();
        assert_eq!(line["label"], "t");
        assert_eq!(line["rejected_ops"], 1);
        assert_eq!(line["elapsed_ms"], 5);
    }
}
