//! Counter pipeline metrics for Prometheus
//!
//! Tracks read-path degradation, sync cycle outcomes and HTTP traffic.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters for the view pipeline
#[derive(Debug)]
pub struct SyncMetrics {
    start_time: Instant,

    // Read path
    views_recorded: AtomicU64,
    cache_failures: AtomicU64,
    index_failures: AtomicU64,

    // Sync worker
    cycles_flushed: AtomicU64,
    cycles_empty: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_failed: AtomicU64,
    entries_written: AtomicU64,
    entries_dropped: AtomicU64,
    consecutive_failures: AtomicU64,
    escalations: AtomicU64,
    last_cycle_us: AtomicU64,

    /// (route class, status code) -> request count
    http_requests: Mutex<BTreeMap<(&'static str, u16), u64>>,
}

impl SyncMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            views_recorded: AtomicU64::new(0),
            cache_failures: AtomicU64::new(0),
            index_failures: AtomicU64::new(0),
            cycles_flushed: AtomicU64::new(0),
            cycles_empty: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            entries_written: AtomicU64::new(0),
            entries_dropped: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            last_cycle_us: AtomicU64::new(0),
            http_requests: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record_view(&self) {
        self.views_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_failure(&self) {
        self.cache_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_index_failure(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_cycle(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_cycle(&self, elapsed: Duration) {
        self.cycles_empty.fetch_add(1, Ordering::Relaxed);
        self.set_last_cycle(elapsed);
    }

    pub fn record_flushed_cycle(&self, written: usize, dropped: usize, elapsed: Duration) {
        self.cycles_flushed.fetch_add(1, Ordering::Relaxed);
        self.entries_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.entries_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        self.set_last_cycle(elapsed);
    }

    pub fn record_failed_cycle(&self, elapsed: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.set_last_cycle(elapsed);
    }

    pub fn set_consecutive_failures(&self, count: u32) {
        self.consecutive_failures
            .store(u64::from(count), Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http(&self, route: &'static str, status: u16) {
        *self.http_requests.lock().entry((route, status)).or_insert(0) += 1;
    }

    fn set_last_cycle(&self, elapsed: Duration) {
        self.last_cycle_us.store(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Export metrics in Prometheus format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);

        write_metric(
            &mut output,
            "viewsync_uptime_seconds",
            "Service uptime in seconds",
            "counter",
            self.start_time.elapsed().as_secs(),
        );
        write_metric(
            &mut output,
            "viewsync_views_recorded_total",
            "Content reads that bumped the live counter",
            "counter",
            self.views_recorded.load(Ordering::Relaxed),
        );
        write_metric(
            &mut output,
            "viewsync_cache_failures_total",
            "Read-path calls that could not reach the counter cache",
            "counter",
            self.cache_failures.load(Ordering::Relaxed),
        );
        write_metric(
            &mut output,
            "viewsync_index_failures_total",
            "Increments whose pending marker could not be written",
            "counter",
            self.index_failures.load(Ordering::Relaxed),
        );

        let _ = writeln!(
            output,
            "# HELP viewsync_sync_cycles_total Sync cycles by outcome"
        );
        let _ = writeln!(output, "# TYPE viewsync_sync_cycles_total counter");
        for (outcome, counter) in [
            ("flushed", &self.cycles_flushed),
            ("empty", &self.cycles_empty),
            ("skipped", &self.cycles_skipped),
            ("failed", &self.cycles_failed),
        ] {
            let _ = writeln!(
                output,
                "viewsync_sync_cycles_total{{outcome=\"{}\"}} {}",
                outcome,
                counter.load(Ordering::Relaxed)
            );
        }

        write_metric(
            &mut output,
            "viewsync_sync_entries_written_total",
            "Counters written to the durable store",
            "counter",
            self.entries_written.load(Ordering::Relaxed),
        );
        write_metric(
            &mut output,
            "viewsync_sync_entries_dropped_total",
            "Pending markers removed without a durable write",
            "counter",
            self.entries_dropped.load(Ordering::Relaxed),
        );
        write_metric(
            &mut output,
            "viewsync_sync_consecutive_failures",
            "Sync cycles failed in a row",
            "gauge",
            self.consecutive_failures.load(Ordering::Relaxed),
        );
        write_metric(
            &mut output,
            "viewsync_sync_escalations_total",
            "Times the failure streak crossed the alert threshold",
            "counter",
            self.escalations.load(Ordering::Relaxed),
        );

        let last_us = self.last_cycle_us.load(Ordering::Relaxed);
        let _ = writeln!(
            output,
            "# HELP viewsync_sync_last_cycle_seconds Duration of the most recent cycle"
        );
        let _ = writeln!(output, "# TYPE viewsync_sync_last_cycle_seconds gauge");
        let _ = writeln!(
            output,
            "viewsync_sync_last_cycle_seconds {}",
            last_us as f64 / 1_000_000.0
        );

        let http = self.http_requests.lock();
        if !http.is_empty() {
            let _ = writeln!(
                output,
                "# HELP viewsync_http_requests_total HTTP requests by route and status"
            );
            let _ = writeln!(output, "# TYPE viewsync_http_requests_total counter");
            for ((route, status), count) in http.iter() {
                let _ = writeln!(
                    output,
                    "viewsync_http_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}"
                );
            }
        }

        output
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {kind}");
    let _ = writeln!(output, "{name} {value}");
}

static SYNC_METRICS: std::sync::OnceLock<SyncMetrics> = std::sync::OnceLock::new();

/// Get global pipeline metrics instance
pub fn sync_metrics() -> &'static SyncMetrics {
    SYNC_METRICS.get_or_init(SyncMetrics::new)
}
