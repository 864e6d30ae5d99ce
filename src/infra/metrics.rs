//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting swaps the per-interval
//! counters to get a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for scanner coordination.

use crate::domain::types::{FilterMethod, ScannerState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared between the scan loop, the HTTP
/// endpoint and the periodic reporter
pub struct Metrics {
    /// Completed scan cycles (monotonic)
    cycles_total: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Well-formed records parsed (monotonic)
    records_total: AtomicU64,
    /// Bytes received from the transport (monotonic)
    bytes_total: AtomicU64,
    /// Change events emitted (monotonic)
    changes_total: AtomicU64,
    /// Strategy rotations applied (monotonic)
    filter_switches_total: AtomicU64,
    /// Transport failures (monotonic)
    transport_failures_total: AtomicU64,
    /// Cycle processing latency (parse + filter + compare), excluding acquisition
    process_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of processing latencies (monotonic, histogram `_sum`)
    process_sum_total_us: AtomicU64,
    /// Sum of processing latencies since last report
    process_sum_us: AtomicU64,
    /// Max processing latency since last report
    process_max_us: AtomicU64,
    /// Trackers held by the scanner (gauge)
    tracked_tags: AtomicU64,
    /// Tags currently settled as present across all antennas (gauge)
    present_tags: AtomicU64,
    /// Scanner run state (gauge, see `ScannerState`)
    scanner_state: AtomicU64,
    /// Active filter method (gauge, see `FilterMethod`)
    filter_method: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            records_total: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            changes_total: AtomicU64::new(0),
            filter_switches_total: AtomicU64::new(0),
            transport_failures_total: AtomicU64::new(0),
            process_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            process_sum_total_us: AtomicU64::new(0),
            process_sum_us: AtomicU64::new(0),
            process_max_us: AtomicU64::new(0),
            tracked_tags: AtomicU64::new(0),
            present_tags: AtomicU64::new(0),
            scanner_state: AtomicU64::new(ScannerState::Running as u64),
            filter_method: AtomicU64::new(FilterMethod::WindowLpf as u64),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed scan cycle (lock-free)
    #[inline]
    pub fn record_cycle(&self, bytes: usize, records: usize, process_us: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.records_total.fetch_add(records as u64, Ordering::Relaxed);
        self.process_sum_total_us.fetch_add(process_us, Ordering::Relaxed);
        self.process_sum_us.fetch_add(process_us, Ordering::Relaxed);
        self.process_buckets[bucket_index(process_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.process_max_us, process_us);
    }

    #[inline]
    pub fn record_change(&self) {
        self.changes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filter_switch(&self) {
        self.filter_switches_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transport_failure(&self) {
        self.transport_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_tag_counts(&self, tracked: usize, present: usize) {
        self.tracked_tags.store(tracked as u64, Ordering::Relaxed);
        self.present_tags.store(present as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_scanner_state(&self, state: ScannerState) {
        self.scanner_state.store(state as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_filter_method(&self, method: FilterMethod) {
        self.filter_method.store(u64::from(method.as_u8()), Ordering::Relaxed);
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    pub fn changes_total(&self) -> u64 {
        self.changes_total.load(Ordering::Relaxed)
    }

    pub fn transport_failures_total(&self) -> u64 {
        self.transport_failures_total.load(Ordering::Relaxed)
    }

    /// Generate a summary, resetting the per-interval counters
    pub fn report(&self) -> MetricsSummary {
        self.summarize(true)
    }

    /// Read-only summary for scrapes; interval counters are left for `report`
    pub fn snapshot(&self) -> MetricsSummary {
        self.summarize(false)
    }

    fn summarize(&self, reset: bool) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            if reset {
                *last = now;
            }
            elapsed
        };

        let take = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };

        let cycles_interval = take(&self.cycles_since_report);
        let cycles_per_min =
            if elapsed_secs > 0.0 { cycles_interval as f64 * 60.0 / elapsed_secs } else { 0.0 };

        let process_sum = take(&self.process_sum_us);
        let process_max_us = take(&self.process_max_us);
        let avg_process_us =
            if cycles_interval > 0 { process_sum / cycles_interval } else { 0 };

        // Histogram stays cumulative for Prometheus
        let process_buckets = load_buckets(&self.process_buckets);
        let process_p99_us = percentile_from_buckets(&process_buckets, 0.99);

        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_per_min,
            records_total: self.records_total.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            changes_total: self.changes_total.load(Ordering::Relaxed),
            filter_switches_total: self.filter_switches_total.load(Ordering::Relaxed),
            transport_failures_total: self.transport_failures_total.load(Ordering::Relaxed),
            process_buckets,
            process_sum_total_us: self.process_sum_total_us.load(Ordering::Relaxed),
            avg_process_us,
            process_max_us,
            process_p99_us,
            tracked_tags: self.tracked_tags.load(Ordering::Relaxed),
            present_tags: self.present_tags.load(Ordering::Relaxed),
            scanner_state: ScannerState::from_u8(
                self.scanner_state.load(Ordering::Relaxed) as u8,
            ),
            filter_method: FilterMethod::from_u8(self.filter_method.load(Ordering::Relaxed) as u8)
                .unwrap_or(FilterMethod::WindowLpf),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the Prometheus endpoint)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_per_min: f64,
    pub records_total: u64,
    pub bytes_total: u64,
    pub changes_total: u64,
    pub filter_switches_total: u64,
    pub transport_failures_total: u64,
    /// Cycle processing latency histogram
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub process_buckets: [u64; NUM_BUCKETS],
    pub process_sum_total_us: u64,
    pub avg_process_us: u64,
    pub process_max_us: u64,
    pub process_p99_us: u64,
    pub tracked_tags: u64,
    pub present_tags: u64,
    pub scanner_state: ScannerState,
    pub filter_method: FilterMethod,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_total,
            cycles_per_min = format!("{:.1}", self.cycles_per_min),
            records_total = %self.records_total,
            changes_total = %self.changes_total,
            tracked_tags = %self.tracked_tags,
            present_tags = %self.present_tags,
            avg_process_us = %self.avg_process_us,
            p99_process_us = %self.process_p99_us,
            state = %self.scanner_state,
            filter = %self.filter_method,
            "metrics"
        );
    }
}
