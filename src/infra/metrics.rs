//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so the frame loop never takes a
//! lock to count. Reporting swaps the interval counters atomically.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters only; never use them for coordination.

use crate::domain::types::GunId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Exponential bucket boundaries for frame processing latency (microseconds)
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

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

/// Compute percentile from histogram buckets; returns the upper bound of
/// the bucket containing the percentile.
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the detection pipeline.
#[derive(Default)]
pub struct Metrics {
    /// Frames ever processed (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Frames that produced an authoritative detection
    detections_total: AtomicU64,
    /// Correlated + mapped shots per gun
    fires_gun_a: AtomicU64,
    fires_gun_b: AtomicU64,
    /// Detections with no fresh trigger to match
    no_trigger_total: AtomicU64,
    /// Correlated shots that mapped outside the screen
    off_target_total: AtomicU64,
    /// Trigger events that aged out unmatched (operational health signal)
    stale_signals_total: AtomicU64,
    /// Fresh triggers consumed but replaced under latest-fresh policy
    superseded_total: AtomicU64,
    /// Frame processing latency (reset on report)
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_buckets: [AtomicU64; NUM_BUCKETS],
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fire(&self, gun: GunId) {
        match gun {
            GunId::A => self.fires_gun_a.fetch_add(1, Ordering::Relaxed),
            GunId::B => self.fires_gun_b.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_no_trigger(&self) {
        self.no_trigger_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_off_target(&self) {
        self.off_target_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_signals(&self, count: u64) {
        self.stale_signals_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_superseded(&self, count: u64) {
        self.superseded_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot and reset the interval counters
    pub fn report(&self) -> MetricsSummary {
        let mut buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.latency_buckets.iter().enumerate() {
            buckets[i] = bucket.swap(0, Ordering::Relaxed);
        }

        let frames = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_avg_us = if frames > 0 { latency_sum / frames } else { 0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_interval: frames,
            detections_total: self.detections_total.load(Ordering::Relaxed),
            fires_gun_a: self.fires_gun_a.load(Ordering::Relaxed),
            fires_gun_b: self.fires_gun_b.load(Ordering::Relaxed),
            no_trigger_total: self.no_trigger_total.load(Ordering::Relaxed),
            off_target_total: self.off_target_total.load(Ordering::Relaxed),
            stale_signals_total: self.stale_signals_total.load(Ordering::Relaxed),
            superseded_total: self.superseded_total.load(Ordering::Relaxed),
            latency_avg_us,
            latency_max_us: self.latency_max_us.swap(0, Ordering::Relaxed),
            latency_p99_us: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

/// Point-in-time snapshot produced by `Metrics::report`
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_interval: u64,
    pub detections_total: u64,
    pub fires_gun_a: u64,
    pub fires_gun_b: u64,
    pub no_trigger_total: u64,
    pub off_target_total: u64,
    pub stale_signals_total: u64,
    pub superseded_total: u64,
    pub latency_avg_us: u64,
    pub latency_max_us: u64,
    pub latency_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_interval = %self.frames_interval,
            detections = %self.detections_total,
            fires_a = %self.fires_gun_a,
            fires_b = %self.fires_gun_b,
            no_trigger = %self.no_trigger_total,
            off_target = %self.off_target_total,
            stale_signals = %self.stale_signals_total,
            superseded = %self.superseded_total,
            latency_avg_us = %self.latency_avg_us,
            latency_max_us = %self.latency_max_us,
            latency_p99_us = %self.latency_p99_us,
            "metrics_report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(60000), 10);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();
        metrics.record_frame(500);
        metrics.record_frame(1500);
        metrics.record_detection();
        metrics.record_fire(GunId::A);
        metrics.record_stale_signals(2);

        let summary = metrics.report();
        assert_eq!(summary.frames_total, 2);
        assert_eq!(summary.frames_interval, 2);
        assert_eq!(summary.detections_total, 1);
        assert_eq!(summary.fires_gun_a, 1);
        assert_eq!(summary.stale_signals_total, 2);
        assert_eq!(summary.latency_avg_us, 1000);
        assert_eq!(summary.latency_max_us, 1500);

        let next = metrics.report();
        assert_eq!(next.frames_total, 2);
        assert_eq!(next.frames_interval, 0);
        assert_eq!(next.latency_max_us, 0);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile_from_buckets(&[0; NUM_BUCKETS], 0.99), 0);
    }
}
