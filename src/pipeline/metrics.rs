// src/pipeline/metrics.rs
//
// Runtime counters shared by the scheduler, zones and override gateway.
// Summarized periodically into the logs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub analysis_attempts: Arc<AtomicU64>,
    pub analysis_successes: Arc<AtomicU64>,
    pub analysis_failures: Arc<AtomicU64>,
    pub analysis_retries: Arc<AtomicU64>,
    pub skipped_ticks: Arc<AtomicU64>,
    pub observations_accepted: Arc<AtomicU64>,
    pub observations_rejected: Arc<AtomicU64>,
    pub normalization_failures: Arc<AtomicU64>,
    pub overrides_set: Arc<AtomicU64>,
    pub overrides_expired: Arc<AtomicU64>,
    pub stale_marks: Arc<AtomicU64>,
    pub asset_swaps: Arc<AtomicU64>,
    pub last_analysis_ms: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            analysis_attempts: Arc::new(AtomicU64::new(0)),
            analysis_successes: Arc::new(AtomicU64::new(0)),
            analysis_failures: Arc::new(AtomicU64::new(0)),
            analysis_retries: Arc::new(AtomicU64::new(0)),
            skipped_ticks: Arc::new(AtomicU64::new(0)),
            observations_accepted: Arc::new(AtomicU64::new(0)),
            observations_rejected: Arc::new(AtomicU64::new(0)),
            normalization_failures: Arc::new(AtomicU64::new(0)),
            overrides_set: Arc::new(AtomicU64::new(0)),
            overrides_expired: Arc::new(AtomicU64::new(0)),
            stale_marks: Arc::new(AtomicU64::new(0)),
            asset_swaps: Arc::new(AtomicU64::new(0)),
            last_analysis_ms: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_ms: u64) {
        counter.store(duration_ms, Ordering::Relaxed);
    }

    pub fn success_rate(&self) -> f64 {
        let ok = self.analysis_successes.load(Ordering::Relaxed);
        let failed = self.analysis_failures.load(Ordering::Relaxed);
        let total = ok + failed;
        if total > 0 {
            ok as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            analysis_attempts: self.analysis_attempts.load(Ordering::Relaxed),
            analysis_successes: self.analysis_successes.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            analysis_retries: self.analysis_retries.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            observations_accepted: self.observations_accepted.load(Ordering::Relaxed),
            observations_rejected: self.observations_rejected.load(Ordering::Relaxed),
            normalization_failures: self.normalization_failures.load(Ordering::Relaxed),
            overrides_set: self.overrides_set.load(Ordering::Relaxed),
            overrides_expired: self.overrides_expired.load(Ordering::Relaxed),
            stale_marks: self.stale_marks.load(Ordering::Relaxed),
            asset_swaps: self.asset_swaps.load(Ordering::Relaxed),
            last_analysis_ms: self.last_analysis_ms.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub analysis_attempts: u64,
    pub analysis_successes: u64,
    pub analysis_failures: u64,
    pub analysis_retries: u64,
    pub success_rate: f64,
    pub skipped_ticks: u64,
    pub observations_accepted: u64,
    pub observations_rejected: u64,
    pub normalization_failures: u64,
    pub overrides_set: u64,
    pub overrides_expired: u64,
    pub stale_marks: u64,
    pub asset_swaps: u64,
    pub last_analysis_ms: u64,
    pub elapsed_secs: f64,
}
