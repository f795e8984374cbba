// src/pipeline/scheduler.rs
//
// Analysis scheduler. One interval loop per zone plus on-demand triggers.
//
//   tick ─▶ single-flight ─▶ analyzer (timeout + backoff) ─▶ normalizer ─▶ zone.apply
//                 │                         │
//                 └─ busy: skip             └─ exhausted: zone.mark_stale
//
// Analyzer calls run in their own tasks, outside any zone lock. A cancelled
// call leaves the zone untouched.

use super::metrics::RuntimeMetrics;
use super::retry::{with_backoff, Backoff};
use super::single_flight::FlightGuard;
use crate::analysis::Normalizer;
use crate::analyzer::VisionAnalyzer;
use crate::error::{AnalyzerError, ZoneError};
use crate::types::Config;
use crate::zone::state_machine::ApplyOutcome;
use crate::zone::{ZoneHandle, ZoneRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Accepted,
    /// Suppressed by an active override.
    Rejected,
    NormalizationFailed,
    MarkedStale,
    Cancelled,
}

pub struct AnalysisScheduler {
    registry: Arc<ZoneRegistry>,
    analyzer: Arc<dyn VisionAnalyzer>,
    normalizer: Normalizer,
    backoff: Backoff,
    timeout: Duration,
    stale_decay: f32,
    metrics: RuntimeMetrics,
    tracker: TaskTracker,
}

impl AnalysisScheduler {
    pub fn new(
        config: &Config,
        registry: Arc<ZoneRegistry>,
        analyzer: Arc<dyn VisionAnalyzer>,
        metrics: RuntimeMetrics,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            registry,
            analyzer,
            normalizer: Normalizer::new(config.normalizer),
            backoff: Backoff::from_config(&config.analyzer.retry),
            timeout: Duration::from_millis(config.analyzer.timeout_ms),
            stale_decay: config.scheduler.stale_confidence_decay,
            metrics,
            tracker,
        }
    }

    /// Start an analysis for the zone now. Ok(false) when one is already in
    /// flight and this request was skipped.
    pub fn trigger(self: &Arc<Self>, zone_id: &str) -> Result<bool, ZoneError> {
        let handle = self.registry.get(zone_id)?;
        Ok(self.tick(&handle))
    }

    /// Interval loop for one zone. Ends when the zone's token is cancelled.
    pub fn spawn_zone_loop(self: &Arc<Self>, handle: Arc<ZoneHandle>) {
        let this = self.clone();
        self.tracker.spawn(async move {
            let interval = handle.zone().interval;
            let cancel = handle.cancel_token().clone();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(zone = %handle.id(), "Scheduling analysis every {:?}", interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.tick(&handle);
                    }
                }
            }
            debug!(zone = %handle.id(), "Zone loop stopped");
        });
    }

    fn tick(self: &Arc<Self>, handle: &Arc<ZoneHandle>) -> bool {
        let Some(guard) = handle.in_flight().try_acquire() else {
            self.metrics.inc(&self.metrics.skipped_ticks);
            debug!(zone = %handle.id(), "Tick skipped, analysis already in flight");
            return false;
        };

        let this = self.clone();
        let handle = handle.clone();
        self.tracker.spawn(async move {
            this.run_cycle(&handle, guard).await;
        });
        true
    }

    /// One analysis for one zone. The guard is released when this returns.
    pub async fn run_cycle(&self, handle: &ZoneHandle, _guard: FlightGuard) -> CycleOutcome {
        let request = handle.next_request();
        let cancel = handle.cancel_token().clone();
        let metrics = &self.metrics;
        metrics.inc(&metrics.analysis_attempts);

        let started = Instant::now();
        let retried = with_backoff(self.backoff, self.timeout, &cancel, |attempt| {
            if attempt > 0 {
                metrics.inc(&metrics.analysis_retries);
            }
            let analyzer = self.analyzer.clone();
            let request = request.clone();
            async move { analyzer.analyze(&request).await }
        })
        .await;

        match retried.result {
            Ok(reply) => {
                metrics.inc(&metrics.analysis_successes);
                metrics.set_timing(&metrics.last_analysis_ms, started.elapsed().as_millis() as u64);

                if cancel.is_cancelled() {
                    return CycleOutcome::Cancelled;
                }

                match reply.normalize(&self.normalizer, Utc::now()) {
                    Ok(observation) => match handle.apply(observation) {
                        ApplyOutcome::Accepted { transition, .. } => {
                            debug!(
                                zone = %handle.id(),
                                "Observation applied (v{}, {:?})",
                                transition.current.version,
                                transition.current.trend
                            );
                            CycleOutcome::Accepted
                        }
                        ApplyOutcome::Rejected(_) => CycleOutcome::Rejected,
                    },
                    Err(e) => {
                        warn!(zone = %handle.id(), "Discarding analyzer reply: {}", e);
                        handle.report_normalization_failure(e.to_string());
                        CycleOutcome::NormalizationFailed
                    }
                }
            }
            Err(AnalyzerError::Cancelled) => {
                debug!(zone = %handle.id(), "Analysis {} cancelled", request.request_id);
                CycleOutcome::Cancelled
            }
            Err(e) => {
                metrics.inc(&metrics.analysis_failures);
                warn!(
                    zone = %handle.id(),
                    "Analysis failed after {} attempt(s): {}",
                    retried.attempts,
                    e
                );
                handle.mark_stale(self.stale_decay);
                CycleOutcome::MarkedStale
            }
        }
    }
}
