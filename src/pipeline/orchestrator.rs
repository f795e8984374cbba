// src/pipeline/orchestrator.rs
//
// Runtime object owning every zone and background task. No globals:
// `start` builds the registry from config and spawns one loop per zone plus
// the override/staleness sweeper; `shutdown` cancels everything, including
// in-flight analyzer calls, and waits for the tasks to finish.

use super::event_bus::{EventBus, ZoneEvent};
use super::metrics::RuntimeMetrics;
use super::scheduler::AnalysisScheduler;
use crate::analyzer::VisionAnalyzer;
use crate::error::ZoneError;
use crate::override_gateway::OverrideGateway;
use crate::types::Config;
use crate::zone::{Zone, ZoneHandle, ZoneRegistry, ZoneState};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

const EVENT_BUFFER: usize = 1024;

pub struct FloodRuntime {
    config: Config,
    registry: Arc<ZoneRegistry>,
    scheduler: Arc<AnalysisScheduler>,
    gateway: OverrideGateway,
    events: EventBus,
    metrics: RuntimeMetrics,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl FloodRuntime {
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config, analyzer: Arc<dyn VisionAnalyzer>) -> Self {
        let events = EventBus::new(EVENT_BUFFER);
        let metrics = RuntimeMetrics::new();
        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        let registry = Arc::new(ZoneRegistry::new());

        for zone_config in &config.zones {
            registry.insert(ZoneHandle::new(
                Zone::resolve(zone_config, &config),
                &config,
                events.clone(),
                metrics.clone(),
                root.child_token(),
            ));
        }

        let scheduler = Arc::new(AnalysisScheduler::new(
            &config,
            registry.clone(),
            analyzer.clone(),
            metrics.clone(),
            tracker.clone(),
        ));
        let gateway = OverrideGateway::new(registry.clone(), config.normalizer.max_depth_cm);

        let runtime = Self {
            config,
            registry,
            scheduler,
            gateway,
            events,
            metrics,
            root,
            tracker,
        };

        for handle in runtime.registry.handles() {
            runtime.scheduler.spawn_zone_loop(handle);
        }
        runtime.spawn_sweeper();

        info!(
            "Flood runtime started: {} zone(s), analyzer '{}'",
            runtime.registry.len(),
            analyzer.name()
        );
        runtime
    }

    fn spawn_sweeper(&self) {
        let registry = self.registry.clone();
        let cancel = self.root.clone();
        let every = Duration::from_secs(self.config.scheduler.sweep_interval_secs);
        let stale_after = ChronoDuration::seconds(self.config.scheduler.stale_after_secs as i64);

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for handle in registry.handles() {
                            handle.sweep(stale_after);
                        }
                    }
                }
            }
            debug!("Sweeper stopped");
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &OverrideGateway {
        &self.gateway
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.metrics
    }

    pub fn events(&self) -> broadcast::Receiver<ZoneEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self, zone_id: &str) -> Result<Arc<ZoneState>, ZoneError> {
        self.registry.snapshot(zone_id)
    }

    pub fn snapshots(&self) -> Vec<Arc<ZoneState>> {
        self.registry.snapshots()
    }

    pub fn subscribe(&self, zone_id: &str) -> Result<watch::Receiver<Arc<ZoneState>>, ZoneError> {
        self.registry.subscribe(zone_id)
    }

    /// On-demand analysis. Ok(false) when one is already in flight.
    pub fn trigger(&self, zone_id: &str) -> Result<bool, ZoneError> {
        self.scheduler.trigger(zone_id)
    }

    /// Stop monitoring a zone. Its loop and any in-flight call are cancelled.
    pub fn remove_zone(&self, zone_id: &str) -> Result<(), ZoneError> {
        self.registry.remove(zone_id).map(|_| ())
    }

    pub async fn shutdown(self) {
        info!("Shutting down flood runtime");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        let summary = self.metrics.summary();
        info!(
            "Shutdown complete: {} analyses ({} ok, {} failed), {} override(s)",
            summary.analysis_attempts,
            summary.analysis_successes,
            summary.analysis_failures,
            summary.overrides_set
        );
    }
}
