// src/zone/handle.rs
//
// Live side of one zone. Every mutation takes the zone's lock, runs the
// state machine, publishes the new snapshot and emits events before the
// lock is released, so subscribers see changes in the order they were made.
// The lock is never held across an await.

use super::state_machine::{
    ActiveOverride, ApplyOutcome, AssetSwap, ManualState, OverrideApplied, Rejection,
    SweepOutcome, Transition, ZoneMachine, ZoneState,
};
use super::Zone;
use crate::analysis::{ObservationHistory, TrendClassifier};
use crate::analyzer::AnalysisRequest;
use crate::dispatch::DispatchPolicy;
use crate::observation::Observation;
use crate::pipeline::event_bus::{EventBus, ZoneEvent};
use crate::pipeline::metrics::RuntimeMetrics;
use crate::pipeline::single_flight::SingleFlight;
use crate::types::Config;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct ZoneHandle {
    zone: Arc<Zone>,
    machine: Mutex<ZoneMachine>,
    state_tx: watch::Sender<Arc<ZoneState>>,
    events: EventBus,
    metrics: RuntimeMetrics,
    in_flight: SingleFlight,
    cancel: CancellationToken,
    next_source: AtomicUsize,
}

impl ZoneHandle {
    pub fn new(
        zone: Zone,
        config: &Config,
        events: EventBus,
        metrics: RuntimeMetrics,
        cancel: CancellationToken,
    ) -> Self {
        let machine = ZoneMachine::new(
            &zone.id,
            DispatchPolicy::new(zone.thresholds),
            TrendClassifier::new(config.trend),
            ObservationHistory::new(
                config.history.capacity,
                Duration::minutes(config.history.lookback_minutes),
            ),
            config.normalizer.confidence_floor,
            Utc::now(),
        );
        let (state_tx, _) = watch::channel(machine.current());

        Self {
            zone: Arc::new(zone),
            machine: Mutex::new(machine),
            state_tx,
            events,
            metrics,
            in_flight: SingleFlight::new(),
            cancel,
            next_source: AtomicUsize::new(0),
        }
    }

    pub fn zone(&self) -> &Arc<Zone> {
        &self.zone
    }

    pub fn id(&self) -> &str {
        &self.zone.id
    }

    /// Last published state. Never blocks on the zone lock.
    pub fn snapshot(&self) -> Arc<ZoneState> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ZoneState>> {
        self.state_tx.subscribe()
    }

    pub fn in_flight(&self) -> &SingleFlight {
        &self.in_flight
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn active_override(&self) -> Option<ActiveOverride> {
        self.machine.lock().active_override().cloned()
    }

    pub fn swap_log(&self) -> Vec<AssetSwap> {
        self.machine.lock().swaps().cloned().collect()
    }

    /// Request for the next analysis; sources rotate round-robin.
    pub fn next_request(&self) -> AnalysisRequest {
        let source = if self.zone.sources.is_empty() {
            None
        } else {
            let i = self.next_source.fetch_add(1, Ordering::Relaxed) % self.zone.sources.len();
            Some(self.zone.sources[i].clone())
        };
        AnalysisRequest {
            request_id: Uuid::new_v4(),
            zone_id: self.zone.id.clone(),
            display_name: self.zone.display_name.clone(),
            geo: self.zone.geo,
            source,
            requested_at: Utc::now(),
        }
    }

    pub fn apply(&self, observation: Observation) -> ApplyOutcome {
        self.apply_at(observation, Utc::now())
    }

    pub fn apply_at(&self, observation: Observation, now: DateTime<Utc>) -> ApplyOutcome {
        let mut machine = self.machine.lock();
        let outcome = machine.apply(observation, now);
        match &outcome {
            ApplyOutcome::Accepted {
                transition,
                expired_override,
            } => {
                self.metrics.inc(&self.metrics.observations_accepted);
                if let Some(expired) = expired_override {
                    self.metrics.inc(&self.metrics.overrides_expired);
                    self.events.publish(ZoneEvent::OverrideCleared {
                        zone_id: self.zone.id.clone(),
                        override_id: expired.id,
                        expired: true,
                    });
                }
                self.publish(transition);
            }
            ApplyOutcome::Rejected(Rejection::OverrideActive { expires_at }) => {
                self.metrics.inc(&self.metrics.observations_rejected);
                self.events.publish(ZoneEvent::ObservationRejected {
                    zone_id: self.zone.id.clone(),
                    override_expires_at: *expires_at,
                });
            }
        }
        outcome
    }

    pub fn set_override(&self, manual: ManualState, ttl: Duration) -> OverrideApplied {
        self.set_override_at(manual, ttl, Utc::now())
    }

    pub fn set_override_at(
        &self,
        manual: ManualState,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> OverrideApplied {
        let mut machine = self.machine.lock();
        let applied = machine.set_override(manual, ttl, now);
        self.metrics.inc(&self.metrics.overrides_set);
        self.events.publish(ZoneEvent::OverrideSet {
            zone_id: self.zone.id.clone(),
            override_id: applied.active.id,
            expires_at: applied.active.expires_at,
            asset: applied.transition.current.asset(),
            superseded: applied.superseded.as_ref().map(|o| o.id),
        });
        self.publish(&applied.transition);
        applied
    }

    /// The cleared override, or None when none was active.
    pub fn clear_override(&self) -> Option<ActiveOverride> {
        let mut machine = self.machine.lock();
        let (cleared, transition) = machine.clear_override(Utc::now())?;
        self.events.publish(ZoneEvent::OverrideCleared {
            zone_id: self.zone.id.clone(),
            override_id: cleared.id,
            expired: false,
        });
        self.publish(&transition);
        Some(cleared)
    }

    pub fn sweep(&self, stale_after: Duration) -> SweepOutcome {
        self.sweep_at(Utc::now(), stale_after)
    }

    pub fn sweep_at(&self, now: DateTime<Utc>, stale_after: Duration) -> SweepOutcome {
        let mut machine = self.machine.lock();
        let outcome = machine.sweep(now, stale_after);
        if let Some(expired) = &outcome.expired_override {
            self.metrics.inc(&self.metrics.overrides_expired);
            self.events.publish(ZoneEvent::OverrideCleared {
                zone_id: self.zone.id.clone(),
                override_id: expired.id,
                expired: true,
            });
        }
        if outcome.became_stale {
            self.metrics.inc(&self.metrics.stale_marks);
            self.events.publish(ZoneEvent::MarkedStale {
                zone_id: self.zone.id.clone(),
                at: now,
            });
        }
        for transition in &outcome.transitions {
            self.publish(transition);
        }
        outcome
    }

    /// Analysis retries exhausted. False when an override kept the state.
    pub fn mark_stale(&self, decay: f32) -> bool {
        let now = Utc::now();
        let mut machine = self.machine.lock();
        let Some(transition) = machine.mark_stale(decay, now) else {
            return false;
        };
        self.metrics.inc(&self.metrics.stale_marks);
        self.events.publish(ZoneEvent::MarkedStale {
            zone_id: self.zone.id.clone(),
            at: now,
        });
        self.publish(&transition);
        true
    }

    pub fn report_normalization_failure(&self, reason: String) {
        self.metrics.inc(&self.metrics.normalization_failures);
        self.events.publish(ZoneEvent::NormalizationFailed {
            zone_id: self.zone.id.clone(),
            reason,
        });
    }

    // Caller holds the machine lock.
    fn publish(&self, transition: &Transition) {
        self.state_tx.send_replace(transition.current.clone());
        self.events
            .publish(ZoneEvent::StateChanged(transition.current.clone()));
        if transition.phase_changed() {
            self.events.publish(ZoneEvent::PhaseChanged {
                zone_id: self.zone.id.clone(),
                from: transition.previous.phase,
                to: transition.current.phase,
                at: transition.current.updated_at,
            });
        }
        if let Some(swap) = &transition.swap {
            self.metrics.inc(&self.metrics.asset_swaps);
            self.events.publish(ZoneEvent::AssetSwapped {
                zone_id: self.zone.id.clone(),
                swap: swap.clone(),
            });
        }
    }
}
