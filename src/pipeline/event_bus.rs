// src/pipeline/event_bus.rs
//
// Decoupled event system. Zones publish events instead of callers polling
// each other's state. Slow subscribers lag and lose the oldest events;
// publishers never block.

use crate::dispatch::Asset;
use crate::zone::state_machine::{AssetSwap, ZonePhase, ZoneState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum ZoneEvent {
    StateChanged(Arc<ZoneState>),

    PhaseChanged {
        zone_id: String,
        from: ZonePhase,
        to: ZonePhase,
        at: DateTime<Utc>,
    },

    AssetSwapped {
        zone_id: String,
        swap: AssetSwap,
    },

    ObservationRejected {
        zone_id: String,
        override_expires_at: DateTime<Utc>,
    },

    NormalizationFailed {
        zone_id: String,
        reason: String,
    },

    OverrideSet {
        zone_id: String,
        override_id: Uuid,
        expires_at: DateTime<Utc>,
        asset: Option<Asset>,
        superseded: Option<Uuid>,
    },

    OverrideCleared {
        zone_id: String,
        override_id: Uuid,
        /// True when the TTL ran out rather than an operator clearing it.
        expired: bool,
    },

    MarkedStale {
        zone_id: String,
        at: DateTime<Utc>,
    },
}

impl ZoneEvent {
    pub fn zone_id(&self) -> &str {
        match self {
            ZoneEvent::StateChanged(state) => &state.zone_id,
            ZoneEvent::PhaseChanged { zone_id, .. }
            | ZoneEvent::AssetSwapped { zone_id, .. }
            | ZoneEvent::ObservationRejected { zone_id, .. }
            | ZoneEvent::NormalizationFailed { zone_id, .. }
            | ZoneEvent::OverrideSet { zone_id, .. }
            | ZoneEvent::OverrideCleared { zone_id, .. }
            | ZoneEvent::MarkedStale { zone_id, .. } => zone_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ZoneEvent>,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let (sender, _) = broadcast::channel(max_pending.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ZoneEvent) {
        // No subscribers is normal.
        if self.sender.send(event).is_err() {
            trace!("Event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ZoneEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let at = Utc::now();
        bus.publish(ZoneEvent::MarkedStale {
            zone_id: "vi".to_string(),
            at,
        });
        bus.publish(ZoneEvent::NormalizationFailed {
            zone_id: "ikoyi".to_string(),
            reason: "no depth".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().zone_id(), "vi");
        assert_eq!(rx.recv().await.unwrap().zone_id(), "ikoyi");
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(ZoneEvent::MarkedStale {
            zone_id: "vi".to_string(),
            at: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
