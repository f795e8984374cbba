// src/override_gateway.rs
//
// Operator control surface: set/clear manual overrides and list zones.
// Requests go through the zone's own critical section, so the last one to
// arrive wins and supersedes whatever was active.

use crate::error::ZoneError;
use crate::zone::{ActiveOverride, ManualState, Zone, ZoneRegistry, ZoneState};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct OverrideReceipt {
    pub override_id: Uuid,
    pub zone_id: String,
    pub expires_at: DateTime<Utc>,
    pub superseded: Option<Uuid>,
    pub state: Arc<ZoneState>,
}

#[derive(Debug, Clone)]
pub struct ZoneListing {
    pub zone: Arc<Zone>,
    pub state: Arc<ZoneState>,
    pub active_override: Option<ActiveOverride>,
}

#[derive(Clone)]
pub struct OverrideGateway {
    registry: Arc<ZoneRegistry>,
    max_depth_cm: f32,
}

impl OverrideGateway {
    pub fn new(registry: Arc<ZoneRegistry>, max_depth_cm: f32) -> Self {
        Self {
            registry,
            max_depth_cm,
        }
    }

    pub fn set_override(
        &self,
        zone_id: &str,
        mut manual: ManualState,
        ttl: Duration,
    ) -> Result<OverrideReceipt, ZoneError> {
        if ttl <= Duration::zero() || Utc::now().checked_add_signed(ttl).is_none() {
            return Err(ZoneError::InvalidTtl);
        }
        if !manual.water_depth_cm.is_finite() {
            return Err(ZoneError::InvalidManualState(format!(
                "water depth {} is not a number",
                manual.water_depth_cm
            )));
        }
        manual.water_depth_cm = manual.water_depth_cm.clamp(0.0, self.max_depth_cm);

        let handle = self.registry.get(zone_id)?;
        let applied = handle.set_override(manual, ttl);

        info!(
            zone = %zone_id,
            "Override {} set ({:.0}cm) until {}",
            applied.active.id,
            applied.active.manual.water_depth_cm,
            applied.active.expires_at
        );

        Ok(OverrideReceipt {
            override_id: applied.active.id,
            zone_id: zone_id.to_string(),
            expires_at: applied.active.expires_at,
            superseded: applied.superseded.map(|o| o.id),
            state: applied.transition.current,
        })
    }

    /// Ok(None) when the zone had no active override.
    pub fn clear_override(&self, zone_id: &str) -> Result<Option<ActiveOverride>, ZoneError> {
        Ok(self.registry.get(zone_id)?.clear_override())
    }

    pub fn list_zones(&self) -> Vec<ZoneListing> {
        let mut listings: Vec<ZoneListing> = self
            .registry
            .handles()
            .into_iter()
            .map(|h| ZoneListing {
                zone: h.zone().clone(),
                state: h.snapshot(),
                active_override: h.active_override(),
            })
            .collect();
        listings.sort_by(|a, b| a.zone.id.cmp(&b.zone.id));
        listings
    }
}
