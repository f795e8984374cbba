// src/zone/mod.rs
//
// Monitored zones. A Zone is the static description resolved from config;
// ZoneHandle owns its live state; ZoneRegistry maps ids to handles.

pub mod handle;
pub mod registry;
pub mod state_machine;

pub use handle::ZoneHandle;
pub use registry::ZoneRegistry;
pub use state_machine::{
    ActiveOverride, AssetSwap, Freshness, ManualState, ZoneMachine, ZonePhase, ZoneState,
};

use crate::types::{Config, DispatchThresholds, GeoRef, ZoneConfig};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: String,
    pub display_name: String,
    pub geo: GeoRef,
    pub sources: Vec<String>,
    pub thresholds: DispatchThresholds,
    pub interval: Duration,
}

impl Zone {
    /// Per-zone settings fall back to the global ones.
    pub fn resolve(zone: &ZoneConfig, config: &Config) -> Self {
        Self {
            id: zone.id.clone(),
            display_name: zone.display_name.clone(),
            geo: zone.geo,
            sources: zone.sources.clone(),
            thresholds: zone.dispatch.unwrap_or(config.dispatch),
            interval: Duration::from_secs(
                zone.interval_secs.unwrap_or(config.scheduler.interval_secs),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_inherits_global_settings() {
        let config = Config::from_yaml(
            r#"
scheduler:
  interval_secs: 600
zones:
  - id: lekki
    display_name: Lekki Phase 1
    geo: { lat: 6.4474, lon: 3.4723 }
  - id: vi
    display_name: Victoria Island
    geo: { lat: 6.4281, lon: 3.4219 }
    interval_secs: 120
    dispatch: { light_vehicle_min_cm: 20, watercraft_min_cm: 50 }
"#,
        )
        .unwrap();

        let lekki = Zone::resolve(&config.zones[0], &config);
        assert_eq!(lekki.interval, Duration::from_secs(600));
        assert_eq!(lekki.thresholds, DispatchThresholds::default());

        let vi = Zone::resolve(&config.zones[1], &config);
        assert_eq!(vi.interval, Duration::from_secs(120));
        assert_eq!(vi.thresholds.light_vehicle_min_cm, 20.0);
        assert_eq!(vi.thresholds.watercraft_min_cm, 50.0);
    }
}
