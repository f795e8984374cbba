// src/zone/registry.rs
//
// Zone id → handle. Lookups never touch a zone's lock.

use super::handle::ZoneHandle;
use super::state_machine::ZoneState;
use super::Zone;
use crate::error::ZoneError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Default)]
pub struct ZoneRegistry {
    zones: DashMap<String, Arc<ZoneHandle>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: ZoneHandle) -> Arc<ZoneHandle> {
        let handle = Arc::new(handle);
        if let Some(previous) = self
            .zones
            .insert(handle.id().to_string(), handle.clone())
        {
            previous.cancel_token().cancel();
        }
        handle
    }

    pub fn get(&self, zone_id: &str) -> Result<Arc<ZoneHandle>, ZoneError> {
        self.zones
            .get(zone_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ZoneError::UnknownZone(zone_id.to_string()))
    }

    pub fn snapshot(&self, zone_id: &str) -> Result<Arc<ZoneState>, ZoneError> {
        Ok(self.get(zone_id)?.snapshot())
    }

    /// All current snapshots, ordered by zone id.
    pub fn snapshots(&self) -> Vec<Arc<ZoneState>> {
        let mut all: Vec<Arc<ZoneState>> = self.zones.iter().map(|e| e.value().snapshot()).collect();
        all.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
        all
    }

    pub fn subscribe(&self, zone_id: &str) -> Result<watch::Receiver<Arc<ZoneState>>, ZoneError> {
        Ok(self.get(zone_id)?.subscribe())
    }

    /// Static zone descriptions, ordered by id.
    pub fn zones(&self) -> Vec<Arc<Zone>> {
        let mut all: Vec<Arc<Zone>> = self.zones.iter().map(|e| e.value().zone().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn handles(&self) -> Vec<Arc<ZoneHandle>> {
        self.zones.iter().map(|e| e.value().clone()).collect()
    }

    /// Remove a zone and cancel its tasks and any in-flight analysis.
    pub fn remove(&self, zone_id: &str) -> Result<Arc<ZoneHandle>, ZoneError> {
        let (_, handle) = self
            .zones
            .remove(zone_id)
            .ok_or_else(|| ZoneError::UnknownZone(zone_id.to_string()))?;
        handle.cancel_token().cancel();
        info!(zone = %zone_id, "Zone removed");
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event_bus::EventBus;
    use crate::pipeline::metrics::RuntimeMetrics;
    use crate::types::Config;
    use tokio_util::sync::CancellationToken;

    fn registry() -> (ZoneRegistry, CancellationToken) {
        let config = Config::from_yaml(
            r#"
zones:
  - { id: vi, display_name: Victoria Island, geo: { lat: 6.4281, lon: 3.4219 } }
  - { id: ikoyi, display_name: Ikoyi, geo: { lat: 6.4500, lon: 3.4300 } }
"#,
        )
        .unwrap();
        let root = CancellationToken::new();
        let registry = ZoneRegistry::new();
        for zc in &config.zones {
            registry.insert(ZoneHandle::new(
                Zone::resolve(zc, &config),
                &config,
                EventBus::new(16),
                RuntimeMetrics::new(),
                root.child_token(),
            ));
        }
        (registry, root)
    }

    #[test]
    fn test_lookup_and_listing() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 2);
        let ids: Vec<String> = registry.snapshots().iter().map(|s| s.zone_id.clone()).collect();
        assert_eq!(ids, vec!["ikoyi", "vi"]);
        assert_eq!(registry.zones()[1].display_name, "Victoria Island");
        assert!(matches!(
            registry.snapshot("lagos_island"),
            Err(ZoneError::UnknownZone(_))
        ));
    }

    #[test]
    fn test_remove_cancels_zone() {
        let (registry, root) = registry();
        let removed = registry.remove("vi").unwrap();
        assert!(removed.cancel_token().is_cancelled());
        assert!(!root.is_cancelled());
        assert!(!registry.get("ikoyi").unwrap().cancel_token().is_cancelled());
        assert!(registry.remove("vi").is_err());
    }
}
