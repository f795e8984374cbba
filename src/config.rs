// src/config.rs

use crate::error::ConfigError;
use crate::types::{Config, DispatchThresholds};
use std::collections::HashSet;
use std::fs;

impl Config {
    /// Read, parse and validate the config file. Any failure here is fatal.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zones.is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "zones",
                reason: "at least one zone must be configured".to_string(),
            });
        }

        let n = &self.normalizer;
        if !(n.max_depth_cm > 0.0) {
            return Err(ConfigError::InvalidThreshold {
                field: "normalizer.max_depth_cm",
                reason: format!("must be positive, got {}", n.max_depth_cm),
            });
        }
        if !(0.0..=1.0).contains(&n.confidence_floor) {
            return Err(ConfigError::InvalidThreshold {
                field: "normalizer.confidence_floor",
                reason: format!("must be within [0, 1], got {}", n.confidence_floor),
            });
        }

        let t = &self.trend;
        if !(t.slow_cm_per_min > 0.0) || !(t.rapid_cm_per_min > t.slow_cm_per_min) {
            return Err(ConfigError::InvalidThreshold {
                field: "trend",
                reason: format!(
                    "need 0 < slow ({}) < rapid ({})",
                    t.slow_cm_per_min, t.rapid_cm_per_min
                ),
            });
        }

        if self.history.capacity < 2 {
            return Err(ConfigError::InvalidSetting {
                field: "history.capacity",
                reason: "a trend needs at least 2 observations".to_string(),
            });
        }
        if self.history.lookback_minutes <= 0 {
            return Err(ConfigError::InvalidSetting {
                field: "history.lookback_minutes",
                reason: "must be positive".to_string(),
            });
        }

        let a = &self.analyzer;
        if a.timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "analyzer.timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if a.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "analyzer.retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if a.retry.base_delay_ms > a.retry.max_delay_ms {
            return Err(ConfigError::InvalidSetting {
                field: "analyzer.retry",
                reason: "base_delay_ms exceeds max_delay_ms".to_string(),
            });
        }

        let s = &self.scheduler;
        if s.interval_secs == 0 || s.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "scheduler",
                reason: "intervals must be positive".to_string(),
            });
        }
        if !(s.stale_confidence_decay > 0.0 && s.stale_confidence_decay <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                field: "scheduler.stale_confidence_decay",
                reason: format!("must be within (0, 1], got {}", s.stale_confidence_decay),
            });
        }

        check_dispatch(&self.dispatch, n.max_depth_cm).map_err(|reason| {
            ConfigError::InvalidThreshold {
                field: "dispatch",
                reason,
            }
        })?;

        let mut seen = HashSet::new();
        for zone in &self.zones {
            let invalid = |reason: String| ConfigError::InvalidZone {
                zone: zone.id.clone(),
                reason,
            };

            if zone.id.trim().is_empty() {
                return Err(invalid("id must not be empty".to_string()));
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(invalid("duplicate zone id".to_string()));
            }
            if !(-90.0..=90.0).contains(&zone.geo.lat) || !(-180.0..=180.0).contains(&zone.geo.lon)
            {
                return Err(invalid(format!(
                    "coordinates out of range ({}, {})",
                    zone.geo.lat, zone.geo.lon
                )));
            }
            if zone.interval_secs == Some(0) {
                return Err(invalid("interval_secs must be positive".to_string()));
            }
            if let Some(thresholds) = &zone.dispatch {
                check_dispatch(thresholds, n.max_depth_cm).map_err(invalid)?;
            }
        }

        Ok(())
    }
}

fn check_dispatch(t: &DispatchThresholds, max_depth_cm: f32) -> Result<(), String> {
    if !(t.light_vehicle_min_cm >= 0.0 && t.light_vehicle_min_cm < t.watercraft_min_cm) {
        return Err(format!(
            "need 0 <= light_vehicle_min_cm ({}) < watercraft_min_cm ({})",
            t.light_vehicle_min_cm, t.watercraft_min_cm
        ));
    }
    if t.watercraft_min_cm > max_depth_cm {
        return Err(format!(
            "watercraft_min_cm ({}) exceeds max depth ({})",
            t.watercraft_min_cm, max_depth_cm
        ));
    }
    Ok(())
}
