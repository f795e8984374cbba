// src/types.rs
//
// Configuration types. Loaded once at startup from YAML; every section
// has defaults so a config file only needs to list its zones.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub dispatch: DispatchThresholds,
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env-filter directive, overridden by RUST_LOG when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "flood_dispatch=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub url: String,
    pub timeout_ms: u64,
    /// Environment variable holding comma-separated API keys.
    pub api_keys_env: String,
    pub rate_limit_cooldown_secs: u64,
    /// Consecutive errors after which a key is retired.
    pub max_key_errors: u32,
    pub retry: RetryConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            timeout_ms: 60_000,
            api_keys_env: "ANALYZER_API_KEYS".to_string(),
            rate_limit_cooldown_secs: 60,
            max_key_errors: 3,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Default tick interval per zone.
    pub interval_secs: u64,
    /// How often overrides and staleness are swept.
    pub sweep_interval_secs: u64,
    /// Age after which the latest observation is surfaced as stale.
    pub stale_after_secs: u64,
    /// Multiplier applied to confidence when analysis keeps failing.
    pub stale_confidence_decay: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            sweep_interval_secs: 30,
            stale_after_secs: 2_700,
            stale_confidence_decay: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub lookback_minutes: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            lookback_minutes: 30,
        }
    }
}

/// Rate thresholds in cm per minute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub rapid_cm_per_min: f32,
    pub slow_cm_per_min: f32,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            rapid_cm_per_min: 2.0,
            slow_cm_per_min: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub max_depth_cm: f32,
    pub confidence_floor: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_depth_cm: 500.0,
            confidence_floor: 0.2,
        }
    }
}

/// Depth boundaries for asset selection, in cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchThresholds {
    /// Above this (and up to `watercraft_min_cm`) a light vehicle is sent.
    pub light_vehicle_min_cm: f32,
    /// Above this only a watercraft is sent.
    pub watercraft_min_cm: f32,
}

impl Default for DispatchThresholds {
    fn default() -> Self {
        Self {
            light_vehicle_min_cm: 40.0,
            watercraft_min_cm: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: String,
    pub display_name: String,
    pub geo: GeoRef,
    /// Video/frame references handed to the analyzer, rotated per tick.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Replaces the global dispatch thresholds for this zone.
    #[serde(default)]
    pub dispatch: Option<DispatchThresholds>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRef {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub radius_m: Option<f64>,
}
