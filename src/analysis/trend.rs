// src/analysis/trend.rs
//
// Rate-of-change label for a zone, derived from its observation history.
// Never stored: recomputed from the history every time state changes.

use super::history::ObservationHistory;
use crate::types::TrendConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    RisingRapidly,
    Rising,
    Stable,
    Receding,
    Unknown,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::RisingRapidly => "RISING_RAPIDLY",
            Trend::Rising => "RISING",
            Trend::Stable => "STABLE",
            Trend::Receding => "RECEDING",
            Trend::Unknown => "UNKNOWN",
        }
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, Trend::Rising | Trend::RisingRapidly)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrendClassifier {
    config: TrendConfig,
}

impl TrendClassifier {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Depth change in cm/min between the oldest and newest in-window
    /// analyzer readings. Operator values are skipped so a lapsed override
    /// never becomes the baseline. None with fewer than two readings or no
    /// elapsed time between them.
    pub fn rate_cm_per_min(history: &ObservationHistory) -> Option<f32> {
        let mut window = history.in_window().filter(|o| !o.is_override());
        let oldest = window.next()?;
        let newest = window.last()?;

        let elapsed_ms = (newest.timestamp - oldest.timestamp).num_milliseconds();
        if elapsed_ms <= 0 {
            return None;
        }
        let minutes = elapsed_ms as f32 / 60_000.0;
        Some((newest.water_depth_cm - oldest.water_depth_cm) / minutes)
    }

    pub fn classify(&self, history: &ObservationHistory) -> Trend {
        // An operator value is not a measurement; hold the trend until the
        // analyzer reports again.
        match history.latest() {
            None => return Trend::Unknown,
            Some(latest) if latest.is_override() => return Trend::Stable,
            Some(_) => {}
        }

        let Some(rate) = Self::rate_cm_per_min(history) else {
            return Trend::Unknown;
        };

        if rate >= self.config.rapid_cm_per_min {
            Trend::RisingRapidly
        } else if rate >= self.config.slow_cm_per_min {
            Trend::Rising
        } else if rate > -self.config.slow_cm_per_min {
            Trend::Stable
        } else {
            Trend::Receding
        }
    }
}
