// src/observation.rs
//
// One normalized reading for a zone. Produced by the normalizer (AUTO) or the
// override gateway (OVERRIDE); never mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoadStatus {
    Passable,
    Impassable,
    Unknown,
}

impl RoadStatus {
    /// Lenient mapping of analyzer vocabulary. Anything unrecognized is Unknown.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "PASSABLE" | "OPEN" | "CLEAR" => RoadStatus::Passable,
            "IMPASSABLE" | "NOT_PASSABLE" | "BLOCKED" | "CLOSED" | "FLOODED" => {
                RoadStatus::Impassable
            }
            _ => RoadStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoadStatus::Passable => "PASSABLE",
            RoadStatus::Impassable => "IMPASSABLE",
            RoadStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationSource {
    Auto,
    Override,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub water_depth_cm: f32,
    pub road_status: RoadStatus,
    pub confidence: f32,
    pub source: ObservationSource,
    /// Confidence fell below the configured floor.
    pub low_confidence: bool,
    /// Free-text evidence from the analyzer (landmark used, remarks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Observation {
    /// Synthetic reading carrying an operator's value.
    pub fn manual(
        timestamp: DateTime<Utc>,
        water_depth_cm: f32,
        road_status: RoadStatus,
    ) -> Self {
        Self {
            timestamp,
            water_depth_cm,
            road_status,
            confidence: 1.0,
            source: ObservationSource::Override,
            low_confidence: false,
            notes: None,
        }
    }

    pub fn is_override(&self) -> bool {
        self.source == ObservationSource::Override
    }

    /// Copy with confidence scaled by `factor`; depth and road status are kept.
    pub fn decayed(&self, factor: f32, confidence_floor: f32) -> Self {
        let confidence = (self.confidence * factor).clamp(0.0, 1.0);
        Self {
            confidence,
            low_confidence: confidence < confidence_floor,
            ..self.clone()
        }
    }
}
