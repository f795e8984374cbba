// src/analysis/normalizer.rs
//
// Turns untrusted analyzer payloads into bounded Observations.
//
// The analyzer is a vision model behind an HTTP server and its replies vary:
// flat objects, the nested `flood_assessment` / `meta_data` layout, numbers
// sent as strings, or a JSON object wrapped in prose. Out-of-range values are
// clamped; only a missing or unreadable depth or road status is an error.

use crate::error::NormalizationError;
use crate::observation::{Observation, ObservationSource, RoadStatus};
use crate::types::NormalizerConfig;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

const DEPTH_PATHS: &[&[&str]] = &[
    &["water_depth_cm"],
    &["water_level_cm"],
    &["water_level_estimate_cm"],
    &["flood_assessment", "water_level_cm"],
    &["visual_evidence", "water_level_cm"],
];

const STATUS_PATHS: &[&[&str]] = &[
    &["road_status"],
    &["bridge_status"],
    &["road", "status"],
];

const CONFIDENCE_PATHS: &[&[&str]] = &[
    &["confidence"],
    &["confidence_score"],
    &["meta_data", "confidence_score"],
];

const NOTES_PATHS: &[&[&str]] = &[
    &["notes"],
    &["flood_assessment", "observations"],
    &["visual_evidence", "observations"],
    &["flood_assessment", "reference_landmark"],
];

const OBSERVED_AT_PATHS: &[&[&str]] = &[&["observed_at"], &["meta_data", "observed_at"]];

#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn confidence_floor(&self) -> f32 {
        self.config.confidence_floor
    }

    /// Normalize a model reply that may be prose around a JSON object.
    pub fn normalize_text(
        &self,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Observation, NormalizationError> {
        let block = extract_json_block(text).ok_or_else(|| {
            NormalizationError::MalformedPayload("no JSON object in analyzer reply".to_string())
        })?;
        let value: Value = serde_json::from_str(block)
            .map_err(|e| NormalizationError::MalformedPayload(format!("invalid JSON: {}", e)))?;
        self.normalize(&value, received_at)
    }

    pub fn normalize(
        &self,
        raw: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<Observation, NormalizationError> {
        if !raw.is_object() {
            return Err(NormalizationError::MalformedPayload(
                "payload is not an object".to_string(),
            ));
        }

        let depth_value = lookup(raw, DEPTH_PATHS).ok_or_else(|| {
            NormalizationError::MalformedPayload("missing water depth".to_string())
        })?;
        let depth = parse_number(depth_value).ok_or_else(|| {
            NormalizationError::MalformedPayload(format!("unparseable water depth: {}", depth_value))
        })?;
        let water_depth_cm = (depth as f32).clamp(0.0, self.config.max_depth_cm);
        if depth < 0.0 || depth > self.config.max_depth_cm as f64 {
            debug!(
                "Clamped analyzer depth {} to {:.1}cm",
                depth, water_depth_cm
            );
        }

        let road_status = match lookup(raw, STATUS_PATHS) {
            Some(Value::String(s)) => RoadStatus::parse(s),
            Some(other) => {
                return Err(NormalizationError::MalformedPayload(format!(
                    "road status is not a string: {}",
                    other
                )))
            }
            None => match raw.get("passable").and_then(Value::as_bool) {
                Some(true) => RoadStatus::Passable,
                Some(false) => RoadStatus::Impassable,
                None => {
                    return Err(NormalizationError::MalformedPayload(
                        "missing road status".to_string(),
                    ))
                }
            },
        };

        let confidence = lookup(raw, CONFIDENCE_PATHS)
            .and_then(parse_number)
            .map(|c| (c as f32).clamp(0.0, 1.0))
            .unwrap_or(0.0);

        let notes = lookup(raw, NOTES_PATHS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let timestamp = lookup(raw, OBSERVED_AT_PATHS)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .filter(|t| *t <= received_at)
            .unwrap_or(received_at);

        Ok(Observation {
            timestamp,
            water_depth_cm,
            road_status,
            confidence,
            source: ObservationSource::Auto,
            low_confidence: confidence < self.config.confidence_floor,
            notes,
        })
    }
}

fn lookup<'a>(raw: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        let mut cur = raw;
        for key in path.iter() {
            cur = cur.get(key)?;
        }
        if cur.is_null() {
            None
        } else {
            Some(cur)
        }
    })
}

/// Numbers, or strings with a leading number ("45", "45cm", " 12.5 cm").
fn parse_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            s[..end].parse::<f64>().ok()?
        }
        _ => return None,
    };
    if n.is_nan() {
        None
    } else {
        Some(n)
    }
}

/// First balanced `{...}` block in `text`, ignoring braces inside strings.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
