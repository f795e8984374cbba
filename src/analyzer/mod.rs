// src/analyzer/mod.rs
//
// Seam to the external vision analyzer. The scheduler only sees the
// VisionAnalyzer trait; http.rs is the production implementation and tests
// plug in an in-process mock.

pub mod http;
pub mod keys;

pub use http::HttpAnalyzer;
pub use keys::ApiKeyPool;

use crate::analysis::Normalizer;
use crate::error::{AnalyzerError, NormalizationError};
use crate::observation::Observation;
use crate::types::GeoRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// What the analyzer is asked to look at, and where.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    pub zone_id: String,
    pub display_name: String,
    pub geo: GeoRef,
    /// File path or URL of the frame/clip. None when the zone has no
    /// configured sources and the analyzer picks its own feed.
    pub source: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Raw analyzer output, not yet trusted.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerReply {
    Json(Value),
    /// Free-form model text, possibly with a JSON object inside.
    Text(String),
}

impl AnalyzerReply {
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::String(text)) => AnalyzerReply::Text(text),
            Ok(value) => AnalyzerReply::Json(value),
            Err(_) => AnalyzerReply::Text(body),
        }
    }

    pub fn normalize(
        &self,
        normalizer: &Normalizer,
        received_at: DateTime<Utc>,
    ) -> Result<Observation, NormalizationError> {
        match self {
            AnalyzerReply::Json(value) => normalizer.normalize(value, received_at),
            AnalyzerReply::Text(text) => normalizer.normalize_text(text, received_at),
        }
    }
}

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// One analysis call. Implementations may block for a long time; the
    /// caller bounds it with a timeout and cancellation.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalyzerReply, AnalyzerError>;

    fn name(&self) -> &str {
        "vision-analyzer"
    }
}
