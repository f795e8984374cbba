// src/error.rs
//
// Error taxonomy. Per-observation errors stay inside their zone; only
// ConfigError is fatal, and only at startup.

use std::time::Duration;
use thiserror::Error;

/// Analyzer payload could not be turned into an Observation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("malformed analyzer payload: {0}")]
    MalformedPayload(String),
}

/// Failures talking to the external vision analyzer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analyzer rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalyzerError {
    /// Timeouts and transport failures are worth another attempt; cancellation
    /// and explicit client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalyzerError::Timeout(_) | AnalyzerError::Unavailable(_) => true,
            AnalyzerError::Rejected { status, .. } => *status == 429 || *status >= 500,
            AnalyzerError::Cancelled => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid zone '{zone}': {reason}")]
    InvalidZone { zone: String, reason: String },
    #[error("invalid threshold {field}: {reason}")]
    InvalidThreshold { field: &'static str, reason: String },
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Operator-facing errors for calls addressed to a zone.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneError {
    #[error("unknown zone '{0}'")]
    UnknownZone(String),
    #[error("override ttl must be positive and representable")]
    InvalidTtl,
    #[error("invalid manual state: {0}")]
    InvalidManualState(String),
}
