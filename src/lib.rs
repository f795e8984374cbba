// src/lib.rs
//
// Per-zone flood state from vision analyzer observations, with asset
// dispatch recommendations and operator overrides.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod observation;
pub mod override_gateway;
pub mod pipeline;
pub mod types;
pub mod zone;

pub use analyzer::{AnalysisRequest, AnalyzerReply, HttpAnalyzer, VisionAnalyzer};
pub use dispatch::{Asset, DispatchPolicy, DispatchRecommendation, RiskTier};
pub use error::{AnalyzerError, ConfigError, NormalizationError, ZoneError};
pub use observation::{Observation, ObservationSource, RoadStatus};
pub use override_gateway::OverrideGateway;
pub use pipeline::{FloodRuntime, ZoneEvent};
pub use types::Config;
pub use zone::{ManualState, ZonePhase, ZoneState};
