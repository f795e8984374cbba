// src/analysis/mod.rs
//
// Observation pipeline for a single zone.
//
// Signal flow:
//   analyzer payload → normalizer → Observation → history → trend
//
// The zone state machine owns one history and calls the classifier after
// every accepted observation.

pub mod history;
pub mod normalizer;
pub mod trend;

pub use history::ObservationHistory;
pub use normalizer::{extract_json_block, Normalizer};
pub use trend::{Trend, TrendClassifier};
