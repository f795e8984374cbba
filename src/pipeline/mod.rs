// src/pipeline/mod.rs

pub mod event_bus;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod single_flight;

pub use event_bus::{EventBus, ZoneEvent};
pub use metrics::{MetricsSummary, RuntimeMetrics};
pub use orchestrator::FloodRuntime;
pub use scheduler::{AnalysisScheduler, CycleOutcome};
pub use single_flight::SingleFlight;
