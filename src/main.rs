// src/main.rs
//
// Flood dispatch service. Loads the zone config, starts one analysis loop
// per zone against the HTTP vision analyzer and logs zone status until
// interrupted.

use anyhow::{Context, Result};
use flood_dispatch::analyzer::{ApiKeyPool, HttpAnalyzer};
use flood_dispatch::zone::ZoneState;
use flood_dispatch::{Config, FloodRuntime, ZoneEvent, ZonePhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_LOG_FILTER: &str = "flood_dispatch=info";

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn config_path() -> String {
    std::env::var("FLOOD_DISPATCH_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| "config.yaml".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let mut config = match Config::load(&path) {
        Ok(config) => {
            init_tracing(&config.logging.level);
            config
        }
        Err(e) => {
            init_tracing(DEFAULT_LOG_FILTER);
            error!("Cannot start: {}", e);
            return Err(e).with_context(|| format!("loading config from {}", path));
        }
    };
    info!("Configuration loaded from {} ({} zones)", path, config.zones.len());

    if let Ok(url) = std::env::var("ANALYZER_URL") {
        info!("Analyzer URL overridden from environment: {}", url);
        config.analyzer.url = url;
    }

    let keys = std::env::var(&config.analyzer.api_keys_env).unwrap_or_default();
    let pool = ApiKeyPool::from_csv(&keys, config.analyzer.max_key_errors);
    if pool.is_empty() {
        warn!(
            "No analyzer API keys in ${}; requests will be sent unauthenticated",
            config.analyzer.api_keys_env
        );
    }
    let analyzer = HttpAnalyzer::new(&config.analyzer, pool).context("creating analyzer client")?;

    let runtime = FloodRuntime::start(config, Arc::new(analyzer));
    let mut events = runtime.events();
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Event log fell behind, {} event(s) dropped", n),
                Err(RecvError::Closed) => break,
            },
            _ = status.tick() => log_status(&runtime),
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn log_event(event: &ZoneEvent) {
    match event {
        ZoneEvent::PhaseChanged {
            zone_id,
            to: ZonePhase::Critical,
            ..
        } => {
            warn!(zone = %zone_id, "Zone is CRITICAL");
        }
        ZoneEvent::OverrideCleared {
            zone_id,
            override_id,
            expired,
        } => {
            info!(
                zone = %zone_id,
                "Override {} {}",
                override_id,
                if *expired { "expired" } else { "cleared" }
            );
        }
        ZoneEvent::MarkedStale { zone_id, .. } => {
            warn!(zone = %zone_id, "Zone data is stale");
        }
        other => debug!(zone = %other.zone_id(), "{:?}", other),
    }
}

fn log_status(runtime: &FloodRuntime) {
    for state in runtime.snapshots() {
        info!("{}", status_line(&state));
    }
    match serde_json::to_string(&runtime.metrics().summary()) {
        Ok(json) => info!("Metrics: {}", json),
        Err(e) => warn!("Failed to serialize metrics: {}", e),
    }
}

fn status_line(state: &ZoneState) -> String {
    let depth = state
        .latest
        .as_ref()
        .map(|o| format!("{:.0}cm {} ({:.0}%)", o.water_depth_cm, o.road_status.as_str(), o.confidence * 100.0))
        .unwrap_or_else(|| "no data".to_string());
    let dispatch = state
        .recommendation
        .map(|r| format!("{} / {}", r.asset.as_str(), r.risk_tier.as_str()))
        .unwrap_or_else(|| "-".to_string());

    let mut flags = Vec::new();
    if state.overridden {
        flags.push("OVERRIDDEN");
    }
    if state.is_stale() {
        flags.push("STALE");
    }

    format!(
        "[{}] {} | {} | {} | {}{}",
        state.zone_id,
        state.phase.as_str(),
        depth,
        state.trend.as_str(),
        dispatch,
        if flags.is_empty() {
            String::new()
        } else {
            format!(" | {}", flags.join(","))
        }
    )
}
