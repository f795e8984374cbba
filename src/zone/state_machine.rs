// src/zone/state_machine.rs
//
// Per-zone state machine. Owns the observation history, the operator
// override and the last published ZoneState.
//
//   INITIALIZING ──first accepted observation──▶ NOMINAL / ALERT / CRITICAL
//   NOMINAL ◀──▶ ALERT ◀──▶ CRITICAL   (driven only by the risk tier)
//   OVERRIDDEN: orthogonal flag, set/cleared from any phase
//
// All methods take `now` explicitly. The machine is not thread-safe by
// itself; ZoneHandle serializes access to it.

use crate::analysis::{ObservationHistory, Trend, TrendClassifier};
use crate::dispatch::{Asset, DispatchPolicy, DispatchRecommendation, DispatchRule, RiskTier};
use crate::observation::{Observation, ObservationSource, RoadStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SWAP_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZonePhase {
    Initializing,
    Nominal,
    Alert,
    Critical,
}

impl ZonePhase {
    pub fn from_risk(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low | RiskTier::Medium => ZonePhase::Nominal,
            RiskTier::High => ZonePhase::Alert,
            RiskTier::Critical => ZonePhase::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZonePhase::Initializing => "INITIALIZING",
            ZonePhase::Nominal => "NOMINAL",
            ZonePhase::Alert => "ALERT",
            ZonePhase::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    Fresh,
    /// Latest reading is too old or analysis keeps failing; do not treat the
    /// numbers as current.
    Stale,
}

/// Operator-supplied values. Asset and tier are optional; when absent the
/// dispatch policy runs on the overridden depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualState {
    pub water_depth_cm: f32,
    #[serde(default)]
    pub road_status: Option<RoadStatus>,
    #[serde(default)]
    pub asset: Option<Asset>,
    #[serde(default)]
    pub risk_tier: Option<RiskTier>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ManualState {
    pub fn depth(water_depth_cm: f32) -> Self {
        Self {
            water_depth_cm,
            road_status: None,
            asset: None,
            risk_tier: None,
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveOverride {
    pub id: Uuid,
    pub manual: ManualState,
    pub set_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActiveOverride {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Externally visible snapshot. Published whole; never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneState {
    pub zone_id: String,
    pub phase: ZonePhase,
    pub latest: Option<Observation>,
    pub trend: Trend,
    pub recommendation: Option<DispatchRecommendation>,
    /// Whether the recommended asset can work at the latest depth.
    pub asset_operable: Option<bool>,
    pub overridden: bool,
    pub override_expires_at: Option<DateTime<Utc>>,
    pub freshness: Freshness,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ZoneState {
    pub fn initializing(zone_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            phase: ZonePhase::Initializing,
            latest: None,
            trend: Trend::Unknown,
            recommendation: None,
            asset_operable: None,
            overridden: false,
            override_expires_at: None,
            freshness: Freshness::Fresh,
            updated_at: now,
            version: 0,
        }
    }

    pub fn asset(&self) -> Option<Asset> {
        self.recommendation.map(|r| r.asset)
    }

    pub fn risk_tier(&self) -> Option<RiskTier> {
        self.recommendation.map(|r| r.risk_tier)
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSwap {
    pub at: DateTime<Utc>,
    pub from: Asset,
    pub to: Asset,
    pub rule: DispatchRule,
    pub water_depth_cm: f32,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub previous: Arc<ZoneState>,
    pub current: Arc<ZoneState>,
    pub swap: Option<AssetSwap>,
}

impl Transition {
    pub fn phase_changed(&self) -> bool {
        self.previous.phase != self.current.phase
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// AUTO reading taken before the active override expires.
    OverrideActive { expires_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Accepted {
        transition: Transition,
        /// Override that lapsed and was cleared by this observation.
        expired_override: Option<ActiveOverride>,
    },
    Rejected(Rejection),
}

#[derive(Debug, Clone)]
pub struct OverrideApplied {
    pub active: ActiveOverride,
    /// Still-live override replaced by this one.
    pub superseded: Option<ActiveOverride>,
    pub transition: Transition,
}

#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub expired_override: Option<ActiveOverride>,
    pub became_stale: bool,
    pub transitions: Vec<Transition>,
}

pub struct ZoneMachine {
    zone_id: String,
    policy: DispatchPolicy,
    classifier: TrendClassifier,
    history: ObservationHistory,
    active_override: Option<ActiveOverride>,
    confidence_floor: f32,
    current: Arc<ZoneState>,
    swaps: VecDeque<AssetSwap>,
}

impl ZoneMachine {
    pub fn new(
        zone_id: &str,
        policy: DispatchPolicy,
        classifier: TrendClassifier,
        history: ObservationHistory,
        confidence_floor: f32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            policy,
            classifier,
            history,
            active_override: None,
            confidence_floor,
            current: Arc::new(ZoneState::initializing(zone_id, now)),
            swaps: VecDeque::with_capacity(SWAP_LOG_CAPACITY),
        }
    }

    pub fn current(&self) -> Arc<ZoneState> {
        self.current.clone()
    }

    pub fn history(&self) -> &ObservationHistory {
        &self.history
    }

    pub fn active_override(&self) -> Option<&ActiveOverride> {
        self.active_override.as_ref()
    }

    /// Asset changes, oldest first.
    pub fn swaps(&self) -> impl Iterator<Item = &AssetSwap> {
        self.swaps.iter()
    }

    pub fn apply(&mut self, observation: Observation, now: DateTime<Utc>) -> ApplyOutcome {
        let mut expired_override = None;

        if observation.source == ObservationSource::Auto {
            if let Some(active) = &self.active_override {
                if observation.timestamp < active.expires_at {
                    debug!(
                        zone = %self.zone_id,
                        "Rejected AUTO observation ({:.1}cm) under override until {}",
                        observation.water_depth_cm,
                        active.expires_at
                    );
                    return ApplyOutcome::Rejected(Rejection::OverrideActive {
                        expires_at: active.expires_at,
                    });
                }
                expired_override = self.active_override.take();
                info!(zone = %self.zone_id, "Override expired, resuming automatic analysis");
            }
        }

        self.history.push(observation);
        let latest = self.history.latest().cloned();
        let transition = self.publish(latest, Freshness::Fresh, now);

        ApplyOutcome::Accepted {
            transition,
            expired_override,
        }
    }

    pub fn set_override(
        &mut self,
        manual: ManualState,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> OverrideApplied {
        let road_status = manual
            .road_status
            .or_else(|| self.current.latest.as_ref().map(|o| o.road_status))
            .unwrap_or(RoadStatus::Unknown);

        let mut observation = Observation::manual(now, manual.water_depth_cm, road_status);
        observation.notes = manual.note.clone();

        let active = ActiveOverride {
            id: Uuid::new_v4(),
            manual,
            set_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let superseded = self
            .active_override
            .replace(active.clone())
            .filter(|prev| !prev.is_expired(now));
        if let Some(prev) = &superseded {
            info!(
                zone = %self.zone_id,
                "Override {} superseded by {} (was due to expire {})",
                prev.id, active.id, prev.expires_at
            );
        }

        self.history.push(observation);
        let latest = self.history.latest().cloned();
        let transition = self.publish(latest, Freshness::Fresh, now);

        OverrideApplied {
            active,
            superseded,
            transition,
        }
    }

    /// None when no override was active.
    pub fn clear_override(&mut self, now: DateTime<Utc>) -> Option<(ActiveOverride, Transition)> {
        let cleared = self.active_override.take()?;
        info!(zone = %self.zone_id, "Override {} cleared by operator", cleared.id);
        let latest = self.history.latest().cloned();
        let freshness = self.current.freshness;
        Some((cleared, self.publish(latest, freshness, now)))
    }

    /// Expire a lapsed override and flag a reading older than `stale_after`.
    pub fn sweep(&mut self, now: DateTime<Utc>, stale_after: Duration) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        if self
            .active_override
            .as_ref()
            .map_or(false, |o| o.is_expired(now))
        {
            outcome.expired_override = self.active_override.take();
            let latest = self.history.latest().cloned();
            let freshness = self.current.freshness;
            outcome.transitions.push(self.publish(latest, freshness, now));
        }

        if self.active_override.is_none() && self.current.freshness == Freshness::Fresh {
            let too_old = self
                .current
                .latest
                .as_ref()
                .map_or(false, |o| now - o.timestamp > stale_after);
            if too_old {
                let latest = self.current.latest.clone();
                outcome.transitions.push(self.publish(latest, Freshness::Stale, now));
                outcome.became_stale = true;
            }
        }

        outcome
    }

    /// Analysis failed repeatedly: republish the last reading with decayed
    /// confidence. Operator values are left alone.
    pub fn mark_stale(&mut self, decay: f32, now: DateTime<Utc>) -> Option<Transition> {
        if self.active_override.is_some() {
            return None;
        }
        let latest = self
            .current
            .latest
            .as_ref()
            .map(|o| o.decayed(decay, self.confidence_floor));
        Some(self.publish(latest, Freshness::Stale, now))
    }

    fn recommend(&self, observation: &Observation, trend: Trend) -> DispatchRecommendation {
        let base = self.policy.assess(observation, trend);
        match &self.active_override {
            Some(o) if o.manual.asset.is_some() || o.manual.risk_tier.is_some() => {
                DispatchRecommendation {
                    asset: o.manual.asset.unwrap_or(base.asset),
                    risk_tier: o.manual.risk_tier.unwrap_or(base.risk_tier),
                    rule: DispatchRule::Operator,
                }
            }
            _ => base,
        }
    }

    fn publish(
        &mut self,
        latest: Option<Observation>,
        freshness: Freshness,
        now: DateTime<Utc>,
    ) -> Transition {
        let previous = self.current.clone();
        let trend = self.classifier.classify(&self.history);

        let (phase, recommendation, asset_operable) = match &latest {
            None => (ZonePhase::Initializing, None, None),
            Some(obs) => {
                let rec = self.recommend(obs, trend);
                (
                    ZonePhase::from_risk(rec.risk_tier),
                    Some(rec),
                    Some(rec.asset.can_operate(obs.water_depth_cm)),
                )
            }
        };

        let state = ZoneState {
            zone_id: self.zone_id.clone(),
            phase,
            latest,
            trend,
            recommendation,
            asset_operable,
            overridden: self.active_override.is_some(),
            override_expires_at: self.active_override.as_ref().map(|o| o.expires_at),
            freshness,
            updated_at: now,
            version: previous.version + 1,
        };

        let swap = match (previous.recommendation, state.recommendation, &state.latest) {
            (Some(from), Some(to), Some(obs)) if from.asset != to.asset => Some(AssetSwap {
                at: now,
                from: from.asset,
                to: to.asset,
                rule: to.rule,
                water_depth_cm: obs.water_depth_cm,
            }),
            _ => None,
        };

        if let Some(swap) = &swap {
            info!(
                zone = %self.zone_id,
                "Asset swap {} → {} at {:.0}cm ({})",
                swap.from.as_str(),
                swap.to.as_str(),
                swap.water_depth_cm,
                swap.rule.describe()
            );
            if self.swaps.len() >= SWAP_LOG_CAPACITY {
                self.swaps.pop_front();
            }
            self.swaps.push_back(swap.clone());
        }

        if previous.phase != state.phase {
            let (from, to) = (previous.phase.as_str(), state.phase.as_str());
            if state.phase == ZonePhase::Critical {
                warn!(zone = %self.zone_id, "Phase {} → {}", from, to);
            } else {
                info!(zone = %self.zone_id, "Phase {} → {}", from, to);
            }
        }

        self.current = Arc::new(state);
        Transition {
            previous,
            current: self.current.clone(),
            swap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DispatchThresholds, TrendConfig};

    fn machine(now: DateTime<Utc>) -> ZoneMachine {
        ZoneMachine::new(
            "lekki",
            DispatchPolicy::new(DispatchThresholds::default()),
            TrendClassifier::new(TrendConfig::default()),
            ObservationHistory::new(5, Duration::minutes(30)),
            0.2,
            now,
        )
    }

    fn auto(at: DateTime<Utc>, depth: f32, road: RoadStatus) -> Observation {
        Observation {
            timestamp: at,
            water_depth_cm: depth,
            road_status: road,
            confidence: 0.9,
            source: ObservationSource::Auto,
            low_confidence: false,
            notes: None,
        }
    }

    fn accepted(outcome: ApplyOutcome) -> Transition {
        match outcome {
            ApplyOutcome::Accepted { transition, .. } => transition,
            ApplyOutcome::Rejected(r) => panic!("expected acceptance, got {:?}", r),
        }
    }

    #[test]
    fn test_starts_initializing() {
        let m = machine(Utc::now());
        let state = m.current();
        assert_eq!(state.phase, ZonePhase::Initializing);
        assert!(state.recommendation.is_none());
        assert_eq!(state.version, 0);
    }

    #[test]
    fn test_first_observation_ends_initializing_regardless_of_value() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        let t = accepted(m.apply(auto(t0, 0.0, RoadStatus::Passable), t0));
        assert_eq!(t.previous.phase, ZonePhase::Initializing);
        assert_eq!(t.current.phase, ZonePhase::Nominal);
        assert_eq!(t.current.version, 1);
        assert!(t.swap.is_none());
    }

    #[test]
    fn test_lekki_rising_flood_sequence() {
        let t0 = Utc::now();
        let mut m = machine(t0);

        let s1 = accepted(m.apply(auto(t0, 30.0, RoadStatus::Passable), t0)).current;
        let t1 = t0 + Duration::minutes(10);
        let s2 = accepted(m.apply(auto(t1, 45.0, RoadStatus::Passable), t1)).current;
        let t2 = t0 + Duration::minutes(15);
        let s3 = accepted(m.apply(auto(t2, 75.0, RoadStatus::Impassable), t2)).current;

        let recs: Vec<(Asset, RiskTier)> = [&s1, &s2, &s3]
            .iter()
            .map(|s| (s.asset().unwrap(), s.risk_tier().unwrap()))
            .collect();
        assert_eq!(
            recs,
            vec![
                (Asset::Truck, RiskTier::Low),
                (Asset::Okada, RiskTier::Medium),
                (Asset::Canoe, RiskTier::Critical),
            ]
        );
        assert_eq!(s3.trend, Trend::RisingRapidly);
        assert_eq!(
            [s1.phase, s2.phase, s3.phase],
            [ZonePhase::Nominal, ZonePhase::Nominal, ZonePhase::Critical]
        );

        let swaps: Vec<(Asset, Asset)> = m.swaps().map(|s| (s.from, s.to)).collect();
        assert_eq!(
            swaps,
            vec![(Asset::Truck, Asset::Okada), (Asset::Okada, Asset::Canoe)]
        );
    }

    #[test]
    fn test_override_suppresses_auto_until_ttl() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        accepted(m.apply(auto(t0, 5.0, RoadStatus::Passable), t0));

        let applied = m.set_override(ManualState::depth(80.0), Duration::minutes(10), t0);
        assert!(applied.superseded.is_none());
        let under_override = m.current();
        assert!(under_override.overridden);
        assert_eq!(under_override.latest.as_ref().unwrap().water_depth_cm, 80.0);
        assert_eq!(under_override.trend, Trend::Stable);
        assert_eq!(under_override.asset(), Some(Asset::Canoe));

        let t1 = t0 + Duration::minutes(1);
        let outcome = m.apply(auto(t1, 5.0, RoadStatus::Passable), t1);
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected(Rejection::OverrideActive { .. })
        ));
        assert_eq!(m.current(), under_override);

        let t2 = t0 + Duration::minutes(11);
        match m.apply(auto(t2, 5.0, RoadStatus::Passable), t2) {
            ApplyOutcome::Accepted {
                transition,
                expired_override,
            } => {
                assert!(expired_override.is_some());
                assert!(!transition.current.overridden);
                assert_eq!(transition.current.asset(), Some(Asset::Truck));
                assert_eq!(
                    transition.current.latest.as_ref().unwrap().water_depth_cm,
                    5.0
                );
            }
            ApplyOutcome::Rejected(r) => panic!("expected acceptance after TTL, got {:?}", r),
        }
    }

    #[test]
    fn test_lapsed_override_does_not_drive_trend() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        m.set_override(ManualState::depth(10.0), Duration::minutes(10), t0);

        let t1 = t0 + Duration::minutes(11);
        let transition = accepted(m.apply(auto(t1, 75.0, RoadStatus::Passable), t1));
        assert!(!transition.current.overridden);
        assert_eq!(transition.current.trend, Trend::Unknown);

        let t2 = t1 + Duration::minutes(5);
        let transition = accepted(m.apply(auto(t2, 76.0, RoadStatus::Passable), t2));
        assert_eq!(transition.current.trend, Trend::Stable);
    }

    #[test]
    fn test_unrepresentable_ttl_saturates() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        let applied = m.set_override(ManualState::depth(10.0), Duration::days(365 * 300_000), t0);
        assert_eq!(applied.active.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!applied.active.is_expired(t0 + Duration::days(365)));
    }

    #[test]
    fn test_operator_asset_and_tier_are_forced() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        let manual = ManualState {
            water_depth_cm: 10.0,
            road_status: Some(RoadStatus::Impassable),
            asset: Some(Asset::Canoe),
            risk_tier: Some(RiskTier::Critical),
            note: Some("bridge washed out".to_string()),
        };
        let applied = m.set_override(manual, Duration::minutes(30), t0);
        let state = applied.transition.current;
        assert_eq!(state.phase, ZonePhase::Critical);
        let rec = state.recommendation.unwrap();
        assert_eq!(rec.asset, Asset::Canoe);
        assert_eq!(rec.risk_tier, RiskTier::Critical);
        assert_eq!(rec.rule, DispatchRule::Operator);
        assert_eq!(state.asset_operable, Some(false));
        assert_eq!(
            state.latest.as_ref().unwrap().notes.as_deref(),
            Some("bridge washed out")
        );
    }

    #[test]
    fn test_later_override_supersedes() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        let first = m.set_override(ManualState::depth(80.0), Duration::minutes(10), t0);
        let t1 = t0 + Duration::minutes(2);
        let second = m.set_override(ManualState::depth(20.0), Duration::minutes(5), t1);

        assert_eq!(second.superseded.map(|o| o.id), Some(first.active.id));
        let active = m.active_override().unwrap();
        assert_eq!(active.id, second.active.id);
        assert_eq!(active.expires_at, t1 + Duration::minutes(5));
        assert_eq!(m.current().latest.as_ref().unwrap().water_depth_cm, 20.0);
    }

    #[test]
    fn test_clear_override_resumes_auto() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        m.set_override(ManualState::depth(80.0), Duration::minutes(10), t0);
        let (_, cleared) = m.clear_override(t0 + Duration::minutes(1)).unwrap();
        assert!(!cleared.current.overridden);
        assert!(m.clear_override(t0 + Duration::minutes(1)).is_none());

        let t2 = t0 + Duration::minutes(2);
        accepted(m.apply(auto(t2, 12.0, RoadStatus::Passable), t2));
        assert_eq!(m.current().latest.as_ref().unwrap().water_depth_cm, 12.0);
    }

    #[test]
    fn test_sweep_expires_override_and_flags_stale() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        m.set_override(ManualState::depth(50.0), Duration::minutes(10), t0);

        let early = m.sweep(t0 + Duration::minutes(5), Duration::minutes(45));
        assert!(early.expired_override.is_none());
        assert!(early.transitions.is_empty());

        let later = m.sweep(t0 + Duration::minutes(10), Duration::minutes(45));
        assert!(later.expired_override.is_some());
        assert!(!m.current().overridden);

        let stale = m.sweep(t0 + Duration::minutes(50), Duration::minutes(45));
        assert!(stale.became_stale);
        assert!(m.current().is_stale());

        // A fresh reading clears the indicator.
        let t3 = t0 + Duration::minutes(51);
        accepted(m.apply(auto(t3, 50.0, RoadStatus::Passable), t3));
        assert_eq!(m.current().freshness, Freshness::Fresh);
    }

    #[test]
    fn test_mark_stale_decays_confidence_only() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        accepted(m.apply(auto(t0, 45.0, RoadStatus::Impassable), t0));

        let t = m.mark_stale(0.5, t0 + Duration::minutes(1)).unwrap();
        let latest = t.current.latest.as_ref().unwrap();
        assert!((latest.confidence - 0.45).abs() < 1e-6);
        assert_eq!(latest.road_status, RoadStatus::Impassable);
        assert_eq!(latest.water_depth_cm, 45.0);
        assert!(t.current.is_stale());
        // History keeps the original reading.
        assert_eq!(m.history().latest().unwrap().confidence, 0.9);

        // Further failures keep decaying; low confidence floors the tier.
        m.mark_stale(0.2, t0 + Duration::minutes(2));
        let state = m.current();
        assert!(state.latest.as_ref().unwrap().low_confidence);
        assert!(state.risk_tier().unwrap() >= RiskTier::Medium);
    }

    #[test]
    fn test_mark_stale_while_initializing() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        let t = m.mark_stale(0.5, t0).unwrap();
        assert_eq!(t.current.phase, ZonePhase::Initializing);
        assert!(t.current.is_stale());
    }

    #[test]
    fn test_mark_stale_skipped_under_override() {
        let t0 = Utc::now();
        let mut m = machine(t0);
        m.set_override(ManualState::depth(30.0), Duration::minutes(10), t0);
        assert!(m.mark_stale(0.5, t0).is_none());
    }
}
