// src/dispatch.rs
//
// Dispatch policy: (depth, trend, road status) → asset + risk tier.
//
// Ordered rules, first match wins, with a final catch-all so every input
// maps to exactly one outcome. No state, no I/O: the same inputs always
// give the same recommendation.

use crate::analysis::Trend;
use crate::observation::{Observation, RoadStatus};
use crate::types::DispatchThresholds;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Asset {
    /// Heavy vehicle.
    Truck,
    /// Motorcycle taxi.
    Okada,
    /// Watercraft.
    Canoe,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Truck => "TRUCK",
            Asset::Okada => "OKADA",
            Asset::Canoe => "CANOE",
        }
    }

    /// Operating envelope in cm of standing water.
    pub fn can_operate(&self, depth_cm: f32) -> bool {
        match self {
            Asset::Truck => depth_cm <= 40.0,
            Asset::Okada => depth_cm <= 20.0,
            Asset::Canoe => depth_cm >= 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

/// Which rule produced a recommendation, for operators reading the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchRule {
    DeepWater,
    LightVehicleCorridor,
    ShallowOrPassable,
    BlockedRoute,
    /// Asset and tier supplied by an operator override.
    Operator,
}

impl DispatchRule {
    pub fn describe(&self) -> &'static str {
        match self {
            DispatchRule::DeepWater => "depth above watercraft threshold",
            DispatchRule::LightVehicleCorridor => "moderate depth on a usable road",
            DispatchRule::ShallowOrPassable => "shallow water or road passable",
            DispatchRule::BlockedRoute => "road impassable at moderate depth",
            DispatchRule::Operator => "operator override",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecommendation {
    pub asset: Asset,
    pub risk_tier: RiskTier,
    pub rule: DispatchRule,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    thresholds: DispatchThresholds,
}

impl DispatchPolicy {
    pub fn new(thresholds: DispatchThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DispatchThresholds {
        &self.thresholds
    }

    pub fn recommend(
        &self,
        depth_cm: f32,
        trend: Trend,
        road_status: RoadStatus,
    ) -> DispatchRecommendation {
        let light = self.thresholds.light_vehicle_min_cm;
        let watercraft = self.thresholds.watercraft_min_cm;

        let (asset, risk_tier, rule) = if depth_cm > watercraft {
            let tier = match trend {
                Trend::RisingRapidly => RiskTier::Critical,
                Trend::Rising => RiskTier::High,
                _ => RiskTier::Medium,
            };
            (Asset::Canoe, tier, DispatchRule::DeepWater)
        } else if depth_cm > light && road_status != RoadStatus::Impassable {
            let tier = if trend == Trend::RisingRapidly {
                RiskTier::High
            } else {
                RiskTier::Medium
            };
            (Asset::Okada, tier, DispatchRule::LightVehicleCorridor)
        } else if depth_cm <= light || road_status == RoadStatus::Passable {
            let tier = if trend.is_rising() {
                RiskTier::Medium
            } else {
                RiskTier::Low
            };
            (Asset::Truck, tier, DispatchRule::ShallowOrPassable)
        } else {
            // Only an impassable road at light < depth <= watercraft gets here.
            (Asset::Canoe, RiskTier::High, DispatchRule::BlockedRoute)
        };

        // An unknown road picks assets like a passable one but never reads
        // as low risk.
        let risk_tier = if road_status == RoadStatus::Unknown {
            risk_tier.max(RiskTier::Medium)
        } else {
            risk_tier
        };

        DispatchRecommendation {
            asset,
            risk_tier,
            rule,
        }
    }

    /// `recommend` for an observation, flooring low-confidence readings at MEDIUM.
    pub fn assess(&self, observation: &Observation, trend: Trend) -> DispatchRecommendation {
        let mut rec = self.recommend(observation.water_depth_cm, trend, observation.road_status);
        if observation.low_confidence {
            rec.risk_tier = rec.risk_tier.max(RiskTier::Medium);
        }
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRENDS: [Trend; 5] = [
        Trend::RisingRapidly,
        Trend::Rising,
        Trend::Stable,
        Trend::Receding,
        Trend::Unknown,
    ];
    const ROADS: [RoadStatus; 3] = [
        RoadStatus::Passable,
        RoadStatus::Impassable,
        RoadStatus::Unknown,
    ];

    fn policy() -> DispatchPolicy {
        DispatchPolicy::new(DispatchThresholds::default())
    }

    #[test]
    fn test_deep_water_is_always_canoe() {
        let p = policy();
        for depth in [60.01, 61.0, 120.0, 500.0] {
            for trend in TRENDS {
                for road in ROADS {
                    assert_eq!(p.recommend(depth, trend, road).asset, Asset::Canoe);
                }
            }
        }
        assert_eq!(
            p.recommend(75.0, Trend::RisingRapidly, RoadStatus::Impassable).risk_tier,
            RiskTier::Critical
        );
        assert_eq!(
            p.recommend(75.0, Trend::Rising, RoadStatus::Passable).risk_tier,
            RiskTier::High
        );
        assert_eq!(
            p.recommend(75.0, Trend::Receding, RoadStatus::Passable).risk_tier,
            RiskTier::Medium
        );
    }

    #[test]
    fn test_exactly_sixty_takes_the_lower_branch() {
        let p = policy();
        let rec = p.recommend(60.0, Trend::Stable, RoadStatus::Passable);
        assert_eq!(rec.asset, Asset::Okada);
        assert_eq!(rec.rule, DispatchRule::LightVehicleCorridor);

        let rec = p.recommend(60.0, Trend::Stable, RoadStatus::Impassable);
        assert_eq!(rec.asset, Asset::Canoe);
        assert_eq!(rec.risk_tier, RiskTier::High);
        assert_eq!(rec.rule, DispatchRule::BlockedRoute);
    }

    #[test]
    fn test_light_vehicle_corridor() {
        let p = policy();
        let rec = p.recommend(45.0, Trend::Rising, RoadStatus::Passable);
        assert_eq!((rec.asset, rec.risk_tier), (Asset::Okada, RiskTier::Medium));
        let rec = p.recommend(45.0, Trend::RisingRapidly, RoadStatus::Passable);
        assert_eq!((rec.asset, rec.risk_tier), (Asset::Okada, RiskTier::High));
    }

    #[test]
    fn test_shallow_water_sends_truck() {
        let p = policy();
        let rec = p.recommend(30.0, Trend::Unknown, RoadStatus::Passable);
        assert_eq!((rec.asset, rec.risk_tier), (Asset::Truck, RiskTier::Low));
        let rec = p.recommend(10.0, Trend::Rising, RoadStatus::Impassable);
        assert_eq!((rec.asset, rec.risk_tier), (Asset::Truck, RiskTier::Medium));
    }

    #[test]
    fn test_unknown_road_never_below_medium() {
        let p = policy();
        let rec = p.recommend(5.0, Trend::Stable, RoadStatus::Unknown);
        assert_eq!(rec.asset, Asset::Truck);
        assert_eq!(rec.risk_tier, RiskTier::Medium);
        // Same asset as passable.
        for depth in [0.0, 20.0, 45.0, 60.0, 90.0] {
            for trend in TRENDS {
                assert_eq!(
                    p.recommend(depth, trend, RoadStatus::Unknown).asset,
                    p.recommend(depth, trend, RoadStatus::Passable).asset
                );
            }
        }
    }

    #[test]
    fn test_literal_twenty_centimetre_boundary() {
        let p = DispatchPolicy::new(DispatchThresholds {
            light_vehicle_min_cm: 20.0,
            watercraft_min_cm: 60.0,
        });
        assert_eq!(
            p.recommend(20.0, Trend::Stable, RoadStatus::Passable).asset,
            Asset::Truck
        );
        assert_eq!(
            p.recommend(20.5, Trend::Stable, RoadStatus::Passable).asset,
            Asset::Okada
        );
    }

    #[test]
    fn test_recommend_is_pure() {
        let p = policy();
        for depth in [0.0, 19.9, 20.0, 40.0, 40.1, 59.9, 60.0, 60.1, 200.0] {
            for trend in TRENDS {
                for road in ROADS {
                    let first = p.recommend(depth, trend, road);
                    for _ in 0..3 {
                        assert_eq!(p.recommend(depth, trend, road), first);
                    }
                }
            }
        }
    }

    #[test]
    fn test_asset_envelopes() {
        assert!(Asset::Truck.can_operate(40.0));
        assert!(!Asset::Truck.can_operate(41.0));
        assert!(!Asset::Okada.can_operate(25.0));
        assert!(!Asset::Canoe.can_operate(10.0));
        assert!(Asset::Canoe.can_operate(75.0));
    }
}
