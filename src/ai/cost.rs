//! Edge costs for the path search.
//!
//! The cost of moving into a successor is the sum of a distance term, a
//! lane-change penalty, a bounded traffic-proximity penalty and a
//! role-dependent opponent term. Literal collisions are not priced at all:
//! they are rejected.

use crate::components::{Role, SpatialState};
use crate::config::{CostWeights, RaceConfig};

use super::types::{ObstacleSet, TrackPoint};

/// Everything besides the transition itself that a cost depends on.
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    pub role: Role,
    pub obstacles: &'a ObstacleSet,
    pub opponent: SpatialState,
    /// Collision immunity: nothing is rejected and traffic is free.
    pub ghost: bool,
}

#[derive(Debug, Clone)]
pub struct CostModel {
    weights: CostWeights,
    footprint: f32,
    capture_threshold: f32,
}

impl CostModel {
    pub fn new(config: &RaceConfig) -> Self {
        Self {
            weights: config.cost.clone(),
            footprint: config.search.footprint_length,
            capture_threshold: config.arbiter.capture_threshold,
        }
    }

    /// Whether a vehicle at `at` would overlap traffic or the opponent.
    pub fn collides(&self, at: TrackPoint, ctx: &CostContext) -> bool {
        if ctx.ghost {
            return false;
        }
        let overlaps = |other: &SpatialState| {
            other.lane == at.lane && (other.distance - at.distance).abs() < self.footprint
        };
        overlaps(&ctx.opponent) || ctx.obstacles.traffic.iter().any(overlaps)
    }

    /// Cost of the transition `from -> to`, or `None` when `to` is a collision.
    pub fn edge_cost(&self, from: TrackPoint, to: TrackPoint, ctx: &CostContext) -> Option<f32> {
        if self.collides(to, ctx) {
            return None;
        }
        let w = &self.weights;
        let forward = (to.distance - from.distance).max(0.0) * w.distance;
        let lane_change = from.lane.abs_diff(to.lane) as f32 * w.lane_change;
        let cost = forward
            + lane_change
            + self.traffic_penalty(to, ctx)
            + self.opponent_term(from, to, ctx);
        cost.is_finite().then_some(cost)
    }

    /// Grows linearly as `at` nears any car inside the safety radius, capped in total.
    pub fn traffic_penalty(&self, at: TrackPoint, ctx: &CostContext) -> f32 {
        if ctx.ghost {
            return 0.0;
        }
        let w = &self.weights;
        let radius = w.traffic_safety_radius;
        let total: f32 = ctx
            .obstacles
            .traffic
            .iter()
            .filter_map(|car| {
                let lane_factor = match car.lane.abs_diff(at.lane) {
                    0 => 1.0,
                    1 => w.adjacent_lane_factor,
                    _ => return None,
                };
                let gap = (car.distance - at.distance).abs();
                (gap < radius).then(|| lane_factor * w.traffic_penalty_cap * (1.0 - gap / radius))
            })
            .sum();
        total.min(w.traffic_penalty_cap)
    }

    /// Pursuers pay heavily for any state ahead of the evader until the
    /// capture gap is reached. Evaders pay a bounded price for closeness, so
    /// opening the gap is rewarded and closing it is penalized.
    pub fn opponent_term(&self, from: TrackPoint, to: TrackPoint, ctx: &CostContext) -> f32 {
        let w = &self.weights;
        let opponent = ctx.opponent;
        match ctx.role {
            Role::Pursuer => {
                let ahead = to.distance - opponent.distance;
                let captured = (opponent.distance - from.distance).abs() < self.capture_threshold;
                if ahead > 0.0 && !captured {
                    w.overtake_penalty + w.overtake_weight * ahead
                } else {
                    0.0
                }
            }
            Role::Evader => {
                let gap = (to.distance - opponent.distance).abs();
                let closeness = (1.0 - gap / w.evade_range).clamp(0.0, 1.0);
                let lane_factor = if to.lane == opponent.lane { 1.0 } else { 0.5 };
                w.evade_penalty_cap * closeness * lane_factor
            }
        }
    }
}
