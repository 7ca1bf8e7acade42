//! Opponent-anticipation advisor.
//!
//! `LookaheadTactician` scores every legal (lane, speed action) pair against
//! every plausible opponent response over a short horizon and keeps the
//! action whose worst case is best. The utility terms reward the agent's role
//! objective (closing for the pursuer, opening for the evader) plus traffic
//! clearance, speed, lane preference and nearby power-ups.

use crate::components::{Role, SpatialState};
use crate::config::{RaceConfig, TrackConfig};
use crate::error::{Advisor, DecisionError};

use super::types::ObstacleSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TacticalSuggestion {
    pub suggested_lane: usize,
    pub suggested_speed: f32,
    /// How decisively the best action beat the runner-up, in `0.0..=1.0`.
    pub confidence: f32,
}

pub trait TacticalAdvisor: Send + Sync {
    fn evaluate(
        &self,
        me: &SpatialState,
        opponent: &SpatialState,
        obstacles: &ObstacleSet,
    ) -> Result<TacticalSuggestion, DecisionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedAction {
    Accelerate,
    Maintain,
    Brake,
}

impl SpeedAction {
    pub const ALL: [SpeedAction; 3] = [
        SpeedAction::Maintain,
        SpeedAction::Accelerate,
        SpeedAction::Brake,
    ];

    fn utility(self) -> f32 {
        match self {
            SpeedAction::Accelerate => 15.0,
            SpeedAction::Maintain => 10.0,
            SpeedAction::Brake => -5.0,
        }
    }
}

/// One candidate move: target lane plus the speed it leads to.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Move {
    lane: usize,
    speed: f32,
    action: SpeedAction,
}

// Utility weights.
const SAME_LANE_PURSUIT: f32 = 50.0;
const LANE_APART_PURSUIT: f32 = -15.0;
const BLOCK_ESCAPE: f32 = 40.0;
const OVERTAKE: f32 = -80.0;
const DIFFERENT_LANE_ESCAPE: f32 = 35.0;
const SAME_LANE_ESCAPE: f32 = -25.0;
const EVASIVE: f32 = 40.0;
const AHEAD: f32 = 20.0;
const GAP_REWARD_RATE: f32 = 0.1;
const GAP_REWARD_CAP: f32 = 30.0;
const CAR_AHEAD: f32 = -8.0;
const CENTRE_LANE: f32 = 5.0;
const LANE_CHANGE: f32 = -3.0;
const POWERUP_PROXIMITY: f32 = 20.0;

#[derive(Debug, Clone)]
pub struct LookaheadTactician {
    role: Role,
    config: RaceConfig,
}

impl LookaheadTactician {
    pub fn new(role: Role, config: &RaceConfig) -> Self {
        Self {
            role,
            config: config.clone(),
        }
    }

    fn track(&self) -> &TrackConfig {
        &self.config.track
    }

    fn speed_after(&self, speed: f32, action: SpeedAction) -> f32 {
        let t = &self.config.tactical;
        let next = match action {
            SpeedAction::Accelerate => speed + t.accelerate_step,
            SpeedAction::Maintain => speed,
            SpeedAction::Brake => speed - t.brake_step,
        };
        self.track().clamp_speed(next)
    }

    fn neighbour_lanes(&self, lane: usize) -> impl Iterator<Item = usize> + '_ {
        [Some(lane), lane.checked_sub(1), Some(lane + 1)]
            .into_iter()
            .flatten()
            .filter(|l| *l < self.track().lane_count)
    }

    /// A lane change is illegal into a lane with traffic inside the blocking distance.
    fn blocked(&self, lane: usize, at: f32, obstacles: &ObstacleSet) -> bool {
        obstacles
            .clearance_ahead(
                lane,
                at,
                self.config.search.footprint_length,
                self.config.tactical.block_distance,
            )
            .is_some()
    }

    fn moves_for(&self, state: &SpatialState, obstacles: Option<&ObstacleSet>) -> Vec<Move> {
        self.neighbour_lanes(state.lane)
            .filter(|lane| {
                *lane == state.lane
                    || obstacles.is_none_or(|o| !self.blocked(*lane, state.distance, o))
            })
            .flat_map(|lane| {
                SpeedAction::ALL.into_iter().map(move |action| (lane, action))
            })
            .map(|(lane, action)| Move {
                lane,
                speed: self.speed_after(state.speed, action),
                action,
            })
            .collect()
    }

    /// Utility terms that do not depend on the opponent's response.
    fn own_utility(&self, me: &SpatialState, mv: &Move, obstacles: &ObstacleSet) -> f32 {
        let safety = &self.config.safety;
        let window = self.config.blend.density_window;

        let clearance = obstacles
            .clearance_ahead(mv.lane, me.distance, self.config.search.footprint_length, window)
            .unwrap_or(f32::INFINITY);
        let clearance_term = if clearance > safety.low_gap {
            30.0
        } else if clearance > safety.moderate_gap {
            20.0
        } else if clearance > safety.high_gap {
            10.0
        } else {
            -20.0
        };
        let cars_ahead = obstacles
            .traffic_in_lane(mv.lane)
            .filter(|car| car.distance > me.distance && car.distance - me.distance <= window)
            .count() as f32;

        let centre = self.track().lane_count / 2;
        let lane_term = if mv.lane == centre { CENTRE_LANE } else { 0.0 }
            + if mv.lane != me.lane { LANE_CHANGE } else { 0.0 };

        clearance_term
            + CAR_AHEAD * cars_ahead
            + mv.action.utility()
            + lane_term
            + self.powerup_term(me, mv.lane, obstacles)
    }

    fn powerup_term(&self, me: &SpatialState, lane: usize, obstacles: &ObstacleSet) -> f32 {
        let range = self.config.tactical.powerup_range;
        obstacles
            .power_ups_for(self.role)
            .filter(|p| p.lane == lane)
            .filter_map(|p| {
                let ahead = p.distance - me.distance;
                (ahead > 0.0 && ahead <= range)
                    .then(|| POWERUP_PROXIMITY * (1.0 - ahead / range) + p.kind.priority())
            })
            .fold(0.0, f32::max)
    }

    /// Utility terms that depend on how the opponent responds.
    fn versus_utility(
        &self,
        me: &SpatialState,
        opponent: &SpatialState,
        mv: &Move,
        response: &Move,
    ) -> f32 {
        let horizon = self.config.tactical.horizon_ticks;
        let my_next = me.distance + mv.speed * horizon;
        let their_next = opponent.distance + response.speed * horizon;
        let lanes_apart = mv.lane.abs_diff(response.lane) as f32;

        match self.role {
            Role::Pursuer => {
                let gap_now = opponent.distance - me.distance;
                let gap_next = their_next - my_next;
                let closing = ((gap_now - gap_next) * GAP_REWARD_RATE)
                    .clamp(-GAP_REWARD_CAP, GAP_REWARD_CAP);
                let alignment = if lanes_apart == 0.0 {
                    SAME_LANE_PURSUIT
                } else {
                    LANE_APART_PURSUIT * lanes_apart
                };
                // Waiting in the lane the evader is escaping into.
                let block = if response.lane != opponent.lane && mv.lane == response.lane {
                    BLOCK_ESCAPE
                } else {
                    0.0
                };
                let overtake = if my_next > their_next { OVERTAKE } else { 0.0 };
                alignment + closing + block + overtake
            }
            Role::Evader => {
                let gap_now = me.distance - opponent.distance;
                let gap_next = my_next - their_next;
                let opening = ((gap_next - gap_now) * GAP_REWARD_RATE)
                    .clamp(-GAP_REWARD_CAP, GAP_REWARD_CAP);
                let separation = if lanes_apart == 0.0 {
                    SAME_LANE_ESCAPE
                } else {
                    DIFFERENT_LANE_ESCAPE
                };
                let close = gap_now.abs() < self.config.arbiter.threat_range;
                let evasive = if close && mv.lane != me.lane { EVASIVE } else { 0.0 };
                let ahead = if gap_next > 0.0 { AHEAD } else { 0.0 };
                separation + opening + evasive + ahead
            }
        }
    }

    fn check_inputs(&self, me: &SpatialState, opponent: &SpatialState) -> Result<(), DecisionError> {
        let lanes = self.track().lane_count;
        let unavailable = |reason: String| DecisionError::AdvisorUnavailable {
            advisor: Advisor::Tactical,
            reason,
        };
        if me.lane >= lanes || opponent.lane >= lanes {
            return Err(unavailable(format!(
                "lane out of range ({} / {} of {lanes})",
                me.lane, opponent.lane
            )));
        }
        if !(me.speed.is_finite() && opponent.speed.is_finite()) {
            return Err(unavailable("non-finite speed".to_string()));
        }
        Ok(())
    }
}

impl TacticalAdvisor for LookaheadTactician {
    fn evaluate(
        &self,
        me: &SpatialState,
        opponent: &SpatialState,
        obstacles: &ObstacleSet,
    ) -> Result<TacticalSuggestion, DecisionError> {
        self.check_inputs(me, opponent)?;

        let responses = self.moves_for(opponent, None);
        let mut scored: Vec<(Move, f32)> = self
            .moves_for(me, Some(obstacles))
            .into_iter()
            .map(|mv| {
                let own = self.own_utility(me, &mv, obstacles);
                let worst = responses
                    .iter()
                    .map(|r| self.versus_utility(me, opponent, &mv, r))
                    .fold(f32::INFINITY, f32::min);
                (mv, own + worst)
            })
            .collect();

        // Stable sort keeps the earlier (more conservative) move on ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let Some(&(best, best_value)) = scored.first() else {
            return Err(DecisionError::AdvisorUnavailable {
                advisor: Advisor::Tactical,
                reason: "no legal action".to_string(),
            });
        };
        let margin = scored.get(1).map_or(best_value, |(_, v)| best_value - v);
        let confidence = (margin / self.config.tactical.confidence_scale).clamp(0.0, 1.0);

        Ok(TacticalSuggestion {
            suggested_lane: best.lane,
            suggested_speed: best.speed,
            confidence,
        })
    }
}
