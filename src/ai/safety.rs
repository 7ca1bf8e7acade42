//! Short-horizon collision reflexes.
//!
//! The arbiter only relies on the `SafetyAdvisor` contract. `ReflexSafety` is
//! the advisor the race uses by default: it grades the gap to the nearest
//! vehicle in the agent's own lane, traffic or opponent, and suggests the
//! clearest neighbouring lane.

use crate::components::SpatialState;
use crate::config::{RaceConfig, SafetyConfig, TrackConfig};
use crate::error::DecisionError;

use super::types::{ObstacleSet, Urgency};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyAssessment {
    pub urgency: Urgency,
    pub suggested_lane: usize,
    pub suggested_speed: f32,
}

pub trait SafetyAdvisor: Send + Sync {
    fn assess(
        &self,
        me: &SpatialState,
        obstacles: &ObstacleSet,
    ) -> Result<SafetyAssessment, DecisionError>;
}

#[derive(Debug, Clone)]
pub struct ReflexSafety {
    bands: SafetyConfig,
    track: TrackConfig,
    footprint: f32,
}

impl ReflexSafety {
    pub fn new(config: &RaceConfig) -> Self {
        Self {
            bands: config.safety.clone(),
            track: config.track.clone(),
            footprint: config.search.footprint_length,
        }
    }

    pub fn classify(&self, gap: Option<f32>) -> Urgency {
        let b = &self.bands;
        match gap {
            Some(gap) if gap < b.critical_gap => Urgency::Critical,
            Some(gap) if gap < b.high_gap => Urgency::High,
            Some(gap) if gap < b.moderate_gap => Urgency::Moderate,
            Some(gap) if gap < b.low_gap => Urgency::Low,
            _ => Urgency::None,
        }
    }

    fn clearance(&self, obstacles: &ObstacleSet, lane: usize, from: f32) -> f32 {
        obstacles
            .vehicle_clearance_ahead(lane, from, self.footprint, self.bands.low_gap)
            .unwrap_or(f32::INFINITY)
    }

    /// Clearest of the current and neighbouring lanes; ties keep the current lane.
    fn escape_lane(&self, me: &SpatialState, obstacles: &ObstacleSet) -> usize {
        let candidates = [me.lane.checked_sub(1), Some(me.lane + 1)];
        let mut best = (me.lane, self.clearance(obstacles, me.lane, me.distance));
        for lane in candidates.into_iter().flatten() {
            if lane >= self.track.lane_count {
                continue;
            }
            let clearance = self.clearance(obstacles, lane, me.distance);
            if clearance > best.1 {
                best = (lane, clearance);
            }
        }
        best.0
    }
}

impl SafetyAdvisor for ReflexSafety {
    fn assess(
        &self,
        me: &SpatialState,
        obstacles: &ObstacleSet,
    ) -> Result<SafetyAssessment, DecisionError> {
        let gap =
            obstacles.vehicle_clearance_ahead(me.lane, me.distance, self.footprint, self.bands.low_gap);
        let urgency = self.classify(gap);
        let b = &self.bands;

        let (suggested_lane, suggested_speed) = match urgency {
            Urgency::None => (me.lane, me.speed),
            Urgency::Critical => (self.escape_lane(me, obstacles), self.track.min_speed),
            Urgency::High => (self.escape_lane(me, obstacles), me.speed * b.high_brake),
            Urgency::Moderate => (self.escape_lane(me, obstacles), me.speed * b.moderate_brake),
            Urgency::Low => (self.escape_lane(me, obstacles), me.speed * b.low_brake),
        };

        Ok(SafetyAssessment {
            urgency,
            suggested_lane,
            suggested_speed: self.track.clamp_speed(suggested_speed),
        })
    }
}
