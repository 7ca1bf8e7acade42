//! Tunable race and AI parameters.
//!
//! Every constant the decision core depends on lives here so it can be
//! adjusted from a JSON file without recompiling. Missing fields fall back
//! to the defaults below.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub lane_count: usize,
    /// Lateral width of one lane in world units.
    pub lane_width: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub finish_distance: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            lane_count: 3,
            lane_width: 166.0,
            min_speed: 0.0,
            max_speed: 8.0,
            finish_distance: 50_000.0,
        }
    }
}

impl TrackConfig {
    pub fn clamp_lane(&self, lane: usize) -> usize {
        lane.min(self.lane_count.saturating_sub(1))
    }

    pub fn clamp_speed(&self, speed: f32) -> f32 {
        speed.clamp(self.min_speed, self.max_speed)
    }
}

// ---------------------------------------------------------------------------
// Path search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum node expansions per `find_path` call.
    pub iteration_cap: usize,
    pub coarse_step: u32,
    pub medium_step: u32,
    pub fine_step: u32,
    /// Remaining distance above which the coarse step is used.
    pub coarse_range: f32,
    /// Remaining distance (or distance to the opponent) below which the fine step is used.
    pub fine_range: f32,
    pub goal_tolerance: f32,
    /// Centre-to-centre distance along the track below which two vehicles
    /// in the same lane overlap.
    pub footprint_length: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iteration_cap: 2_000,
            coarse_step: 200,
            medium_step: 100,
            fine_step: 25,
            coarse_range: 1_000.0,
            fine_range: 250.0,
            goal_tolerance: 25.0,
            footprint_length: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Cost model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Cost per unit of forward displacement.
    pub distance: f32,
    /// Cost per lane index changed.
    pub lane_change: f32,
    pub traffic_penalty_cap: f32,
    pub traffic_safety_radius: f32,
    /// Share of the traffic penalty applied to cars in a neighbouring lane.
    pub adjacent_lane_factor: f32,
    /// Fixed penalty for a pursuer state ahead of the evader.
    pub overtake_penalty: f32,
    /// Additional pursuer penalty per unit ahead of the evader.
    pub overtake_weight: f32,
    pub evade_penalty_cap: f32,
    pub evade_range: f32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            distance: 1.0,
            lane_change: 120.0,
            traffic_penalty_cap: 400.0,
            traffic_safety_radius: 200.0,
            adjacent_lane_factor: 0.25,
            overtake_penalty: 10_000.0,
            overtake_weight: 10.0,
            evade_penalty_cap: 150.0,
            evade_range: 400.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Blending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub safety_floor: f32,
    pub safety_urgency_gain: f32,
    pub safety_density_gain: f32,
    pub safety_ceiling: f32,
    /// Upper edge of the close band.
    pub close_range: f32,
    /// Upper edge of the medium band.
    pub medium_range: f32,
    /// Upper edge of the long band; beyond it is the far band.
    pub long_range: f32,
    /// Distance ahead of the agent counted for traffic density.
    pub density_window: f32,
    /// Cars per lane inside the window that count as saturated traffic.
    pub density_saturation: f32,
    /// Share of the tactical weight kept at zero confidence.
    pub tactical_confidence_floor: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            safety_floor: 0.05,
            safety_urgency_gain: 0.6,
            safety_density_gain: 0.15,
            safety_ceiling: 0.9,
            close_range: 150.0,
            medium_range: 400.0,
            long_range: 1_000.0,
            density_window: 400.0,
            density_saturation: 2.0,
            tactical_confidence_floor: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Arbiter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Gap below which the pursuer has caught the evader.
    pub capture_threshold: f32,
    /// Gap below which the pursuer's speed is capped relative to the evader's.
    pub no_overtake_range: f32,
    pub pursuit_speed_fraction: f32,
    pub max_lane_delta: usize,
    pub max_speed_delta: f32,
    pub powerup_detection_radius: f32,
    /// Gap within which the pursuer targets the evader.
    pub pursuit_detection_range: f32,
    /// Gap within which the evader flees the pursuer.
    pub threat_range: f32,
    /// Ticks the opponent's position is projected ahead when choosing goals.
    pub projection_ticks: f32,
    /// How far behind the projected evader the pursuer aims.
    pub intercept_offset: f32,
    pub evade_horizon: f32,
    /// Extra speed per unit of gap beyond the capture threshold.
    pub closing_gain: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            capture_threshold: 100.0,
            no_overtake_range: 200.0,
            pursuit_speed_fraction: 0.95,
            max_lane_delta: 1,
            max_speed_delta: 0.5,
            powerup_detection_radius: 1_200.0,
            pursuit_detection_range: 3_000.0,
            threat_range: 300.0,
            projection_ticks: 30.0,
            intercept_offset: 70.0,
            evade_horizon: 800.0,
            closing_gain: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------
// Reflex safety
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub critical_gap: f32,
    pub high_gap: f32,
    pub moderate_gap: f32,
    pub low_gap: f32,
    pub high_brake: f32,
    pub moderate_brake: f32,
    pub low_brake: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            critical_gap: 40.0,
            high_gap: 100.0,
            moderate_gap: 180.0,
            low_gap: 300.0,
            high_brake: 0.5,
            moderate_brake: 0.8,
            low_brake: 0.95,
        }
    }
}

// ---------------------------------------------------------------------------
// Tactical lookahead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    pub horizon_ticks: f32,
    pub accelerate_step: f32,
    pub brake_step: f32,
    /// Traffic closer than this in a lane makes the lane unavailable.
    pub block_distance: f32,
    pub powerup_range: f32,
    /// Score margin between best and runner-up that maps to full confidence.
    pub confidence_scale: f32,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            horizon_ticks: 30.0,
            accelerate_step: 1.0,
            brake_step: 1.5,
            block_distance: 120.0,
            powerup_range: 600.0,
            confidence_scale: 40.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Race simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub traffic_count: usize,
    pub powerups_per_role: usize,
    pub evader_start: f32,
    pub pursuer_start: f32,
    pub acceleration: f32,
    pub braking: f32,
    pub emergency_braking: f32,
    pub lane_change_ticks: u32,
    pub pickup_radius: f32,
    pub crash_distance: f32,
    pub crash_recovery_ticks: u32,
    pub ghost_ticks: u32,
    pub shield_ticks: u32,
    pub boost_ticks: u32,
    pub slow_ticks: u32,
    pub traffic_min_speed: f32,
    pub traffic_max_speed: f32,
    /// Length of track ahead of the start that traffic is scattered over.
    pub traffic_spread: f32,
    /// Traffic this far behind the evader is respawned ahead.
    pub traffic_recycle_behind: f32,
    pub max_ticks: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            traffic_count: 60,
            powerups_per_role: 20,
            evader_start: 300.0,
            pursuer_start: 0.0,
            acceleration: 0.2,
            braking: 0.3,
            emergency_braking: 0.6,
            lane_change_ticks: 10,
            pickup_radius: 45.0,
            crash_distance: 55.0,
            crash_recovery_ticks: 60,
            ghost_ticks: 300,
            shield_ticks: 360,
            boost_ticks: 240,
            slow_ticks: 180,
            traffic_min_speed: 2.0,
            traffic_max_speed: 4.0,
            traffic_spread: 12_000.0,
            traffic_recycle_behind: 500.0,
            max_ticks: 60 * 60 * 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub track: TrackConfig,
    pub search: SearchConfig,
    pub cost: CostWeights,
    pub blend: BlendConfig,
    pub arbiter: ArbiterConfig,
    pub safety: SafetyConfig,
    pub tactical: TacticalConfig,
    pub sim: SimConfig,
}

impl RaceConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RaceConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.track.lane_count == 0 {
            return invalid("track.lane_count must be at least 1");
        }
        if self.track.lane_width <= 0.0 {
            return invalid("track.lane_width must be positive");
        }
        if self.track.min_speed < 0.0 || self.track.min_speed > self.track.max_speed {
            return invalid("track speed bounds must satisfy 0 <= min_speed <= max_speed");
        }
        if self.search.iteration_cap == 0 {
            return invalid("search.iteration_cap must be at least 1");
        }
        let steps = [
            self.search.fine_step,
            self.search.medium_step,
            self.search.coarse_step,
        ];
        if steps.contains(&0) {
            return invalid("search step sizes must be positive");
        }
        if !(steps[0] <= steps[1] && steps[1] <= steps[2]) {
            return invalid("search steps must satisfy fine <= medium <= coarse");
        }
        if self.search.goal_tolerance < self.search.fine_step as f32 / 2.0 {
            return invalid("search.goal_tolerance must cover half a fine step");
        }
        if self.cost.distance < 0.0 || self.cost.lane_change < 0.0 {
            return invalid("cost.distance and cost.lane_change must be non-negative");
        }
        if !(self.blend.close_range < self.blend.medium_range
            && self.blend.medium_range < self.blend.long_range)
        {
            return invalid("blend ranges must satisfy close < medium < long");
        }
        if !(self.safety.critical_gap < self.safety.high_gap
            && self.safety.high_gap < self.safety.moderate_gap
            && self.safety.moderate_gap < self.safety.low_gap)
        {
            return invalid("safety gaps must increase from critical to low");
        }
        if self.sim.traffic_min_speed > self.sim.traffic_max_speed || self.sim.traffic_spread <= 0.0 {
            return invalid("sim traffic speeds must be ordered and spread positive");
        }
        if self.arbiter.max_speed_delta <= 0.0 {
            return invalid("arbiter.max_speed_delta must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RaceConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = RaceConfig::from_json(r#"{ "track": { "lane_count": 4 } }"#).unwrap();
        assert_eq!(cfg.track.lane_count, 4);
        assert_eq!(cfg.track.lane_width, TrackConfig::default().lane_width);
        assert_eq!(cfg.search, SearchConfig::default());
    }

    #[test]
    fn zero_lanes_rejected() {
        let err = RaceConfig::from_json(r#"{ "track": { "lane_count": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_steps_rejected() {
        let err =
            RaceConfig::from_json(r#"{ "search": { "fine_step": 300 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn negative_lane_change_rejected() {
        let err = RaceConfig::from_json(r#"{ "cost": { "lane_change": -5.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = RaceConfig::from_json("{ track: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RaceConfig::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn clamp_lane_and_speed() {
        let track = TrackConfig::default();
        assert_eq!(track.clamp_lane(7), 2);
        assert_eq!(track.clamp_lane(1), 1);
        assert_eq!(track.clamp_speed(12.0), track.max_speed);
        assert_eq!(track.clamp_speed(-1.0), track.min_speed);
    }
}
