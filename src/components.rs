use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ai::{DecisionArbiter, Heuristic};

// ---------------------------------------------------------------------------
// Track position
// ---------------------------------------------------------------------------

/// Lane, distance along the track and speed of one vehicle for the current tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialState {
    pub lane: usize,
    pub distance: f32,
    pub speed: f32,
}

impl SpatialState {
    /// Negative distance or speed is clamped to zero.
    pub fn new(lane: usize, distance: f32, speed: f32) -> Self {
        Self {
            lane,
            distance: distance.max(0.0),
            speed: speed.max(0.0),
        }
    }

    /// Same state with the lane forced onto a track of `lane_count` lanes.
    pub fn clamped_to(self, lane_count: usize) -> Self {
        Self {
            lane: self.lane.min(lane_count.saturating_sub(1)),
            ..self
        }
    }

    /// Signed distance from `self` forward to `other`.
    pub fn gap_to(&self, other: &SpatialState) -> f32 {
        other.distance - self.distance
    }

    pub fn lanes_apart(&self, other: &SpatialState) -> usize {
        self.lane.abs_diff(other.lane)
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Police.
    Pursuer,
    /// Thief.
    Evader,
}

impl Role {
    pub fn opponent(self) -> Role {
        match self {
            Role::Pursuer => Role::Evader,
            Role::Evader => Role::Pursuer,
        }
    }

    /// Pursuers use the diagonal-aware estimate for aggressive interception.
    pub fn heuristic(self) -> Heuristic {
        match self {
            Role::Pursuer => Heuristic::Euclidean,
            Role::Evader => Heuristic::Manhattan,
        }
    }
}

/// An agent's decision core. The arbiter keeps its previous intent for smoothing.
#[derive(Component)]
pub struct Pilot(pub DecisionArbiter);

impl Pilot {
    pub fn new(role: Role, config: &crate::config::RaceConfig) -> Self {
        Self(DecisionArbiter::new(role, config))
    }
}

/// Timed power-up and crash effects, in ticks remaining.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveEffects {
    pub ghost: u32,
    pub shield: u32,
    pub boost: u32,
    pub slowed: u32,
    pub crash_recovery: u32,
}

impl ActiveEffects {
    pub fn ghost_mode(&self) -> bool {
        self.ghost > 0
    }

    pub fn tick(&mut self) {
        for timer in [
            &mut self.ghost,
            &mut self.shield,
            &mut self.boost,
            &mut self.slowed,
            &mut self.crash_recovery,
        ] {
            *timer = timer.saturating_sub(1);
        }
    }
}

/// Ticks until the vehicle may shift lanes again.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Steering {
    pub cooldown: u32,
}

// ---------------------------------------------------------------------------
// Track objects
// ---------------------------------------------------------------------------

/// Oncoming civilian car. Position and speed live in its `SpatialState`.
#[derive(Component, Debug)]
pub struct TrafficCar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpKind {
    Freeze,
    Boost,
    Shield,
    Ghost,
    Spike,
    Emp,
    Turbo,
    Roadblock,
    Magnet,
}

/// What collecting a power-up does in the race loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUpEffect {
    Ghost,
    Shield,
    Boost,
    SlowOpponent,
}

impl PowerUpKind {
    pub const THIEF: [PowerUpKind; 4] = [
        PowerUpKind::Freeze,
        PowerUpKind::Boost,
        PowerUpKind::Shield,
        PowerUpKind::Ghost,
    ];

    pub const POLICE: [PowerUpKind; 5] = [
        PowerUpKind::Spike,
        PowerUpKind::Emp,
        PowerUpKind::Turbo,
        PowerUpKind::Roadblock,
        PowerUpKind::Magnet,
    ];

    /// The only role allowed to collect this kind.
    pub fn owner(self) -> Role {
        match self {
            PowerUpKind::Freeze | PowerUpKind::Boost | PowerUpKind::Shield | PowerUpKind::Ghost => {
                Role::Evader
            }
            _ => Role::Pursuer,
        }
    }

    /// Bonus the tactical scorer adds for steering onto this kind.
    pub fn priority(self) -> f32 {
        match self {
            PowerUpKind::Emp => 18.0,
            PowerUpKind::Freeze | PowerUpKind::Turbo => 15.0,
            PowerUpKind::Magnet => 14.0,
            PowerUpKind::Shield | PowerUpKind::Spike => 12.0,
            PowerUpKind::Boost | PowerUpKind::Roadblock => 10.0,
            PowerUpKind::Ghost => 8.0,
        }
    }

    pub fn effect(self) -> PowerUpEffect {
        match self {
            PowerUpKind::Ghost => PowerUpEffect::Ghost,
            PowerUpKind::Shield => PowerUpEffect::Shield,
            PowerUpKind::Boost | PowerUpKind::Turbo => PowerUpEffect::Boost,
            PowerUpKind::Freeze
            | PowerUpKind::Emp
            | PowerUpKind::Spike
            | PowerUpKind::Roadblock
            | PowerUpKind::Magnet => PowerUpEffect::SlowOpponent,
        }
    }
}

/// A collectible resting at a fixed track position.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub lane: usize,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spatial_state_never_negative() {
        let s = SpatialState::new(1, -50.0, -2.0);
        assert_eq!(s.distance, 0.0);
        assert_eq!(s.speed, 0.0);
    }

    #[test]
    fn clamped_to_track() {
        let s = SpatialState::new(5, 10.0, 1.0).clamped_to(3);
        assert_eq!(s.lane, 2);
    }

    #[test]
    fn power_up_ownership_splits_by_role() {
        assert!(PowerUpKind::THIEF.iter().all(|k| k.owner() == Role::Evader));
        assert!(PowerUpKind::POLICE.iter().all(|k| k.owner() == Role::Pursuer));
    }

    #[test]
    fn effects_count_down_to_zero() {
        let mut fx = ActiveEffects {
            ghost: 2,
            shield: 1,
            ..default()
        };
        assert!(fx.ghost_mode());
        fx.tick();
        fx.tick();
        fx.tick();
        assert_eq!(fx, ActiveEffects::default());
        assert!(!fx.ghost_mode());
    }

    #[test]
    fn roles_pick_heuristics() {
        assert_eq!(Role::Pursuer.heuristic(), Heuristic::Euclidean);
        assert_eq!(Role::Evader.heuristic(), Heuristic::Manhattan);
        assert_eq!(Role::Pursuer.opponent(), Role::Evader);
    }
}
