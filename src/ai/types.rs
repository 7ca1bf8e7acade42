//! Per-tick data shared by the decision core: the obstacle snapshot in and
//! the control intent out.

use bevy::prelude::*;

use crate::components::{PowerUp, PowerUpKind, Role, SpatialState};

/// A (lane, distance) point on the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lane: usize,
    pub distance: f32,
}

impl TrackPoint {
    pub fn new(lane: usize, distance: f32) -> Self {
        Self { lane, distance }
    }
}

impl From<&SpatialState> for TrackPoint {
    fn from(state: &SpatialState) -> Self {
        Self::new(state.lane, state.distance)
    }
}

/// Read-only view of the track for one tick, as one agent sees it.
#[derive(Debug, Clone, Default)]
pub struct ObstacleSet {
    /// Traffic sorted by distance along the track.
    pub traffic: Vec<SpatialState>,
    pub power_ups: Vec<PowerUp>,
    /// The other racer, when known.
    pub opponent: Option<SpatialState>,
}

impl ObstacleSet {
    pub fn new(mut traffic: Vec<SpatialState>, power_ups: Vec<PowerUp>) -> Self {
        traffic.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self {
            traffic,
            power_ups,
            opponent: None,
        }
    }

    pub fn with_opponent(mut self, opponent: SpatialState) -> Self {
        self.opponent = Some(opponent);
        self
    }

    pub fn traffic_in_lane(&self, lane: usize) -> impl Iterator<Item = &SpatialState> {
        self.traffic.iter().filter(move |car| car.lane == lane)
    }

    /// Gap to the nearest traffic car ahead in `lane` within `horizon`, if any.
    /// Cars overlapping from slightly behind (within `behind`) count as gap zero.
    pub fn clearance_ahead(&self, lane: usize, from: f32, behind: f32, horizon: f32) -> Option<f32> {
        nearest_gap(self.traffic_in_lane(lane), from, behind, horizon)
    }

    /// Like `clearance_ahead`, but the opponent counts as a vehicle too.
    pub fn vehicle_clearance_ahead(
        &self,
        lane: usize,
        from: f32,
        behind: f32,
        horizon: f32,
    ) -> Option<f32> {
        let opponent = self.opponent.iter().filter(|o| o.lane == lane);
        nearest_gap(self.traffic_in_lane(lane).chain(opponent), from, behind, horizon)
    }

    pub fn power_ups_for(&self, role: Role) -> impl Iterator<Item = &PowerUp> {
        self.power_ups.iter().filter(move |p| p.kind.owner() == role)
    }
}

fn nearest_gap<'a>(
    vehicles: impl Iterator<Item = &'a SpatialState>,
    from: f32,
    behind: f32,
    horizon: f32,
) -> Option<f32> {
    vehicles
        .map(|car| car.distance - from)
        .filter(|gap| *gap > -behind && *gap <= horizon)
        .map(|gap| gap.max(0.0))
        .min_by(|a, b| a.total_cmp(b))
}

/// Danger classification, ordered from calm to imminent collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Urgency {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl Urgency {
    /// Scalar level in `0.0..=1.0` used by the blend weights.
    pub fn level(self) -> f32 {
        match self {
            Urgency::None => 0.0,
            Urgency::Low => 0.25,
            Urgency::Moderate => 0.5,
            Urgency::High => 0.75,
            Urgency::Critical => 1.0,
        }
    }
}

/// Which source dominated an emitted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IntentSource {
    Safety,
    Tactical,
    Search,
    PathFollowing,
    /// No advisor answered; hold lane and slow down.
    #[default]
    Fallback,
}

/// The decision handed to vehicle motion for one tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlIntent {
    pub target_lane: usize,
    pub target_speed: f32,
    pub urgency: Urgency,
    pub source: IntentSource,
}

/// A goal the path search steers toward, and why it was chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Goal {
    pub kind: GoalKind,
    pub point: TrackPoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalKind {
    Intercept,
    Evade,
    PowerUp(PowerUpKind),
    Cruise,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_is_ordered() {
        assert!(Urgency::None < Urgency::Low);
        assert!(Urgency::High < Urgency::Critical);
        assert_eq!(Urgency::Critical.level(), 1.0);
    }

    #[test]
    fn traffic_sorted_and_clearance_measured() {
        let obstacles = ObstacleSet::new(
            vec![
                SpatialState::new(0, 900.0, 3.0),
                SpatialState::new(0, 450.0, 3.0),
                SpatialState::new(1, 420.0, 3.0),
            ],
            vec![],
        );
        assert_eq!(obstacles.traffic[0].distance, 420.0);
        assert_eq!(obstacles.clearance_ahead(0, 400.0, 60.0, 1_000.0), Some(50.0));
        assert_eq!(obstacles.clearance_ahead(2, 400.0, 60.0, 1_000.0), None);
        // Overlapping from behind counts as touching.
        assert_eq!(obstacles.clearance_ahead(1, 440.0, 60.0, 1_000.0), Some(0.0));
    }

    #[test]
    fn opponent_counts_only_as_a_vehicle() {
        let obstacles = ObstacleSet::new(vec![SpatialState::new(1, 700.0, 3.0)], vec![])
            .with_opponent(SpatialState::new(1, 520.0, 6.0));
        assert_eq!(obstacles.clearance_ahead(1, 500.0, 60.0, 1_000.0), Some(200.0));
        assert_eq!(obstacles.vehicle_clearance_ahead(1, 500.0, 60.0, 1_000.0), Some(20.0));
        assert_eq!(obstacles.vehicle_clearance_ahead(0, 500.0, 60.0, 1_000.0), None);
    }

    #[test]
    fn power_ups_filtered_by_owner() {
        let obstacles = ObstacleSet::new(
            vec![],
            vec![
                PowerUp {
                    kind: PowerUpKind::Ghost,
                    lane: 0,
                    distance: 100.0,
                },
                PowerUp {
                    kind: PowerUpKind::Emp,
                    lane: 1,
                    distance: 200.0,
                },
            ],
        );
        let thief: Vec<_> = obstacles.power_ups_for(Role::Evader).collect();
        assert_eq!(thief.len(), 1);
        assert_eq!(thief[0].kind, PowerUpKind::Ghost);
    }
}
