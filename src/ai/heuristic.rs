//! Remaining-cost estimates for the path search.

use serde::{Deserialize, Serialize};

use super::types::TrackPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heuristic {
    /// Lane changes and forward travel as independent moves. Evader default.
    Manhattan,
    /// Straight-line distance between lane centres. Pursuer default.
    Euclidean,
}

/// Lateral centre of a lane, measured from the road's left edge.
pub fn lane_to_x(lane: usize, lane_width: f32) -> f32 {
    (lane as f32 + 0.5) * lane_width
}

impl Heuristic {
    pub fn estimate(self, from: TrackPoint, goal: TrackPoint, lane_width: f32) -> f32 {
        let forward = (goal.distance - from.distance).abs();
        match self {
            Heuristic::Manhattan => from.lane.abs_diff(goal.lane) as f32 * lane_width + forward,
            Heuristic::Euclidean => {
                let lateral = lane_to_x(from.lane, lane_width) - lane_to_x(goal.lane, lane_width);
                lateral.hypot(forward)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: f32 = 166.0;

    #[test]
    fn zero_at_goal() {
        let goal = TrackPoint::new(2, 1_500.0);
        assert_eq!(Heuristic::Manhattan.estimate(goal, goal, WIDTH), 0.0);
        assert_eq!(Heuristic::Euclidean.estimate(goal, goal, WIDTH), 0.0);
    }

    #[test]
    fn manhattan_adds_lane_width_per_lane() {
        let h = Heuristic::Manhattan.estimate(
            TrackPoint::new(0, 1_000.0),
            TrackPoint::new(2, 1_400.0),
            WIDTH,
        );
        assert!((h - (2.0 * WIDTH + 400.0)).abs() < 1e-3);
    }

    #[test]
    fn euclidean_never_exceeds_manhattan() {
        for from_lane in 0..3 {
            for goal_lane in 0..3 {
                for from_d in [0.0_f32, 137.5, 400.0, 999.0] {
                    for goal_d in [0.0_f32, 250.0, 1_000.0, 5_000.0] {
                        let from = TrackPoint::new(from_lane, from_d);
                        let goal = TrackPoint::new(goal_lane, goal_d);
                        let l1 = Heuristic::Manhattan.estimate(from, goal, WIDTH);
                        let l2 = Heuristic::Euclidean.estimate(from, goal, WIDTH);
                        assert!(l2 >= 0.0);
                        assert!(l2 <= l1 + 1e-3, "{from:?} -> {goal:?}: {l2} > {l1}");
                    }
                }
            }
        }
    }

    #[test]
    fn estimates_shrink_approaching_goal() {
        let goal = TrackPoint::new(1, 1_000.0);
        for h in [Heuristic::Manhattan, Heuristic::Euclidean] {
            let mut previous = f32::INFINITY;
            // Forward steps with one lane change on the way.
            for (lane, d) in [(0, 600.0), (0, 700.0), (1, 800.0), (1, 900.0), (1, 1_000.0)] {
                let estimate = h.estimate(TrackPoint::new(lane, d), goal, WIDTH);
                assert!(estimate <= previous, "{h:?} rose to {estimate}");
                previous = estimate;
            }
            assert_eq!(previous, 0.0);
        }
    }
}
