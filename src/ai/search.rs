//! Best-first path search over the (lane, distance) grid.
//!
//! Nodes are `GridCell`s: a lane index plus a whole-unit distance. Each
//! expansion moves forward by a step that shrinks near the goal and near the
//! opponent, either holding the lane or shifting one lane. The frontier,
//! closed set and parent links are owned by `pathfinding`'s A* for the
//! duration of one call; nothing survives between calls.
//!
//! Costs are converted to fixed-point integers so they can be totally
//! ordered. Ties on `f` favour the node with the larger `g`, i.e. the one
//! closer to the goal.
//!
//! The heuristic is measured in cost units, not track units: a lane is worth
//! no more than a lane change costs, a unit of distance no more than it costs
//! to drive, and the goal tolerance is credited up front. It therefore never
//! exceeds the cheapest remaining cost.

use micromegas_tracing::prelude::*;
use pathfinding::prelude::astar;

use crate::components::SpatialState;
use crate::config::{RaceConfig, SearchConfig};
use crate::error::{DecisionError, SearchLimit};

use super::cost::{CostContext, CostModel};
use super::heuristic::Heuristic;
use super::types::TrackPoint;

/// Fixed-point units per unit of cost.
const COST_SCALE: f32 = 100.0;

fn to_fixed(cost: f32) -> u64 {
    (cost.max(0.0) * COST_SCALE).round() as u64
}

/// Discretized search state; its identity is what the closed set tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub lane: usize,
    pub distance: i64,
}

impl GridCell {
    fn point(self) -> TrackPoint {
        TrackPoint::new(self.lane, self.distance as f32)
    }
}

/// One step of a found path with the costs the search assigned to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub lane: usize,
    pub distance: f32,
    pub g_cost: f32,
    pub h_cost: f32,
}

impl Waypoint {
    pub fn f_cost(&self) -> f32 {
        self.g_cost + self.h_cost
    }

    pub fn point(&self) -> TrackPoint {
        TrackPoint::new(self.lane, self.distance)
    }
}

/// A non-empty path from the start state to within tolerance of the goal.
/// Only the search builds plans, so every plan has at least its start.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPlan {
    start: Waypoint,
    rest: Vec<Waypoint>,
    expanded: usize,
}

impl PathPlan {
    fn from_waypoints(waypoints: Vec<Waypoint>, expanded: usize) -> Option<Self> {
        let mut waypoints = waypoints.into_iter();
        let start = waypoints.next()?;
        Some(Self {
            start,
            rest: waypoints.collect(),
            expanded,
        })
    }

    pub fn start(&self) -> &Waypoint {
        &self.start
    }

    pub fn last(&self) -> &Waypoint {
        self.rest.last().unwrap_or(&self.start)
    }

    /// All waypoints in travel order, the start included.
    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        std::iter::once(&self.start).chain(&self.rest)
    }

    pub fn waypoint_count(&self) -> usize {
        1 + self.rest.len()
    }

    /// Nodes expanded to find this plan.
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    /// Lane the plan wants next: the first waypoint after the start.
    pub fn next_lane(&self) -> usize {
        self.rest.first().unwrap_or(&self.start).lane
    }

    pub fn total_cost(&self) -> f32 {
        self.last().g_cost
    }
}

#[derive(Debug, Clone)]
pub struct PathSearchEngine {
    heuristic: Heuristic,
    cost: CostModel,
    search: SearchConfig,
    lane_count: usize,
    /// Lane spacing for the heuristic, in distance units.
    lateral_unit: f32,
    /// Cost per distance unit the heuristic may assume.
    distance_weight: f32,
}

impl PathSearchEngine {
    pub fn new(heuristic: Heuristic, config: &RaceConfig) -> Self {
        let weights = &config.cost;
        let distance_weight = weights.distance.max(0.0);
        // A lane change must never look dearer to the heuristic than it is.
        let lane_cost = if distance_weight > 0.0 {
            weights.lane_change.max(0.0) / distance_weight
        } else {
            0.0
        };
        Self {
            heuristic,
            cost: CostModel::new(config),
            search: config.search.clone(),
            lane_count: config.track.lane_count,
            lateral_unit: config.track.lane_width.min(lane_cost),
            distance_weight,
        }
    }

    pub fn heuristic(&self) -> Heuristic {
        self.heuristic
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn iteration_cap(&self) -> usize {
        self.search.iteration_cap
    }

    /// Reject goals whose lane is off the track, naming the nearest valid lane.
    pub fn validate_goal(&self, goal: TrackPoint) -> Result<TrackPoint, DecisionError> {
        if goal.lane < self.lane_count {
            return Ok(goal);
        }
        Err(DecisionError::InvalidGoalState {
            lane: goal.lane,
            lane_count: self.lane_count,
            clamped: self.lane_count.saturating_sub(1),
        })
    }

    /// Search from `start` toward `goal`. Always returns within the iteration
    /// cap: either a non-empty plan ending within tolerance of the goal, or
    /// `NoPathFound`. An off-track goal lane is clamped, not refused.
    pub fn find_path(
        &self,
        start: &SpatialState,
        goal: TrackPoint,
        ctx: &CostContext,
    ) -> Result<PathPlan, DecisionError> {
        span_scope!("find_path");

        let goal = match self.validate_goal(goal) {
            Ok(goal) => goal,
            Err(DecisionError::InvalidGoalState { clamped, .. }) => {
                warn!("goal lane {} off track, clamping to {}", goal.lane, clamped);
                TrackPoint::new(clamped, goal.distance)
            }
            Err(err) => return Err(err),
        };
        let start_cell = GridCell {
            lane: start.lane.min(self.lane_count.saturating_sub(1)),
            distance: start.distance.round() as i64,
        };

        let cap = self.search.iteration_cap;
        let mut expanded = 0usize;
        let mut capped = false;
        let found = astar(
            &start_cell,
            |cell| {
                if expanded >= cap {
                    capped = true;
                    return Vec::new();
                }
                expanded += 1;
                self.successors(*cell, goal, ctx)
            },
            |cell| (self.estimate(*cell, goal) * COST_SCALE).floor() as u64,
            |cell| self.reached(*cell, goal),
        );

        imetric!("search_expanded", "count", expanded as u64);

        let Some((cells, _)) = found else {
            let limit = if capped {
                SearchLimit::IterationCap
            } else {
                SearchLimit::FrontierExhausted
            };
            return Err(DecisionError::NoPathFound { expanded, limit });
        };

        PathPlan::from_waypoints(self.annotate(&cells, goal, ctx), expanded).ok_or(
            DecisionError::NoPathFound {
                expanded,
                limit: SearchLimit::FrontierExhausted,
            },
        )
    }

    /// Lower bound on the cost from `cell` to any state within tolerance of `goal`.
    fn estimate(&self, cell: GridCell, goal: TrackPoint) -> f32 {
        let track_units = self.heuristic.estimate(cell.point(), goal, self.lateral_unit);
        ((track_units - self.search.goal_tolerance) * self.distance_weight).max(0.0)
    }

    fn reached(&self, cell: GridCell, goal: TrackPoint) -> bool {
        cell.lane == goal.lane
            && (cell.distance as f32 - goal.distance).abs() <= self.search.goal_tolerance
    }

    /// Forward step for expanding `cell`: coarse far from the goal, fine near
    /// the goal or the opponent, never jumping past the goal distance.
    fn step_size(&self, cell: GridCell, goal: TrackPoint, ctx: &CostContext) -> i64 {
        let s = &self.search;
        let here = cell.distance as f32;
        let remaining = goal.distance - here;
        let near_opponent = (ctx.opponent.distance - here).abs() < s.fine_range;

        let step = i64::from(if remaining <= s.fine_range || near_opponent {
            s.fine_step
        } else if remaining <= s.coarse_range {
            s.medium_step
        } else {
            s.coarse_step
        });

        let remaining = remaining.floor() as i64;
        step.min(remaining.max(s.fine_step as i64))
    }

    fn successors(&self, cell: GridCell, goal: TrackPoint, ctx: &CostContext) -> Vec<(GridCell, u64)> {
        let step = self.step_size(cell, goal, ctx);
        let distance = cell.distance + step;
        // Forward-only moves can never come back to a goal already passed.
        if distance as f32 > goal.distance + self.search.goal_tolerance {
            return Vec::new();
        }

        let from = cell.point();
        let lanes = [cell.lane.checked_sub(1), Some(cell.lane), Some(cell.lane + 1)];
        lanes
            .into_iter()
            .flatten()
            .filter(|lane| *lane < self.lane_count)
            .filter_map(|lane| {
                let next = GridCell { lane, distance };
                self.cost
                    .edge_cost(from, next.point(), ctx)
                    .map(|cost| (next, to_fixed(cost)))
            })
            .collect()
    }

    fn annotate(&self, cells: &[GridCell], goal: TrackPoint, ctx: &CostContext) -> Vec<Waypoint> {
        let mut g_cost = 0.0;
        let mut previous: Option<GridCell> = None;
        cells
            .iter()
            .map(|cell| {
                if let Some(prev) = previous {
                    g_cost += self
                        .cost
                        .edge_cost(prev.point(), cell.point(), ctx)
                        .unwrap_or(0.0);
                }
                previous = Some(*cell);
                Waypoint {
                    lane: cell.lane,
                    distance: cell.distance as f32,
                    g_cost,
                    h_cost: self.estimate(*cell, goal),
                }
            })
            .collect()
    }
}
