//! The priority hierarchy that turns advisor suggestions into one intent.
//!
//! Every tick the arbiter consults the safety advisor first. A critical
//! assessment is emitted as-is. Anything else is blended: the tactical
//! advisor, the path search and the previous intent each suggest a lane and a
//! speed, weighted by `BlendWeights`. The blended intent is clamped, capped
//! for a pursuer closing on the evader, and smoothed against the previous
//! tick. The only state kept between ticks is that previous intent.

use micromegas_tracing::prelude::*;

use crate::components::{Role, SpatialState};
use crate::config::RaceConfig;
use crate::error::{Advisor, DecisionError};

use super::blend::{traffic_density, BlendWeights, RangeBand};
use super::cost::CostContext;
use super::heuristic::Heuristic;
use super::safety::{ReflexSafety, SafetyAdvisor, SafetyAssessment};
use super::search::{PathPlan, PathSearchEngine};
use super::tactical::{LookaheadTactician, TacticalAdvisor, TacticalSuggestion};
use super::types::{ControlIntent, Goal, GoalKind, IntentSource, ObstacleSet, TrackPoint, Urgency};

/// Everything the arbiter needs for one agent's decision. When
/// `obstacles.opponent` is unset, `opponent` fills it in for the safety check.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub me: SpatialState,
    pub opponent: SpatialState,
    pub obstacles: &'a ObstacleSet,
    /// Temporary collision immunity.
    pub ghost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionMode {
    /// Critical danger: the safety suggestion is emitted unblended.
    SafetyOverride,
    /// Blended, with the safety advisor reporting some danger.
    SafetyInfluenced,
    Blended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Skipped by a safety override.
    NotRun,
    Planned {
        waypoints: usize,
        expanded: usize,
        next_lane: usize,
    },
    Failed(DecisionError),
}

/// What went into the most recent decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTrace {
    pub mode: DecisionMode,
    pub urgency: Urgency,
    pub weights: BlendWeights,
    pub band: RangeBand,
    pub goal: Option<Goal>,
    pub search: SearchOutcome,
    pub unavailable: Vec<Advisor>,
    /// Blended intent before smoothing.
    pub raw: ControlIntent,
}

pub struct DecisionArbiter {
    role: Role,
    config: RaceConfig,
    safety: Box<dyn SafetyAdvisor>,
    tactical: Box<dyn TacticalAdvisor>,
    engine: PathSearchEngine,
    previous: Option<ControlIntent>,
    trace: Option<DecisionTrace>,
}

impl DecisionArbiter {
    /// Arbiter with the default advisors and the role's heuristic.
    pub fn new(role: Role, config: &RaceConfig) -> Self {
        Self {
            role,
            config: config.clone(),
            safety: Box::new(ReflexSafety::new(config)),
            tactical: Box::new(LookaheadTactician::new(role, config)),
            engine: PathSearchEngine::new(role.heuristic(), config),
            previous: None,
            trace: None,
        }
    }

    pub fn with_advisors(
        mut self,
        safety: Box<dyn SafetyAdvisor>,
        tactical: Box<dyn TacticalAdvisor>,
    ) -> Self {
        self.safety = safety;
        self.tactical = tactical;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Heuristic) -> Self {
        self.engine = PathSearchEngine::new(heuristic, &self.config);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn engine(&self) -> &PathSearchEngine {
        &self.engine
    }

    pub fn previous_intent(&self) -> Option<ControlIntent> {
        self.previous
    }

    pub fn last_trace(&self) -> Option<&DecisionTrace> {
        self.trace.as_ref()
    }

    /// Forget the previous intent, e.g. when a race restarts.
    pub fn reset(&mut self) {
        self.previous = None;
        self.trace = None;
    }

    /// Produce this tick's intent. Never fails: advisor errors and search
    /// failures only remove their source from the blend.
    pub fn decide(&mut self, input: &DecisionInput) -> ControlIntent {
        span_scope!("decide");
        let track = &self.config.track;
        let me = input.me.clamped_to(track.lane_count);
        let mut unavailable = Vec::new();

        // Safety sees the opponent as one more vehicle.
        let with_opponent;
        let surroundings = if input.obstacles.opponent.is_some() {
            input.obstacles
        } else {
            with_opponent = input.obstacles.clone().with_opponent(input.opponent);
            &with_opponent
        };
        let safety = match self.safety.assess(&me, surroundings) {
            Ok(assessment) => Some(assessment),
            Err(err) => {
                warn!("{:?} safety advisor failed: {err}", self.role);
                unavailable.push(Advisor::Safety);
                None
            }
        };
        let urgency = safety.map_or(Urgency::None, |a| a.urgency);
        let band = RangeBand::classify(me.gap_to(&input.opponent), &self.config.blend);

        if let Some(assessment) = safety.filter(|a| a.urgency == Urgency::Critical) {
            return self.safety_override(assessment, band, unavailable);
        }

        let tactical = match self.tactical.evaluate(&me, &input.opponent, input.obstacles) {
            Ok(suggestion) => Some(suggestion),
            Err(err) => {
                warn!("{:?} tactical advisor failed: {err}", self.role);
                unavailable.push(Advisor::Tactical);
                None
            }
        };

        let goal = self.select_goal(&me, &input.opponent, input.obstacles);
        let ctx = CostContext {
            role: self.role,
            obstacles: input.obstacles,
            opponent: input.opponent,
            ghost: input.ghost,
        };
        let plan = self.engine.find_path(&me, goal.point, &ctx);
        if let Err(err) = &plan {
            debug!("{:?} search toward {:?}: {err}", self.role, goal.kind);
        }

        let weights = self.weights(&me, input, urgency, safety, tactical, &plan);
        let raw = self.blend(&me, input, &goal, weights, safety, tactical, &plan);
        let intent = self.smooth(raw);

        let search = match &plan {
            Ok(plan) => SearchOutcome::Planned {
                waypoints: plan.waypoint_count(),
                expanded: plan.expanded(),
                next_lane: plan.next_lane(),
            },
            Err(err) => SearchOutcome::Failed(err.clone()),
        };
        let mode = if urgency > Urgency::None {
            DecisionMode::SafetyInfluenced
        } else {
            DecisionMode::Blended
        };
        self.trace = Some(DecisionTrace {
            mode,
            urgency,
            weights,
            band,
            goal: Some(goal),
            search,
            unavailable,
            raw,
        });
        self.previous = Some(intent);
        intent
    }

    fn safety_override(
        &mut self,
        assessment: SafetyAssessment,
        band: RangeBand,
        unavailable: Vec<Advisor>,
    ) -> ControlIntent {
        let track = &self.config.track;
        let intent = ControlIntent {
            target_lane: track.clamp_lane(assessment.suggested_lane),
            target_speed: track.clamp_speed(assessment.suggested_speed),
            urgency: Urgency::Critical,
            source: IntentSource::Safety,
        };
        self.trace = Some(DecisionTrace {
            mode: DecisionMode::SafetyOverride,
            urgency: Urgency::Critical,
            weights: BlendWeights {
                safety: 1.0,
                ..BlendWeights::default()
            },
            band,
            goal: None,
            search: SearchOutcome::NotRun,
            unavailable,
            raw: intent,
        });
        self.previous = Some(intent);
        intent
    }

    fn weights(
        &self,
        me: &SpatialState,
        input: &DecisionInput,
        urgency: Urgency,
        safety: Option<SafetyAssessment>,
        tactical: Option<TacticalSuggestion>,
        plan: &Result<PathPlan, DecisionError>,
    ) -> BlendWeights {
        let blend = &self.config.blend;
        let density = traffic_density(me, input.obstacles, self.config.track.lane_count, blend);
        let mut weights =
            BlendWeights::compute(urgency, me.gap_to(&input.opponent), density, blend);

        match tactical {
            Some(t) => {
                let floor = blend.tactical_confidence_floor;
                weights = weights.scaled(IntentSource::Tactical, floor + (1.0 - floor) * t.confidence);
            }
            None => weights = weights.without(IntentSource::Tactical),
        }
        if safety.is_none() {
            weights = weights.without(IntentSource::Safety);
        }
        if plan.is_err() {
            weights = weights.without(IntentSource::Search);
        }
        if self.previous.is_none() {
            weights = weights.without(IntentSource::PathFollowing);
        }
        weights
    }

    #[allow(clippy::too_many_arguments)]
    fn blend(
        &self,
        me: &SpatialState,
        input: &DecisionInput,
        goal: &Goal,
        weights: BlendWeights,
        safety: Option<SafetyAssessment>,
        tactical: Option<TacticalSuggestion>,
        plan: &Result<PathPlan, DecisionError>,
    ) -> ControlIntent {
        let track = &self.config.track;
        let urgency = safety.map_or(Urgency::None, |a| a.urgency);

        let Some(source) = weights.dominant() else {
            debug!("{:?} has no advisors, holding lane", self.role);
            let speed = track.clamp_speed(me.speed - self.config.arbiter.max_speed_delta);
            return ControlIntent {
                target_lane: me.lane,
                target_speed: self.cap_pursuit_speed(speed, me, &input.opponent),
                urgency,
                source: IntentSource::Fallback,
            };
        };

        let mut suggestions: Vec<(f32, usize, f32)> = Vec::with_capacity(4);
        if let Some(a) = safety {
            suggestions.push((weights.safety, a.suggested_lane, a.suggested_speed));
        }
        if let Some(t) = tactical {
            suggestions.push((weights.tactical, t.suggested_lane, t.suggested_speed));
        }
        if let Ok(plan) = plan {
            let speed = self.search_speed(me, &input.opponent, goal);
            suggestions.push((weights.search, plan.next_lane(), speed));
        }
        if let Some(prev) = self.previous {
            suggestions.push((weights.path_following, prev.target_lane, prev.target_speed));
        }

        let lane = self.majority_lane(me.lane, &suggestions);
        let speed: f32 = suggestions.iter().map(|(w, _, s)| w * s).sum();
        let speed = self.cap_pursuit_speed(track.clamp_speed(speed), me, &input.opponent);

        ControlIntent {
            target_lane: lane,
            target_speed: speed,
            urgency,
            source,
        }
    }

    /// Lane with the most weight behind it; ties go to the lane nearest `current`.
    fn majority_lane(&self, current: usize, suggestions: &[(f32, usize, f32)]) -> usize {
        let track = &self.config.track;
        let mut votes = vec![0.0_f32; track.lane_count];
        for (weight, lane, _) in suggestions {
            votes[track.clamp_lane(*lane)] += weight;
        }
        let mut best = current;
        for (lane, vote) in votes.iter().enumerate() {
            let best_vote = votes[best];
            let closer = lane.abs_diff(current) < best.abs_diff(current);
            if *vote > best_vote + f32::EPSILON || ((*vote - best_vote).abs() <= f32::EPSILON && closer) {
                best = lane;
            }
        }
        best
    }

    /// A pursuer near the evader may not outrun it.
    fn cap_pursuit_speed(&self, speed: f32, me: &SpatialState, opponent: &SpatialState) -> f32 {
        let arbiter = &self.config.arbiter;
        if self.role != Role::Pursuer || me.gap_to(opponent).abs() >= arbiter.no_overtake_range {
            return speed;
        }
        let cap = opponent.speed * arbiter.pursuit_speed_fraction;
        self.config.track.clamp_speed(speed.min(cap))
    }

    /// Speed the search plan implies: close the gap proportionally when
    /// intercepting, otherwise run at the legal maximum.
    fn search_speed(&self, me: &SpatialState, opponent: &SpatialState, goal: &Goal) -> f32 {
        let arbiter = &self.config.arbiter;
        let track = &self.config.track;
        match (self.role, goal.kind) {
            (Role::Pursuer, GoalKind::Intercept) => {
                let excess = me.gap_to(opponent) - arbiter.capture_threshold;
                track.clamp_speed(opponent.speed + arbiter.closing_gain * excess)
            }
            _ => track.max_speed,
        }
    }

    /// Limit per-tick change relative to the previous intent.
    fn smooth(&self, raw: ControlIntent) -> ControlIntent {
        let Some(prev) = self.previous else {
            return raw;
        };
        let arbiter = &self.config.arbiter;
        let max_lane = arbiter.max_lane_delta;
        let target_lane = if raw.target_lane > prev.target_lane {
            raw.target_lane.min(prev.target_lane + max_lane)
        } else {
            raw.target_lane.max(prev.target_lane.saturating_sub(max_lane))
        };
        let target_speed = raw.target_speed.clamp(
            prev.target_speed - arbiter.max_speed_delta,
            prev.target_speed + arbiter.max_speed_delta,
        );
        ControlIntent {
            target_lane,
            target_speed: self.config.track.clamp_speed(target_speed),
            ..raw
        }
    }

    /// Where the search should head this tick.
    pub fn select_goal(
        &self,
        me: &SpatialState,
        opponent: &SpatialState,
        obstacles: &ObstacleSet,
    ) -> Goal {
        let arbiter = &self.config.arbiter;
        let gap = me.gap_to(opponent);

        let primary = match self.role {
            Role::Pursuer if gap.abs() <= arbiter.pursuit_detection_range => Some(Goal {
                kind: GoalKind::Intercept,
                point: TrackPoint::new(
                    opponent.lane,
                    opponent.distance + opponent.speed * arbiter.projection_ticks
                        - arbiter.intercept_offset,
                ),
            }),
            Role::Evader if gap.abs() < arbiter.threat_range => Some(Goal {
                kind: GoalKind::Evade,
                point: TrackPoint::new(
                    self.safest_lane(me, opponent, obstacles),
                    me.distance + arbiter.evade_horizon,
                ),
            }),
            _ => None,
        };

        primary
            .or_else(|| self.nearest_power_up(me, obstacles))
            .unwrap_or(Goal {
                kind: GoalKind::Cruise,
                point: TrackPoint::new(me.lane, me.distance + self.config.search.coarse_range),
            })
    }

    fn nearest_power_up(&self, me: &SpatialState, obstacles: &ObstacleSet) -> Option<Goal> {
        let radius = self.config.arbiter.powerup_detection_radius;
        obstacles
            .power_ups_for(self.role)
            .filter(|p| p.distance > me.distance && p.distance - me.distance <= radius)
            .min_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(b.kind.priority().total_cmp(&a.kind.priority()))
            })
            .map(|p| Goal {
                kind: GoalKind::PowerUp(p.kind),
                point: TrackPoint::new(p.lane, p.distance),
            })
    }

    /// Lane with the most clearance over the evade horizon, preferring lanes
    /// other than the pursuer's and then lanes near the current one.
    fn safest_lane(&self, me: &SpatialState, opponent: &SpatialState, obstacles: &ObstacleSet) -> usize {
        let horizon = self.config.arbiter.evade_horizon;
        let footprint = self.config.search.footprint_length;
        (0..self.config.track.lane_count)
            .map(|lane| {
                let clearance = obstacles
                    .clearance_ahead(lane, me.distance, footprint, horizon)
                    .unwrap_or(horizon);
                (lane, clearance)
            })
            .max_by(|(a_lane, a), (b_lane, b)| {
                a.total_cmp(b)
                    .then((*a_lane != opponent.lane).cmp(&(*b_lane != opponent.lane)))
                    .then(b_lane.abs_diff(me.lane).cmp(&a_lane.abs_diff(me.lane)))
            })
            .map_or(me.lane, |(lane, _)| lane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{PowerUp, PowerUpKind};

    struct Failing;

    impl SafetyAdvisor for Failing {
        fn assess(&self, _: &SpatialState, _: &ObstacleSet) -> Result<SafetyAssessment, DecisionError> {
            Err(DecisionError::AdvisorUnavailable {
                advisor: Advisor::Safety,
                reason: "offline".into(),
            })
        }
    }

    impl TacticalAdvisor for Failing {
        fn evaluate(
            &self,
            _: &SpatialState,
            _: &SpatialState,
            _: &ObstacleSet,
        ) -> Result<TacticalSuggestion, DecisionError> {
            Err(DecisionError::AdvisorUnavailable {
                advisor: Advisor::Tactical,
                reason: "offline".into(),
            })
        }
    }

    fn input<'a>(me: SpatialState, opponent: SpatialState, obstacles: &'a ObstacleSet) -> DecisionInput<'a> {
        DecisionInput {
            me,
            opponent,
            obstacles,
            ghost: false,
        }
    }

    #[test]
    fn critical_danger_overrides_everything() {
        let cfg = RaceConfig::default();
        let obstacles = ObstacleSet::new(vec![SpatialState::new(1, 1_020.0, 3.0)], vec![]);
        let me = SpatialState::new(1, 1_000.0, 7.0);
        let expected = ReflexSafety::new(&cfg).assess(&me, &obstacles).unwrap();

        let mut arbiter = DecisionArbiter::new(Role::Evader, &cfg);
        let intent = arbiter.decide(&input(me, SpatialState::new(0, 200.0, 6.0), &obstacles));

        assert_eq!(intent.urgency, Urgency::Critical);
        assert_eq!(intent.source, IntentSource::Safety);
        assert_eq!(intent.target_lane, expected.suggested_lane);
        assert_eq!(intent.target_speed, expected.suggested_speed);
        let trace = arbiter.last_trace().unwrap();
        assert_eq!(trace.mode, DecisionMode::SafetyOverride);
        assert_eq!(trace.search, SearchOutcome::NotRun);
    }

    #[test]
    fn calm_road_blends_all_sources() {
        let cfg = RaceConfig::default();
        let obstacles = ObstacleSet::default();
        let mut arbiter = DecisionArbiter::new(Role::Evader, &cfg);
        let first = arbiter.decide(&input(
            SpatialState::new(1, 2_000.0, 6.0),
            SpatialState::new(1, 0.0, 6.0),
            &obstacles,
        ));
        let trace = arbiter.last_trace().unwrap();
        assert_eq!(trace.mode, DecisionMode::Blended);
        assert!(matches!(trace.search, SearchOutcome::Planned { .. }));
        // No previous intent yet.
        assert_eq!(trace.weights.path_following, 0.0);
        assert!((trace.weights.total() - 1.0).abs() < 1e-5);
        assert_eq!(first.source, IntentSource::Search);

        arbiter.decide(&input(
            SpatialState::new(1, 2_006.0, 6.0),
            SpatialState::new(1, 6.0, 6.0),
            &obstacles,
        ));
        assert!(arbiter.last_trace().unwrap().weights.path_following > 0.0);
    }

    #[test]
    fn failed_advisors_are_dropped_not_fatal() {
        let cfg = RaceConfig::default();
        let obstacles = ObstacleSet::default();
        let mut arbiter = DecisionArbiter::new(Role::Pursuer, &cfg)
            .with_advisors(Box::new(Failing), Box::new(Failing));
        let intent = arbiter.decide(&input(
            SpatialState::new(0, 0.0, 5.0),
            SpatialState::new(2, 1_000.0, 6.0),
            &obstacles,
        ));
        let trace = arbiter.last_trace().unwrap();
        assert_eq!(trace.unavailable, vec![Advisor::Safety, Advisor::Tactical]);
        assert_eq!(trace.weights.safety, 0.0);
        assert_eq!(trace.weights.tactical, 0.0);
        assert!((trace.weights.search - 1.0).abs() < 1e-5);
        assert_eq!(intent.source, IntentSource::Search);
        assert_eq!(intent.urgency, Urgency::None);
    }

    #[test]
    fn nothing_left_holds_lane_and_slows() {
        let cfg = RaceConfig::default();
        // A wall of traffic one step ahead makes the search fail too.
        let obstacles = ObstacleSet::new(
            (0..3).map(|lane| SpatialState::new(lane, 1_100.0, 3.0)).collect(),
            vec![],
        );
        let mut arbiter = DecisionArbiter::new(Role::Evader, &cfg)
            .with_advisors(Box::new(Failing), Box::new(Failing));
        let me = SpatialState::new(2, 1_000.0, 5.0);
        let intent = arbiter.decide(&input(me, SpatialState::new(0, 0.0, 6.0), &obstacles));
        assert!(matches!(
            arbiter.last_trace().unwrap().search,
            SearchOutcome::Failed(DecisionError::NoPathFound { .. })
        ));
        assert_eq!(intent.source, IntentSource::Fallback);
        assert_eq!(intent.target_lane, 2);
        assert!((intent.target_speed - 4.5).abs() < 1e-5);
    }

    #[test]
    fn pursuer_capped_below_close_evader() {
        let cfg = RaceConfig::default();
        let obstacles = ObstacleSet::default();
        let mut arbiter = DecisionArbiter::new(Role::Pursuer, &cfg);
        let intent = arbiter.decide(&input(
            SpatialState::new(1, 400.0, 5.0),
            SpatialState::new(1, 500.0, 5.0),
            &obstacles,
        ));
        assert!(intent.target_speed <= 5.0 * cfg.arbiter.pursuit_speed_fraction + 1e-5);
    }

    #[test]
    fn smoothing_limits_lane_and_speed_steps() {
        let cfg = RaceConfig::default();
        let mut arbiter = DecisionArbiter::new(Role::Evader, &cfg);
        arbiter.previous = Some(ControlIntent {
            target_lane: 0,
            target_speed: 1.0,
            urgency: Urgency::None,
            source: IntentSource::Search,
        });
        let raw = ControlIntent {
            target_lane: 2,
            target_speed: 8.0,
            urgency: Urgency::None,
            source: IntentSource::Tactical,
        };
        let smoothed = arbiter.smooth(raw);
        assert_eq!(smoothed.target_lane, 1);
        assert!((smoothed.target_speed - 1.5).abs() < 1e-5);
        assert_eq!(smoothed.source, IntentSource::Tactical);
    }

    #[test]
    fn majority_lane_ties_prefer_current() {
        let arbiter = DecisionArbiter::new(Role::Evader, &RaceConfig::default());
        let votes = [(0.4, 0, 5.0), (0.4, 2, 5.0), (0.2, 1, 5.0)];
        // Lanes 0 and 2 tie and are equally far from lane 1; the lower index wins.
        assert_eq!(arbiter.majority_lane(1, &votes), 0);
        assert_eq!(arbiter.majority_lane(2, &votes), 2);
    }

    #[test]
    fn goals_follow_role_and_situation() {
        let cfg = RaceConfig::default();
        let power_ups = ObstacleSet::new(
            vec![],
            vec![
                PowerUp {
                    kind: PowerUpKind::Shield,
                    lane: 2,
                    distance: 1_500.0,
                },
                PowerUp {
                    kind: PowerUpKind::Emp,
                    lane: 0,
                    distance: 1_300.0,
                },
            ],
        );
        let me = SpatialState::new(1, 1_000.0, 6.0);

        let police = DecisionArbiter::new(Role::Pursuer, &cfg);
        let intercept = police.select_goal(&me, &SpatialState::new(2, 1_500.0, 6.0), &power_ups);
        assert_eq!(intercept.kind, GoalKind::Intercept);
        assert_eq!(intercept.point, TrackPoint::new(2, 1_500.0 + 180.0 - 70.0));
        let far = police.select_goal(&me, &SpatialState::new(2, 9_000.0, 6.0), &power_ups);
        assert_eq!(far.kind, GoalKind::PowerUp(PowerUpKind::Emp));

        let thief = DecisionArbiter::new(Role::Evader, &cfg);
        let threatened = thief.select_goal(&me, &SpatialState::new(1, 850.0, 7.0), &power_ups);
        assert_eq!(threatened.kind, GoalKind::Evade);
        assert_ne!(threatened.point.lane, 1);
        let calm = thief.select_goal(&me, &SpatialState::new(1, 0.0, 7.0), &power_ups);
        assert_eq!(calm.kind, GoalKind::PowerUp(PowerUpKind::Shield));
        let none = thief.select_goal(&me, &SpatialState::new(1, 0.0, 7.0), &ObstacleSet::default());
        assert_eq!(none.kind, GoalKind::Cruise);
    }
}
