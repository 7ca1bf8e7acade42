//! Decision core for both agents.
//!
//! Pure and deterministic: nothing here touches the ECS. The decision plugin
//! builds an `ObstacleSet` each fixed tick and asks every agent's
//! `DecisionArbiter` for a `ControlIntent`.

pub mod arbiter;
pub mod blend;
pub mod cost;
pub mod heuristic;
pub mod safety;
pub mod search;
pub mod tactical;
pub mod types;

pub use arbiter::{DecisionArbiter, DecisionInput, DecisionMode, DecisionTrace, SearchOutcome};
pub use blend::{BlendWeights, RangeBand};
pub use cost::{CostContext, CostModel};
pub use heuristic::Heuristic;
pub use safety::{ReflexSafety, SafetyAdvisor, SafetyAssessment};
pub use search::{PathPlan, PathSearchEngine, Waypoint};
pub use tactical::{LookaheadTactician, TacticalAdvisor, TacticalSuggestion};
pub use types::{ControlIntent, Goal, GoalKind, IntentSource, ObstacleSet, TrackPoint, Urgency};
