//! Runs every agent's decision core once per fixed tick.
//!
//! Both agents see the same traffic and power-ups, snapshotted at the start
//! of the tick, plus their opponent's state as it was before either decided.

use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::ai::{ControlIntent, DecisionInput, DecisionMode, ObstacleSet, SearchOutcome};
use crate::components::{ActiveEffects, Pilot, PowerUp, Role, SpatialState, TrafficCar};
use crate::resources::RaceStats;
use crate::RaceSet;

pub struct DecisionPlugin;

impl Plugin for DecisionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, decide_intents.in_set(RaceSet::Decide));
    }
}

/// Snapshot the track for this tick.
pub fn build_obstacles<'a>(
    traffic: impl Iterator<Item = &'a SpatialState>,
    power_ups: impl Iterator<Item = &'a PowerUp>,
) -> ObstacleSet {
    ObstacleSet::new(traffic.copied().collect(), power_ups.copied().collect())
}

#[allow(clippy::type_complexity)]
#[span_fn]
fn decide_intents(
    mut agents: Query<(
        &Role,
        &SpatialState,
        &ActiveEffects,
        &mut Pilot,
        &mut ControlIntent,
    )>,
    traffic: Query<&SpatialState, (With<TrafficCar>, Without<Role>)>,
    power_ups: Query<&PowerUp>,
    mut stats: ResMut<RaceStats>,
) {
    let track = build_obstacles(traffic.iter(), power_ups.iter());
    let positions: Vec<(Role, SpatialState)> =
        agents.iter().map(|(role, state, ..)| (*role, *state)).collect();

    for (role, state, effects, mut pilot, mut intent) in &mut agents {
        let Some(opponent) = positions
            .iter()
            .find(|(r, _)| *r == role.opponent())
            .map(|(_, s)| *s)
        else {
            continue;
        };

        let obstacles = track.clone().with_opponent(opponent);
        let input = DecisionInput {
            me: *state,
            opponent,
            obstacles: &obstacles,
            ghost: effects.ghost_mode(),
        };
        *intent = pilot.0.decide(&input);

        stats.count_source(*role, intent.source);
        if let Some(trace) = pilot.0.last_trace() {
            if trace.mode == DecisionMode::SafetyOverride {
                *stats.safety_overrides.entry(*role).or_default() += 1;
            }
            if matches!(trace.search, SearchOutcome::Failed(_)) {
                *stats.no_path_ticks.entry(*role).or_default() += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Urgency;
    use crate::config::RaceConfig;

    fn setup_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(RaceStats::default());
        app.add_systems(FixedUpdate, decide_intents);
        app
    }

    fn spawn_agent(app: &mut App, role: Role, state: SpatialState) -> Entity {
        let config = RaceConfig::default();
        app.world_mut()
            .spawn((
                role,
                state,
                ActiveEffects::default(),
                Pilot::new(role, &config),
                ControlIntent::default(),
            ))
            .id()
    }

    #[test]
    fn both_agents_get_an_intent_each_tick() {
        let mut app = setup_app();
        let police = spawn_agent(&mut app, Role::Pursuer, SpatialState::new(0, 0.0, 5.0));
        let thief = spawn_agent(&mut app, Role::Evader, SpatialState::new(2, 800.0, 5.0));

        app.world_mut().run_schedule(FixedUpdate);

        for agent in [police, thief] {
            let intent = app.world().get::<ControlIntent>(agent).unwrap();
            assert_ne!(intent.source, crate::ai::IntentSource::Fallback);
            assert!(intent.target_lane < 3);
        }
        let stats = app.world().resource::<RaceStats>();
        assert_eq!(stats.dominant_sources.values().sum::<u32>(), 2);
    }

    #[test]
    fn traffic_dead_ahead_forces_override() {
        let mut app = setup_app();
        let thief = spawn_agent(&mut app, Role::Evader, SpatialState::new(1, 1_000.0, 7.0));
        spawn_agent(&mut app, Role::Pursuer, SpatialState::new(0, 0.0, 5.0));
        app.world_mut()
            .spawn((TrafficCar, SpatialState::new(1, 1_020.0, 3.0)));

        app.world_mut().run_schedule(FixedUpdate);

        let intent = app.world().get::<ControlIntent>(thief).unwrap();
        assert_eq!(intent.urgency, Urgency::Critical);
        let stats = app.world().resource::<RaceStats>();
        assert_eq!(stats.safety_overrides.get(&Role::Evader), Some(&1));
    }

    #[test]
    fn tailgating_the_evader_forces_override() {
        let mut app = setup_app();
        let police = spawn_agent(&mut app, Role::Pursuer, SpatialState::new(1, 1_000.0, 7.0));
        spawn_agent(&mut app, Role::Evader, SpatialState::new(1, 1_020.0, 2.0));

        app.world_mut().run_schedule(FixedUpdate);

        let intent = app.world().get::<ControlIntent>(police).unwrap();
        assert_eq!(intent.urgency, Urgency::Critical);
        assert_eq!(intent.target_speed, RaceConfig::default().track.min_speed);
        let stats = app.world().resource::<RaceStats>();
        assert_eq!(stats.safety_overrides.get(&Role::Pursuer), Some(&1));
    }

    #[test]
    fn lone_agent_waits_for_an_opponent() {
        let mut app = setup_app();
        let thief = spawn_agent(&mut app, Role::Evader, SpatialState::new(1, 1_000.0, 7.0));
        app.world_mut().run_schedule(FixedUpdate);
        assert_eq!(
            *app.world().get::<ControlIntent>(thief).unwrap(),
            ControlIntent::default()
        );
    }
}
