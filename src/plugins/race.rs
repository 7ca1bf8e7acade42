//! Race rules: staging, power-up pickups, crashes and the end conditions.

use bevy::prelude::*;
use micromegas_tracing::prelude::{imetric, info, span_fn, span_scope};

use crate::ai::ControlIntent;
use crate::app_state::RaceState;
use crate::components::{
    ActiveEffects, Pilot, PowerUp, PowerUpEffect, Role, SpatialState, Steering, TrafficCar,
};
use crate::config::RaceConfig;
use crate::events::{PowerUpCollected, RaceFinished, VehicleCrashed};
use crate::plugins::traffic::populate_track;
use crate::resources::{RaceClock, RaceOutcome, RaceRng, RaceStats};
use crate::RaceSet;

/// Speed kept after an unshielded crash.
const CRASH_SPEED_FACTOR: f32 = 0.3;

pub struct RacePlugin;

impl Plugin for RacePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(RaceState::Staging), stage_race);
        app.add_systems(Update, start_race.run_if(in_state(RaceState::Staging)));
        app.add_systems(
            FixedUpdate,
            (
                tick_effects,
                collect_power_ups.after(tick_effects),
                detect_crashes.after(collect_power_ups),
                check_race_end.after(detect_crashes),
            )
                .in_set(RaceSet::Resolve),
        );
        app.add_systems(OnEnter(RaceState::Finished), report_results);

        app.add_observer(on_power_up_collected);
        app.add_observer(on_vehicle_crashed);
        app.add_observer(on_race_finished);
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Put both agents on the grid and populate the track.
/// Session resources are replaced so a restaged race starts clean.
#[span_fn]
fn stage_race(mut commands: Commands, config: Res<RaceConfig>) {
    let sim = &config.sim;
    let centre = config.track.lane_count / 2;

    for (role, start) in [
        (Role::Evader, sim.evader_start),
        (Role::Pursuer, sim.pursuer_start),
    ] {
        commands.spawn((
            role,
            SpatialState::new(centre, start, 0.0),
            Pilot::new(role, &config),
            ControlIntent {
                target_lane: centre,
                ..default()
            },
            ActiveEffects::default(),
            Steering::default(),
        ));
    }

    let mut rng = RaceRng::seeded(sim.seed);
    populate_track(&mut commands, &config, &mut rng.0);
    commands.insert_resource(rng);
    commands.insert_resource(RaceStats::default());
    commands.insert_resource(RaceClock::default());
    info!("race staged: seed={} lanes={}", sim.seed, config.track.lane_count);
}

fn start_race(mut next_state: ResMut<NextState<RaceState>>) {
    next_state.set(RaceState::Racing);
}

// ---------------------------------------------------------------------------
// Per-tick rules
// ---------------------------------------------------------------------------

#[span_fn]
fn tick_effects(
    mut clock: ResMut<RaceClock>,
    mut stats: ResMut<RaceStats>,
    mut effects: Query<&mut ActiveEffects>,
) {
    clock.0 += 1;
    stats.ticks = clock.0;
    for mut fx in &mut effects {
        fx.tick();
    }
}

/// An agent picks up power-ups of its own role that it drives over.
#[span_fn]
fn collect_power_ups(
    mut commands: Commands,
    config: Res<RaceConfig>,
    agents: Query<(Entity, &Role, &SpatialState)>,
    power_ups: Query<(Entity, &PowerUp)>,
) {
    let radius = config.sim.pickup_radius;
    for (agent, role, state) in &agents {
        for (entity, power_up) in &power_ups {
            let reached = power_up.lane == state.lane
                && (power_up.distance - state.distance).abs() <= radius;
            if reached && power_up.kind.owner() == *role {
                commands.entity(entity).despawn();
                commands.trigger(PowerUpCollected {
                    collector: agent,
                    role: *role,
                    kind: power_up.kind,
                });
            }
        }
    }
}

#[span_fn]
fn detect_crashes(
    mut commands: Commands,
    config: Res<RaceConfig>,
    mut agents: Query<(Entity, &Role, &mut SpatialState, &mut ActiveEffects)>,
    traffic: Query<&SpatialState, (With<TrafficCar>, Without<Role>)>,
) {
    let reach = config.sim.crash_distance;
    for (entity, role, mut state, mut fx) in &mut agents {
        if fx.ghost_mode() || fx.crash_recovery > 0 {
            continue;
        }
        let hit = traffic
            .iter()
            .any(|car| car.lane == state.lane && (car.distance - state.distance).abs() < reach);
        if !hit {
            continue;
        }
        let shielded = fx.shield > 0;
        if shielded {
            fx.shield = 0;
        } else {
            state.speed *= CRASH_SPEED_FACTOR;
        }
        fx.crash_recovery = config.sim.crash_recovery_ticks;
        commands.trigger(VehicleCrashed {
            vehicle: entity,
            role: *role,
            shielded,
        });
    }
}

/// The first end condition met this tick decides the outcome.
pub fn race_outcome(
    pursuer: &SpatialState,
    evader: &SpatialState,
    tick: u64,
    config: &RaceConfig,
) -> Option<RaceOutcome> {
    if (evader.distance - pursuer.distance).abs() < config.arbiter.capture_threshold {
        Some(RaceOutcome::Captured)
    } else if evader.distance >= config.track.finish_distance {
        Some(RaceOutcome::Escaped)
    } else if tick >= config.sim.max_ticks {
        Some(RaceOutcome::TimeUp)
    } else {
        None
    }
}

#[span_fn]
fn check_race_end(
    mut commands: Commands,
    config: Res<RaceConfig>,
    clock: Res<RaceClock>,
    mut stats: ResMut<RaceStats>,
    mut next_state: ResMut<NextState<RaceState>>,
    agents: Query<(&Role, &SpatialState)>,
) {
    let find = |wanted: Role| agents.iter().find(|(r, _)| **r == wanted).map(|(_, s)| *s);
    let (Some(pursuer), Some(evader)) = (find(Role::Pursuer), find(Role::Evader)) else {
        return;
    };
    let Some(outcome) = race_outcome(&pursuer, &evader, clock.0, &config) else {
        return;
    };
    stats.outcome = Some(outcome);
    commands.trigger(RaceFinished { outcome });
    next_state.set(RaceState::Finished);
}

#[span_fn]
fn report_results(stats: Res<RaceStats>) {
    info!("race finished: {}", stats.summary());
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

fn on_power_up_collected(
    trigger: On<PowerUpCollected>,
    config: Res<RaceConfig>,
    mut stats: ResMut<RaceStats>,
    mut agents: Query<(Entity, &Role, &mut ActiveEffects)>,
) {
    let event = trigger.event();
    let sim = &config.sim;
    *stats.pickups.entry(event.role).or_default() += 1;
    info!("power-up collected: {:?} by {:?}", event.kind, event.role);

    for (entity, role, mut fx) in &mut agents {
        match event.kind.effect() {
            PowerUpEffect::Ghost if entity == event.collector => fx.ghost = sim.ghost_ticks,
            PowerUpEffect::Shield if entity == event.collector => fx.shield = sim.shield_ticks,
            PowerUpEffect::Boost if entity == event.collector => fx.boost = sim.boost_ticks,
            PowerUpEffect::SlowOpponent if *role == event.role.opponent() => {
                fx.slowed = sim.slow_ticks
            }
            _ => {}
        }
    }
}

fn on_vehicle_crashed(trigger: On<VehicleCrashed>, mut stats: ResMut<RaceStats>) {
    let event = trigger.event();
    if event.shielded {
        stats.shielded_crashes += 1;
    } else {
        *stats.crashes.entry(event.role).or_default() += 1;
    }
    imetric!("crash", "count", 1);
}

fn on_race_finished(trigger: On<RaceFinished>, clock: Res<RaceClock>) {
    let outcome = trigger.event().outcome;
    match outcome.winner() {
        Some(role) => info!("{outcome:?} after {} ticks, {role:?} wins", clock.0),
        None => info!("{outcome:?} after {} ticks, no winner", clock.0),
    }
    imetric!("race_ticks", "count", clock.0);
}
