//! Oncoming traffic and power-up placement.
//!
//! Traffic drives toward the agents, so its distance along the track shrinks
//! every tick. Cars that fall far behind both agents are respawned ahead of
//! the leader, keeping the road busy for the whole race.

use bevy::prelude::*;
use micromegas_tracing::prelude::{imetric, info, span_fn, span_scope};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::components::{PowerUp, PowerUpKind, Role, SpatialState, TrafficCar};
use crate::config::RaceConfig;
use crate::resources::RaceRng;
use crate::RaceSet;

pub struct TrafficPlugin;

impl Plugin for TrafficPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (move_traffic, recycle_traffic.after(move_traffic)).in_set(RaceSet::Traffic),
        );
    }
}

fn random_car(rng: &mut impl Rng, config: &RaceConfig, distance: f32) -> SpatialState {
    let sim = &config.sim;
    SpatialState::new(
        rng.gen_range(0..config.track.lane_count),
        distance,
        rng.gen_range(sim.traffic_min_speed..=sim.traffic_max_speed),
    )
}

/// Scatter traffic and both roles' power-ups over the track.
pub fn populate_track(commands: &mut Commands, config: &RaceConfig, rng: &mut impl Rng) {
    let sim = &config.sim;
    let lanes = config.track.lane_count;
    let first = sim.evader_start + config.safety.low_gap * 2.0;

    for _ in 0..sim.traffic_count {
        let distance = first + rng.gen_range(0.0..sim.traffic_spread);
        commands.spawn((TrafficCar, random_car(rng, config, distance)));
    }

    let last = config.track.finish_distance.max(first + 1.0);
    for kinds in [&PowerUpKind::THIEF[..], &PowerUpKind::POLICE[..]] {
        for _ in 0..sim.powerups_per_role {
            let Some(kind) = kinds.choose(rng) else { continue };
            commands.spawn(PowerUp {
                kind: *kind,
                lane: rng.gen_range(0..lanes),
                distance: rng.gen_range(first..last),
            });
        }
    }
    info!(
        "track populated: {} cars, {} power-ups per role",
        sim.traffic_count, sim.powerups_per_role
    );
}

#[span_fn]
fn move_traffic(mut traffic: Query<&mut SpatialState, (With<TrafficCar>, Without<Role>)>) {
    for mut car in &mut traffic {
        car.distance = (car.distance - car.speed).max(0.0);
    }
}

/// Respawn cars that are far behind the trailing agent.
#[span_fn]
fn recycle_traffic(
    config: Res<RaceConfig>,
    mut rng: ResMut<RaceRng>,
    agents: Query<&SpatialState, With<Role>>,
    mut traffic: Query<&mut SpatialState, (With<TrafficCar>, Without<Role>)>,
) {
    let mut distances = agents.iter().map(|a| a.distance);
    let Some(first) = distances.next() else {
        return;
    };
    let (trailing, leading) = distances.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    let cutoff = trailing - config.sim.traffic_recycle_behind;
    let spawn_from = leading + config.safety.low_gap * 2.0;

    let mut recycled = 0u64;
    for mut car in &mut traffic {
        if car.distance < cutoff || car.distance <= 0.0 {
            let distance = spawn_from + rng.0.gen_range(0.0..config.sim.traffic_spread * 0.5);
            *car = random_car(&mut rng.0, &config, distance);
            recycled += 1;
        }
    }
    if recycled > 0 {
        imetric!("traffic_recycled", "count", recycled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_app(config: RaceConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(RaceRng::seeded(config.sim.seed));
        app.insert_resource(config);
        app.add_systems(FixedUpdate, (move_traffic, recycle_traffic.after(move_traffic)));
        app
    }

    fn populate(app: &mut App) {
        let config = app.world().resource::<RaceConfig>().clone();
        let mut rng = RaceRng::seeded(config.sim.seed);
        let mut commands = app.world_mut().commands();
        populate_track(&mut commands, &config, &mut rng.0);
        app.world_mut().flush();
    }

    #[test]
    fn populates_requested_counts_on_track() {
        let mut app = setup_app(RaceConfig::default());
        populate(&mut app);
        let cfg = RaceConfig::default();

        let world = app.world_mut();
        let cars: Vec<SpatialState> = world
            .query_filtered::<&SpatialState, With<TrafficCar>>()
            .iter(world)
            .copied()
            .collect();
        assert_eq!(cars.len(), cfg.sim.traffic_count);
        assert!(cars.iter().all(|c| c.lane < cfg.track.lane_count));
        assert!(cars.iter().all(|c| c.distance > cfg.sim.evader_start));

        let power_ups: Vec<PowerUp> = world.query::<&PowerUp>().iter(world).copied().collect();
        assert_eq!(power_ups.len(), cfg.sim.powerups_per_role * 2);
        let thief = power_ups.iter().filter(|p| p.kind.owner() == Role::Evader).count();
        assert_eq!(thief, cfg.sim.powerups_per_role);
    }

    #[test]
    fn same_seed_same_track() {
        let layout = || {
            let mut app = setup_app(RaceConfig::default());
            populate(&mut app);
            let world = app.world_mut();
            let mut cars: Vec<(usize, f32)> = world
                .query_filtered::<&SpatialState, With<TrafficCar>>()
                .iter(world)
                .map(|c| (c.lane, c.distance))
                .collect();
            cars.sort_by(|a, b| a.1.total_cmp(&b.1));
            cars
        };
        assert_eq!(layout(), layout());
    }

    #[test]
    fn traffic_drives_toward_agents() {
        let mut app = setup_app(RaceConfig::default());
        app.world_mut().spawn((Role::Evader, SpatialState::new(1, 0.0, 0.0)));
        let car = app
            .world_mut()
            .spawn((TrafficCar, SpatialState::new(0, 1_000.0, 3.0)))
            .id();
        app.world_mut().run_schedule(FixedUpdate);
        let state = app.world().get::<SpatialState>(car).unwrap();
        assert!((state.distance - 997.0).abs() < 1e-4);
    }

    #[test]
    fn cars_far_behind_are_respawned_ahead() {
        let mut app = setup_app(RaceConfig::default());
        app.world_mut().spawn((Role::Evader, SpatialState::new(1, 5_000.0, 6.0)));
        app.world_mut().spawn((Role::Pursuer, SpatialState::new(1, 4_000.0, 6.0)));
        let car = app
            .world_mut()
            .spawn((TrafficCar, SpatialState::new(0, 3_000.0, 3.0)))
            .id();
        app.world_mut().run_schedule(FixedUpdate);
        let state = app.world().get::<SpatialState>(car).unwrap();
        assert!(state.distance > 5_000.0);
    }
}
