pub mod ai;
pub mod app_state;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod plugins;
pub mod resources;
pub mod tracing_bridge;

use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use app_state::RaceState;
use components::{PowerUp, Role, TrafficCar};
use config::RaceConfig;
use plugins::decision::DecisionPlugin;
use plugins::motion::MotionPlugin;
use plugins::race::RacePlugin;
use plugins::telemetry::TelemetryPlugin;
use plugins::traffic::TrafficPlugin;
use resources::{RaceClock, RaceRng};

/// Order of work inside one fixed tick. Every set runs only while racing.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceSet {
    /// Oncoming traffic moves first so decisions see this tick's road.
    Traffic,
    Decide,
    Motion,
    /// Pickups, crashes and end conditions.
    Resolve,
    Telemetry,
}

pub struct RoadRushPlugin;

impl Plugin for RoadRushPlugin {
    fn build(&self, app: &mut App) {
        // StatesPlugin comes from the caller's plugin group.
        app.init_state::<RaceState>();
        app.init_resource::<RaceConfig>();

        app.configure_sets(
            FixedUpdate,
            (
                RaceSet::Traffic,
                RaceSet::Decide,
                RaceSet::Motion,
                RaceSet::Resolve,
                RaceSet::Telemetry,
            )
                .chain()
                .run_if(in_state(RaceState::Racing)),
        );

        app.add_plugins(TrafficPlugin);
        app.add_plugins(DecisionPlugin);
        app.add_plugins(MotionPlugin);
        app.add_plugins(RacePlugin);
        app.add_plugins(TelemetryPlugin);

        // Race entities and session resources persist through Finished for
        // the results report and are cleared when a new race is staged.
        app.add_systems(OnExit(RaceState::Finished), cleanup_race_session);
    }
}

/// Despawn everything a staged race created.
#[span_fn]
fn cleanup_race_session(
    mut commands: Commands,
    entities: Query<Entity, Or<(With<Role>, With<TrafficCar>, With<PowerUp>)>>,
) {
    for entity in &entities {
        commands.entity(entity).despawn();
    }
    commands.remove_resource::<RaceRng>();
    commands.remove_resource::<RaceClock>();
}
