//! Race telemetry: per-tick gap and speed metrics plus frame timing.

use bevy::prelude::*;
use micromegas_tracing::prelude::{fmetric, span_scope};

use crate::components::{Role, SpatialState};
use crate::RaceSet;

pub struct TelemetryPlugin;

impl Plugin for TelemetryPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, race_telemetry.in_set(RaceSet::Telemetry));
        app.add_systems(Last, frame_telemetry);
    }
}

fn race_telemetry(agents: Query<(&Role, &SpatialState)>) {
    span_scope!("race_telemetry");
    let mut pursuer = None;
    let mut evader = None;
    for (role, state) in &agents {
        match role {
            Role::Pursuer => {
                fmetric!("pursuer_speed", "units/tick", state.speed as f64);
                pursuer = Some(state.distance);
            }
            Role::Evader => {
                fmetric!("evader_speed", "units/tick", state.speed as f64);
                evader = Some(state.distance);
            }
        }
    }
    if let (Some(p), Some(e)) = (pursuer, evader) {
        fmetric!("chase_gap", "units", (e - p) as f64);
    }
}

fn frame_telemetry(time: Res<Time>) {
    span_scope!("frame");
    let dt_ms = time.delta_secs_f64() * 1000.0;
    fmetric!("frame_time_ms", "ms", dt_ms);
}
