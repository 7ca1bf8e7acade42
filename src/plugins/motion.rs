//! Vehicle motion: turns each agent's `ControlIntent` into lane and speed changes.
//!
//! The decision core only says where the vehicle wants to be. This plugin
//! enforces the physical limits: acceleration and braking per tick, one lane
//! step per steering cooldown, and the speed penalties of active effects.

use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::ai::{ControlIntent, Urgency};
use crate::components::{ActiveEffects, Role, SpatialState, Steering};
use crate::config::RaceConfig;
use crate::RaceSet;

pub struct MotionPlugin;

impl Plugin for MotionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, apply_intents.in_set(RaceSet::Motion));
    }
}

/// Top speed after effects. Slowed vehicles run at half the legal maximum.
pub fn effective_max_speed(effects: &ActiveEffects, config: &RaceConfig) -> f32 {
    let max = config.track.max_speed;
    if effects.slowed > 0 { max * 0.5 } else { max }
}

/// Advance one vehicle by one tick toward its intent.
pub fn step_vehicle(
    state: &mut SpatialState,
    steering: &mut Steering,
    intent: &ControlIntent,
    effects: &ActiveEffects,
    config: &RaceConfig,
) {
    let sim = &config.sim;
    let target = intent
        .target_speed
        .min(effective_max_speed(effects, config))
        .max(config.track.min_speed);

    let mut acceleration = sim.acceleration;
    if effects.boost > 0 {
        acceleration *= 2.0;
    }
    if effects.crash_recovery > 0 {
        acceleration *= 0.5;
    }
    let braking = if intent.urgency == Urgency::Critical {
        sim.emergency_braking
    } else {
        sim.braking
    };

    state.speed = if state.speed < target {
        (state.speed + acceleration).min(target)
    } else {
        (state.speed - braking).max(target)
    };

    if steering.cooldown > 0 {
        steering.cooldown -= 1;
    } else {
        let lane = config.track.clamp_lane(intent.target_lane);
        if lane != state.lane {
            state.lane = if lane > state.lane { state.lane + 1 } else { state.lane - 1 };
            steering.cooldown = sim.lane_change_ticks;
        }
    }

    state.distance += state.speed;
}

#[span_fn]
fn apply_intents(
    config: Res<RaceConfig>,
    mut agents: Query<
        (&ControlIntent, &ActiveEffects, &mut SpatialState, &mut Steering),
        With<Role>,
    >,
) {
    for (intent, effects, mut state, mut steering) in &mut agents {
        step_vehicle(&mut state, &mut steering, intent, effects, &config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::IntentSource;

    fn intent(lane: usize, speed: f32, urgency: Urgency) -> ControlIntent {
        ControlIntent {
            target_lane: lane,
            target_speed: speed,
            urgency,
            source: IntentSource::Search,
        }
    }

    #[test]
    fn accelerates_gradually_toward_target() {
        let cfg = RaceConfig::default();
        let mut state = SpatialState::new(1, 100.0, 0.0);
        let mut steering = Steering::default();
        step_vehicle(&mut state, &mut steering, &intent(1, 5.0, Urgency::None), &ActiveEffects::default(), &cfg);
        assert!((state.speed - cfg.sim.acceleration).abs() < 1e-6);
        assert!((state.distance - (100.0 + cfg.sim.acceleration)).abs() < 1e-4);
    }

    #[test]
    fn critical_urgency_brakes_harder() {
        let cfg = RaceConfig::default();
        let fx = ActiveEffects::default();
        let mut calm = SpatialState::new(1, 0.0, 6.0);
        let mut emergency = calm;
        step_vehicle(&mut calm, &mut Steering::default(), &intent(1, 0.0, Urgency::High), &fx, &cfg);
        step_vehicle(&mut emergency, &mut Steering::default(), &intent(1, 0.0, Urgency::Critical), &fx, &cfg);
        assert!(emergency.speed < calm.speed);
        assert!((emergency.speed - (6.0 - cfg.sim.emergency_braking)).abs() < 1e-5);
    }

    #[test]
    fn one_lane_per_cooldown() {
        let cfg = RaceConfig::default();
        let fx = ActiveEffects::default();
        let mut state = SpatialState::new(0, 0.0, 5.0);
        let mut steering = Steering::default();
        let wide = intent(2, 5.0, Urgency::None);

        step_vehicle(&mut state, &mut steering, &wide, &fx, &cfg);
        assert_eq!(state.lane, 1);
        assert_eq!(steering.cooldown, cfg.sim.lane_change_ticks);

        for _ in 0..cfg.sim.lane_change_ticks {
            step_vehicle(&mut state, &mut steering, &wide, &fx, &cfg);
            assert_eq!(state.lane, 1);
        }
        step_vehicle(&mut state, &mut steering, &wide, &fx, &cfg);
        assert_eq!(state.lane, 2);
    }

    #[test]
    fn slowed_vehicle_is_held_to_half_speed() {
        let cfg = RaceConfig::default();
        let fx = ActiveEffects {
            slowed: 10,
            ..default()
        };
        let mut state = SpatialState::new(1, 0.0, 7.0);
        step_vehicle(&mut state, &mut Steering::default(), &intent(1, 8.0, Urgency::None), &fx, &cfg);
        assert!(state.speed <= 7.0);
        assert!(effective_max_speed(&fx, &cfg) < cfg.track.max_speed);
    }

    #[test]
    fn distance_never_decreases() {
        let cfg = RaceConfig::default();
        let fx = ActiveEffects::default();
        let mut state = SpatialState::new(1, 500.0, 1.0);
        let mut steering = Steering::default();
        for _ in 0..20 {
            let before = state.distance;
            step_vehicle(&mut state, &mut steering, &intent(0, 0.0, Urgency::Critical), &fx, &cfg);
            assert!(state.distance >= before);
            assert!(state.speed >= 0.0);
        }
    }

    #[test]
    fn system_advances_agents() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(RaceConfig::default());
        app.add_systems(FixedUpdate, apply_intents);
        let agent = app
            .world_mut()
            .spawn((
                Role::Evader,
                SpatialState::new(1, 0.0, 4.0),
                Steering::default(),
                ActiveEffects::default(),
                intent(1, 4.0, Urgency::None),
            ))
            .id();

        app.world_mut().run_schedule(FixedUpdate);

        let state = app.world().get::<SpatialState>(agent).unwrap();
        assert!((state.distance - 4.0).abs() < 1e-5);
    }
}
