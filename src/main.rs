use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use bevy::tasks::{ComputeTaskPool, TaskPoolBuilder};
use bevy::time::TimeUpdateStrategy;
use micromegas_telemetry_sink::TelemetryGuardBuilder;
use micromegas_telemetry_sink::tracing_interop::TracingCaptureLayer;
use micromegas_tracing::dispatch::{flush_thread_buffer, init_thread_stream, unregister_thread_stream};
use micromegas_tracing::levels::LevelFilter;
use micromegas_tracing::prelude::{error, info};
use roadrush::app_state::RaceState;
use roadrush::config::RaceConfig;
use roadrush::tracing_bridge::{MicromegasBridgeLayer, ScheduleFilter};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;

const TICK_HZ: f64 = 60.0;

fn main() -> AppExit {
    // 1. Initialize telemetry. Spans additionally require
    //    MICROMEGAS_ENABLE_CPU_TRACING=true; logs and metrics always work.
    let _telemetry_guard = match TelemetryGuardBuilder::default()
        .with_install_tracing_capture(false)
        .build()
    {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize telemetry: {err}");
            return AppExit::error();
        }
    };

    // 2. Optional JSON config as the first argument.
    let config = match std::env::args().nth(1) {
        Some(path) => match RaceConfig::load(&path) {
            Ok(config) => {
                info!("loaded race config from {path}");
                config
            }
            Err(err) => {
                error!("cannot use config {path}: {err}");
                return AppExit::error();
            }
        },
        None => RaceConfig::default(),
    };
    info!("RoadRush starting: seed={}", config.sim.seed);

    // 3. Route Bevy's own tracing into the same sink. Must be installed
    //    before the app starts emitting schedule spans.
    let log_layer = TracingCaptureLayer {
        max_level: LevelFilter::Info,
    };
    let subscriber = Registry::default()
        .with(MicromegasBridgeLayer::new(ScheduleFilter::FixedTick))
        .with(log_layer);
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        error!("failed to set tracing subscriber: {err}");
        return AppExit::error();
    }

    // 4. Pre-init ComputeTaskPool with Micromegas thread callbacks, before
    //    TaskPoolPlugin would create its own.
    init_thread_stream();
    ComputeTaskPool::get_or_init(|| {
        TaskPoolBuilder::new()
            .on_thread_spawn(|| {
                init_thread_stream();
            })
            .on_thread_destroy(|| {
                flush_thread_buffer();
                unregister_thread_stream();
            })
            .build()
    });

    // 5. Run headless. Every update advances virtual time by exactly one
    //    fixed tick, so a race runs as fast as the machine allows and is
    //    reproducible for a given seed.
    let tick = Duration::from_secs_f64(1.0 / TICK_HZ);
    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        .add_plugins(StatesPlugin)
        .insert_resource(Time::<Fixed>::from_hz(TICK_HZ))
        .insert_resource(TimeUpdateStrategy::ManualDuration(tick))
        .insert_resource(config)
        .add_plugins(roadrush::RoadRushPlugin)
        .add_systems(OnEnter(RaceState::Finished), exit_when_finished)
        .run()
}

fn exit_when_finished(mut exit: MessageWriter<AppExit>) {
    exit.write(AppExit::Success);
}
