use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use vehicle_sim::command::{Commands, EngineTransmissionCommand, TransmissionCommand};
use vehicle_sim::config::SimulationConfig;
use vehicle_sim::error::Result;
use vehicle_sim::physics::PhysicsWorld;
use vehicle_sim::presets;
use vehicle_sim::types::{Pose, Real, Vec3};

/// Scripted driver: throttle ramps in over 2 s, steering sweeps slowly.
fn demo_commands(time: Real, wheels_on_tracks: bool) -> Commands {
    let throttle = (time / 2.0).min(1.0) * 0.6;
    let mut engine = EngineTransmissionCommand::default();
    let mut steer = (time * 0.3).sin() * 0.5;
    if wheels_on_tracks {
        // Tanks steer by thrust difference.
        engine.thrusts[0] = throttle;
        engine.thrusts[1] = throttle * 0.8;
        steer = 0.0;
    }
    Commands { throttle, steer, transmission: TransmissionCommand::Engine(engine), ..Commands::default() }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Usage: vehicle-sim [config.json] [ticks]
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SimulationConfig::from_json_file(&path)?,
        None => SimulationConfig::default(),
    };
    let max_ticks: Option<u64> = args.next().and_then(|t| t.parse().ok());
    info!(timestep = config.timestep, substeps = config.substeps, ?max_ticks, "starting vehicle simulation");

    let period = Duration::from_secs_f32(config.timestep);
    let gravity = config.gravity.norm();
    let mut world = PhysicsWorld::new(config)?;

    let mut vehicles: Vec<(Uuid, bool)> = Vec::new();
    for (params, half_extents, x, tracked) in [
        (presets::engine_drive_car(), presets::CAR_HALF_EXTENTS, -4.0, false),
        (presets::four_wheel_drive_car(), presets::CAR_HALF_EXTENTS, 0.0, false),
        (presets::tank(), presets::TANK_HALF_EXTENTS, 6.0, true),
    ] {
        let y = presets::rest_height(&params, gravity, 0.0);
        let id = world.spawn_vehicle(params, Vec3::from(half_extents), Pose::translation(x, y, 0.0))?;
        vehicles.push((id, tracked));
    }

    let world = Arc::new(RwLock::new(world));

    // Telemetry: one snapshot per second.
    let telemetry = Arc::clone(&world);
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let snapshot = telemetry.read().await.snapshot();
            for v in &snapshot.vehicles {
                info!(tick = snapshot.tick, name = %v.name, speed = v.forward_speed, gear = ?v.gear, "vehicle");
            }
            match serde_json::to_string(&snapshot) {
                Ok(json) => tracing::debug!(%json, "snapshot"),
                Err(e) => warn!(error = %e, "snapshot serialization failed"),
            }
        }
    });

    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let mut world = world.write().await;
        let time = world.tick as Real * world.config.timestep;
        for (id, tracked) in &vehicles {
            if let Some(v) = world.vehicle_mut(*id) {
                v.set_commands(demo_commands(time, *tracked));
            }
        }
        world.step();

        if max_ticks.is_some_and(|max| world.tick >= max) {
            info!(tick = world.tick, "tick limit reached");
            break;
        }
    }
    Ok(())
}
