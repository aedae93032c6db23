//! Whole-vehicle behaviour against analytic roads, without a physics engine.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vehicle_sim::command::{Commands, DirectGear, EngineTransmissionCommand, GearCommand, TransmissionCommand};
use vehicle_sim::config::SimulationConfig;
use vehicle_sim::drivetrain::DrivetrainParams;
use vehicle_sim::presets;
use vehicle_sim::road::{FlatRoad, RoadGeometryQuery, RoadHit, RoadQueryFilter, WheelShape};
use vehicle_sim::suspension::JounceCalculation;
use vehicle_sim::types::{Point3, Pose, Real, Vec3};
use vehicle_sim::vehicle::{Vehicle, VehicleParams};

const DT: Real = 1.0 / 60.0;
const G: Real = 9.81;

fn at_rest(params: VehicleParams) -> Vehicle {
    let y = presets::rest_height(&params, G, 0.0);
    let mut v = Vehicle::new(params).unwrap();
    v.set_pose(Pose::translation(0.0, y, 0.0));
    v
}

fn run(v: &mut Vehicle, road: &dyn RoadGeometryQuery, steps: usize) {
    let config = SimulationConfig::default();
    let ctx = config.context(road);
    for _ in 0..steps {
        assert!(v.update(DT, &ctx));
    }
}

fn engine_commands(throttle: Real, gear: GearCommand, thrusts: [Real; 2]) -> Commands {
    let mut engine = EngineTransmissionCommand { target_gear: gear, ..Default::default() };
    engine.thrusts[0] = thrusts[0];
    engine.thrusts[1] = thrusts[1];
    Commands { throttle, transmission: TransmissionCommand::Engine(engine), ..Commands::default() }
}

/// Flat ground with a hole over the +X/+Z quadrant.
struct HoleyRoad(FlatRoad);

impl RoadGeometryQuery for HoleyRoad {
    fn raycast(&self, origin: &Point3, dir: &Vec3, max_dist: Real, filter: &RoadQueryFilter) -> Option<RoadHit> {
        if origin.x > 0.0 && origin.z > 0.0 {
            return None;
        }
        self.0.raycast(origin, dir, max_dist, filter)
    }

    fn sweep(&self, shape: &WheelShape, start: &Pose, dir: &Vec3, max_dist: Real, filter: &RoadQueryFilter) -> Option<RoadHit> {
        let p = start.translation.vector;
        if p.x > 0.0 && p.z > 0.0 {
            return None;
        }
        self.0.sweep(shape, start, dir, max_dist, filter)
    }
}

#[test]
fn idle_car_stays_at_rest_jounce() {
    let mut v = at_rest(presets::direct_drive_car());
    let road = FlatRoad::ground(0.0);
    let drivetrain = v.state.drivetrain;
    run(&mut v, &road, 60);

    for w in 0..4 {
        assert_eq!(v.state.responses.drive_torque[w], 0.0);
        assert_eq!(v.state.responses.brake_torque[w], 0.0);
        assert!(v.state.wheels[w].rotation_speed.abs() < 0.05);
    }
    assert_eq!(v.state.drivetrain, drivetrain);

    run(&mut v, &road, 60);
    let p = v.params().clone();
    for w in 0..4 {
        let rest = p.suspension_forces[w].rest_jounce(G);
        assert!(!v.state.suspension[w].is_airborne());
        assert_relative_eq!(v.state.suspension[w].jounce, rest, epsilon = 0.02);
    }
    assert!(v.state.rigid_body.linear_velocity.norm() < 0.05);
}

#[test]
fn direct_drive_moves_forward() {
    let mut v = at_rest(presets::direct_drive_car());
    v.set_commands(Commands {
        throttle: 1.0,
        transmission: TransmissionCommand::Direct(DirectGear::Forward),
        ..Commands::default()
    });
    let road = FlatRoad::ground(0.0);
    run(&mut v, &road, 120);

    let frame = SimulationConfig::default().frame;
    assert!(v.state.forward_speed(&frame) > 1.0);
    // Driven wheels spin forward.
    assert!(v.state.wheels[2].rotation_speed > 0.0);
}

#[test]
fn neutral_throttle_revs_engine_without_moving() {
    let mut v = at_rest(presets::engine_drive_car());
    let road = FlatRoad::ground(0.0);
    let DrivetrainParams::Engine(drive) = &v.params().drivetrain else { unreachable!() };
    let max_omega = drive.engine.max_omega;
    let idle = v.state.drivetrain.engine().unwrap().engine.rotation_speed;

    let clutch_slip = v.state.drivetrain.engine().unwrap().clutch_slip;
    let ramp = 120;
    for i in 0..ramp + 120 {
        // 0 -> 1 over two seconds, then held.
        let throttle = (i as Real / ramp as Real).min(1.0);
        v.set_commands(engine_commands(throttle, GearCommand::Gear(1), [0.0; 2]));
        run(&mut v, &road, 1);

        let engine = v.state.drivetrain.engine().unwrap();
        assert_eq!(engine.clutch_slip, clutch_slip);
        assert!(engine.engine.rotation_speed <= max_omega, "engine over max at step {i}");
        if i == ramp {
            assert!(engine.engine.rotation_speed > idle * 2.0);
        }
    }

    let engine = v.state.drivetrain.engine().unwrap();
    assert_eq!(engine.gearbox.current_gear(), 1);
    assert!(
        engine.engine.rotation_speed >= 0.9 * max_omega,
        "engine at {} of {max_omega}",
        engine.engine.rotation_speed
    );
    assert!(v.state.rigid_body.linear_velocity.norm() < 0.1);
}

#[test]
fn wheel_over_a_hole_unloads_within_one_update() {
    let mut params = presets::four_wheel_drive_car();
    assert!(params.substeps > 1);
    // The front bar would hand the lost load to wheel 1.
    params.anti_roll_bars.clear();

    let mut holed = at_rest(params.clone());
    let mut twin = at_rest(params);
    for v in [&mut holed, &mut twin] {
        let pose = v.state.rigid_body.pose;
        // Rolling chassis over locked wheels so every tire carries a real force.
        v.set_rigid_body_state(pose, Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
    }

    // Deferred: the chassis holds its pose through the update, so the hole is
    // the only difference between the two vehicles.
    let config = SimulationConfig::deferred();
    let hole = HoleyRoad(FlatRoad::ground(0.0));
    let flat = FlatRoad::ground(0.0);
    assert!(holed.update(DT, &config.context(&hole)));
    assert!(twin.update(DT, &config.context(&flat)));

    assert!(!holed.state.road[0].hit);
    assert!(holed.state.suspension[0].is_airborne());
    assert_relative_eq!(holed.state.suspension_force[0].normal_force, 0.0);
    assert_relative_eq!(holed.state.tires[0].force.force, Vec3::zeros());
    assert!(twin.state.tires[0].force.force.norm() > 0.0);

    for w in 1..4 {
        let load = twin.state.suspension_force[w].normal_force;
        assert!(load > 0.0);
        assert!(holed.state.road[w].hit);
        assert_relative_eq!(holed.state.suspension_force[w].normal_force, load, max_relative = 1e-3);

        let force = twin.state.tires[w].force.force;
        assert!(force.norm() > 0.1 * load, "wheel {w} tire force {force:?}");
        let diff = (holed.state.tires[w].force.force - force).norm();
        assert!(diff <= 1e-2 * load, "wheel {w} tire force moved by {diff}");
    }
}

#[test]
fn sweep_matches_raycast_on_flat_ground() {
    let mut params = presets::direct_drive_car();
    let mut swept = params.clone();
    swept.suspension_state_calc.jounce_calculation = JounceCalculation::Sweep;
    params.suspension_state_calc.jounce_calculation = JounceCalculation::Raycast;

    let mut ray = at_rest(params);
    let mut sweep = at_rest(swept);
    let road = FlatRoad::ground(0.0);
    run(&mut ray, &road, 1);
    run(&mut sweep, &road, 1);

    for w in 0..4 {
        assert!(sweep.state.road[w].hit);
        assert!(!sweep.state.suspension[w].is_airborne());
        assert_relative_eq!(sweep.state.suspension[w].jounce, ray.state.suspension[w].jounce, epsilon = 1e-3);
        assert_relative_eq!(
            sweep.state.suspension_force[w].normal_force,
            ray.state.suspension_force[w].normal_force,
            max_relative = 1e-2
        );
    }
}

#[test]
fn expansion_limit_paces_a_sudden_drop() {
    let rate = 0.5;
    let mut params = presets::direct_drive_car();
    params.suspension_state_calc.limit_expansion_velocity = true;
    params.suspension_state_calc.max_expansion_speed = rate;

    let mut v = at_rest(params);
    run(&mut v, &FlatRoad::ground(0.0), 30);
    assert!(v.state.suspension.iter().take(4).all(|s| !s.is_airborne() && s.jounce > 0.0));

    // The ground falls away further than the wheels can reach; the chassis is
    // still clear of it after 14 updates of free fall.
    let road = FlatRoad::ground(-0.5);
    let step = rate * DT;
    let mut previous: Vec<Real> = v.state.suspension.iter().take(4).map(|s| s.jounce).collect();
    for _ in 0..14 {
        run(&mut v, &road, 1);
        for w in 0..4 {
            let s = v.state.suspension[w];
            assert!(previous[w] - s.jounce <= step + 1e-4, "wheel {w} dropped {}", previous[w] - s.jounce);
            assert!(s.is_airborne());
            if previous[w] > step + 1e-4 {
                // Held at the rate limit rather than snapped to full extension.
                assert!(s.jounce > 0.0);
                assert_relative_eq!(previous[w] - s.jounce, step, epsilon = 1e-4);
            }
            previous[w] = s.jounce;
        }
    }
    assert!(previous.iter().all(|&j| j == 0.0));
}

#[test]
fn tank_with_equal_thrusts_drives_straight() {
    let mut v = at_rest(presets::tank());
    v.set_commands(engine_commands(1.0, GearCommand::Automatic, [1.0, 1.0]));
    let road = FlatRoad::ground(0.0);
    run(&mut v, &road, 180);

    let frame = SimulationConfig::default().frame;
    assert!(v.state.forward_speed(&frame) > 0.5);
    let heading = v.state.rigid_body.pose.rotation * Vec3::z();
    assert!(heading.x.abs() < 0.05, "tank turned: {heading:?}");
}

#[test]
fn random_driving_stays_finite_and_in_travel() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut v = at_rest(presets::four_wheel_drive_car());
    let road = FlatRoad::ground(0.0);
    let travel = v.params().suspensions[0].travel_dist;

    for _ in 0..60 {
        let mut commands = engine_commands(rng.gen_range(0.0..1.0), GearCommand::Automatic, [0.0; 2]);
        commands.steer = rng.gen_range(-1.0..1.0);
        commands.brakes[0] = if rng.gen_bool(0.2) { rng.gen_range(0.0..1.0) } else { 0.0 };
        v.set_commands(commands);
        run(&mut v, &road, 10);

        let rb = &v.state.rigid_body;
        assert!(rb.pose.translation.vector.iter().all(|c| c.is_finite()));
        assert!(rb.linear_velocity.iter().all(|c| c.is_finite()));
        for w in 0..4 {
            let j = v.state.suspension[w].jounce;
            assert!((0.0..=travel).contains(&j), "jounce {j} out of travel");
            assert!(v.state.wheels[w].rotation_speed.is_finite());
            assert!(v.state.tires[w].force.force.iter().all(|c| c.is_finite()));
        }
    }
}
