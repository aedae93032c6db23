//! Randomized invariant checks on individual subsystems.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vehicle_sim::command::EngineTransmissionCommand;
use vehicle_sim::drivetrain::differential::{update_differential, DifferentialParams, DifferentialState};
use vehicle_sim::drivetrain::engine::{update_gearbox, GearboxParams, GearboxState};
use vehicle_sim::drivetrain::{FourWheelBias, FourWheelDifferentialParams};
use vehicle_sim::presets;
use vehicle_sim::road::{Plane, RoadGeometryState};
use vehicle_sim::suspension::{
    update_suspension_state, AirborneJounce, JounceInput, SuspensionParams, SuspensionState,
    SuspensionStateCalculationParams,
};
use vehicle_sim::tire::slip::{slip_denominators, update_slip, TireSlipState, TireSpeedState};
use vehicle_sim::tire::TireSlipParams;
use vehicle_sim::types::{Frame, Point3, Pose, Real, Scale, TransformAndScale, Vec3};

fn random_bias(rng: &mut StdRng) -> FourWheelBias {
    FourWheelBias { front: rng.gen_range(0.0..=1.0), rear: rng.gen_range(0.0..=1.0), center: rng.gen_range(0.0..=1.0) }
}

#[test]
fn four_wheel_bias_is_rate_limited_and_converges() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let rate = rng.gen_range(0.05..2.0);
        let dt = rng.gen_range(0.001..0.05);
        let params = DifferentialParams::FourWheel(FourWheelDifferentialParams {
            initial: random_bias(&mut rng),
            rate,
            ..Default::default()
        });
        let target = random_bias(&mut rng);
        let cmd = EngineTransmissionCommand { bias_targets: Some(target), ..Default::default() };
        let mut state = DifferentialState::initial(&params);

        let dist = |b: &FourWheelBias| {
            (b.front - target.front).abs().max((b.rear - target.rear).abs()).max((b.center - target.center).abs())
        };
        for _ in 0..400 {
            let before = state.bias;
            update_differential(&params, &cmd, 4, dt, &mut state);
            let after = state.bias;
            let limit = rate * dt + 1e-6;
            assert!((after.front - before.front).abs() <= limit);
            assert!((after.rear - before.rear).abs() <= limit);
            assert!((after.center - before.center).abs() <= limit);
            assert!(dist(&after) <= dist(&before) + 1e-6, "moved away from target");
        }
    }
}

#[test]
fn gearbox_engages_only_after_switch_time() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..100 {
        let params = GearboxParams { switch_time: rng.gen_range(0.05..1.0), ..Default::default() };
        let mut state = GearboxState::neutral(&params);
        let to = rng.gen_range(2..params.nb_gears());
        let dt = rng.gen_range(0.001..0.05);

        update_gearbox(&params, Some(to), dt, &mut state);
        let mut elapsed = dt;
        while state.engaged_gear().is_none() {
            assert_ne!(state.current_gear(), state.target_gear());
            update_gearbox(&params, Some(0), dt, &mut state);
            elapsed += dt;
        }
        assert!(elapsed + 1e-5 >= params.switch_time, "engaged after {elapsed} < {}", params.switch_time);
        assert!(elapsed < params.switch_time + dt + 1e-5, "engaged a substep late after {elapsed}");
        assert_eq!(state.current_gear(), to);
        assert_eq!(state.current_gear(), state.target_gear());
    }
}

#[test]
fn slip_denominators_respect_minimums() {
    let mut rng = StdRng::seed_from_u64(5);
    let params = TireSlipParams::default();
    for _ in 0..1000 {
        // Speeds cluster near zero to exercise the protected region.
        let speeds = TireSpeedState { lng: rng.gen_range(-1.0..1.0) * 1e-3, lat: rng.gen_range(-2.0..2.0) };
        let omega = rng.gen_range(-1.0..1.0) * 1e-3;
        let actuated = rng.gen_bool(0.5);

        let (lng, lat) = slip_denominators(&speeds, omega * 0.35, actuated, &params);
        let min_lng = if actuated {
            params.min_active_long_slip_denominator
        } else {
            params.min_passive_long_slip_denominator
        };
        assert!(lng >= min_lng);
        assert!(lat >= params.min_lat_slip_denominator);

        let mut slip = TireSlipState::default();
        update_slip(&speeds, omega, 0.35, actuated, &params, &mut slip);
        assert!(slip.lng.is_finite() && slip.lat.is_finite());
    }
}

#[test]
fn jounce_stays_in_travel() {
    let mut rng = StdRng::seed_from_u64(9);
    let susp = SuspensionParams {
        suspension_attachment: Pose::translation(0.7, -0.1, 1.2),
        travel_dir: -Vec3::y(),
        travel_dist: 0.25,
        wheel_attachment: Pose::identity(),
    };
    let calc = SuspensionStateCalculationParams { airborne: AirborneJounce::Value(0.0), ..Default::default() };
    let chassis = Pose::identity();
    let mut state = SuspensionState::default();

    for _ in 0..2000 {
        let tilt = Vec3::new(rng.gen_range(-0.2..0.2), 1.0, rng.gen_range(-0.2..0.2)).normalize();
        let height = rng.gen_range(-1.2..0.2);
        let road = RoadGeometryState {
            plane: Plane::from_point_normal(&Point3::new(0.0, height, 0.0), &tilt),
            hit: rng.gen_bool(0.9),
            ..Default::default()
        };
        let input = JounceInput {
            params: &susp,
            calc: &calc,
            wheel_radius: 0.33,
            spin_axis: Vec3::x(),
            road: &road,
            chassis: &chassis,
        };
        update_suspension_state(&input, 1.0 / 240.0, &mut state);

        assert!((0.0..=susp.travel_dist).contains(&state.jounce), "jounce {}", state.jounce);
        if state.separation > 0.0 {
            assert!(state.is_airborne());
            assert_eq!(state.jounce, 0.0);
        }
    }
}

#[test]
fn same_frame_and_scale_is_identity() {
    let frame = Frame::default();
    let scale = Scale::default();
    for params in [presets::direct_drive_car(), presets::engine_drive_car(), presets::four_wheel_drive_car(), presets::tank()] {
        let out = params.transform_and_scale(&frame, &frame, &scale, &scale);
        assert_eq!(out, params, "{} changed", params.name);
    }
    let slip = TireSlipParams::default();
    assert_eq!(slip.transform_and_scale(&frame, &frame, &scale, &scale), slip);
}

#[test]
fn scaling_round_trips() {
    let frame = Frame::default();
    let metres = Scale::default();
    let centimetres = Scale { scale: 100.0 };
    let p = presets::direct_drive_car();
    let there = p.transform_and_scale(&frame, &frame, &metres, &centimetres);
    assert!((there.suspensions[0].travel_dist - p.suspensions[0].travel_dist * 100.0).abs() < 1e-3);
    let back: Real = there.transform_and_scale(&frame, &frame, &centimetres, &metres).suspensions[0].travel_dist;
    assert!((back - p.suspensions[0].travel_dist).abs() < 1e-6);
}
