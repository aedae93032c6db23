// ==============================================================================
// presets.rs — READY-MADE VEHICLES
// ------------------------------------------------------------------------------
// Wheel layout (rigid-body frame, origin = centre of mass, default Frame):
//
//        +Z (forward)
//     0 ---- 1        even ids on +X, odd ids on -X
//     |      |        axle i = wheels (2i, 2i + 1)
//     2 ---- 3
//
// Cars: 1350 kg, 2.5 m wheelbase, 1.5 m track, anti-roll 18000 / 12000 N/m.
// Tank: 32 t, four axles, two tracks driven by the command's thrusts.
// ==============================================================================

use crate::command::{AckermannParams, ClutchCommandResponseParams, CommandResponseParams, NonlinearResponse};
use crate::drivetrain::{
    AutoboxParams, DifferentialParams, DirectDriveParams, DrivetrainParams, EngineDriveParams, EngineParams,
    FourWheelBias, FourWheelDifferentialParams, GearboxParams, MultiWheelDifferentialParams,
    TankDifferentialParams,
};
use crate::fixed::LookupTable;
use crate::rigid_body::RigidBodyParams;
use crate::suspension::{AntiRollBarParams, SuspensionComplianceParams, SuspensionForceParams, SuspensionParams};
use crate::tire::TireForceParams;
use crate::types::{AxleDescription, Pose, Real, Vec3, MAX_COMPLIANCE_POINTS};
use crate::vehicle::VehicleParams;
use crate::wheel::WheelParams;

const GRAVITY: Real = 9.81;

pub const CAR_MASS: Real = 1350.0;
pub const CAR_HALF_EXTENTS: [Real; 3] = [1.0, 0.35, 2.1];
const CAR_WHEELBASE: Real = 2.5;
const CAR_TRACK: Real = 1.5;
const CAR_MAX_STEER: Real = 0.6;
const CAR_ACKERMANN: Real = 0.8;
const CAR_ARB_FRONT: Real = 18_000.0;
const CAR_ARB_REAR: Real = 12_000.0;
const CAR_SAG: Real = 0.08;
const CAR_ZETA: Real = 0.7;

pub const TANK_MASS: Real = 32_000.0;
pub const TANK_HALF_EXTENTS: [Real; 3] = [1.7, 0.6, 3.5];

/// Steer angle falls from full lock at rest to 40 % at 30 m/s.
fn speed_sensitive_steer(wheels: &[u32]) -> CommandResponseParams {
    let mut table = NonlinearResponse::new();
    table.add_response(-1.0, &[(0.0, -1.0), (30.0, -0.4)]);
    table.add_response(0.0, &[(0.0, 0.0)]);
    table.add_response(1.0, &[(0.0, 1.0), (30.0, 0.4)]);
    CommandResponseParams { nonlinear: table, ..CommandResponseParams::linear(CAR_MAX_STEER, wheels) }
}

/// Wheel i at `(x, z)`; the suspension reaches full compression at `top_y`.
fn place_wheel(params: &mut VehicleParams, i: usize, x: Real, z: Real, top_y: Real, travel: Real) {
    params.suspensions[i] = SuspensionParams {
        suspension_attachment: Pose::translation(x, top_y, z),
        travel_dir: -Vec3::y(),
        travel_dist: travel,
        wheel_attachment: Pose::identity(),
    };
}

fn car(name: &str, drivetrain: DrivetrainParams) -> VehicleParams {
    let mut p = VehicleParams {
        name: name.to_string(),
        axle: AxleDescription::paired(2),
        rigid_body: RigidBodyParams::from_box(CAR_MASS, Vec3::from(CAR_HALF_EXTENTS)),
        drivetrain,
        ..VehicleParams::default()
    };

    let half_track = CAR_TRACK * 0.5;
    let half_base = CAR_WHEELBASE * 0.5;
    let sprung = CAR_MASS / 4.0;
    let forces = SuspensionForceParams::from_sag(sprung, GRAVITY, CAR_SAG, CAR_ZETA);
    let tire = TireForceParams { rest_load: sprung * GRAVITY, ..TireForceParams::default() };

    let front_camber = SuspensionComplianceParams { camber: linear_curve(0.0, -0.03), ..Default::default() };

    for (i, (x, z)) in
        [(half_track, half_base), (-half_track, half_base), (half_track, -half_base), (-half_track, -half_base)]
            .into_iter()
            .enumerate()
    {
        place_wheel(&mut p, i, x, z, -0.05, 0.25);
        p.wheels[i] = WheelParams::default();
        p.suspension_forces[i] = forces;
        p.tires[i] = tire;
        if i < 2 {
            p.suspension_compliance[i] = front_camber;
        }
    }

    p.anti_roll_bars.try_push(AntiRollBarParams { wheel0: 0, wheel1: 1, stiffness: CAR_ARB_FRONT });
    p.anti_roll_bars.try_push(AntiRollBarParams { wheel0: 2, wheel1: 3, stiffness: CAR_ARB_REAR });

    p.brake_responses[0] = CommandResponseParams::linear(1_500.0, &[0, 1, 2, 3]);
    p.brake_responses[1] = CommandResponseParams::linear(2_500.0, &[2, 3]);
    p.steer_response = speed_sensitive_steer(&[0, 1]);
    p.ackermann.try_push(AckermannParams {
        wheel_ids: [0, 1],
        wheel_base: CAR_WHEELBASE,
        track_width: CAR_TRACK,
        strength: CAR_ACKERMANN,
    });
    p
}

fn car_engine() -> EngineParams {
    EngineParams { peak_torque: 250.0, moi: 0.6, idle_omega: 80.0, max_omega: 700.0, ..EngineParams::default() }
}

/// Rear-wheel drive, torque straight from the throttle.
pub fn direct_drive_car() -> VehicleParams {
    car(
        "direct-drive-car",
        DrivetrainParams::Direct(DirectDriveParams { throttle_response: CommandResponseParams::linear(600.0, &[2, 3]) }),
    )
}

/// Rear-wheel drive through engine, clutch, five-speed gearbox and autobox.
pub fn engine_drive_car() -> VehicleParams {
    car(
        "engine-drive-car",
        DrivetrainParams::Engine(EngineDriveParams {
            engine: car_engine(),
            gearbox: GearboxParams::default(),
            autobox: Some(AutoboxParams::default()),
            clutch_response: ClutchCommandResponseParams { max_response: 40.0 },
            differential: DifferentialParams::MultiWheel(MultiWheelDifferentialParams::even(&[2, 3])),
            ..EngineDriveParams::default()
        }),
    )
}

/// All-wheel drive; the centre bias drifts toward 40 % front.
pub fn four_wheel_drive_car() -> VehicleParams {
    car(
        "four-wheel-drive-car",
        DrivetrainParams::Engine(EngineDriveParams {
            engine: car_engine(),
            gearbox: GearboxParams::default(),
            autobox: Some(AutoboxParams::default()),
            clutch_response: ClutchCommandResponseParams { max_response: 40.0 },
            differential: DifferentialParams::FourWheel(FourWheelDifferentialParams {
                front_wheels: [0, 1],
                rear_wheels: [2, 3],
                initial: FourWheelBias::default(),
                target: FourWheelBias { front: 0.5, rear: 0.5, center: 0.4 },
                rate: 0.5,
            }),
            ..EngineDriveParams::default()
        }),
    )
}

/// Eight road wheels on two tracks. Steering comes from thrust differences.
pub fn tank() -> VehicleParams {
    let mut diff = TankDifferentialParams::default();
    diff.add_track(0, &[0, 2, 4, 6]);
    diff.add_track(1, &[1, 3, 5, 7]);

    let mut p = VehicleParams {
        name: String::from("tank"),
        axle: AxleDescription::paired(4),
        rigid_body: RigidBodyParams::from_box(TANK_MASS, Vec3::from(TANK_HALF_EXTENTS)),
        drivetrain: DrivetrainParams::Engine(EngineDriveParams {
            engine: EngineParams { peak_torque: 2_000.0, moi: 4.0, idle_omega: 60.0, max_omega: 300.0, ..EngineParams::default() },
            gearbox: GearboxParams::default(),
            autobox: Some(AutoboxParams::default()),
            clutch_response: ClutchCommandResponseParams { max_response: 400.0 },
            differential: DifferentialParams::Tank(diff),
            ..EngineDriveParams::default()
        }),
        ..VehicleParams::default()
    };

    let sprung = TANK_MASS / 8.0;
    let forces = SuspensionForceParams::from_sag(sprung, GRAVITY, 0.1, 0.7);
    let wheel = WheelParams { radius: 0.4, half_width: 0.3, mass: 100.0, moi: 8.0, damping_rate: 1.0 };
    let tire = TireForceParams { rest_load: sprung * GRAVITY, long_stiff: 300_000.0, ..TireForceParams::default() };

    for (axle, z) in [2.4, 0.8, -0.8, -2.4].into_iter().enumerate() {
        for (side, x) in [1.4, -1.4].into_iter().enumerate() {
            let i = axle * 2 + side;
            place_wheel(&mut p, i, x, z, -0.3, 0.3);
            p.wheels[i] = wheel;
            p.suspension_forces[i] = forces;
            p.tires[i] = tire;
        }
    }
    p.brake_responses[0] = CommandResponseParams::linear(20_000.0, &[0, 1, 2, 3, 4, 5, 6, 7]);
    p
}

/// Centre-of-mass height above flat ground at which every wheel sits at its
/// rest jounce. Assumes the rigid-body vertical axis is +Y.
pub fn rest_height(params: &VehicleParams, gravity: Real, ground_y: Real) -> Real {
    let ids: Vec<u32> = params.axle.wheel_ids().collect();
    let sum: Real = ids
        .iter()
        .map(|&w| {
            let i = w as usize;
            let rest = params.suspension_forces[i].rest_jounce(gravity).min(params.suspensions[i].travel_dist);
            params.wheels[i].radius - params.suspensions[i].wheel_center(rest).y
        })
        .sum();
    ground_y + sum / ids.len().max(1) as Real
}

fn linear_curve(at_droop: Real, at_compression: Real) -> LookupTable<Real, MAX_COMPLIANCE_POINTS> {
    let mut t = LookupTable::new();
    t.add_pair(0.0, at_droop);
    t.add_pair(1.0, at_compression);
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for p in [direct_drive_car(), engine_drive_car(), four_wheel_drive_car(), tank()] {
            assert!(p.validate().is_ok(), "{} failed: {:?}", p.name, p.validate());
        }
    }

    #[test]
    fn rest_height_puts_wheels_on_the_ground() {
        let p = direct_drive_car();
        let h = rest_height(&p, GRAVITY, 0.0);
        let rest = p.suspension_forces[0].rest_jounce(GRAVITY);
        let bottom = h + p.suspensions[0].wheel_center(rest).y - p.wheels[0].radius;
        approx::assert_relative_eq!(bottom, 0.0, epsilon = 1e-5);
    }
}
