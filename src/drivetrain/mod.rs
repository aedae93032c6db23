// ==============================================================================
// drivetrain/mod.rs — DRIVETRAIN SELECTION + DISPATCH
// ------------------------------------------------------------------------------
// A vehicle carries exactly one drivetrain, chosen by a tagged union:
//
//   Direct  - per-wheel throttle torque, wheels integrated independently
//   Engine  - engine + clutch + gearbox (+ optional autobox) + differential,
//             engine and driven wheels solved as one implicit system
//
// update_drivetrain() advances wheel speeds (and engine state) by one substep.
// ==============================================================================

pub mod differential;
pub mod direct;
pub mod engine;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use differential::{
    equalize_tank_tracks, update_differential, DifferentialParams, DifferentialState, FourWheelBias,
    FourWheelDifferentialParams, MultiWheelDifferentialParams, TankDifferentialParams, TankTrack,
};
pub use direct::{update_direct_drive, DirectDriveParams, DirectDriveState};
pub use engine::{
    gear_target, solve_engine_drive, update_autobox, update_gearbox, AutoboxParams, AutoboxState,
    ClutchAccuracyMode, ClutchParams, ClutchSlipState, DriveWheelInput, EngineDriveParams, EngineDriveState,
    EngineParams, EngineSolveInput, EngineSolveOutcome, EngineState, GearboxParams, GearboxState,
};

use crate::command::{CommandResponseState, Commands};
use crate::error::Result;
use crate::types::{AxleDescription, Frame, PerWheel, Real, Scale, TransformAndScale, MAX_WHEELS};
use crate::wheel::{WheelParams, WheelRigidBody1dState, WheelTorques};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DrivetrainParams {
    Direct(DirectDriveParams),
    Engine(EngineDriveParams),
}

impl Default for DrivetrainParams {
    fn default() -> Self {
        DrivetrainParams::Direct(DirectDriveParams::default())
    }
}

impl DrivetrainParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        match self {
            DrivetrainParams::Direct(p) => p.validate(axle),
            DrivetrainParams::Engine(p) => p.validate(axle),
        }
    }

    pub fn initial_state(&self) -> DrivetrainState {
        match self {
            DrivetrainParams::Direct(_) => DrivetrainState::Direct(DirectDriveState::default()),
            DrivetrainParams::Engine(p) => DrivetrainState::Engine(EngineDriveState::initial(p)),
        }
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, DrivetrainParams::Engine(_))
    }
}

impl TransformAndScale for DrivetrainParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        match self {
            DrivetrainParams::Direct(p) => {
                DrivetrainParams::Direct(p.transform_and_scale(src_frame, trg_frame, src, trg))
            }
            DrivetrainParams::Engine(p) => {
                DrivetrainParams::Engine(p.transform_and_scale(src_frame, trg_frame, src, trg))
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DrivetrainState {
    Direct(DirectDriveState),
    Engine(EngineDriveState),
}

impl Default for DrivetrainState {
    fn default() -> Self {
        DrivetrainState::Direct(DirectDriveState::default())
    }
}

impl DrivetrainState {
    pub fn engine(&self) -> Option<&EngineDriveState> {
        match self {
            DrivetrainState::Engine(s) => Some(s),
            DrivetrainState::Direct(_) => None,
        }
    }
}

/// Refreshes the differential ratios. Direct drive has nothing to do.
pub fn update_drivetrain_differential(
    params: &DrivetrainParams,
    commands: &Commands,
    nb_wheels: usize,
    dt: Real,
    state: &mut DrivetrainState,
) {
    if let (DrivetrainParams::Engine(p), DrivetrainState::Engine(s)) = (params, state) {
        update_differential(&p.differential, &commands.engine(), nb_wheels, dt, &mut s.differential);
    }
}

/// Wheel inputs shared by both drivetrains.
pub struct DrivetrainInput<'a> {
    pub wheel_ids: &'a [u32],
    pub wheels: &'a PerWheel<WheelParams>,
    pub commands: &'a Commands,
    pub responses: &'a CommandResponseState,
    /// Tire reaction torque and its slope per wheel.
    pub tire_torques: &'a PerWheel<(Real, Real)>,
}

/// Advances wheel speeds by `dt`. Returns false if params and state disagree on
/// the drivetrain kind.
pub fn update_drivetrain(
    params: &DrivetrainParams,
    input: &DrivetrainInput<'_>,
    dt: Real,
    state: &mut DrivetrainState,
    wheel_states: &mut PerWheel<WheelRigidBody1dState>,
) -> bool {
    match (params, state) {
        (DrivetrainParams::Direct(_), DrivetrainState::Direct(s)) => {
            s.gear = input.commands.direct_gear();
            let mut torques = [WheelTorques::default(); MAX_WHEELS];
            for &w in input.wheel_ids {
                let i = w as usize;
                let (tire, tire_derivative) = input.tire_torques[i];
                torques[i] = WheelTorques {
                    drive: input.responses.drive_torque[i],
                    brake: input.responses.brake_torque[i],
                    tire,
                    tire_derivative,
                };
            }
            update_direct_drive(input.wheel_ids, input.wheels, &torques, dt, wheel_states);
            true
        }
        (DrivetrainParams::Engine(p), DrivetrainState::Engine(s)) => {
            let cmd = input.commands.engine();
            let target = gear_target(p, cmd.target_gear, input.commands.throttle, dt, s);
            update_gearbox(&p.gearbox, target, dt, &mut s.gearbox);

            let mut inputs = [DriveWheelInput::default(); MAX_WHEELS];
            let mut omegas = [0.0; MAX_WHEELS];
            for &w in input.wheel_ids {
                let i = w as usize;
                let (tire, tire_derivative) = input.tire_torques[i];
                inputs[i] = DriveWheelInput { brake: input.responses.brake_torque[i], tire, tire_derivative };
                omegas[i] = wheel_states[i].rotation_speed;
            }

            let solve = EngineSolveInput {
                engine: &p.engine,
                accuracy: p.clutch.accuracy,
                throttle: input.commands.throttle,
                clutch_strength: input.responses.clutch_strength,
                gear_ratio: s.gearbox.ratio(&p.gearbox),
                differential: &s.differential,
                wheel_ids: input.wheel_ids,
                wheels: input.wheels,
                inputs: &inputs,
            };
            let outcome = solve_engine_drive(&solve, dt, &mut s.engine.rotation_speed, &mut omegas);
            s.clutch_slip.slip = outcome.clutch_slip;

            if let DifferentialParams::Tank(tank) = &p.differential {
                let mut moi = [0.0; MAX_WHEELS];
                for &w in input.wheel_ids {
                    moi[w as usize] = input.wheels[w as usize].moi;
                }
                equalize_tank_tracks(tank, &moi, &mut omegas);
            }

            for &w in input.wheel_ids {
                wheel_states[w as usize].rotation_speed = omegas[w as usize];
            }
            true
        }
        _ => {
            warn!("drivetrain params and state disagree; skipping drivetrain update");
            false
        }
    }
}
