// ==============================================================================
// drivetrain/engine.rs — ENGINE, CLUTCH, GEARBOX, AUTOBOX + COUPLED SOLVE
// ------------------------------------------------------------------------------
// Unknowns: engine speed ω_e and each wheel speed ω_i (next substep).
//
// The clutch couples engine and wheels through the gearbox:
//   clutch slip   s = ω_e - G Σ a_j ω_j          (a = ave_speed_ratios)
//   clutch torque T_c = K s                      (K = clutch strength)
//   wheel i gets  G t_i T_c                      (t = torque_ratios)
//
// Implicit Euler gives one linear row per body:
//   engine: (I_e/dt + D_e + K) ω_e - K G Σ a_j ω_j           = I_e ω_e0/dt + T_eng
//   wheel:  -G t_i K ω_e + (I_i/dt + D_i) ω_i + G² t_i K Σ a_j ω_j
//                                                            = I_i ω_i0/dt + T_tire_i
// D_i collects wheel damping, brake-as-damping and the tire slope.
//
// Solved with a fixed-size LU (no heap). In neutral or mid-shift G = 0 and the
// rows decouple; clutch slip is reported as 0.
//
// Accuracy modes:
//   Estimate  - engine torque evaluated once at the current engine speed
//   Iterative - re-evaluate the torque curve at the new engine speed and
//               resolve until the speed change drops below tolerance
// ==============================================================================

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{ClutchCommandResponseParams, GearCommand};
use crate::drivetrain::differential::{DifferentialParams, DifferentialState};
use crate::error::{Result, VehicleError};
use crate::fixed::{FixedVec, LookupTable};
use crate::types::{
    AxleDescription, Frame, PerWheel, Real, Scale, TransformAndScale, MAX_GEARS, MAX_TORQUE_CURVE_POINTS,
    MAX_WHEELS,
};
use crate::wheel::{brake_damping, WheelParams};

const SYSTEM_SIZE: usize = MAX_WHEELS + 1;
type System = SMatrix<Real, SYSTEM_SIZE, SYSTEM_SIZE>;
type SystemVec = SVector<Real, SYSTEM_SIZE>;

// ============================================
// Params
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Normalized speed (ω / max_omega) -> normalized torque.
    pub torque_curve: LookupTable<Real, MAX_TORQUE_CURVE_POINTS>,
    pub peak_torque: Real, // N·m
    pub moi: Real,         // kg·m²
    pub idle_omega: Real,  // rad/s
    pub max_omega: Real,   // rad/s
    pub damping_rate_full_throttle: Real,
    pub damping_rate_zero_throttle_clutch_engaged: Real,
    pub damping_rate_zero_throttle_clutch_disengaged: Real,
}

impl Default for EngineParams {
    fn default() -> Self {
        let mut torque_curve = LookupTable::new();
        torque_curve.add_pair(0.0, 0.8);
        torque_curve.add_pair(0.33, 1.0);
        torque_curve.add_pair(1.0, 0.8);
        Self {
            torque_curve,
            peak_torque: 500.0,
            moi: 1.0,
            idle_omega: 0.0,
            max_omega: 600.0,
            damping_rate_full_throttle: 0.15,
            damping_rate_zero_throttle_clutch_engaged: 2.0,
            damping_rate_zero_throttle_clutch_disengaged: 0.35,
        }
    }
}

impl EngineParams {
    /// Drive torque at `omega` for `throttle`.
    pub fn torque(&self, omega: Real, throttle: Real) -> Real {
        let x = (omega / self.max_omega).clamp(0.0, 1.0);
        self.peak_torque * self.torque_curve.interpolate_or(x, 1.0) * throttle
    }

    /// Blends full-throttle damping with the zero-throttle value for the clutch state.
    pub fn damping_rate(&self, throttle: Real, clutch_engaged: bool) -> Real {
        let zero = if clutch_engaged {
            self.damping_rate_zero_throttle_clutch_engaged
        } else {
            self.damping_rate_zero_throttle_clutch_disengaged
        };
        throttle * self.damping_rate_full_throttle + (1.0 - throttle) * zero
    }

    pub fn validate(&self) -> Result<()> {
        let pos = |v: Real| v.is_finite() && v > 0.0;
        let non_neg = |v: Real| v.is_finite() && v >= 0.0;
        if !(pos(self.moi) && pos(self.max_omega) && non_neg(self.peak_torque)) {
            return Err(VehicleError::invalid("EngineParams", "moi and max_omega must be > 0, peak_torque >= 0"));
        }
        if !(non_neg(self.idle_omega) && self.idle_omega <= self.max_omega) {
            return Err(VehicleError::invalid("EngineParams", "idle_omega must lie in [0, max_omega]"));
        }
        if ![
            self.damping_rate_full_throttle,
            self.damping_rate_zero_throttle_clutch_engaged,
            self.damping_rate_zero_throttle_clutch_disengaged,
        ]
        .into_iter()
        .all(non_neg)
        {
            return Err(VehicleError::invalid("EngineParams", "damping rates must be >= 0"));
        }
        self.torque_curve.validate("EngineParams")
    }
}

impl TransformAndScale for EngineParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        // Torque and inertia carry length² (N·m, kg·m²).
        let r2 = src.ratio_to(trg).powi(2);
        Self {
            peak_torque: self.peak_torque * r2,
            moi: self.moi * r2,
            damping_rate_full_throttle: self.damping_rate_full_throttle * r2,
            damping_rate_zero_throttle_clutch_engaged: self.damping_rate_zero_throttle_clutch_engaged * r2,
            damping_rate_zero_throttle_clutch_disengaged: self.damping_rate_zero_throttle_clutch_disengaged * r2,
            ..*self
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GearboxParams {
    /// Index of neutral; reverse gears come before it, forward gears after.
    pub neutral_gear: u32,
    pub ratios: FixedVec<Real, MAX_GEARS>,
    pub final_ratio: Real,
    /// s
    pub switch_time: Real,
}

impl Default for GearboxParams {
    fn default() -> Self {
        let ratios = FixedVec::from_slice(&[-4.0, 0.0, 4.0, 2.0, 1.5, 1.1, 1.0]).unwrap_or_default();
        Self { neutral_gear: 1, ratios, final_ratio: 4.0, switch_time: 0.5 }
    }
}

impl GearboxParams {
    pub fn nb_gears(&self) -> u32 {
        self.ratios.len() as u32
    }

    pub fn first_gear(&self) -> u32 {
        self.neutral_gear + 1
    }

    /// Engine-to-wheel ratio including the final drive.
    pub fn ratio(&self, gear: u32) -> Real {
        self.ratios.get(gear as usize).copied().unwrap_or(0.0) * self.final_ratio
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.ratios.len();
        let neutral = self.neutral_gear as usize;
        if neutral >= n {
            return Err(VehicleError::invalid("GearboxParams", "neutral_gear out of range"));
        }
        if self.ratios[neutral] != 0.0 {
            return Err(VehicleError::invalid("GearboxParams", "neutral ratio must be 0"));
        }
        if self.ratios[..neutral].iter().any(|&r| r >= 0.0) {
            return Err(VehicleError::invalid("GearboxParams", "reverse ratios must be < 0"));
        }
        if self.ratios[neutral + 1..].iter().any(|&r| r <= 0.0) {
            return Err(VehicleError::invalid("GearboxParams", "forward ratios must be > 0"));
        }
        if !(self.final_ratio > 0.0 && self.switch_time >= 0.0) {
            return Err(VehicleError::invalid("GearboxParams", "final_ratio must be > 0, switch_time >= 0"));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoboxParams {
    /// Shift up when ω_e / max_omega exceeds this (indexed by current gear).
    pub up_ratios: [Real; MAX_GEARS],
    /// Shift down when ω_e / max_omega drops below this (indexed by current gear).
    pub down_ratios: [Real; MAX_GEARS],
    /// s between automatic shifts
    pub latency: Real,
}

impl Default for AutoboxParams {
    fn default() -> Self {
        Self { up_ratios: [0.65; MAX_GEARS], down_ratios: [0.5; MAX_GEARS], latency: 2.0 }
    }
}

impl AutoboxParams {
    pub fn validate(&self, gearbox: &GearboxParams) -> Result<()> {
        let first = gearbox.first_gear() as usize;
        for g in first..gearbox.ratios.len() {
            if self.down_ratios[g] >= self.up_ratios[g] {
                return Err(VehicleError::invalid(
                    "AutoboxParams",
                    format!("gear {g}: down ratio must be below up ratio"),
                ));
            }
        }
        if !(self.latency >= 0.0) {
            return Err(VehicleError::invalid("AutoboxParams", "latency must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClutchAccuracyMode {
    Estimate,
    Iterative { max_iterations: u32, tolerance: Real },
}

impl Default for ClutchAccuracyMode {
    fn default() -> Self {
        ClutchAccuracyMode::Estimate
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClutchParams {
    pub accuracy: ClutchAccuracyMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineDriveParams {
    pub engine: EngineParams,
    pub gearbox: GearboxParams,
    pub autobox: Option<AutoboxParams>,
    pub clutch: ClutchParams,
    pub clutch_response: ClutchCommandResponseParams,
    pub differential: DifferentialParams,
}

impl EngineDriveParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        self.engine.validate()?;
        self.gearbox.validate()?;
        if let Some(a) = &self.autobox {
            a.validate(&self.gearbox)?;
        }
        if let ClutchAccuracyMode::Iterative { max_iterations, tolerance } = self.clutch.accuracy {
            if max_iterations == 0 || !(tolerance > 0.0) {
                return Err(VehicleError::invalid("ClutchParams", "iterative mode needs max_iterations > 0 and tolerance > 0"));
            }
        }
        self.clutch_response.validate()?;
        self.differential.validate(axle)
    }
}

impl TransformAndScale for EngineDriveParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r2 = src.ratio_to(trg).powi(2);
        Self {
            engine: self.engine.transform_and_scale(src_frame, trg_frame, src, trg),
            clutch_response: ClutchCommandResponseParams { max_response: self.clutch_response.max_response * r2 },
            ..*self
        }
    }
}

// ============================================
// State
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub rotation_speed: Real,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GearboxState {
    Engaged { gear: u32 },
    Shifting { from: u32, to: u32, elapsed: Real },
}

impl Default for GearboxState {
    fn default() -> Self {
        GearboxState::Engaged { gear: 1 }
    }
}

impl GearboxState {
    pub fn neutral(params: &GearboxParams) -> Self {
        GearboxState::Engaged { gear: params.neutral_gear }
    }

    /// Gear whose ratio currently applies, or `None` mid-shift.
    pub fn engaged_gear(&self) -> Option<u32> {
        match *self {
            GearboxState::Engaged { gear } => Some(gear),
            GearboxState::Shifting { .. } => None,
        }
    }

    /// The gear being left, or held.
    pub fn current_gear(&self) -> u32 {
        match *self {
            GearboxState::Engaged { gear } => gear,
            GearboxState::Shifting { from, .. } => from,
        }
    }

    pub fn target_gear(&self) -> u32 {
        match *self {
            GearboxState::Engaged { gear } => gear,
            GearboxState::Shifting { to, .. } => to,
        }
    }

    pub fn ratio(&self, params: &GearboxParams) -> Real {
        self.engaged_gear().map_or(0.0, |g| params.ratio(g))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoboxState {
    pub time_since_last_shift: Real,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClutchSlipState {
    /// ω_e - G Σ a_j ω_j
    pub slip: Real,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineDriveState {
    pub engine: EngineState,
    pub gearbox: GearboxState,
    pub autobox: AutoboxState,
    pub clutch_slip: ClutchSlipState,
    pub differential: DifferentialState,
}

impl EngineDriveState {
    pub fn initial(params: &EngineDriveParams) -> Self {
        Self {
            engine: EngineState { rotation_speed: params.engine.idle_omega },
            gearbox: GearboxState::neutral(&params.gearbox),
            autobox: AutoboxState::default(),
            clutch_slip: ClutchSlipState::default(),
            differential: DifferentialState::initial(&params.differential),
        }
    }
}

// ============================================
// Gear selection
// ============================================

/// Gear the autobox wants, if any. Resets its latency timer when it picks one.
pub fn update_autobox(
    params: &AutoboxParams,
    gearbox: &GearboxParams,
    engine: &EngineParams,
    engine_omega: Real,
    throttle: Real,
    gearbox_state: &GearboxState,
    state: &mut AutoboxState,
    dt: Real,
) -> Option<u32> {
    let GearboxState::Engaged { gear } = *gearbox_state else {
        state.time_since_last_shift = 0.0;
        return None;
    };
    state.time_since_last_shift += dt;

    let neutral = gearbox.neutral_gear;
    let target = if gear == neutral {
        // Leaving neutral is not subject to latency.
        (throttle > 0.0).then(|| gearbox.first_gear())
    } else if gear < neutral || state.time_since_last_shift < params.latency {
        None
    } else {
        let ratio = engine_omega / engine.max_omega;
        let g = gear as usize;
        if ratio > params.up_ratios[g] && gear + 1 < gearbox.nb_gears() {
            Some(gear + 1)
        } else if ratio < params.down_ratios[g] && gear > gearbox.first_gear() {
            Some(gear - 1)
        } else {
            None
        }
    };

    if target.is_some() {
        state.time_since_last_shift = 0.0;
    }
    target
}

/// Starts, advances or completes a shift. A shift in progress ignores new
/// targets. The substep that starts a shift counts toward `switch_time`.
pub fn update_gearbox(params: &GearboxParams, target: Option<u32>, dt: Real, state: &mut GearboxState) {
    let (from, to, elapsed) = match *state {
        GearboxState::Engaged { gear } => match target.filter(|&t| t != gear && t < params.nb_gears()) {
            Some(to) => {
                debug!(from = gear, to, "gear shift started");
                (gear, to, dt)
            }
            None => return,
        },
        GearboxState::Shifting { from, to, elapsed } => (from, to, elapsed + dt),
    };
    if elapsed >= params.switch_time {
        debug!(from, to, "gear shift complete");
        *state = GearboxState::Engaged { gear: to };
    } else {
        *state = GearboxState::Shifting { from, to, elapsed };
    }
}

/// Resolves the commanded gear into a shift target.
pub fn gear_target(
    params: &EngineDriveParams,
    command: GearCommand,
    throttle: Real,
    dt: Real,
    state: &mut EngineDriveState,
) -> Option<u32> {
    match command {
        GearCommand::Gear(g) => Some(g),
        GearCommand::Automatic => params.autobox.as_ref().and_then(|a| {
            update_autobox(
                a,
                &params.gearbox,
                &params.engine,
                state.engine.rotation_speed,
                throttle,
                &state.gearbox,
                &mut state.autobox,
                dt,
            )
        }),
    }
}

// ============================================
// Coupled solve
// ============================================

/// Per-wheel torques entering the coupled solve.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DriveWheelInput {
    pub brake: Real,
    pub tire: Real,
    /// d(tire)/dω, <= 0
    pub tire_derivative: Real,
}

pub struct EngineSolveInput<'a> {
    pub engine: &'a EngineParams,
    pub accuracy: ClutchAccuracyMode,
    pub throttle: Real,
    /// Clutch strength K (N·m per rad/s).
    pub clutch_strength: Real,
    /// Total gear ratio G; 0 in neutral or mid-shift.
    pub gear_ratio: Real,
    pub differential: &'a DifferentialState,
    pub wheel_ids: &'a [u32],
    pub wheels: &'a PerWheel<WheelParams>,
    pub inputs: &'a PerWheel<DriveWheelInput>,
}

/// What the coupled solve reports besides the new speeds.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EngineSolveOutcome {
    pub clutch_slip: Real,
    /// Linearized systems solved; 1 for `Estimate`.
    pub iterations: u32,
    /// |T(ω solved) - T(ω the torque was taken at)| for the last system.
    pub torque_residual: Real,
}

/// Advances engine and wheel speeds by `dt`.
pub fn solve_engine_drive(
    input: &EngineSolveInput<'_>,
    dt: Real,
    engine_omega: &mut Real,
    wheel_omegas: &mut PerWheel<Real>,
) -> EngineSolveOutcome {
    let g = input.gear_ratio;
    let k = if g != 0.0 { input.clutch_strength.max(0.0) } else { 0.0 };
    let engaged = k > 0.0;
    let engine = input.engine;
    let damping = engine.damping_rate(input.throttle, engaged);

    let we0 = *engine_omega;
    let w0 = *wheel_omegas;

    let (max_iterations, tolerance) = match input.accuracy {
        ClutchAccuracyMode::Estimate => (1, Real::INFINITY),
        ClutchAccuracyMode::Iterative { max_iterations, tolerance } => (max_iterations.max(1), tolerance),
    };

    let mut solution = None;
    let mut torque_at = we0;
    let mut iterations = 0;
    let mut torque_residual = 0.0;
    while iterations < max_iterations {
        let t_eng = engine.torque(torque_at, input.throttle);
        let Some(x) = solve_system(input, k, g, damping, t_eng, we0, &w0, dt) else { break };
        iterations += 1;
        torque_residual = (engine.torque(x[0], input.throttle) - t_eng).abs();
        let converged = (x[0] - torque_at).abs() < tolerance;
        torque_at = x[0];
        solution = Some(x);
        if converged {
            if iterations > 1 {
                debug!(iterations, "clutch solve converged");
            }
            break;
        }
    }

    let Some(x) = solution else {
        // Singular system: keep previous speeds.
        return EngineSolveOutcome::default();
    };

    *engine_omega = x[0].clamp(engine.idle_omega, engine.max_omega);
    for (row, &w) in input.wheel_ids.iter().enumerate() {
        let i = w as usize;
        let brake = input.inputs[i].brake;
        let omega = x[row + 1];
        // Brakes stop a wheel, they never turn it around.
        wheel_omegas[i] = if brake > 0.0 && w0[i] != 0.0 && omega * w0[i] < 0.0 && !engaged { 0.0 } else { omega };
    }

    let clutch_slip = if engaged {
        let gearbox_speed: Real =
            input.wheel_ids.iter().map(|&w| input.differential.ave_speed_ratios[w as usize] * wheel_omegas[w as usize]).sum();
        *engine_omega - g * gearbox_speed
    } else {
        0.0
    };
    EngineSolveOutcome { clutch_slip, iterations, torque_residual }
}

#[allow(clippy::too_many_arguments)]
fn solve_system(
    input: &EngineSolveInput<'_>,
    k: Real,
    g: Real,
    engine_damping: Real,
    engine_torque: Real,
    we0: Real,
    w0: &PerWheel<Real>,
    dt: Real,
) -> Option<SystemVec> {
    let mut a = System::identity();
    let mut b = SystemVec::zeros();
    let ratios = input.differential;

    let ie = input.engine.moi / dt;
    a[(0, 0)] = ie + engine_damping + k;
    b[0] = ie * we0 + engine_torque;

    for (row, &w) in input.wheel_ids.iter().enumerate() {
        let i = w as usize;
        let r = row + 1;
        let a_i = ratios.ave_speed_ratios[i];
        let t_i = ratios.torque_ratios[i];

        // Engine row couples to every connected wheel through the speed average.
        a[(0, r)] = -k * g * a_i;

        let wheel = &input.wheels[i];
        let drive = &input.inputs[i];
        let iw = wheel.moi / dt;
        let d_i = wheel.damping_rate + brake_damping(drive.brake, w0[i]) - drive.tire_derivative;

        a[(r, 0)] = -g * t_i * k;
        a[(r, r)] = iw + d_i;
        for (col, &wj) in input.wheel_ids.iter().enumerate() {
            a[(r, col + 1)] += g * g * t_i * k * ratios.ave_speed_ratios[wj as usize];
        }
        b[r] = iw * w0[i] + drive.tire - drive.tire_derivative * w0[i];
    }

    a.lu().solve(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivetrain::differential::{update_differential, MultiWheelDifferentialParams};
    use crate::command::EngineTransmissionCommand;
    use approx::assert_relative_eq;

    fn diff(wheels: &[u32]) -> DifferentialState {
        let p = DifferentialParams::MultiWheel(MultiWheelDifferentialParams::even(wheels));
        let mut s = DifferentialState::initial(&p);
        update_differential(&p, &EngineTransmissionCommand::default(), 4, 0.01, &mut s);
        s
    }

    #[test]
    fn shift_takes_switch_time() {
        let p = GearboxParams { switch_time: 0.25, ..Default::default() };
        let mut s = GearboxState::neutral(&p);
        update_gearbox(&p, Some(2), 0.1, &mut s);
        assert_eq!(s, GearboxState::Shifting { from: 1, to: 2, elapsed: 0.1 });
        assert_relative_eq!(s.ratio(&p), 0.0);
        update_gearbox(&p, Some(4), 0.1, &mut s);
        assert!(s.engaged_gear().is_none(), "still shifting after 0.2 s");
        update_gearbox(&p, None, 0.1, &mut s);
        assert_eq!(s.engaged_gear(), Some(2), "new command ignored mid-shift");
        assert_relative_eq!(s.ratio(&p), 16.0);
    }

    #[test]
    fn shift_shorter_than_a_step_completes_at_once() {
        let p = GearboxParams { switch_time: 0.05, ..Default::default() };
        let mut s = GearboxState::neutral(&p);
        update_gearbox(&p, Some(3), 0.1, &mut s);
        assert_eq!(s, GearboxState::Engaged { gear: 3 });
        update_gearbox(&p, Some(3), 0.1, &mut s);
        assert_eq!(s, GearboxState::Engaged { gear: 3 });
    }

    #[test]
    fn autobox_leaves_neutral_on_throttle_and_respects_latency() {
        let gb = GearboxParams::default();
        let ab = AutoboxParams { latency: 1.0, ..Default::default() };
        let e = EngineParams::default();
        let mut st = AutoboxState::default();
        let neutral = GearboxState::neutral(&gb);
        assert_eq!(update_autobox(&ab, &gb, &e, 100.0, 0.0, &neutral, &mut st, 0.1), None);
        assert_eq!(update_autobox(&ab, &gb, &e, 100.0, 0.5, &neutral, &mut st, 0.1), Some(2));

        let first = GearboxState::Engaged { gear: 2 };
        assert_eq!(update_autobox(&ab, &gb, &e, 590.0, 1.0, &first, &mut st, 0.5), None);
        assert_eq!(update_autobox(&ab, &gb, &e, 590.0, 1.0, &first, &mut st, 0.6), Some(3));
        let third = GearboxState::Engaged { gear: 3 };
        st.time_since_last_shift = 5.0;
        assert_eq!(update_autobox(&ab, &gb, &e, 100.0, 1.0, &third, &mut st, 0.1), Some(2));
    }

    #[test]
    fn neutral_engine_revs_freely() {
        let engine = EngineParams::default();
        let wheels = [WheelParams::default(); MAX_WHEELS];
        let inputs = [DriveWheelInput::default(); MAX_WHEELS];
        let d = diff(&[2, 3]);
        let ids = [0, 1, 2, 3];
        let input = EngineSolveInput {
            engine: &engine,
            accuracy: ClutchAccuracyMode::Estimate,
            throttle: 1.0,
            clutch_strength: 10.0,
            gear_ratio: 0.0,
            differential: &d,
            wheel_ids: &ids,
            wheels: &wheels,
            inputs: &inputs,
        };
        let mut we = 100.0;
        let mut w = [0.0; MAX_WHEELS];
        let slip = solve_engine_drive(&input, 0.01, &mut we, &mut w).clutch_slip;
        assert!(we > 100.0);
        assert_relative_eq!(slip, 0.0);
        assert_relative_eq!(w[2], 0.0);
    }

    #[test]
    fn engaged_clutch_transfers_torque_to_driven_wheels() {
        let engine = EngineParams::default();
        let wheels = [WheelParams::default(); MAX_WHEELS];
        let inputs = [DriveWheelInput::default(); MAX_WHEELS];
        let d = diff(&[2, 3]);
        let ids = [0, 1, 2, 3];
        let input = EngineSolveInput {
            engine: &engine,
            accuracy: ClutchAccuracyMode::Iterative { max_iterations: 8, tolerance: 1e-3 },
            throttle: 1.0,
            clutch_strength: 10.0,
            gear_ratio: 16.0,
            differential: &d,
            wheel_ids: &ids,
            wheels: &wheels,
            inputs: &inputs,
        };
        let mut we = 200.0;
        let mut w = [0.0; MAX_WHEELS];
        let slip = solve_engine_drive(&input, 0.01, &mut we, &mut w).clutch_slip;
        assert!(w[2] > 0.0 && w[3] > 0.0);
        assert_relative_eq!(w[2], w[3], epsilon = 1e-4);
        assert_relative_eq!(w[0], 0.0);
        assert!(slip > 0.0 && slip < 200.0);
    }

    fn free_revving(accuracy: ClutchAccuracyMode, engine: &EngineParams, we: &mut Real) -> EngineSolveOutcome {
        let wheels = [WheelParams::default(); MAX_WHEELS];
        let inputs = [DriveWheelInput::default(); MAX_WHEELS];
        let d = diff(&[2, 3]);
        let input = EngineSolveInput {
            engine,
            accuracy,
            throttle: 1.0,
            clutch_strength: 10.0,
            gear_ratio: 0.0,
            differential: &d,
            wheel_ids: &[0, 1, 2, 3],
            wheels: &wheels,
            inputs: &inputs,
        };
        let mut w = [0.0; MAX_WHEELS];
        solve_engine_drive(&input, 0.1, we, &mut w)
    }

    #[test]
    fn iterative_clutch_solve_tracks_the_torque_curve() {
        // Long step starting on the falling side of the curve: torque taken at
        // the old speed overstates what the engine makes at the new one.
        let engine = EngineParams::default();

        let mut estimate_omega = 200.0;
        let estimate = free_revving(ClutchAccuracyMode::Estimate, &engine, &mut estimate_omega);
        assert_eq!(estimate.iterations, 1);
        assert!(estimate.torque_residual > 1.0, "residual {}", estimate.torque_residual);

        let mut iterative_omega = 200.0;
        let iterative = free_revving(
            ClutchAccuracyMode::Iterative { max_iterations: 50, tolerance: 1e-3 },
            &engine,
            &mut iterative_omega,
        );
        assert!(iterative.iterations > 1 && iterative.iterations < 50);
        assert!(iterative.torque_residual < 0.1 * estimate.torque_residual);
        assert!(iterative_omega < estimate_omega);

        let mut capped_omega = 200.0;
        let capped = free_revving(
            ClutchAccuracyMode::Iterative { max_iterations: 3, tolerance: 1e-9 },
            &engine,
            &mut capped_omega,
        );
        assert_eq!(capped.iterations, 3);

        let mut single_omega = 200.0;
        let single = free_revving(
            ClutchAccuracyMode::Iterative { max_iterations: 1, tolerance: 1e-9 },
            &engine,
            &mut single_omega,
        );
        assert_eq!(single.iterations, 1);
        assert_relative_eq!(single_omega, estimate_omega);
        assert_relative_eq!(single.torque_residual, estimate.torque_residual);
    }

    #[test]
    fn gearbox_validation() {
        assert!(GearboxParams::default().validate().is_ok());
        let mut bad = GearboxParams::default();
        bad.ratios[0] = 1.0;
        assert!(bad.validate().is_err());
    }
}
