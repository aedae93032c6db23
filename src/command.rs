// ==============================================================================
// command.rs — DRIVER COMMANDS + NONLINEAR RESPONSE CURVES
// ==============================================================================
// Raw driver commands (throttle, brake/handbrake, steer, clutch, gear) are mapped
// to per-wheel physical responses (torque in N·m, steer angle in rad) through a
// response table keyed by (command value, longitudinal speed):
//
//   1) bracket the command value between two calibration rows
//   2) inside each row, bracket the speed and interpolate the response
//   3) interpolate the two row responses by command value
//   4) scale by max_response × per-wheel multiplier, clamp to ±max_response
//
// An empty table is a linear passthrough (response == command).
// Inputs outside the table clamp to the nearest row / speed sample.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::drivetrain::FourWheelBias;
use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;
use crate::types::{
    AxleDescription, Frame, PerWheel, Real, Scale, TransformAndScale, MAX_BRAKE_COMMANDS,
    MAX_COMMAND_VALUES, MAX_SPEED_RESPONSES, MAX_TANK_TRACKS, MAX_WHEELS,
};

// ============================================
// Nonlinear response table
// ============================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NonlinearResponse {
    /// Ascending command values, one row each.
    pub command_values: FixedVec<Real, MAX_COMMAND_VALUES>,
    /// First (speed, response) sample of each row.
    pub row_start: FixedVec<u16, MAX_COMMAND_VALUES>,
    /// Number of samples in each row.
    pub row_len: FixedVec<u16, MAX_COMMAND_VALUES>,
    pub speeds: FixedVec<Real, MAX_SPEED_RESPONSES>,
    pub responses: FixedVec<Real, MAX_SPEED_RESPONSES>,
}

impl NonlinearResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a calibration row. Fails (returning false, nothing changed) if the
    /// table is full, the row is empty, or values are not ascending.
    pub fn add_response(&mut self, command_value: Real, speed_responses: &[(Real, Real)]) -> bool {
        if speed_responses.is_empty()
            || self.command_values.is_full()
            || self.speeds.len() + speed_responses.len() > MAX_SPEED_RESPONSES
        {
            return false;
        }
        if let Some(&last) = self.command_values.last() {
            if command_value <= last {
                return false;
            }
        }
        if speed_responses.windows(2).any(|w| w[1].0 <= w[0].0) {
            return false;
        }

        let start = self.speeds.len() as u16;
        for &(speed, response) in speed_responses {
            self.speeds.try_push(speed);
            self.responses.try_push(response);
        }
        self.command_values.try_push(command_value);
        self.row_start.try_push(start);
        self.row_len.try_push(speed_responses.len() as u16);
        true
    }

    /// Checks the row layout `add_response` maintains; tables read from JSON
    /// bypass it.
    pub fn validate(&self) -> Result<()> {
        let bad = |reason: String| Err(VehicleError::invalid("NonlinearResponse", reason));
        let rows = self.command_values.len();
        if self.row_start.len() != rows || self.row_len.len() != rows {
            return bad(format!(
                "{rows} command values but {} row starts and {} row lengths",
                self.row_start.len(),
                self.row_len.len()
            ));
        }
        if self.speeds.len() != self.responses.len() {
            return bad(format!("{} speeds but {} responses", self.speeds.len(), self.responses.len()));
        }
        if self.command_values.iter().any(|v| !v.is_finite())
            || self.command_values.windows(2).any(|w| w[1] <= w[0])
        {
            return bad("command values must be finite and strictly ascending".into());
        }
        for row in 0..rows {
            let start = self.row_start[row] as usize;
            let len = self.row_len[row] as usize;
            if len == 0 || start + len > self.speeds.len() {
                return bad(format!("row {row} spans {start}..{} of {} samples", start + len, self.speeds.len()));
            }
            let speeds = &self.speeds[start..start + len];
            if speeds.iter().any(|s| !s.is_finite()) || speeds.windows(2).any(|w| w[1] <= w[0]) {
                return bad(format!("row {row} speeds must be finite and strictly ascending"));
            }
        }
        Ok(())
    }

    pub fn nb_command_values(&self) -> usize {
        self.command_values.len()
    }

    fn row_response(&self, row: usize, speed: Real) -> Real {
        let start = self.row_start[row] as usize;
        let len = self.row_len[row] as usize;
        let speeds = &self.speeds[start..start + len];
        let responses = &self.responses[start..start + len];

        if speed <= speeds[0] {
            return responses[0];
        }
        if speed >= speeds[len - 1] {
            return responses[len - 1];
        }
        let hi = speeds.iter().position(|&s| s >= speed).unwrap_or(len - 1);
        let lo = hi - 1;
        let t = (speed - speeds[lo]) / (speeds[hi] - speeds[lo]);
        responses[lo] + (responses[hi] - responses[lo]) * t
    }

    /// Normalized response for `command` at `speed`.
    pub fn compute(&self, command: Real, speed: Real) -> Real {
        let n = self.command_values.len();
        if n == 0 {
            return command;
        }
        let values = &self.command_values;
        if n == 1 || command <= values[0] {
            return self.row_response(0, speed);
        }
        if command >= values[n - 1] {
            return self.row_response(n - 1, speed);
        }
        let hi = values.iter().position(|&v| v >= command).unwrap_or(n - 1);
        let lo = hi - 1;
        let t = (command - values[lo]) / (values[hi] - values[lo]);
        let r0 = self.row_response(lo, speed);
        let r1 = self.row_response(hi, speed);
        r0 + (r1 - r0) * t
    }
}

// ============================================
// Response params (throttle / brake / steer)
// ============================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponseParams {
    pub nonlinear: NonlinearResponse,
    /// Per-wheel multiplier; 0 disconnects a wheel from this command.
    pub wheel_multipliers: PerWheel<Real>,
    /// Largest response any wheel can receive (N·m or rad).
    pub max_response: Real,
}

impl Default for CommandResponseParams {
    fn default() -> Self {
        Self {
            nonlinear: NonlinearResponse::default(),
            wheel_multipliers: [0.0; MAX_WHEELS],
            max_response: 0.0,
        }
    }
}

impl CommandResponseParams {
    /// Linear response on `wheels`, zero elsewhere.
    pub fn linear(max_response: Real, wheels: &[u32]) -> Self {
        let mut p = Self { max_response, ..Self::default() };
        for &w in wheels {
            p.wheel_multipliers[w as usize] = 1.0;
        }
        p
    }

    pub fn response(&self, command: Real, speed: Real, wheel: u32) -> Real {
        let normalized = self.nonlinear.compute(command, speed);
        let r = normalized * self.max_response * self.wheel_multipliers[wheel as usize];
        r.clamp(-self.max_response, self.max_response)
    }

    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        if !(self.max_response.is_finite() && self.max_response >= 0.0) {
            return Err(VehicleError::invalid(
                "CommandResponseParams",
                format!("max_response must be finite and >= 0, got {}", self.max_response),
            ));
        }
        self.nonlinear.validate()?;
        for w in axle.wheel_ids() {
            if !self.wheel_multipliers[w as usize].is_finite() {
                return Err(VehicleError::invalid(
                    "CommandResponseParams",
                    format!("wheel {w} multiplier is not finite"),
                ));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, axle: &AxleDescription) -> bool {
        self.validate(axle).is_ok()
    }
}

impl TransformAndScale for CommandResponseParams {
    /// Speed samples are lengths per second; responses are left to the caller.
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let ratio = src.ratio_to(trg);
        let mut out = *self;
        for s in out.nonlinear.speeds.iter_mut() {
            *s *= ratio;
        }
        out
    }
}

/// Clutch strength in N·m per rad/s of slip at a fully released pedal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClutchCommandResponseParams {
    pub max_response: Real,
}

impl Default for ClutchCommandResponseParams {
    fn default() -> Self {
        Self { max_response: 10.0 }
    }
}

impl ClutchCommandResponseParams {
    /// `pedal` is 0 (released, fully engaged) .. 1 (pressed, disengaged).
    pub fn strength(&self, pedal: Real) -> Real {
        self.max_response * (1.0 - pedal.clamp(0.0, 1.0))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_response.is_finite() && self.max_response >= 0.0) {
            return Err(VehicleError::invalid("ClutchCommandResponseParams", "max_response must be >= 0"));
        }
        Ok(())
    }
}

// ============================================
// Ackermann correction (front axle)
// ============================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AckermannParams {
    /// [wheel on the +lat side, wheel on the -lat side]
    pub wheel_ids: [u32; 2],
    pub wheel_base: Real,  // m
    pub track_width: Real, // m
    /// 0 = parallel steer, 1 = full Ackermann
    pub strength: Real,
}

impl AckermannParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        let n = axle.nb_wheels() as u32;
        if self.wheel_ids.iter().any(|&w| w >= n) || self.wheel_ids[0] == self.wheel_ids[1] {
            return Err(VehicleError::invalid("AckermannParams", "wheel ids must be distinct and in range"));
        }
        if !(self.wheel_base > 0.0 && self.track_width > 0.0) {
            return Err(VehicleError::invalid("AckermannParams", "wheel_base and track_width must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(VehicleError::invalid("AckermannParams", "strength must be in [0, 1]"));
        }
        Ok(())
    }
}

impl TransformAndScale for AckermannParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        Self { wheel_base: self.wheel_base * r, track_width: self.track_width * r, ..*self }
    }
}

/// Inner/outer wheel angles for a bicycle-model steer angle `base`.
/// Returns (+lat wheel, -lat wheel).
fn ackermann_angles(base: Real, wheel_base: Real, track: Real) -> (Real, Real) {
    let eps = 1e-4;
    if base.abs() < eps {
        return (0.0, 0.0);
    }

    let sign = base.signum();
    let a = base.abs();

    // Bicycle-model turning radius
    let r = wheel_base / a.tan();

    let r_in = (r - track * 0.5).max(0.01);
    let r_out = (r + track * 0.5).max(0.01);

    let inner = (wheel_base / r_in).atan() * sign;
    let outer = (wheel_base / r_out).atan() * sign;

    // Positive steer turns toward +lat, so the +lat wheel is on the inside.
    if sign > 0.0 { (inner, outer) } else { (outer, inner) }
}

// ============================================
// Commands
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectGear {
    Reverse,
    #[default]
    Neutral,
    Forward,
}

impl DirectGear {
    pub fn sign(self) -> Real {
        match self {
            DirectGear::Reverse => -1.0,
            DirectGear::Neutral => 0.0,
            DirectGear::Forward => 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearCommand {
    /// Let the autobox choose.
    #[default]
    Automatic,
    /// Index into the gearbox ratio table.
    Gear(u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineTransmissionCommand {
    /// 0 released (engaged) .. 1 pressed (disengaged)
    pub clutch: Real,
    pub target_gear: GearCommand,
    /// Tank thrust per controller, -1..1. Ignored by wheeled differentials.
    pub thrusts: [Real; MAX_TANK_TRACKS],
    /// Overrides the four-wheel differential's target biases when set.
    pub bias_targets: Option<FourWheelBias>,
}

impl Default for EngineTransmissionCommand {
    fn default() -> Self {
        Self {
            clutch: 0.0,
            target_gear: GearCommand::Automatic,
            thrusts: [0.0; MAX_TANK_TRACKS],
            bias_targets: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransmissionCommand {
    Direct(DirectGear),
    Engine(EngineTransmissionCommand),
}

impl Default for TransmissionCommand {
    fn default() -> Self {
        TransmissionCommand::Direct(DirectGear::Neutral)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commands {
    /// [brake, handbrake], 0..1
    pub brakes: [Real; MAX_BRAKE_COMMANDS],
    pub nb_brakes: u32,
    pub throttle: Real, // 0..1
    pub steer: Real,    // -1..1, positive toward +lat
    pub transmission: TransmissionCommand,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            brakes: [0.0; MAX_BRAKE_COMMANDS],
            nb_brakes: MAX_BRAKE_COMMANDS as u32,
            throttle: 0.0,
            steer: 0.0,
            transmission: TransmissionCommand::default(),
        }
    }
}

impl Commands {
    /// Clamps every analog channel into its legal range.
    pub fn sanitized(mut self) -> Self {
        self.throttle = self.throttle.clamp(0.0, 1.0);
        self.steer = self.steer.clamp(-1.0, 1.0);
        self.nb_brakes = self.nb_brakes.min(MAX_BRAKE_COMMANDS as u32);
        for b in self.brakes.iter_mut() {
            *b = b.clamp(0.0, 1.0);
        }
        if let TransmissionCommand::Engine(ref mut e) = self.transmission {
            e.clutch = e.clutch.clamp(0.0, 1.0);
            for t in e.thrusts.iter_mut() {
                *t = t.clamp(-1.0, 1.0);
            }
        }
        self
    }

    pub fn direct_gear(&self) -> DirectGear {
        match self.transmission {
            TransmissionCommand::Direct(g) => g,
            TransmissionCommand::Engine(_) => DirectGear::Neutral,
        }
    }

    pub fn engine(&self) -> EngineTransmissionCommand {
        match self.transmission {
            TransmissionCommand::Engine(e) => e,
            TransmissionCommand::Direct(_) => EngineTransmissionCommand::default(),
        }
    }
}

// ============================================
// Per-wheel response state
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelActuationState {
    pub brake_applied: bool,
    pub drive_applied: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponseState {
    pub brake_torque: PerWheel<Real>,
    pub steer_angle: PerWheel<Real>,
    /// Direct drive only: wheel drive torque.
    pub drive_torque: PerWheel<Real>,
    /// Engine drive only: clutch strength (N·m·s/rad).
    pub clutch_strength: Real,
    pub actuation: PerWheel<WheelActuationState>,
}

impl Default for CommandResponseState {
    fn default() -> Self {
        Self {
            brake_torque: [0.0; MAX_WHEELS],
            steer_angle: [0.0; MAX_WHEELS],
            drive_torque: [0.0; MAX_WHEELS],
            clutch_strength: 0.0,
            actuation: [WheelActuationState::default(); MAX_WHEELS],
        }
    }
}

/// Sum of all brake channels on `wheel`. Never negative.
pub fn brake_response(
    cmd: &Commands,
    speed: Real,
    wheel: u32,
    params: &[CommandResponseParams; MAX_BRAKE_COMMANDS],
) -> Real {
    let n = (cmd.nb_brakes as usize).min(MAX_BRAKE_COMMANDS);
    let sum: Real = (0..n).map(|i| params[i].response(cmd.brakes[i], speed, wheel)).sum();
    sum.max(0.0)
}

/// Direct-drive wheel torque: throttle response with the gear flipping the sign.
pub fn direct_throttle_response(
    throttle: Real,
    gear: DirectGear,
    speed: Real,
    wheel: u32,
    params: &CommandResponseParams,
) -> Real {
    params.response(throttle, speed, wheel) * gear.sign()
}

/// Steer angles for every wheel, with Ackermann correction applied to the listed pairs.
pub fn steer_response(
    steer: Real,
    speed: Real,
    params: &CommandResponseParams,
    ackermann: &[AckermannParams],
    axle: &AxleDescription,
    out: &mut PerWheel<Real>,
) {
    for w in axle.wheel_ids() {
        out[w as usize] = params.response(steer, speed, w);
    }

    for ack in ackermann {
        let [a, b] = ack.wheel_ids;
        // Bicycle-model angle is the mean of the pair's uncorrected responses.
        let base = 0.5 * (out[a as usize] + out[b as usize]);
        let (acker_a, acker_b) = ackermann_angles(base, ack.wheel_base, ack.track_width);
        out[a as usize] = (1.0 - ack.strength) * base + ack.strength * acker_a;
        out[b as usize] = (1.0 - ack.strength) * base + ack.strength * acker_b;
    }
}
