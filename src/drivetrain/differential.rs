// ==============================================================================
// drivetrain/differential.rs — TORQUE SPLIT BETWEEN DRIVEN WHEELS
// ------------------------------------------------------------------------------
// Every differential reduces to two per-wheel weights consumed by the engine
// solve:
//   torque_ratios[i]     share of clutch torque delivered to wheel i
//   ave_speed_ratios[i]  weight of wheel i in the gearbox-side speed
//
// MultiWheel: fixed weights.
// FourWheel:  front/rear/centre biases that move toward a target by at most
//             rate·dt per step.
//               FL = c·f      FR = c·(1-f)
//               RL = (1-c)·r  RR = (1-c)·(1-r)
// Tank:       each track gets thrust_t / Σ|thrust|, split evenly over its
//             wheels. Wheels sharing a track are later forced to one speed.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::command::EngineTransmissionCommand;
use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;
use crate::types::{AxleDescription, PerWheel, Real, MAX_TANK_TRACKS, MAX_WHEELS};

/// Torque split of a four-wheel differential. All values in [0, 1].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FourWheelBias {
    /// Share of the front axle's torque going to the first front wheel.
    pub front: Real,
    /// Share of the rear axle's torque going to the first rear wheel.
    pub rear: Real,
    /// Share of total torque going to the front axle.
    pub center: Real,
}

impl Default for FourWheelBias {
    fn default() -> Self {
        Self { front: 0.5, rear: 0.5, center: 0.5 }
    }
}

impl FourWheelBias {
    pub fn is_valid(&self) -> bool {
        [self.front, self.rear, self.center].iter().all(|v| (0.0..=1.0).contains(v))
    }

    /// Moves each bias toward `target` by at most `max_delta`.
    pub fn step_toward(&self, target: &FourWheelBias, max_delta: Real) -> Self {
        let step = |from: Real, to: Real| from + (to - from).clamp(-max_delta, max_delta);
        Self {
            front: step(self.front, target.front),
            rear: step(self.rear, target.rear),
            center: step(self.center, target.center),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiWheelDifferentialParams {
    pub torque_ratios: PerWheel<Real>,
    pub ave_speed_ratios: PerWheel<Real>,
}

impl Default for MultiWheelDifferentialParams {
    fn default() -> Self {
        Self { torque_ratios: [0.0; MAX_WHEELS], ave_speed_ratios: [0.0; MAX_WHEELS] }
    }
}

impl MultiWheelDifferentialParams {
    /// Even split over `wheels`.
    pub fn even(wheels: &[u32]) -> Self {
        let mut p = Self::default();
        let share = 1.0 / wheels.len().max(1) as Real;
        for &w in wheels {
            p.torque_ratios[w as usize] = share;
            p.ave_speed_ratios[w as usize] = share;
        }
        p
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FourWheelDifferentialParams {
    pub front_wheels: [u32; 2],
    pub rear_wheels: [u32; 2],
    pub initial: FourWheelBias,
    pub target: FourWheelBias,
    /// Largest bias change per second.
    pub rate: Real,
}

impl Default for FourWheelDifferentialParams {
    fn default() -> Self {
        Self {
            front_wheels: [0, 1],
            rear_wheels: [2, 3],
            initial: FourWheelBias::default(),
            target: FourWheelBias::default(),
            rate: 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TankTrack {
    /// Index into the command's thrust array.
    pub thrust_index: u32,
    pub wheels: FixedVec<u32, MAX_WHEELS>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TankDifferentialParams {
    pub tracks: FixedVec<TankTrack, MAX_TANK_TRACKS>,
}

impl TankDifferentialParams {
    pub fn add_track(&mut self, thrust_index: u32, wheels: &[u32]) -> bool {
        let Some(wheels) = FixedVec::from_slice(wheels) else { return false };
        self.tracks.try_push(TankTrack { thrust_index, wheels })
    }

    pub fn track_of_wheel(&self, wheel: u32) -> Option<usize> {
        self.tracks.iter().position(|t| t.wheels.contains(&wheel))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DifferentialParams {
    MultiWheel(MultiWheelDifferentialParams),
    FourWheel(FourWheelDifferentialParams),
    Tank(TankDifferentialParams),
}

impl Default for DifferentialParams {
    fn default() -> Self {
        DifferentialParams::MultiWheel(MultiWheelDifferentialParams::default())
    }
}

impl DifferentialParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        let n = axle.nb_wheels();
        match self {
            DifferentialParams::MultiWheel(p) => {
                let bad = p.torque_ratios[..n]
                    .iter()
                    .chain(p.ave_speed_ratios[..n].iter())
                    .any(|r| !r.is_finite() || *r < 0.0);
                if bad {
                    return Err(VehicleError::invalid("MultiWheelDifferentialParams", "ratios must be finite and >= 0"));
                }
                let sum: Real = p.ave_speed_ratios[..n].iter().sum();
                if sum > 1e-6 && (sum - 1.0).abs() > 1e-3 {
                    return Err(VehicleError::invalid(
                        "MultiWheelDifferentialParams",
                        format!("ave_speed_ratios must sum to 1, got {sum}"),
                    ));
                }
            }
            DifferentialParams::FourWheel(p) => {
                let wheels = [p.front_wheels[0], p.front_wheels[1], p.rear_wheels[0], p.rear_wheels[1]];
                if wheels.iter().any(|&w| w as usize >= n) {
                    return Err(VehicleError::invalid("FourWheelDifferentialParams", "wheel id out of range"));
                }
                if (1..4).any(|i| wheels[..i].contains(&wheels[i])) {
                    return Err(VehicleError::invalid("FourWheelDifferentialParams", "wheel ids must be distinct"));
                }
                if !(p.initial.is_valid() && p.target.is_valid()) {
                    return Err(VehicleError::invalid("FourWheelDifferentialParams", "biases must be in [0, 1]"));
                }
                if !(p.rate.is_finite() && p.rate >= 0.0) {
                    return Err(VehicleError::invalid("FourWheelDifferentialParams", "rate must be >= 0"));
                }
            }
            DifferentialParams::Tank(p) => {
                if p.tracks.is_empty() {
                    return Err(VehicleError::invalid("TankDifferentialParams", "no tracks"));
                }
                let mut seen = [false; MAX_WHEELS];
                for t in p.tracks.iter() {
                    if t.thrust_index as usize >= MAX_TANK_TRACKS || t.wheels.is_empty() {
                        return Err(VehicleError::invalid("TankDifferentialParams", "bad thrust index or empty track"));
                    }
                    for &w in t.wheels.iter() {
                        if w as usize >= n || seen[w as usize] {
                            return Err(VehicleError::invalid(
                                "TankDifferentialParams",
                                format!("wheel {w} out of range or on two tracks"),
                            ));
                        }
                        seen[w as usize] = true;
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================
// State
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialState {
    pub torque_ratios: PerWheel<Real>,
    pub ave_speed_ratios: PerWheel<Real>,
    /// Wheels with a non-zero torque or speed weight.
    pub connected: FixedVec<u32, MAX_WHEELS>,
    /// Four-wheel only.
    pub bias: FourWheelBias,
}

impl Default for DifferentialState {
    fn default() -> Self {
        Self {
            torque_ratios: [0.0; MAX_WHEELS],
            ave_speed_ratios: [0.0; MAX_WHEELS],
            connected: FixedVec::new(),
            bias: FourWheelBias::default(),
        }
    }
}

impl DifferentialState {
    pub fn initial(params: &DifferentialParams) -> Self {
        let mut s = Self::default();
        if let DifferentialParams::FourWheel(p) = params {
            s.bias = p.initial;
        }
        s
    }

    fn refresh_connected(&mut self, nb_wheels: usize) {
        self.connected.clear();
        for w in 0..nb_wheels {
            if self.torque_ratios[w] != 0.0 || self.ave_speed_ratios[w] != 0.0 {
                self.connected.try_push(w as u32);
            }
        }
    }
}

pub fn update_differential(
    params: &DifferentialParams,
    command: &EngineTransmissionCommand,
    nb_wheels: usize,
    dt: Real,
    state: &mut DifferentialState,
) {
    state.torque_ratios = [0.0; MAX_WHEELS];
    state.ave_speed_ratios = [0.0; MAX_WHEELS];

    match params {
        DifferentialParams::MultiWheel(p) => {
            state.torque_ratios = p.torque_ratios;
            state.ave_speed_ratios = p.ave_speed_ratios;
        }
        DifferentialParams::FourWheel(p) => {
            let target = command.bias_targets.filter(FourWheelBias::is_valid).unwrap_or(p.target);
            state.bias = state.bias.step_toward(&target, p.rate * dt);
            let FourWheelBias { front, rear, center } = state.bias;
            let shares = [
                (p.front_wheels[0], center * front),
                (p.front_wheels[1], center * (1.0 - front)),
                (p.rear_wheels[0], (1.0 - center) * rear),
                (p.rear_wheels[1], (1.0 - center) * (1.0 - rear)),
            ];
            for (w, share) in shares {
                state.torque_ratios[w as usize] = share;
                state.ave_speed_ratios[w as usize] = share;
            }
        }
        DifferentialParams::Tank(p) => {
            let thrust = |t: &TankTrack| command.thrusts[t.thrust_index as usize];
            let total: Real = p.tracks.iter().map(|t| thrust(t).abs()).sum();
            if total > 1e-6 {
                for t in p.tracks.iter() {
                    let per_wheel = thrust(t) / total / t.wheels.len() as Real;
                    for &w in t.wheels.iter() {
                        state.torque_ratios[w as usize] = per_wheel;
                        state.ave_speed_ratios[w as usize] = per_wheel;
                    }
                }
            }
        }
    }
    state.refresh_connected(nb_wheels);
}

/// Tracks move as one: average the speed of each track's wheels, weighted by inertia.
pub fn equalize_tank_tracks(params: &TankDifferentialParams, moi: &PerWheel<Real>, omegas: &mut PerWheel<Real>) {
    for t in params.tracks.iter() {
        let (mut num, mut den) = (0.0, 0.0);
        for &w in t.wheels.iter() {
            num += moi[w as usize] * omegas[w as usize];
            den += moi[w as usize];
        }
        if den <= 0.0 {
            continue;
        }
        let omega = num / den;
        for &w in t.wheels.iter() {
            omegas[w as usize] = omega;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn four_wheel_ratios_sum_to_one() {
        let p = DifferentialParams::FourWheel(FourWheelDifferentialParams {
            initial: FourWheelBias { front: 0.3, rear: 0.6, center: 0.4 },
            target: FourWheelBias { front: 0.3, rear: 0.6, center: 0.4 },
            ..Default::default()
        });
        let mut s = DifferentialState::initial(&p);
        update_differential(&p, &EngineTransmissionCommand::default(), 4, 0.01, &mut s);
        assert_relative_eq!(s.torque_ratios[0], 0.12, epsilon = 1e-6);
        assert_relative_eq!(s.torque_ratios[1], 0.28, epsilon = 1e-6);
        assert_relative_eq!(s.torque_ratios[2], 0.36, epsilon = 1e-6);
        assert_relative_eq!(s.torque_ratios[3], 0.24, epsilon = 1e-6);
        assert_relative_eq!(s.torque_ratios.iter().sum::<Real>(), 1.0, epsilon = 1e-6);
        assert_eq!(&*s.connected, &[0, 1, 2, 3]);
    }

    #[test]
    fn bias_moves_at_most_rate_dt() {
        let params = FourWheelDifferentialParams { rate: 0.5, ..Default::default() };
        let p = DifferentialParams::FourWheel(params);
        let mut s = DifferentialState::initial(&p);
        let cmd = EngineTransmissionCommand {
            bias_targets: Some(FourWheelBias { front: 1.0, rear: 0.0, center: 0.8 }),
            ..Default::default()
        };
        update_differential(&p, &cmd, 4, 0.1, &mut s);
        assert_relative_eq!(s.bias.front, 0.55, epsilon = 1e-6);
        assert_relative_eq!(s.bias.rear, 0.45, epsilon = 1e-6);
        assert_relative_eq!(s.bias.center, 0.55, epsilon = 1e-6);
    }

    #[test]
    fn tank_splits_by_thrust() {
        let mut tank = TankDifferentialParams::default();
        assert!(tank.add_track(0, &[0, 2, 4]));
        assert!(tank.add_track(1, &[1, 3, 5]));
        let p = DifferentialParams::Tank(tank);
        let mut s = DifferentialState::initial(&p);
        let mut cmd = EngineTransmissionCommand::default();
        cmd.thrusts[0] = 1.0;
        cmd.thrusts[1] = -0.5;
        update_differential(&p, &cmd, 6, 0.01, &mut s);
        assert_relative_eq!(s.torque_ratios[0], 2.0 / 9.0, epsilon = 1e-6);
        assert_relative_eq!(s.torque_ratios[5], -1.0 / 9.0, epsilon = 1e-6);

        cmd.thrusts = [0.0; MAX_TANK_TRACKS];
        update_differential(&p, &cmd, 6, 0.01, &mut s);
        assert!(s.connected.is_empty());
    }

    #[test]
    fn tracks_share_one_speed() {
        let mut tank = TankDifferentialParams::default();
        assert!(tank.add_track(0, &[0, 1]));
        let mut moi = [1.0; MAX_WHEELS];
        moi[1] = 3.0;
        let mut omega = [0.0; MAX_WHEELS];
        omega[0] = 4.0;
        equalize_tank_tracks(&tank, &moi, &mut omega);
        assert_relative_eq!(omega[0], 1.0);
        assert_relative_eq!(omega[1], 1.0);
    }

    #[test]
    fn validation_rejects_overlapping_tracks() {
        let mut tank = TankDifferentialParams::default();
        tank.add_track(0, &[0, 1]);
        tank.add_track(1, &[1, 2]);
        let axle = AxleDescription::paired(2);
        assert!(DifferentialParams::Tank(tank).validate(&axle).is_err());
    }
}
