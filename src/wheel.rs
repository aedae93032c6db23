//! Wheel rigid-body params/state and the single-wheel spin integrator.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};
use crate::types::{Frame, Real, Scale, TransformAndScale, sign};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelParams {
    pub radius: Real,     // m
    pub half_width: Real, // m
    pub mass: Real,       // kg
    pub moi: Real,        // kg·m²
    /// Spin damping (N·m per rad/s).
    pub damping_rate: Real,
}

impl Default for WheelParams {
    fn default() -> Self {
        Self { radius: 0.35, half_width: 0.12, mass: 20.0, moi: 1.2, damping_rate: 0.25 }
    }
}

impl WheelParams {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: Real| v.is_finite() && v > 0.0;
        if !(positive(self.radius) && positive(self.half_width) && positive(self.mass) && positive(self.moi)) {
            return Err(VehicleError::invalid("WheelParams", "radius, half_width, mass and moi must be > 0"));
        }
        if !(self.damping_rate.is_finite() && self.damping_rate >= 0.0) {
            return Err(VehicleError::invalid("WheelParams", "damping_rate must be >= 0"));
        }
        Ok(())
    }
}

impl TransformAndScale for WheelParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        Self {
            radius: self.radius * r,
            half_width: self.half_width * r,
            mass: self.mass,
            moi: self.moi * r * r,
            damping_rate: self.damping_rate * r * r,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelRigidBody1dState {
    /// rad/s, positive rolls the wheel toward +lng
    pub rotation_speed: Real,
    /// Speed used to advance `rotation_angle`; equals rolling speed for slow, unactuated wheels.
    pub corrected_rotation_speed: Real,
    /// rad, wrapped to (-2π, 2π)
    pub rotation_angle: Real,
}

/// Spin-axis torques acting on one wheel for a single substep.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WheelTorques {
    pub drive: Real,
    /// Magnitude; always opposes rotation.
    pub brake: Real,
    pub tire: Real,
    /// d(tire)/d(omega), <= 0. Lets the integrator treat the tire implicitly.
    pub tire_derivative: Real,
}

/// Rotation speed below which a braked wheel is treated as held.
pub(crate) const BRAKE_HOLD_OMEGA: Real = 0.1;

/// Brake torque as an equivalent damping rate about the current speed.
/// Acting as damping it can stop a wheel but never reverse it.
#[inline]
pub(crate) fn brake_damping(brake: Real, omega: Real) -> Real {
    brake.max(0.0) / omega.abs().max(BRAKE_HOLD_OMEGA)
}

/// Implicit Euler step of one free wheel (direct drive, or undriven wheels).
pub fn integrate_wheel(params: &WheelParams, torques: &WheelTorques, dt: Real, state: &mut WheelRigidBody1dState) {
    let w0 = state.rotation_speed;
    let inertia = params.moi / dt;
    let lhs = inertia + params.damping_rate + brake_damping(torques.brake, w0) - torques.tire_derivative;
    let rhs = inertia * w0 + torques.drive + torques.tire - torques.tire_derivative * w0;
    let w = rhs / lhs;

    // Brakes stop the wheel but never spin it the other way.
    state.rotation_speed = if torques.brake > 0.0 && sign(w) != sign(w0) && w0 != 0.0 && torques.drive == 0.0 {
        0.0
    } else {
        w
    };
}

/// Advances the visual rotation angle.
///
/// Slow wheels with no drive or brake follow the rolling speed of the ground so
/// that integration noise at rest does not show up as a creeping wheel.
pub fn update_rotation_angle(
    params: &WheelParams,
    longitudinal_speed: Real,
    actuated: bool,
    threshold_speed: Real,
    dt: Real,
    state: &mut WheelRigidBody1dState,
) {
    let rolling = longitudinal_speed / params.radius;
    state.corrected_rotation_speed = if !actuated && longitudinal_speed.abs() < threshold_speed {
        let t = longitudinal_speed.abs() / threshold_speed.max(1e-6);
        rolling + (state.rotation_speed - rolling) * t
    } else {
        state.rotation_speed
    };
    let two_pi = 2.0 * std::f32::consts::PI;
    state.rotation_angle = (state.rotation_angle + state.corrected_rotation_speed * dt) % two_pi;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn drive_torque_spins_up() {
        let p = WheelParams { damping_rate: 0.0, ..WheelParams::default() };
        let mut s = WheelRigidBody1dState::default();
        let t = WheelTorques { drive: 12.0, ..WheelTorques::default() };
        integrate_wheel(&p, &t, 0.1, &mut s);
        assert_relative_eq!(s.rotation_speed, 12.0 * 0.1 / p.moi, epsilon = 1e-5);
    }

    #[test]
    fn brake_never_reverses() {
        let p = WheelParams::default();
        let mut s = WheelRigidBody1dState { rotation_speed: 0.5, ..Default::default() };
        let t = WheelTorques { brake: 5000.0, ..WheelTorques::default() };
        for _ in 0..20 {
            integrate_wheel(&p, &t, 0.01, &mut s);
            assert!(s.rotation_speed >= 0.0);
        }
        assert!(s.rotation_speed < 0.01);
    }

    #[test]
    fn stiff_tire_is_stable() {
        let p = WheelParams::default();
        let mut s = WheelRigidBody1dState { rotation_speed: 10.0, ..Default::default() };
        // Tire torque pulling the wheel toward zero with a very stiff slope.
        for _ in 0..50 {
            let t = WheelTorques { tire: -5000.0 * s.rotation_speed, tire_derivative: -5000.0, ..Default::default() };
            integrate_wheel(&p, &t, 1.0 / 60.0, &mut s);
            assert!(s.rotation_speed.abs() <= 10.0);
        }
        assert!(s.rotation_speed.abs() < 1e-3);
    }

    #[test]
    fn idle_wheel_angle_follows_ground() {
        let p = WheelParams::default();
        let mut s = WheelRigidBody1dState { rotation_speed: 3.0, ..Default::default() };
        update_rotation_angle(&p, 0.0, false, 0.1, 0.1, &mut s);
        assert_relative_eq!(s.corrected_rotation_speed, 0.0);
        assert_relative_eq!(s.rotation_angle, 0.0);
        update_rotation_angle(&p, 0.0, true, 0.1, 0.1, &mut s);
        assert_relative_eq!(s.corrected_rotation_speed, 3.0);
    }
}
