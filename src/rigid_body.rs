// ==============================================================================
// rigid_body.rs — CHASSIS FORCE ACCUMULATION + INTEGRATION
// ------------------------------------------------------------------------------
// The rigid-body frame origin is the centre of mass. Every substep:
//
//   F = Σ suspension + Σ tire + external
//   τ = Σ (arm × F_i) + aligning moments + external
//
// Immediate:  integrate velocity (gravity + gyroscopic term) and pose here.
//             The physics engine later receives the velocity change, either
//             as a velocity change or as an acceleration.
// Deferred:   accumulate F·dt and τ·dt; the engine applies them on its step
//             (and owns gravity).
// ==============================================================================

use nalgebra::{Matrix3, Unit};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};
use crate::types::{Frame, Pose, Quat, Real, Scale, TransformAndScale, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyParams {
    pub mass: Real,
    /// Principal moments about the rigid-body axes.
    pub moi: Vec3,
}

impl Default for RigidBodyParams {
    fn default() -> Self {
        Self { mass: 1_500.0, moi: Vec3::new(3_200.0, 3_400.0, 750.0) }
    }
}

impl RigidBodyParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.mass.is_finite() && self.mass > 0.0) || self.moi.iter().any(|m| !(m.is_finite() && *m > 0.0)) {
            return Err(VehicleError::invalid("RigidBodyParams", "mass and moi must be > 0"));
        }
        Ok(())
    }

    /// Box inertia for a chassis of the given half extents.
    pub fn from_box(mass: Real, half_extents: Vec3) -> Self {
        let (x, y, z) = (half_extents.x * 2.0, half_extents.y * 2.0, half_extents.z * 2.0);
        let k = mass / 12.0;
        Self { mass, moi: Vec3::new(k * (y * y + z * z), k * (x * x + z * z), k * (x * x + y * y)) }
    }
}

impl TransformAndScale for RigidBodyParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r2 = src.ratio_to(trg).powi(2);
        let rot = src_frame.rotation_to(trg_frame);
        // Permute principal moments along with the axes.
        let moi = rot.abs() * self.moi * r2;
        Self { mass: self.mass, moi }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integration {
    #[default]
    Immediate,
    Deferred,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForceApplication {
    #[default]
    VelocityChange,
    Acceleration,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigidBodyUpdateMode {
    pub integration: Integration,
    pub apply: ForceApplication,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyState {
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Velocities when the outer update began.
    pub previous_linear_velocity: Vec3,
    pub previous_angular_velocity: Vec3,
    /// Injected by the caller; consumed by the next update.
    pub external_force: Vec3,
    pub external_torque: Vec3,
    /// Deferred mode: impulse awaiting the physics engine.
    pub pending_impulse: Vec3,
    pub pending_angular_impulse: Vec3,
}

impl Default for RigidBodyState {
    fn default() -> Self {
        Self {
            pose: Pose::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            previous_linear_velocity: Vec3::zeros(),
            previous_angular_velocity: Vec3::zeros(),
            external_force: Vec3::zeros(),
            external_torque: Vec3::zeros(),
            pending_impulse: Vec3::zeros(),
            pending_angular_impulse: Vec3::zeros(),
        }
    }
}

impl RigidBodyState {
    /// Velocity of a point fixed to the body, `arm` measured from the centre of mass.
    pub fn point_velocity(&self, arm: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(arm)
    }

    /// Marks the start of an outer update.
    pub fn begin(&mut self) {
        self.previous_linear_velocity = self.linear_velocity;
        self.previous_angular_velocity = self.angular_velocity;
        self.pending_impulse = Vec3::zeros();
        self.pending_angular_impulse = Vec3::zeros();
    }

    fn world_inertia(&self, params: &RigidBodyParams) -> Matrix3<Real> {
        let r = self.pose.rotation.to_rotation_matrix();
        r.matrix() * Matrix3::from_diagonal(&params.moi) * r.matrix().transpose()
    }

    fn world_inverse_inertia(&self, params: &RigidBodyParams) -> Matrix3<Real> {
        let r = self.pose.rotation.to_rotation_matrix();
        let inv = params.moi.map(|m| 1.0 / m);
        r.matrix() * Matrix3::from_diagonal(&inv) * r.matrix().transpose()
    }
}

/// Applies one substep of accumulated chassis force and torque.
pub fn update_rigid_body(
    params: &RigidBodyParams,
    mode: &RigidBodyUpdateMode,
    gravity: &Vec3,
    force: Vec3,
    torque: Vec3,
    dt: Real,
    state: &mut RigidBodyState,
) {
    let force = force + state.external_force;
    let torque = torque + state.external_torque;

    match mode.integration {
        Integration::Immediate => {
            state.linear_velocity += (force / params.mass + gravity) * dt;

            let w = state.angular_velocity;
            let gyro = w.cross(&(state.world_inertia(params) * w));
            state.angular_velocity += state.world_inverse_inertia(params) * (torque - gyro) * dt;

            state.pose.translation.vector += state.linear_velocity * dt;
            let dq = Quat::from_scaled_axis(state.angular_velocity * dt);
            state.pose.rotation = Unit::new_normalize(*(dq * state.pose.rotation).quaternion());
        }
        Integration::Deferred => {
            state.pending_impulse += force * dt;
            state.pending_angular_impulse += torque * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn free_fall_under_gravity() {
        let p = RigidBodyParams::default();
        let mut s = RigidBodyState::default();
        let g = Vec3::new(0.0, -10.0, 0.0);
        for _ in 0..10 {
            update_rigid_body(&p, &RigidBodyUpdateMode::default(), &g, Vec3::zeros(), Vec3::zeros(), 0.1, &mut s);
        }
        assert_relative_eq!(s.linear_velocity.y, -10.0, epsilon = 1e-4);
        assert!(s.pose.translation.vector.y < -5.0);
    }

    #[test]
    fn deferred_accumulates_impulse() {
        let p = RigidBodyParams::default();
        let mode = RigidBodyUpdateMode { integration: Integration::Deferred, ..Default::default() };
        let mut s = RigidBodyState::default();
        s.begin();
        update_rigid_body(&p, &mode, &Vec3::zeros(), Vec3::x() * 100.0, Vec3::y() * 5.0, 0.5, &mut s);
        update_rigid_body(&p, &mode, &Vec3::zeros(), Vec3::x() * 100.0, Vec3::zeros(), 0.5, &mut s);
        assert_relative_eq!(s.pending_impulse, Vec3::x() * 100.0);
        assert_relative_eq!(s.pending_angular_impulse, Vec3::y() * 2.5);
        assert_relative_eq!(s.linear_velocity, Vec3::zeros());
    }

    #[test]
    fn torque_spins_about_principal_axis() {
        let p = RigidBodyParams { mass: 1.0, moi: Vec3::new(2.0, 4.0, 8.0) };
        let mut s = RigidBodyState::default();
        update_rigid_body(&p, &RigidBodyUpdateMode::default(), &Vec3::zeros(), Vec3::zeros(), Vec3::y() * 4.0, 0.5, &mut s);
        assert_relative_eq!(s.angular_velocity, Vec3::y() * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn box_inertia() {
        let p = RigidBodyParams::from_box(12.0, Vec3::new(0.5, 0.5, 1.0));
        assert_relative_eq!(p.moi, Vec3::new(5.0, 5.0, 2.0), epsilon = 1e-5);
    }
}
