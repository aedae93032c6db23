// ==============================================================================
// tire/force.rs — COMBINED-SLIP TIRE FORCE + ALIGNING MOMENT
// ------------------------------------------------------------------------------
// Inputs: slip (long, lat), camber, filtered load Fz, friction μ.
//
//   TEff = tan(α) - γ * camber_stiff / lat_stiff
//   K    = sqrt((lat_stiff * TEff)² + (long_stiff * s)²) / (μ Fz)
//   F̄    = K - K²/3 + K³/27   for K < 3, otherwise 1
//
// Each component is its linear (stiffness × slip) value scaled by F̄ / K, so the
// resultant never exceeds μ Fz. Lateral force opposes lateral slip.
//
// Aligning moment: lateral force acting a pneumatic trail behind the contact
// centre. The trail shrinks as (1 - K/3)³ and vanishes at full saturation.
//
// Sticky axes replace the slip force with a load-proportional damping force.
//
// The wheel receives -Fx * r about its spin axis, plus the slope of that torque
// against wheel speed so the drivetrain can integrate it implicitly.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::tire::grip::{TireGripState, TireStickyState};
use crate::tire::params::{TireForceParams, TireStickyParams};
use crate::tire::slip::{TireCamberState, TireDirectionState, TireSlipState, TireSpeedState};
use crate::types::{Real, Vec3};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireForceState {
    pub lng_force: Real,
    pub lat_force: Real,
    pub aligning_moment: Real,
    /// World frame.
    pub force: Vec3,
    /// World frame, about the centre of mass.
    pub torque: Vec3,
    /// Reaction torque on the wheel's spin axis.
    pub wheel_torque: Real,
    /// d(wheel_torque)/d(omega), <= 0.
    pub wheel_torque_derivative: Real,
}

#[derive(Copy, Clone, Debug)]
pub struct TireForceInput<'a> {
    pub params: &'a TireForceParams,
    pub sticky_params: &'a TireStickyParams,
    pub directions: &'a TireDirectionState,
    pub speeds: &'a TireSpeedState,
    pub slip: &'a TireSlipState,
    pub camber: &'a TireCamberState,
    pub grip: &'a TireGripState,
    pub sticky: &'a TireStickyState,
    pub wheel_radius: Real,
    /// Force application point relative to the centre of mass, world frame.
    pub arm: Vec3,
}

/// F̄ / K: ratio between saturated and linear force.
#[inline]
fn saturation_scale(k: Real) -> Real {
    if k < 3.0 { 1.0 - k / 3.0 + k * k / 27.0 } else { 1.0 / k }
}

pub fn compute_tire_force(input: &TireForceInput<'_>, out: &mut TireForceState) {
    let p = input.params;
    let load = input.grip.load;
    let mu_fz = input.grip.friction * load;
    if load <= 0.0 || mu_fz <= 1e-6 {
        *out = TireForceState::default();
        return;
    }

    let lat_stiff = p.lateral_stiffness(load);
    let tan_alpha = input.slip.lat.tan();
    let t_eff = if lat_stiff > 1e-6 {
        tan_alpha - input.camber.camber * p.camber_stiff / lat_stiff
    } else {
        tan_alpha
    };

    let lng_linear = p.long_stiff * input.slip.lng;
    let lat_linear = lat_stiff * t_eff;
    let k = (lng_linear * lng_linear + lat_linear * lat_linear).sqrt() / mu_fz;
    let scale = saturation_scale(k);

    let mut fx = lng_linear * scale;
    let mut fy = -lat_linear * scale;

    let saturation = 1.0 - k.min(3.0) / 3.0;
    let trail = p.pneumatic_trail * saturation * saturation * saturation;
    let mut mz = (-fy * trail).clamp(-p.max_aligning_moment, p.max_aligning_moment);

    let r = input.wheel_radius;
    let mut torque_slope = -r * p.long_stiff * scale * r / input.slip.lng_denominator.max(1e-6);

    let axes = &input.sticky_params.axes;
    if input.sticky.active[TireStickyParams::LONGITUDINAL] {
        let c = axes[TireStickyParams::LONGITUDINAL].damping;
        fx = (-c * load * input.speeds.lng).clamp(-mu_fz, mu_fz);
        torque_slope = 0.0;
    }
    if input.sticky.active[TireStickyParams::LATERAL] {
        let c = axes[TireStickyParams::LATERAL].damping;
        fy = (-c * load * input.speeds.lat).clamp(-mu_fz, mu_fz);
        mz = 0.0;
    }

    let d = input.directions;
    let force = d.lng * fx + d.lat * fy;
    let up = d.lng.cross(&d.lat);

    out.lng_force = fx;
    out.lat_force = fy;
    out.aligning_moment = mz;
    out.force = force;
    out.torque = input.arm.cross(&force) + up * mz;
    out.wheel_torque = -fx * r;
    out.wheel_torque_derivative = torque_slope;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Fixture {
        params: TireForceParams,
        sticky_params: TireStickyParams,
        directions: TireDirectionState,
        speeds: TireSpeedState,
        slip: TireSlipState,
        camber: TireCamberState,
        grip: TireGripState,
        sticky: TireStickyState,
    }

    impl Fixture {
        fn new(long: Real, lat: Real) -> Self {
            Self {
                params: TireForceParams::default(),
                sticky_params: TireStickyParams::default(),
                directions: TireDirectionState::default(),
                speeds: TireSpeedState { lng: 10.0, lat: 0.0 },
                slip: TireSlipState { lng: long, lat, lng_denominator: 10.0 },
                camber: TireCamberState::default(),
                grip: TireGripState { load: 3500.0, friction: 1.0 },
                sticky: TireStickyState::default(),
            }
        }

        fn run(&self) -> TireForceState {
            let input = TireForceInput {
                params: &self.params,
                sticky_params: &self.sticky_params,
                directions: &self.directions,
                speeds: &self.speeds,
                slip: &self.slip,
                camber: &self.camber,
                grip: &self.grip,
                sticky: &self.sticky,
                wheel_radius: 0.3,
                arm: Vec3::zeros(),
            };
            let mut out = TireForceState::default();
            compute_tire_force(&input, &mut out);
            out
        }
    }

    #[test]
    fn small_slip_is_linear() {
        let f = Fixture::new(0.001, 0.0).run();
        assert_relative_eq!(f.lng_force, 25.0, epsilon = 0.1);
        assert_relative_eq!(f.lat_force, 0.0);
        assert_relative_eq!(f.wheel_torque, -f.lng_force * 0.3, epsilon = 1e-4);
    }

    #[test]
    fn force_never_exceeds_friction_limit() {
        for &(s, a) in &[(0.5, 0.0), (0.0, 0.4), (-1.0, -0.8), (0.2, 0.2)] {
            let f = Fixture::new(s, a).run();
            let total = (f.lng_force * f.lng_force + f.lat_force * f.lat_force).sqrt();
            assert!(total <= 3500.0 * 1.0001, "slip ({s}, {a}) gave {total}");
        }
        let f = Fixture::new(5.0, 0.0).run();
        assert_relative_eq!(f.lng_force, 3500.0, epsilon = 1.0);
    }

    #[test]
    fn lateral_force_opposes_slip_and_aligns() {
        let f = Fixture::new(0.0, 0.02).run();
        assert!(f.lat_force < 0.0);
        // Moment steers the wheel back toward the direction of travel.
        assert!(f.aligning_moment > 0.0);
        let saturated = Fixture::new(0.0, 1.2).run();
        assert_relative_eq!(saturated.aligning_moment, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn zero_load_means_zero_force() {
        let mut fx = Fixture::new(0.3, 0.1);
        fx.grip = TireGripState::default();
        assert_eq!(fx.run(), TireForceState::default());
    }

    #[test]
    fn sticky_axis_uses_damping() {
        let mut fx = Fixture::new(0.0, 0.0);
        fx.speeds = TireSpeedState { lng: 0.05, lat: -0.02 };
        fx.sticky.active = [true, true];
        let f = fx.run();
        assert_relative_eq!(f.lng_force, -1.0 * 3500.0 * 0.05, epsilon = 1e-3);
        assert_relative_eq!(f.lat_force, 0.1 * 3500.0 * 0.02, epsilon = 1e-3);
        assert_relative_eq!(f.wheel_torque_derivative, 0.0);
    }
}
