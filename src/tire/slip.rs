// ==============================================================================
// tire/slip.rs — CONTACT DIRECTIONS, SPEEDS, SLIP, CAMBER
// ------------------------------------------------------------------------------
// Directions:
//   lng = wheel forward (after steer/toe/camber) projected on the road plane
//   lat = n × lng        (right-handed with the road normal as "up")
//   airborne: the unprojected wheel axes
//
// Speeds are contact-point velocity minus road velocity, projected on lng/lat.
//
// Slip:
//   long = (ωr - v_lng) / max(|v_lng|, |ωr|, min_denominator)
//          min_denominator = active value if drive/brake torque applied, else passive
//   lat  = atan(v_lat / max(|v_lng|, min_lat_denominator))
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::road::RoadGeometryState;
use crate::suspension::{SuspensionComplianceState, SuspensionParams};
use crate::tire::params::TireSlipParams;
use crate::types::{project_on_plane, Frame, Quat, Real, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireDirectionState {
    /// World frame.
    pub lng: Vec3,
    /// World frame.
    pub lat: Vec3,
}

impl Default for TireDirectionState {
    fn default() -> Self {
        let f = Frame::default();
        Self { lng: f.lng_axis(), lat: f.lat_axis() }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireSpeedState {
    pub lng: Real,
    pub lat: Real,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireSlipState {
    pub lng: Real,
    /// rad
    pub lat: Real,
    /// Denominator used for `lng`; the drivetrain needs it for the implicit tire term.
    pub lng_denominator: Real,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireCamberState {
    /// rad
    pub camber: Real,
}

/// Wheel orientation relative to the rigid body: base attachment, then steer+toe
/// about the vertical axis, then camber about the longitudinal axis.
pub fn wheel_rotation(
    suspension: &SuspensionParams,
    frame: &Frame,
    steer: Real,
    compliance: &SuspensionComplianceState,
) -> Quat {
    let yaw = Quat::from_axis_angle(&nalgebra::Unit::new_unchecked(frame.vrt_axis()), steer + compliance.toe);
    let roll = Quat::from_axis_angle(&nalgebra::Unit::new_unchecked(frame.lng_axis()), compliance.camber);
    suspension.wheel_base_rotation() * yaw * roll
}

/// `wheel` is the world orientation of the wheel.
pub fn update_directions(wheel: &Quat, frame: &Frame, road: &RoadGeometryState, airborne: bool, out: &mut TireDirectionState) {
    let lng_wheel = wheel * frame.lng_axis();
    let lat_wheel = wheel * frame.lat_axis();
    if airborne || !road.hit {
        out.lng = lng_wheel;
        out.lat = lat_wheel;
        return;
    }
    let n = road.plane.normal;
    // Wheel pointing straight into the road: derive lng from the spin axis.
    let fallback = project_on_plane(&lat_wheel, &n, frame.lat_axis()).cross(&n);
    out.lng = project_on_plane(&lng_wheel, &n, fallback);
    out.lat = n.cross(&out.lng);
}

/// `contact_velocity` is the world velocity of the chassis at the contact point.
pub fn update_speeds(
    dirs: &TireDirectionState,
    contact_velocity: &Vec3,
    road: &RoadGeometryState,
    out: &mut TireSpeedState,
) {
    let rel = contact_velocity - road.velocity;
    out.lng = rel.dot(&dirs.lng);
    out.lat = rel.dot(&dirs.lat);
}

/// (longitudinal, lateral) slip denominators.
pub fn slip_denominators(
    speeds: &TireSpeedState,
    wheel_linear_speed: Real,
    actuated: bool,
    params: &TireSlipParams,
) -> (Real, Real) {
    let min_lng = if actuated {
        params.min_active_long_slip_denominator
    } else {
        params.min_passive_long_slip_denominator
    };
    let lng = speeds.lng.abs().max(wheel_linear_speed.abs()).max(min_lng);
    let lat = speeds.lng.abs().max(params.min_lat_slip_denominator);
    (lng, lat)
}

pub fn update_slip(
    speeds: &TireSpeedState,
    wheel_omega: Real,
    wheel_radius: Real,
    actuated: bool,
    params: &TireSlipParams,
    out: &mut TireSlipState,
) {
    let wheel_linear = wheel_omega * wheel_radius;
    let (lng_den, lat_den) = slip_denominators(speeds, wheel_linear, actuated, params);
    out.lng = (wheel_linear - speeds.lng) / lng_den;
    out.lat = (speeds.lat / lat_den).atan();
    out.lng_denominator = lng_den;
}

/// Inclination of the wheel's spin axis against the road plane.
pub fn update_camber(wheel: &Quat, frame: &Frame, road: &RoadGeometryState, out: &mut TireCamberState) {
    if !road.hit {
        out.camber = 0.0;
        return;
    }
    let lat_wheel = wheel * frame.lat_axis();
    out.camber = lat_wheel.dot(&road.plane.normal).clamp(-1.0, 1.0).asin();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Plane;
    use approx::assert_relative_eq;

    fn flat() -> RoadGeometryState {
        RoadGeometryState { plane: Plane::default(), friction: 1.0, velocity: Vec3::zeros(), hit: true }
    }

    #[test]
    fn directions_follow_steer_and_slope() {
        let frame = Frame::default();
        let steer = Quat::from_axis_angle(&Vec3::y_axis(), 0.3);
        let mut d = TireDirectionState::default();
        update_directions(&steer, &frame, &flat(), false, &mut d);
        assert_relative_eq!(d.lng, Vec3::new(0.3f32.sin(), 0.0, 0.3f32.cos()), epsilon = 1e-5);
        assert_relative_eq!(d.lat, Vec3::y().cross(&d.lng), epsilon = 1e-6);

        let mut slope = flat();
        slope.plane.normal = Vec3::new(0.0, 0.8, -0.6);
        update_directions(&Quat::identity(), &frame, &slope, false, &mut d);
        assert_relative_eq!(d.lng.dot(&slope.plane.normal), 0.0, epsilon = 1e-6);
        assert_relative_eq!(d.lng.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn speeds_are_relative_to_road() {
        let mut road = flat();
        road.velocity = Vec3::new(0.0, 0.0, 2.0);
        let mut s = TireSpeedState::default();
        update_speeds(&TireDirectionState::default(), &Vec3::new(1.0, 0.0, 5.0), &road, &mut s);
        assert_relative_eq!(s.lng, 3.0);
        assert_relative_eq!(s.lat, 1.0);
    }

    #[test]
    fn slip_stays_finite_at_standstill() {
        let p = TireSlipParams::default();
        let still = TireSpeedState::default();
        let (lng, lat) = slip_denominators(&still, 0.0, false, &p);
        assert!(lng >= p.min_passive_long_slip_denominator);
        assert!(lat >= p.min_lat_slip_denominator);
        let (lng, _) = slip_denominators(&still, 0.0, true, &p);
        assert!(lng >= p.min_active_long_slip_denominator);

        let mut slip = TireSlipState::default();
        update_slip(&still, 0.0, 0.3, true, &p, &mut slip);
        assert!(slip.lng.is_finite() && slip.lat.is_finite());
        assert_relative_eq!(slip.lng, 0.0);
    }

    #[test]
    fn wheelspin_gives_positive_slip() {
        let p = TireSlipParams::default();
        let speeds = TireSpeedState { lng: 10.0, lat: 0.0 };
        let mut slip = TireSlipState::default();
        update_slip(&speeds, 50.0, 0.3, true, &p, &mut slip);
        assert_relative_eq!(slip.lng, (15.0 - 10.0) / 15.0, epsilon = 1e-6);
        update_slip(&TireSpeedState { lng: 10.0, lat: 10.0 }, 33.3333, 0.3, false, &p, &mut slip);
        assert_relative_eq!(slip.lat, std::f32::consts::FRAC_PI_4, epsilon = 1e-5);
    }

    #[test]
    fn camber_from_tilted_wheel() {
        let frame = Frame::default();
        let tilt = Quat::from_axis_angle(&Vec3::z_axis(), 0.1);
        let mut c = TireCamberState::default();
        update_camber(&tilt, &frame, &flat(), &mut c);
        assert_relative_eq!(c.camber, 0.1, epsilon = 1e-5);
    }
}
