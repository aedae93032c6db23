// ==============================================================================
// suspension.rs — JOUNCE, COMPLIANCE, SPRING/DAMPER FORCE, ANTI-ROLL BARS
// ------------------------------------------------------------------------------
// Per wheel, per substep:
//
// 1) Jounce (compression) from the road plane captured by the road component:
//    - the wheel centre at jounce j sits at  A + d * (travel - j)
//      (A = attachment point, d = unit travel direction pointing "down")
//    - the lowest point of the wheel disc must touch the plane
//    - raw jounce < 0        => wheel cannot reach the road (airborne)
//    - raw jounce > travel   => clamp; the excess feeds the limit constraint
//    - optional expansion speed limit: the wheel cannot drop faster than
//      max_expansion_speed. If the road falls away faster, the wheel separates.
//
// 2) Compliance: toe, camber and force application points as functions of
//    normalized jounce (jounce / travel).
//
// 3) Force: F = k * jounce + c * jounce_speed, never pulling (F >= 0).
//    Tire load is the part of F along the road normal. Airborne => zero.
//
// 4) Anti-roll bars: force = stiffness * (j0 - j1), added to wheel 0 and taken
//    from wheel 1. Loads stay non-negative.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};
use crate::fixed::LookupTable;
use crate::road::RoadGeometryState;
use crate::types::{
    transform_pose, transform_vec, AxleDescription, Frame, Point3, Pose, Quat, Real, Scale,
    TransformAndScale, Vec3, MAX_COMPLIANCE_POINTS,
};

// ============================================
// Params
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspensionParams {
    /// Rigid-body frame. Translation = wheel centre at full compression.
    pub suspension_attachment: Pose,
    /// Rigid-body frame, unit length, pointing from compression toward droop.
    pub travel_dir: Vec3,
    pub travel_dist: Real,
    /// Wheel frame relative to the suspension frame.
    pub wheel_attachment: Pose,
}

impl Default for SuspensionParams {
    fn default() -> Self {
        Self {
            suspension_attachment: Pose::identity(),
            travel_dir: -Vec3::y(),
            travel_dist: 0.25,
            wheel_attachment: Pose::identity(),
        }
    }
}

impl SuspensionParams {
    pub fn validate(&self) -> Result<()> {
        if (self.travel_dir.norm() - 1.0).abs() > 1e-3 {
            return Err(VehicleError::invalid("SuspensionParams", "travel_dir must be unit length"));
        }
        if !(self.travel_dist.is_finite() && self.travel_dist > 0.0) {
            return Err(VehicleError::invalid("SuspensionParams", "travel_dist must be > 0"));
        }
        Ok(())
    }

    /// Wheel centre (rigid-body frame) at `jounce`.
    pub fn wheel_center(&self, jounce: Real) -> Point3 {
        let base = self.suspension_attachment * Point3::from(self.wheel_attachment.translation.vector);
        base + self.travel_dir * (self.travel_dist - jounce)
    }

    /// Orientation of the wheel (rigid-body frame) before steer/toe/camber.
    pub fn wheel_base_rotation(&self) -> Quat {
        self.suspension_attachment.rotation * self.wheel_attachment.rotation
    }
}

impl TransformAndScale for SuspensionParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        Self {
            suspension_attachment: transform_pose(&self.suspension_attachment, src_frame, trg_frame, r),
            travel_dir: transform_vec(&self.travel_dir, src_frame, trg_frame),
            travel_dist: self.travel_dist * r,
            wheel_attachment: transform_pose(&self.wheel_attachment, src_frame, trg_frame, r),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JounceCalculation {
    #[default]
    Raycast,
    Sweep,
}

/// What jounce to report while a wheel is in the air.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AirborneJounce {
    HoldLast,
    Value(Real),
}

impl Default for AirborneJounce {
    fn default() -> Self {
        AirborneJounce::Value(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspensionStateCalculationParams {
    pub jounce_calculation: JounceCalculation,
    pub limit_expansion_velocity: bool,
    /// m/s; only used when `limit_expansion_velocity` is set.
    pub max_expansion_speed: Real,
    pub airborne: AirborneJounce,
}

impl Default for SuspensionStateCalculationParams {
    fn default() -> Self {
        Self {
            jounce_calculation: JounceCalculation::Raycast,
            limit_expansion_velocity: false,
            max_expansion_speed: 10.0,
            airborne: AirborneJounce::default(),
        }
    }
}

impl TransformAndScale for SuspensionStateCalculationParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        Self {
            max_expansion_speed: self.max_expansion_speed * r,
            airborne: match self.airborne {
                AirborneJounce::Value(v) => AirborneJounce::Value(v * r),
                AirborneJounce::HoldLast => AirborneJounce::HoldLast,
            },
            ..*self
        }
    }
}

/// Compliance curves keyed by normalized jounce (0 = full droop, 1 = full compression).
/// Application points are offsets from the wheel centre, rigid-body frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspensionComplianceParams {
    pub toe: LookupTable<Real, MAX_COMPLIANCE_POINTS>,
    pub camber: LookupTable<Real, MAX_COMPLIANCE_POINTS>,
    pub suspension_force_app_point: LookupTable<Vec3, MAX_COMPLIANCE_POINTS>,
    pub tire_force_app_point: LookupTable<Vec3, MAX_COMPLIANCE_POINTS>,
}

impl SuspensionComplianceParams {
    pub fn validate(&self) -> Result<()> {
        const BLOCK: &str = "SuspensionComplianceParams";
        self.toe.validate(BLOCK)?;
        self.camber.validate(BLOCK)?;
        self.suspension_force_app_point.validate(BLOCK)?;
        self.tire_force_app_point.validate(BLOCK)
    }
}

impl TransformAndScale for SuspensionComplianceParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        let point = |v: Vec3| transform_vec(&v, src_frame, trg_frame) * r;
        Self {
            toe: self.toe,
            camber: self.camber,
            suspension_force_app_point: self.suspension_force_app_point.map_values(point),
            tire_force_app_point: self.tire_force_app_point.map_values(point),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspensionForceParams {
    pub stiffness: Real, // N/m
    pub damping: Real,   // N·s/m
    /// Mass carried by this spring at rest.
    pub sprung_mass: Real,
}

impl Default for SuspensionForceParams {
    fn default() -> Self {
        Self { stiffness: 35_000.0, damping: 3_500.0, sprung_mass: 300.0 }
    }
}

impl SuspensionForceParams {
    /// Spring/damper from static sag and damping ratio.
    ///
    /// k = m g / sag, c = 2 ζ sqrt(k m)
    pub fn from_sag(sprung_mass: Real, gravity: Real, sag: Real, zeta: Real) -> Self {
        let k = sprung_mass * gravity / sag.max(1e-3);
        let c = 2.0 * zeta * (k * sprung_mass).sqrt();
        Self { stiffness: k, damping: c, sprung_mass }
    }

    /// Jounce at which the spring alone carries the sprung mass.
    pub fn rest_jounce(&self, gravity: Real) -> Real {
        self.sprung_mass * gravity / self.stiffness.max(1e-6)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: Real| v.is_finite() && v >= 0.0;
        if !(ok(self.stiffness) && ok(self.damping) && ok(self.sprung_mass)) {
            return Err(VehicleError::invalid("SuspensionForceParams", "stiffness, damping and sprung_mass must be >= 0"));
        }
        Ok(())
    }
}

impl TransformAndScale for SuspensionForceParams {
    /// Force and length both carry one length unit, so k and c are scale free.
    fn transform_and_scale(&self, _: &Frame, _: &Frame, _: &Scale, _: &Scale) -> Self {
        *self
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AntiRollBarParams {
    pub wheel0: u32,
    pub wheel1: u32,
    pub stiffness: Real, // N/m
}

impl AntiRollBarParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        let n = axle.nb_wheels() as u32;
        if self.wheel0 >= n || self.wheel1 >= n || self.wheel0 == self.wheel1 {
            return Err(VehicleError::invalid("AntiRollBarParams", "wheel ids must be distinct and in range"));
        }
        if !(self.stiffness.is_finite() && self.stiffness >= 0.0) {
            return Err(VehicleError::invalid("AntiRollBarParams", "stiffness must be >= 0"));
        }
        Ok(())
    }
}

// ============================================
// State
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspensionState {
    pub jounce: Real,
    /// Positive while compressing.
    pub jounce_speed: Real,
    /// Gap between wheel and road along the normal; > 0 means airborne.
    pub separation: Real,
    /// Compression beyond travel_dist; drives the limit constraint.
    pub overcompression: Real,
    /// `jounce` holds a grounded value from the previous step.
    pub previous_jounce_valid: bool,
}

impl SuspensionState {
    pub fn is_airborne(&self) -> bool {
        self.separation > 0.0
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspensionComplianceState {
    pub toe: Real,
    pub camber: Real,
    /// Rigid-body frame.
    pub suspension_force_app_point: Vec3,
    /// Rigid-body frame.
    pub tire_force_app_point: Vec3,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspensionForce {
    /// World frame.
    pub force: Vec3,
    /// World frame, about the centre of mass.
    pub torque: Vec3,
    /// Load handed to the tire.
    pub normal_force: Real,
    /// Spring/damper magnitude along the travel axis, anti-roll included.
    pub magnitude: Real,
}

// ============================================
// Jounce
// ============================================

/// Inputs to the jounce computation that vary per wheel and step.
#[derive(Copy, Clone, Debug)]
pub struct JounceInput<'a> {
    pub params: &'a SuspensionParams,
    pub calc: &'a SuspensionStateCalculationParams,
    pub wheel_radius: Real,
    /// World spin axis of the wheel.
    pub spin_axis: Vec3,
    pub road: &'a RoadGeometryState,
    pub chassis: &'a Pose,
}

pub fn update_suspension_state(input: &JounceInput<'_>, dt: Real, state: &mut SuspensionState) {
    let p = input.params;
    let road = input.road;

    // `separation` is measured at full extension; `approach` converts jounce
    // into extra separation (0 when the road is not in reach at all).
    let airborne = |state: &mut SuspensionState, separation: Real, approach: Real| {
        if input.calc.limit_expansion_velocity && state.previous_jounce_valid {
            // The wheel cannot drop faster than the limit even when nothing is below it.
            let floor = state.jounce - input.calc.max_expansion_speed * dt;
            if floor > 0.0 {
                state.jounce_speed = if dt > 0.0 { (floor - state.jounce) / dt } else { 0.0 };
                state.jounce = floor;
                state.separation = (separation + floor * approach).max(Real::MIN_POSITIVE);
                state.overcompression = 0.0;
                return;
            }
        }
        if let AirborneJounce::Value(v) = input.calc.airborne {
            state.jounce = v.clamp(0.0, p.travel_dist);
        }
        state.jounce_speed = 0.0;
        state.separation = separation.max(Real::MIN_POSITIVE);
        state.overcompression = 0.0;
        state.previous_jounce_valid = false;
    };

    if !road.hit {
        airborne(state, Real::MAX, 0.0);
        return;
    }

    let n = road.plane.normal;
    let d = input.chassis.rotation * p.travel_dir;
    let n_d = n.dot(&d);
    if n_d > -1e-3 {
        // Travel direction does not approach the road.
        airborne(state, Real::MAX, 0.0);
        return;
    }

    // Distance from wheel centre to the disc's lowest point along -n.
    let axis = input.spin_axis;
    let radial = n - axis * n.dot(&axis);
    let rim = input.wheel_radius * radial.norm().min(1.0);

    let a = input.chassis * (p.suspension_attachment * Point3::from(p.wheel_attachment.translation.vector));
    let s = (rim - road.plane.signed_distance(&a)) / n_d;
    let raw = p.travel_dist - s;

    if raw < 0.0 {
        airborne(state, -raw * -n_d, -n_d);
        return;
    }

    let mut jounce = raw.min(p.travel_dist);
    let mut separation = 0.0;
    state.overcompression = (raw - p.travel_dist).max(0.0);

    if input.calc.limit_expansion_velocity && state.previous_jounce_valid {
        let floor = state.jounce - input.calc.max_expansion_speed * dt;
        if jounce < floor {
            separation = (floor - jounce) * -n_d;
            jounce = floor;
        }
    }

    state.jounce_speed = if state.previous_jounce_valid && dt > 0.0 { (jounce - state.jounce) / dt } else { 0.0 };
    state.jounce = jounce;
    state.separation = separation;
    state.previous_jounce_valid = true;
}

// ============================================
// Compliance
// ============================================

pub fn update_compliance(
    params: &SuspensionComplianceParams,
    suspension: &SuspensionParams,
    jounce: Real,
    state: &mut SuspensionComplianceState,
) {
    let x = (jounce / suspension.travel_dist).clamp(0.0, 1.0);
    let center = suspension.wheel_center(jounce).coords;
    state.toe = params.toe.interpolate(x);
    state.camber = params.camber.interpolate(x);
    state.suspension_force_app_point = center + params.suspension_force_app_point.interpolate(x);
    state.tire_force_app_point = center + params.tire_force_app_point.interpolate(x);
}

// ============================================
// Force
// ============================================

/// Spring/damper magnitude along the travel axis. Zero when airborne.
pub fn spring_damper(params: &SuspensionForceParams, state: &SuspensionState) -> Real {
    if state.is_airborne() {
        return 0.0;
    }
    (params.stiffness * state.jounce + params.damping * state.jounce_speed).max(0.0)
}

/// Turns a travel-axis magnitude into world force, torque and tire load.
pub fn resolve_suspension_force(
    magnitude: Real,
    suspension: &SuspensionParams,
    compliance: &SuspensionComplianceState,
    road: &RoadGeometryState,
    chassis: &Pose,
    airborne: bool,
    out: &mut SuspensionForce,
) {
    if airborne || magnitude <= 0.0 {
        *out = SuspensionForce::default();
        return;
    }
    let up = -(chassis.rotation * suspension.travel_dir);
    let force = up * magnitude;
    let arm = chassis.rotation * compliance.suspension_force_app_point;
    out.force = force;
    out.torque = arm.cross(&force);
    out.magnitude = magnitude;
    out.normal_force = (magnitude * road.plane.normal.dot(&up)).max(0.0);
}

/// Anti-roll force on `wheel0` (the same amount is removed from `wheel1`).
pub fn anti_roll_force(bar: &AntiRollBarParams, j0: Real, j1: Real) -> Real {
    bar.stiffness * (j0 - j1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Plane;
    use approx::assert_relative_eq;

    fn road(height: Real) -> RoadGeometryState {
        RoadGeometryState {
            plane: Plane { normal: Vec3::y(), d: -height },
            friction: 1.0,
            velocity: Vec3::zeros(),
            hit: true,
        }
    }

    fn susp() -> SuspensionParams {
        SuspensionParams {
            suspension_attachment: Pose::translation(0.0, 0.0, 0.0),
            travel_dir: -Vec3::y(),
            travel_dist: 0.3,
            wheel_attachment: Pose::identity(),
        }
    }

    fn step(road: &RoadGeometryState, calc: &SuspensionStateCalculationParams, state: &mut SuspensionState) {
        let p = susp();
        let chassis = Pose::identity();
        let input = JounceInput {
            params: &p,
            calc,
            wheel_radius: 0.4,
            spin_axis: Vec3::x(),
            road,
            chassis: &chassis,
        };
        update_suspension_state(&input, 0.01, state);
    }

    #[test]
    fn jounce_from_plane() {
        // Centre at full compression is y = 0; rim 0.4 below. Road at -0.5 => s = 0.1
        let mut s = SuspensionState::default();
        step(&road(-0.5), &SuspensionStateCalculationParams::default(), &mut s);
        assert_relative_eq!(s.jounce, 0.2, epsilon = 1e-5);
        assert!(!s.is_airborne());
        assert_relative_eq!(s.overcompression, 0.0);
    }

    #[test]
    fn jounce_clamps_and_reports_overcompression() {
        let mut s = SuspensionState::default();
        step(&road(-0.2), &SuspensionStateCalculationParams::default(), &mut s);
        assert_relative_eq!(s.jounce, 0.3, epsilon = 1e-5);
        assert_relative_eq!(s.overcompression, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn out_of_reach_is_airborne_with_policy() {
        let calc = SuspensionStateCalculationParams { airborne: AirborneJounce::HoldLast, ..Default::default() };
        let mut s = SuspensionState::default();
        step(&road(-0.5), &calc, &mut s);
        step(&road(-2.0), &calc, &mut s);
        assert!(s.is_airborne());
        assert_relative_eq!(s.jounce, 0.2, epsilon = 1e-5);
        assert_relative_eq!(s.separation, 1.3, epsilon = 1e-4);

        let mut s = SuspensionState::default();
        step(&road(-0.5), &SuspensionStateCalculationParams::default(), &mut s);
        step(&road(-2.0), &SuspensionStateCalculationParams::default(), &mut s);
        assert_relative_eq!(s.jounce, 0.0);
        assert_relative_eq!(s.jounce_speed, 0.0);
    }

    #[test]
    fn expansion_speed_limit_separates_wheel() {
        let calc = SuspensionStateCalculationParams {
            limit_expansion_velocity: true,
            max_expansion_speed: 1.0,
            ..Default::default()
        };
        let mut s = SuspensionState::default();
        step(&road(-0.4), &calc, &mut s);
        assert_relative_eq!(s.jounce, 0.3, epsilon = 1e-5);
        step(&road(-0.6), &calc, &mut s);
        // May drop at most 1 m/s * 0.01 s
        assert_relative_eq!(s.jounce, 0.29, epsilon = 1e-5);
        assert!(s.is_airborne());
        assert_relative_eq!(s.jounce_speed, -1.0, epsilon = 1e-3);
    }

    #[test]
    fn expansion_speed_limit_applies_out_of_reach() {
        let calc = SuspensionStateCalculationParams {
            limit_expansion_velocity: true,
            max_expansion_speed: 6.0,
            ..Default::default()
        };
        let mut s = SuspensionState::default();
        step(&road(-0.5), &calc, &mut s);
        assert_relative_eq!(s.jounce, 0.2, epsilon = 1e-5);

        // Road far below the reach of the wheel: extend at 0.06 per step.
        let mut previous = s.jounce;
        for _ in 0..3 {
            step(&road(-2.0), &calc, &mut s);
            assert!(s.is_airborne());
            assert_relative_eq!(previous - s.jounce, 0.06, epsilon = 1e-5);
            assert_relative_eq!(s.jounce_speed, -6.0, epsilon = 1e-2);
            previous = s.jounce;
        }
        assert_relative_eq!(s.separation, 1.3 + 0.02, epsilon = 1e-4);

        // Reaching full extension hands over to the airborne policy.
        step(&road(-2.0), &calc, &mut s);
        assert_relative_eq!(s.jounce, 0.0);
        assert!(!s.previous_jounce_valid);

        s = SuspensionState { previous_jounce_valid: true, jounce: 0.2, ..Default::default() };
        let no_hit = RoadGeometryState { hit: false, ..road(0.0) };
        step(&no_hit, &calc, &mut s);
        assert_relative_eq!(s.jounce, 0.14, epsilon = 1e-5);
        assert!(s.is_airborne());
    }

    #[test]
    fn force_is_zero_in_air_and_never_pulls() {
        let fp = SuspensionForceParams { stiffness: 1000.0, damping: 100.0, sprung_mass: 0.0 };
        let grounded = SuspensionState { jounce: 0.1, jounce_speed: -5.0, ..Default::default() };
        assert_relative_eq!(spring_damper(&fp, &grounded), 0.0);
        let grounded = SuspensionState { jounce: 0.1, jounce_speed: 0.5, ..Default::default() };
        assert_relative_eq!(spring_damper(&fp, &grounded), 150.0);
        let air = SuspensionState { jounce: 0.1, separation: 0.2, ..Default::default() };
        assert_relative_eq!(spring_damper(&fp, &air), 0.0);
    }

    #[test]
    fn load_is_projected_on_road_normal() {
        let p = susp();
        let c = SuspensionComplianceState::default();
        let mut tilted = road(0.0);
        tilted.plane.normal = Vec3::new(0.6, 0.8, 0.0);
        let mut out = SuspensionForce::default();
        resolve_suspension_force(1000.0, &p, &c, &tilted, &Pose::identity(), false, &mut out);
        assert_relative_eq!(out.normal_force, 800.0, epsilon = 1e-3);
        assert_relative_eq!(out.force, Vec3::new(0.0, 1000.0, 0.0));
    }

    #[test]
    fn compliance_interpolates_by_normalized_jounce() {
        let mut cp = SuspensionComplianceParams::default();
        assert!(cp.camber.add_pair(0.0, 0.0));
        assert!(cp.camber.add_pair(1.0, -0.1));
        let mut cs = SuspensionComplianceState::default();
        update_compliance(&cp, &susp(), 0.15, &mut cs);
        assert_relative_eq!(cs.camber, -0.05, epsilon = 1e-6);
        assert_relative_eq!(cs.suspension_force_app_point, Vec3::new(0.0, -0.15, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn sag_gives_rest_jounce() {
        let f = SuspensionForceParams::from_sag(400.0, 9.81, 0.08, 0.35);
        assert_relative_eq!(f.rest_jounce(9.81), 0.08, epsilon = 1e-4);
    }
}
