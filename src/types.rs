//! Core shared types: scalar/vector aliases, limits, frame + scale, axle layout.
// types.rs
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;

pub type Real = f32;
pub type Vec3 = nalgebra::Vector3<Real>;
pub type Point3 = nalgebra::Point3<Real>;
pub type Quat = nalgebra::UnitQuaternion<Real>;
pub type Pose = nalgebra::Isometry3<Real>;

// ============================================
// Compile-time capacities
// ============================================
pub const MAX_WHEELS: usize = 20;
pub const MAX_AXLES: usize = 20;
pub const MAX_GEARS: usize = 32;
pub const MAX_COMMAND_VALUES: usize = 8;
pub const MAX_SPEED_RESPONSES: usize = 64;
pub const MAX_TORQUE_CURVE_POINTS: usize = 8;
pub const MAX_TANK_TRACKS: usize = 4;
pub const MAX_ANTI_ROLL_BARS: usize = 10;
pub const MAX_COMPLIANCE_POINTS: usize = 3;
pub const MAX_FRICTION_MATERIALS: usize = 32;
pub const MAX_BRAKE_COMMANDS: usize = 2;

pub const FRICTION_VS_SLIP_POINTS: usize = 3;

/// Per-wheel value array sized for the largest supported vehicle.
pub type PerWheel<T> = [T; MAX_WHEELS];

// ============================================
// Frame
// ============================================

/// A signed principal axis of the rigid-body local frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Axis {
    pub fn vector(self) -> Vec3 {
        match self {
            Axis::PosX => Vec3::x(),
            Axis::NegX => -Vec3::x(),
            Axis::PosY => Vec3::y(),
            Axis::NegY => -Vec3::y(),
            Axis::PosZ => Vec3::z(),
            Axis::NegZ => -Vec3::z(),
        }
    }
}

/// Which local axes are longitudinal (forward), lateral and vertical.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub lng: Axis,
    pub lat: Axis,
    pub vrt: Axis,
}

impl Default for Frame {
    fn default() -> Self {
        // +Z forward, +X lateral (left), +Y up
        Self { lng: Axis::PosZ, lat: Axis::PosX, vrt: Axis::PosY }
    }
}

impl Frame {
    pub fn lng_axis(&self) -> Vec3 { self.lng.vector() }
    pub fn lat_axis(&self) -> Vec3 { self.lat.vector() }
    pub fn vrt_axis(&self) -> Vec3 { self.vrt.vector() }

    /// Columns are (lng, lat, vrt); maps frame coordinates to local coordinates.
    pub fn basis(&self) -> nalgebra::Matrix3<Real> {
        nalgebra::Matrix3::from_columns(&[self.lng_axis(), self.lat_axis(), self.vrt_axis()])
    }

    /// Right-handed: lat = vrt × lng.
    pub fn is_valid(&self) -> bool {
        let lat = self.vrt_axis().cross(&self.lng_axis());
        (lat - self.lat_axis()).norm() < 1e-6
    }

    /// Rotation taking vectors expressed against `self` onto `target`.
    pub fn rotation_to(&self, target: &Frame) -> nalgebra::Matrix3<Real> {
        target.basis() * self.basis().transpose()
    }
}

/// Length units per metre.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub scale: Real,
}

impl Default for Scale {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Scale {
    pub fn is_valid(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }

    pub fn ratio_to(&self, target: &Scale) -> Real {
        target.scale / self.scale
    }
}

/// Re-expresses a Params block in another frame and length scale.
///
/// Identical source and target frame/scale must reproduce the input.
pub trait TransformAndScale: Sized {
    fn transform_and_scale(
        &self,
        src_frame: &Frame,
        trg_frame: &Frame,
        src_scale: &Scale,
        trg_scale: &Scale,
    ) -> Self;
}

#[inline]
pub(crate) fn transform_vec(v: &Vec3, src: &Frame, trg: &Frame) -> Vec3 {
    src.rotation_to(trg) * v
}

#[inline]
pub(crate) fn transform_pose(p: &Pose, src: &Frame, trg: &Frame, scale: Real) -> Pose {
    if src == trg {
        return Pose::from_parts((p.translation.vector * scale).into(), p.rotation);
    }
    let r = src.rotation_to(trg);
    let rot = nalgebra::Rotation3::from_matrix_unchecked(r);
    let translation = r * p.translation.vector * scale;
    let rotation = Quat::from_rotation_matrix(&(rot * p.rotation.to_rotation_matrix() * rot.transpose()));
    Pose::from_parts(translation.into(), rotation)
}

// ============================================
// Axle description
// ============================================

/// Groups wheel indices into axles. Every wheel belongs to exactly one axle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxleDescription {
    pub axles: FixedVec<FixedVec<u32, MAX_WHEELS>, MAX_AXLES>,
}

impl AxleDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Front-to-back pairs: axle i holds wheels (2i, 2i+1).
    pub fn paired(nb_axles: usize) -> Self {
        let mut desc = Self::new();
        for a in 0..nb_axles as u32 {
            desc.add_axle(&[2 * a, 2 * a + 1]);
        }
        desc
    }

    /// Returns false (and leaves the description unchanged) on overflow.
    pub fn add_axle(&mut self, wheel_ids: &[u32]) -> bool {
        if self.nb_wheels() + wheel_ids.len() > MAX_WHEELS {
            return false;
        }
        let Some(axle) = FixedVec::from_slice(wheel_ids) else { return false };
        self.axles.try_push(axle)
    }

    pub fn nb_axles(&self) -> usize {
        self.axles.len()
    }

    pub fn nb_wheels(&self) -> usize {
        self.axles.iter().map(|a| a.len()).sum()
    }

    pub fn nb_wheels_on_axle(&self, axle: usize) -> usize {
        self.axles[axle].len()
    }

    pub fn wheel_on_axle(&self, slot: usize, axle: usize) -> u32 {
        self.axles[axle][slot]
    }

    pub fn axle_of_wheel(&self, wheel: u32) -> Option<usize> {
        self.axles.iter().position(|a| a.contains(&wheel))
    }

    /// All wheel ids in axle order.
    pub fn wheel_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.axles.iter().flat_map(|a| a.iter().copied())
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.nb_wheels();
        if self.nb_axles() == 0 {
            return Err(VehicleError::invalid("AxleDescription", "no axles"));
        }
        let mut seen = [false; MAX_WHEELS];
        for id in self.wheel_ids() {
            let i = id as usize;
            if i >= n {
                return Err(VehicleError::invalid(
                    "AxleDescription",
                    format!("wheel id {id} out of range for {n} wheels"),
                ));
            }
            if seen[i] {
                return Err(VehicleError::invalid(
                    "AxleDescription",
                    format!("wheel {id} appears on more than one axle"),
                ));
            }
            seen[i] = true;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "axle description rejected");
                false
            }
        }
    }
}

#[inline]
pub fn sign(x: Real) -> Real {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Projects `v` onto the plane with unit normal `n` and normalizes; `fallback` if degenerate.
#[inline]
pub fn project_on_plane(v: &Vec3, n: &Vec3, fallback: Vec3) -> Vec3 {
    let p = v - n * v.dot(n);
    let m = p.norm();
    if m > 1e-6 { p / m } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_frame_is_right_handed() {
        assert!(Frame::default().is_valid());
        let bad = Frame { lng: Axis::PosZ, lat: Axis::NegX, vrt: Axis::PosY };
        assert!(!bad.is_valid());
    }

    #[test]
    fn frame_rotation_maps_axes() {
        let src = Frame::default();
        let trg = Frame { lng: Axis::PosX, lat: Axis::NegZ, vrt: Axis::PosY };
        assert!(trg.is_valid());
        let v = transform_vec(&src.lng_axis(), &src, &trg);
        assert_relative_eq!(v, trg.lng_axis(), epsilon = 1e-6);
    }

    #[test]
    fn axle_description_rejects_duplicates() {
        let mut desc = AxleDescription::new();
        assert!(desc.add_axle(&[0, 1]));
        assert!(desc.add_axle(&[1, 2]));
        assert!(desc.validate().is_err());

        let ok = AxleDescription::paired(2);
        assert!(ok.is_valid());
        assert_eq!(ok.nb_wheels(), 4);
        assert_eq!(ok.axle_of_wheel(3), Some(1));
        assert_eq!(ok.wheel_on_axle(1, 0), 1);
    }

    #[test]
    fn axle_description_enforces_wheel_limit() {
        let mut desc = AxleDescription::new();
        let many: Vec<u32> = (0..MAX_WHEELS as u32).collect();
        assert!(desc.add_axle(&many));
        assert!(!desc.add_axle(&[0]));
        assert_eq!(desc.nb_axles(), 1);
    }
}
