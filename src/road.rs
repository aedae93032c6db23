// ==============================================================================
// road.rs — ROAD GEOMETRY QUERY SURFACE + MATERIAL FRICTION
// ------------------------------------------------------------------------------
// The pipeline does not own world geometry. It asks an external collaborator
// (rapier in physics.rs, flat planes in tests) for the nearest hit along a
// wheel's suspension travel:
//
// - raycast: a single ray from the wheel centre at maximum compression
// - sweep:   the wheel cylinder swept along the same path (needed when the wheel
//            cannot be approximated as a point, e.g. kerbs and steps)
//
// Implementations must be safe to call concurrently (read access only). The
// result is reduced to a RoadGeometryState: a plane, a friction value resolved
// through the MaterialFrictionTable, and the surface velocity.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;
use crate::types::{Point3, Pose, Real, Vec3, MAX_FRICTION_MATERIALS};

/// Opaque material id reported by the geometry query.
pub type MaterialId = u32;

/// Inclusion rule forwarded to the geometry query.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadQueryFilter {
    /// Groups the wheel query belongs to.
    pub memberships: u32,
    /// Groups the query may hit.
    pub filter: u32,
}

impl Default for RoadQueryFilter {
    fn default() -> Self {
        Self { memberships: u32::MAX, filter: u32::MAX }
    }
}

/// Cylinder approximating the wheel for sweeps.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelShape {
    pub radius: Real,
    pub half_width: Real,
}

/// Nearest intersection returned by a query, world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RoadHit {
    /// Travel along the cast direction to the hit (ray) or to first touch (sweep).
    pub distance: Real,
    pub point: Point3,
    /// Unit normal pointing away from the road surface.
    pub normal: Vec3,
    pub material: MaterialId,
    /// Velocity of the road surface at `point`.
    pub velocity: Vec3,
}

pub trait RoadGeometryQuery: Sync {
    fn raycast(&self, origin: &Point3, dir: &Vec3, max_dist: Real, filter: &RoadQueryFilter) -> Option<RoadHit>;

    /// `start` places the wheel cylinder; its local Y axis is the wheel's spin axis.
    fn sweep(
        &self,
        shape: &WheelShape,
        start: &Pose,
        dir: &Vec3,
        max_dist: Real,
        filter: &RoadQueryFilter,
    ) -> Option<RoadHit>;
}

/// A query that never hits anything; every wheel stays airborne.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRoad;

impl RoadGeometryQuery for NoRoad {
    fn raycast(&self, _: &Point3, _: &Vec3, _: Real, _: &RoadQueryFilter) -> Option<RoadHit> {
        None
    }

    fn sweep(&self, _: &WheelShape, _: &Pose, _: &Vec3, _: Real, _: &RoadQueryFilter) -> Option<RoadHit> {
        None
    }
}

/// Infinite plane `normal · x + d = 0`, useful on its own and as a test double.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub d: Real,
}

impl Default for Plane {
    fn default() -> Self {
        Self { normal: Vec3::y(), d: 0.0 }
    }
}

impl Plane {
    pub fn from_point_normal(point: &Point3, normal: &Vec3) -> Self {
        let n = normal.normalize();
        Self { normal: n, d: -n.dot(&point.coords) }
    }

    #[inline]
    pub fn signed_distance(&self, p: &Point3) -> Real {
        self.normal.dot(&p.coords) + self.d
    }
}

/// A flat, uniform road: an infinite plane with one material and velocity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FlatRoad {
    pub plane: Plane,
    pub material: MaterialId,
    pub velocity: Vec3,
}

impl FlatRoad {
    pub fn ground(height: Real) -> Self {
        Self {
            plane: Plane { normal: Vec3::y(), d: -height },
            material: 0,
            velocity: Vec3::zeros(),
        }
    }
}

impl RoadGeometryQuery for FlatRoad {
    fn raycast(&self, origin: &Point3, dir: &Vec3, max_dist: Real, _: &RoadQueryFilter) -> Option<RoadHit> {
        let denom = self.plane.normal.dot(dir);
        if denom >= -1e-6 {
            return None;
        }
        let t = -self.plane.signed_distance(origin) / denom;
        if !(0.0..=max_dist).contains(&t) {
            return None;
        }
        Some(RoadHit {
            distance: t,
            point: origin + dir * t,
            normal: self.plane.normal,
            material: self.material,
            velocity: self.velocity,
        })
    }

    fn sweep(
        &self,
        shape: &WheelShape,
        start: &Pose,
        dir: &Vec3,
        max_dist: Real,
        filter: &RoadQueryFilter,
    ) -> Option<RoadHit> {
        // Lowest point of the wheel disc against the plane normal.
        let n = self.plane.normal;
        let axis = start.rotation * Vec3::y();
        let toward = n - axis * n.dot(&axis);
        let reach = if toward.norm() > 1e-6 { toward.normalize() * shape.radius } else { n * shape.half_width };
        let contact = Point3::from(start.translation.vector) - reach;
        let mut hit = self.raycast(&contact, dir, max_dist, filter)?;
        hit.point = contact + dir * hit.distance;
        Some(hit)
    }
}

// ============================================
// Road geometry state (per wheel)
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadGeometryState {
    pub plane: Plane,
    pub friction: Real,
    pub velocity: Vec3,
    pub hit: bool,
}

impl Default for RoadGeometryState {
    fn default() -> Self {
        Self { plane: Plane::default(), friction: 0.0, velocity: Vec3::zeros(), hit: false }
    }
}

// ============================================
// Material friction
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialFriction {
    pub material: MaterialId,
    pub friction: Real,
}

/// Friction coefficient per road material, with a fallback for unknown materials.
/// Shared read-only between vehicles.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialFrictionTable {
    pub entries: FixedVec<MaterialFriction, MAX_FRICTION_MATERIALS>,
    pub default_friction: Real,
}

impl Default for MaterialFrictionTable {
    fn default() -> Self {
        Self { entries: FixedVec::new(), default_friction: 1.0 }
    }
}

impl MaterialFrictionTable {
    pub fn with_default(default_friction: Real) -> Self {
        Self { entries: FixedVec::new(), default_friction }
    }

    /// Adds or replaces a material. False when the table is full.
    pub fn set(&mut self, material: MaterialId, friction: Real) -> bool {
        if let Some(e) = self.entries.iter_mut().find(|e| e.material == material) {
            e.friction = friction;
            return true;
        }
        self.entries.try_push(MaterialFriction { material, friction })
    }

    pub fn friction(&self, material: MaterialId) -> Real {
        self.entries
            .iter()
            .find(|e| e.material == material)
            .map(|e| e.friction)
            .unwrap_or(self.default_friction)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |f: Real| !(f.is_finite() && f >= 0.0);
        if bad(self.default_friction) || self.entries.iter().any(|e| bad(e.friction)) {
            return Err(VehicleError::invalid("MaterialFrictionTable", "friction values must be finite and >= 0"));
        }
        Ok(())
    }
}
