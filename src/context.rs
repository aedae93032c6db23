//! Simulation-wide values shared by every vehicle during an update.

use crate::road::{MaterialFrictionTable, RoadGeometryQuery};
use crate::rigid_body::RigidBodyUpdateMode;
use crate::tire::{TireSlipParams, TireStickyParams};
use crate::types::{Frame, Real, Scale, Vec3};

/// Borrowed for the duration of one update; vehicles only read it.
#[derive(Copy, Clone)]
pub struct SimulationContext<'a> {
    pub gravity: Vec3,
    pub frame: Frame,
    pub scale: Scale,
    pub tire_slip: TireSlipParams,
    pub tire_sticky: TireStickyParams,
    /// Below this forward speed an unactuated wheel's angle follows the ground.
    pub wheel_angle_threshold_speed: Real,
    pub rigid_body_update: RigidBodyUpdateMode,
    pub road: &'a dyn RoadGeometryQuery,
    pub materials: &'a MaterialFrictionTable,
}

impl<'a> SimulationContext<'a> {
    /// Defaults with the given road and material table.
    pub fn new(road: &'a dyn RoadGeometryQuery, materials: &'a MaterialFrictionTable) -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            frame: Frame::default(),
            scale: Scale::default(),
            tire_slip: TireSlipParams::default(),
            tire_sticky: TireStickyParams::default(),
            wheel_angle_threshold_speed: 1.0,
            rigid_body_update: RigidBodyUpdateMode::default(),
            road,
            materials,
        }
    }

    pub fn gravity_magnitude(&self) -> Real {
        self.gravity.norm()
    }
}

impl std::fmt::Debug for SimulationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("gravity", &self.gravity)
            .field("frame", &self.frame)
            .field("scale", &self.scale)
            .field("rigid_body_update", &self.rigid_body_update)
            .finish_non_exhaustive()
    }
}
