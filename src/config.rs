//! Simulation-wide configuration.
//!
//! Everything a [`SimulationContext`] carries apart from the borrowed road and
//! material table, plus the outer timestep and the substep count applied to
//! each vehicle's substep group.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::SimulationContext;
use crate::error::{Result, VehicleError};
use crate::rigid_body::{ForceApplication, Integration, RigidBodyUpdateMode};
use crate::road::{MaterialFrictionTable, RoadGeometryQuery};
use crate::tire::{TireSlipParams, TireStickyParams};
use crate::types::{Frame, Real, Scale, Vec3};

/// Main configuration for a vehicle simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Outer timestep (seconds).
    pub timestep: Real,
    /// Passes of each vehicle's substep group per outer step.
    pub substeps: u32,
    pub gravity: Vec3,
    pub frame: Frame,
    pub scale: Scale,
    pub tire_slip: TireSlipParams,
    pub tire_sticky: TireStickyParams,
    /// m/s
    pub wheel_angle_threshold_speed: Real,
    pub rigid_body_update: RigidBodyUpdateMode,
    pub materials: MaterialFrictionTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            substeps: 4,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            frame: Frame::default(),
            scale: Scale::default(),
            tire_slip: TireSlipParams::default(),
            tire_sticky: TireStickyParams::default(),
            wheel_angle_threshold_speed: 1.0,
            rigid_body_update: RigidBodyUpdateMode::default(),
            materials: MaterialFrictionTable::default(),
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn with_timestep(timestep: Real) -> Self {
        Self { timestep, ..Default::default() }
    }

    /// Vehicles integrate themselves and hand the engine a velocity change.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            rigid_body_update: RigidBodyUpdateMode {
                integration: Integration::Immediate,
                apply: ForceApplication::VelocityChange,
            },
            ..Default::default()
        }
    }

    /// Vehicles only accumulate impulses; the engine integrates.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            rigid_body_update: RigidBodyUpdateMode {
                integration: Integration::Deferred,
                apply: ForceApplication::VelocityChange,
            },
            ..Default::default()
        }
    }

    #[must_use]
    pub fn substeps(mut self, substeps: u32) -> Self {
        self.substeps = substeps;
        self
    }

    #[must_use]
    pub fn gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vec3::zeros();
        self
    }

    #[must_use]
    pub fn frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    #[must_use]
    pub fn scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn tire_sticky(mut self, sticky: TireStickyParams) -> Self {
        self.tire_sticky = sticky;
        self
    }

    #[must_use]
    pub fn rigid_body_update(mut self, mode: RigidBodyUpdateMode) -> Self {
        self.rigid_body_update = mode;
        self
    }

    #[must_use]
    pub fn materials(mut self, materials: MaterialFrictionTable) -> Self {
        self.materials = materials;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(VehicleError::invalid("SimulationConfig", format!("timestep must be > 0, got {}", self.timestep)));
        }
        if self.timestep > 1.0 {
            return Err(VehicleError::invalid("SimulationConfig", "timestep > 1 second is likely an error"));
        }
        if self.substeps == 0 {
            return Err(VehicleError::invalid("SimulationConfig", "substeps must be >= 1"));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(VehicleError::invalid("SimulationConfig", "gravity must be finite"));
        }
        if !self.frame.is_valid() {
            return Err(VehicleError::invalid("SimulationConfig", "frame axes must form a right-handed basis"));
        }
        if !self.scale.is_valid() {
            return Err(VehicleError::invalid("SimulationConfig", "scale must be > 0"));
        }
        if !(self.wheel_angle_threshold_speed.is_finite() && self.wheel_angle_threshold_speed >= 0.0) {
            return Err(VehicleError::invalid("SimulationConfig", "wheel_angle_threshold_speed must be >= 0"));
        }
        self.tire_slip.validate()?;
        self.tire_sticky.validate()?;
        self.materials.validate()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn frequency(&self) -> Real {
        1.0 / self.timestep
    }

    /// Context for one update against `road`.
    pub fn context<'a>(&'a self, road: &'a dyn RoadGeometryQuery) -> SimulationContext<'a> {
        SimulationContext {
            gravity: self.gravity,
            frame: self.frame,
            scale: self.scale,
            tire_slip: self.tire_slip,
            tire_sticky: self.tire_sticky,
            wheel_angle_threshold_speed: self.wheel_angle_threshold_speed,
            rigid_body_update: self.rigid_body_update,
            road,
            materials: &self.materials,
        }
    }
}
