// ==============================================================================
// connector.rs — CONSTRAINT ROWS HANDED TO THE PHYSICS ENGINE
// ------------------------------------------------------------------------------
// When a suspension compresses beyond its travel the spring alone cannot stop
// the chassis from sinking into the road. The vehicle publishes one row per
// such wheel: a unilateral velocity constraint along the suspension axis.
//
// Ownership: the physics world owns connector objects keyed by
// ConstraintHandle. A vehicle only remembers its handle. After each vehicle
// update the world copies the vehicle's ConstraintState into its connector,
// then calls prepare(dt) while solving.
//
// Rows carry the error (overcompression); prepare() turns it into a bias
// velocity with a Baumgarte factor so the penetration is removed over a few
// steps.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::fixed::FixedVec;
use crate::types::{Real, Vec3, MAX_WHEELS};

/// Fraction of the positional error corrected per step.
pub const LIMIT_ERROR_REDUCTION: Real = 0.2;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRow {
    pub wheel: u32,
    /// World position of the suspension attachment.
    pub point: Vec3,
    /// Application point relative to the centre of mass, world frame.
    pub arm: Vec3,
    /// Unit direction the chassis is pushed along, world frame.
    pub direction: Vec3,
    /// Overcompression (m).
    pub error: Real,
    /// Separation velocity the solver must reach along `direction`.
    pub bias_velocity: Real,
}

impl Default for ConstraintRow {
    fn default() -> Self {
        Self { wheel: 0, point: Vec3::zeros(), arm: Vec3::zeros(), direction: Vec3::y(), error: 0.0, bias_velocity: 0.0 }
    }
}

/// Rows written by the vehicle's constraint component.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintState {
    pub rows: FixedVec<ConstraintRow, MAX_WHEELS>,
}

/// Opaque key into the physics world's connector registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintHandle(pub u64);

pub trait ConstraintConnector: Send + Sync {
    /// Rows for the coming solve. Empty once released.
    fn prepare(&mut self, dt: Real) -> &[ConstraintRow];

    /// Drops all rows; the connector stays registered but inert.
    fn release(&mut self);

    /// The world origin moved by `shift`; rows are relative to the centre of mass.
    fn shift_origin(&mut self, shift: &Vec3);
}

#[derive(Clone, Debug, Default)]
pub struct VehicleConstraintConnector {
    state: ConstraintState,
    released: bool,
}

impl VehicleConstraintConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the vehicle's latest rows.
    pub fn load(&mut self, state: &ConstraintState) {
        if !self.released {
            self.state = *state;
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl ConstraintConnector for VehicleConstraintConnector {
    fn prepare(&mut self, dt: Real) -> &[ConstraintRow] {
        if self.released || dt <= 0.0 {
            return &[];
        }
        for row in self.state.rows.iter_mut() {
            row.bias_velocity = row.error * LIMIT_ERROR_REDUCTION / dt;
        }
        &self.state.rows
    }

    fn release(&mut self) {
        self.state.rows.clear();
        self.released = true;
    }

    fn shift_origin(&mut self, shift: &Vec3) {
        // Arms are relative to the centre of mass and do not move.
        for row in self.state.rows.iter_mut() {
            row.point -= shift;
        }
    }
}
