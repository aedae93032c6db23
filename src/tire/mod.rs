//! Tire model: contact directions, slip, grip, sticky low-speed behaviour and
//! the combined-slip force model.
// tire/mod.rs

pub mod force;
pub mod grip;
pub mod params;
pub mod slip;

use serde::{Deserialize, Serialize};

pub use force::{compute_tire_force, TireForceInput, TireForceState};
pub use grip::{update_grip, update_sticky, TireGripState, TireStickyState};
pub use params::{TireForceParams, TireSlipParams, TireStickyAxis, TireStickyParams};
pub use slip::{
    slip_denominators, update_camber, update_directions, update_slip, update_speeds, TireCamberState,
    TireDirectionState, TireSlipState, TireSpeedState,
};

/// Everything the tire stage writes for one wheel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireState {
    pub directions: TireDirectionState,
    pub speeds: TireSpeedState,
    pub slip: TireSlipState,
    pub camber: TireCamberState,
    pub grip: TireGripState,
    pub sticky: TireStickyState,
    pub force: TireForceState,
}
