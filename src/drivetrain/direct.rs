//! Direct drive: each wheel receives its own throttle response, no engine or clutch.

use serde::{Deserialize, Serialize};

use crate::command::{CommandResponseParams, DirectGear};
use crate::error::Result;
use crate::types::{AxleDescription, Frame, PerWheel, Real, Scale, TransformAndScale};
use crate::wheel::{integrate_wheel, WheelParams, WheelRigidBody1dState, WheelTorques};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectDriveParams {
    /// Throttle -> wheel torque (N·m).
    pub throttle_response: CommandResponseParams,
}

impl DirectDriveParams {
    pub fn validate(&self, axle: &AxleDescription) -> Result<()> {
        self.throttle_response.validate(axle)
    }
}

impl TransformAndScale for DirectDriveParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r2 = src.ratio_to(trg).powi(2);
        let mut throttle_response = self.throttle_response.transform_and_scale(src_frame, trg_frame, src, trg);
        throttle_response.max_response *= r2;
        Self { throttle_response }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectDriveState {
    /// Gear seen on the last update.
    pub gear: DirectGear,
}

/// Integrates every wheel independently.
pub fn update_direct_drive(
    wheel_ids: &[u32],
    wheels: &PerWheel<WheelParams>,
    torques: &PerWheel<WheelTorques>,
    dt: Real,
    states: &mut PerWheel<WheelRigidBody1dState>,
) {
    for &w in wheel_ids {
        let i = w as usize;
        integrate_wheel(&wheels[i], &torques[i], dt, &mut states[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_WHEELS;

    #[test]
    fn unconnected_wheels_stay_put() {
        let wheels = [WheelParams::default(); MAX_WHEELS];
        let mut torques = [WheelTorques::default(); MAX_WHEELS];
        torques[1].drive = 100.0;
        let mut states = [WheelRigidBody1dState::default(); MAX_WHEELS];
        update_direct_drive(&[0, 1], &wheels, &torques, 0.01, &mut states);
        assert_eq!(states[0].rotation_speed, 0.0);
        assert!(states[1].rotation_speed > 0.0);
    }
}
