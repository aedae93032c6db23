// tire/grip.rs — tire load/friction and the low-speed sticky state.

use serde::{Deserialize, Serialize};

use crate::tire::params::{TireForceParams, TireStickyParams};
use crate::tire::slip::TireSpeedState;
use crate::types::Real;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireGripState {
    /// Filtered load (N).
    pub load: Real,
    /// Road friction × friction-vs-slip multiplier.
    pub friction: Real,
}

pub fn update_grip(
    params: &TireForceParams,
    suspension_load: Real,
    road_friction: Real,
    long_slip: Real,
    airborne: bool,
    out: &mut TireGripState,
) {
    if airborne || suspension_load <= 0.0 {
        *out = TireGripState::default();
        return;
    }
    out.load = params.filtered_load(suspension_load);
    out.friction = road_friction * params.friction_multiplier(long_slip);
}

/// Per-axis timers, [longitudinal, lateral].
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireStickyState {
    pub low_speed_time: [Real; 2],
    pub active: [bool; 2],
}

/// An axis turns sticky after its speed has stayed below threshold for
/// `threshold_time`. Drive torque or leaving the ground resets it.
pub fn update_sticky(
    params: &TireStickyParams,
    speeds: &TireSpeedState,
    drive_applied: bool,
    airborne: bool,
    dt: Real,
    state: &mut TireStickyState,
) {
    let lng = TireStickyParams::LONGITUDINAL;
    let lat = TireStickyParams::LATERAL;
    let slow = [
        speeds.lng.abs() < params.axes[lng].threshold_speed,
        // Sliding sideways slowly while rolling forward is not standstill.
        speeds.lng.abs() < params.axes[lat].threshold_speed && speeds.lat.abs() < params.axes[lat].threshold_speed,
    ];
    for axis in [lng, lat] {
        if airborne || drive_applied || !slow[axis] {
            state.low_speed_time[axis] = 0.0;
            state.active[axis] = false;
            continue;
        }
        state.low_speed_time[axis] += dt;
        state.active[axis] = state.low_speed_time[axis] >= params.axes[axis].threshold_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grip_is_zero_in_air() {
        let p = TireForceParams::default();
        let mut g = TireGripState::default();
        update_grip(&p, 3000.0, 0.9, 0.0, true, &mut g);
        assert_eq!(g, TireGripState::default());
        update_grip(&p, 3000.0, 0.9, 0.0, false, &mut g);
        assert_relative_eq!(g.load, 3000.0, epsilon = 1e-2);
        assert_relative_eq!(g.friction, 0.9);
    }

    #[test]
    fn sticky_activates_after_threshold_time() {
        let p = TireStickyParams::default();
        let mut s = TireStickyState::default();
        let still = TireSpeedState { lng: 0.05, lat: 0.0 };
        for _ in 0..9 {
            update_sticky(&p, &still, false, false, 0.1, &mut s);
        }
        assert!(!s.active[0]);
        update_sticky(&p, &still, false, false, 0.11, &mut s);
        assert!(s.active[0] && s.active[1]);

        update_sticky(&p, &still, true, false, 0.1, &mut s);
        assert!(!s.active[0] && !s.active[1]);
        assert_relative_eq!(s.low_speed_time[0], 0.0);
    }

    #[test]
    fn lateral_axis_ignores_sideways_creep_at_speed() {
        let p = TireStickyParams::default();
        let mut s = TireStickyState::default();
        let rolling = TireSpeedState { lng: 5.0, lat: 0.01 };
        for _ in 0..30 {
            update_sticky(&p, &rolling, false, false, 0.1, &mut s);
        }
        assert!(!s.active[1]);
    }
}
