// ==============================================================================
// tire/params.rs — TIRE PARAMETERS (PER WHEEL + SIMULATION-WIDE)
// ------------------------------------------------------------------------------
// Per wheel (TireForceParams):
// - lateral stiffness curve: lat_stiff_y * rest_load * smooth(load / (lat_stiff_x * rest_load))
// - longitudinal stiffness (N per unit slip), camber stiffness (N per rad)
// - friction multiplier vs. longitudinal slip (3 points)
// - load filter (normalized load -> filtered normalized load)
// - pneumatic trail + aligning moment clamp
//
// Simulation-wide (live on SimulationContext):
// - TireSlipParams: minimum slip denominators (keep slip finite near standstill)
// - TireStickyParams: low-speed sticky thresholds and damping per direction
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};
use crate::types::{Frame, Real, Scale, TransformAndScale, FRICTION_VS_SLIP_POINTS};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireForceParams {
    /// Normalized load at which lateral stiffness saturates.
    pub lat_stiff_x: Real,
    /// Lateral stiffness per unit rest load at saturation (1/rad).
    pub lat_stiff_y: Real,
    /// N per unit longitudinal slip.
    pub long_stiff: Real,
    /// N per rad of camber.
    pub camber_stiff: Real,
    /// Load the tire carries at rest (N).
    pub rest_load: Real,
    /// (longitudinal slip, friction multiplier), ascending slip.
    pub friction_vs_slip: [[Real; 2]; FRICTION_VS_SLIP_POINTS],
    /// [(min normalized load, filtered), (max normalized load, filtered)]
    pub load_filter: [[Real; 2]; 2],
    /// Trail at zero slip (m).
    pub pneumatic_trail: Real,
    /// Aligning moment clamp (N·m).
    pub max_aligning_moment: Real,
}

impl Default for TireForceParams {
    fn default() -> Self {
        Self {
            lat_stiff_x: 2.0,
            lat_stiff_y: 17.0,
            long_stiff: 25_000.0,
            camber_stiff: 0.0,
            rest_load: 3_500.0,
            friction_vs_slip: [[0.0, 1.0], [0.1, 1.0], [1.0, 1.0]],
            load_filter: [[0.0, 0.0], [3.0, 3.0]],
            pneumatic_trail: 0.08,
            max_aligning_moment: 4_500.0,
        }
    }
}

impl TireForceParams {
    /// Friction multiplier for the magnitude of longitudinal slip.
    pub fn friction_multiplier(&self, long_slip: Real) -> Real {
        let s = long_slip.abs();
        let pts = &self.friction_vs_slip;
        if s <= pts[0][0] {
            return pts[0][1];
        }
        for w in pts.windows(2) {
            let ([x0, y0], [x1, y1]) = (w[0], w[1]);
            if s <= x1 {
                let t = (s - x0) / (x1 - x0).max(1e-6);
                return y0 + (y1 - y0) * t;
            }
        }
        pts[FRICTION_VS_SLIP_POINTS - 1][1]
    }

    /// Filtered tire load (N) for a raw load (N).
    pub fn filtered_load(&self, load: Real) -> Real {
        let [[x0, y0], [x1, y1]] = self.load_filter;
        let norm = load / self.rest_load;
        let filtered = if norm <= x0 {
            y0
        } else if norm >= x1 {
            y1
        } else {
            y0 + (y1 - y0) * (norm - x0) / (x1 - x0)
        };
        filtered * self.rest_load
    }

    /// Lateral stiffness (N per unit tan(slip angle)) at a filtered load.
    pub fn lateral_stiffness(&self, filtered_load: Real) -> Real {
        let x = (3.0 * filtered_load / (self.lat_stiff_x * self.rest_load)).clamp(0.0, 3.0);
        let smooth = x - x * x / 3.0 + x * x * x / 27.0;
        self.lat_stiff_y * self.rest_load * smooth
    }

    pub fn validate(&self) -> Result<()> {
        let pos = |v: Real| v.is_finite() && v > 0.0;
        let non_neg = |v: Real| v.is_finite() && v >= 0.0;
        if !(pos(self.lat_stiff_x) && pos(self.lat_stiff_y) && pos(self.long_stiff) && pos(self.rest_load)) {
            return Err(VehicleError::invalid("TireForceParams", "stiffness terms and rest_load must be > 0"));
        }
        if !(non_neg(self.camber_stiff) && non_neg(self.pneumatic_trail) && non_neg(self.max_aligning_moment)) {
            return Err(VehicleError::invalid("TireForceParams", "camber_stiff, pneumatic_trail and max_aligning_moment must be >= 0"));
        }
        let pts = &self.friction_vs_slip;
        if pts.windows(2).any(|w| w[1][0] <= w[0][0]) || pts.iter().any(|p| !non_neg(p[1])) {
            return Err(VehicleError::invalid("TireForceParams", "friction_vs_slip must have ascending slip and friction >= 0"));
        }
        let [[x0, y0], [x1, y1]] = self.load_filter;
        if !(x1 > x0 && non_neg(x0) && non_neg(y0) && y1 >= y0) {
            return Err(VehicleError::invalid("TireForceParams", "load_filter must be ascending and non-negative"));
        }
        Ok(())
    }
}

impl TransformAndScale for TireForceParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        // Loads and forces scale with length, slips are dimensionless.
        let r = src.ratio_to(trg);
        Self {
            long_stiff: self.long_stiff * r,
            camber_stiff: self.camber_stiff * r,
            rest_load: self.rest_load * r,
            pneumatic_trail: self.pneumatic_trail * r,
            max_aligning_moment: self.max_aligning_moment * r * r,
            ..*self
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireSlipParams {
    /// m/s, used when the wheel has no drive or brake torque.
    pub min_passive_long_slip_denominator: Real,
    /// m/s, used when drive or brake torque is applied.
    pub min_active_long_slip_denominator: Real,
    /// m/s
    pub min_lat_slip_denominator: Real,
}

impl Default for TireSlipParams {
    fn default() -> Self {
        Self {
            min_passive_long_slip_denominator: 4.0,
            min_active_long_slip_denominator: 0.1,
            min_lat_slip_denominator: 1.0,
        }
    }
}

impl TireSlipParams {
    pub fn validate(&self) -> Result<()> {
        let pos = |v: Real| v.is_finite() && v > 0.0;
        if !(pos(self.min_passive_long_slip_denominator)
            && pos(self.min_active_long_slip_denominator)
            && pos(self.min_lat_slip_denominator))
        {
            return Err(VehicleError::invalid("TireSlipParams", "slip denominators must be > 0"));
        }
        Ok(())
    }
}

impl TransformAndScale for TireSlipParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        Self {
            min_passive_long_slip_denominator: self.min_passive_long_slip_denominator * r,
            min_active_long_slip_denominator: self.min_active_long_slip_denominator * r,
            min_lat_slip_denominator: self.min_lat_slip_denominator * r,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireStickyAxis {
    /// m/s
    pub threshold_speed: Real,
    /// s spent below `threshold_speed` before the axis turns sticky
    pub threshold_time: Real,
    /// Damping per unit load (s/m): force = -damping * load * speed
    pub damping: Real,
}

/// Low-speed sticky tire behaviour, [longitudinal, lateral].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireStickyParams {
    pub axes: [TireStickyAxis; 2],
}

impl Default for TireStickyParams {
    fn default() -> Self {
        Self {
            axes: [
                TireStickyAxis { threshold_speed: 0.2, threshold_time: 1.0, damping: 1.0 },
                TireStickyAxis { threshold_speed: 0.2, threshold_time: 1.0, damping: 0.1 },
            ],
        }
    }
}

impl TireStickyParams {
    pub const LONGITUDINAL: usize = 0;
    pub const LATERAL: usize = 1;

    pub fn validate(&self) -> Result<()> {
        for a in &self.axes {
            if !(a.threshold_speed >= 0.0 && a.threshold_time >= 0.0 && a.damping >= 0.0) {
                return Err(VehicleError::invalid("TireStickyParams", "thresholds and damping must be >= 0"));
            }
        }
        Ok(())
    }
}

impl TransformAndScale for TireStickyParams {
    fn transform_and_scale(&self, _: &Frame, _: &Frame, src: &Scale, trg: &Scale) -> Self {
        let r = src.ratio_to(trg);
        let mut out = *self;
        for a in out.axes.iter_mut() {
            a.threshold_speed *= r;
            a.damping /= r;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn friction_curve_interpolates_and_clamps() {
        let p = TireForceParams {
            friction_vs_slip: [[0.0, 1.0], [0.1, 1.2], [1.0, 0.8]],
            ..TireForceParams::default()
        };
        assert_relative_eq!(p.friction_multiplier(0.05), 1.1, epsilon = 1e-6);
        assert_relative_eq!(p.friction_multiplier(-0.1), 1.2, epsilon = 1e-6);
        assert_relative_eq!(p.friction_multiplier(5.0), 0.8, epsilon = 1e-6);
    }

    #[test]
    fn lateral_stiffness_saturates() {
        let p = TireForceParams::default();
        let sat = p.lat_stiff_y * p.rest_load;
        assert_relative_eq!(p.lateral_stiffness(10.0 * p.rest_load), sat, epsilon = 1e-2);
        assert!(p.lateral_stiffness(0.5 * p.rest_load) < sat);
        assert_relative_eq!(p.lateral_stiffness(0.0), 0.0);
    }

    #[test]
    fn load_filter_clamps() {
        let p = TireForceParams { load_filter: [[0.5, 0.5], [2.0, 1.5]], ..TireForceParams::default() };
        assert_relative_eq!(p.filtered_load(0.0), 0.5 * p.rest_load);
        assert_relative_eq!(p.filtered_load(10.0 * p.rest_load), 1.5 * p.rest_load);
        assert!(p.validate().is_ok());
    }
}
