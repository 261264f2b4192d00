//! Damage Curve Interpolator
//!
//! Piecewise-linear evaluation of depth-damage curves. Depths outside the
//! curve's control points clamp to the boundary value; there is no
//! extrapolation.
//!
//! Batched evaluation (`interpolate_many`, `weighted_damage`) walks plain
//! slices with a binary search per depth, so per-call overhead is a few
//! comparisons.

use crate::reference::{DamageCurve, DamageCurveSet};
use crate::types::DamageFunctionId;

impl DamageCurve {
    /// Percent damage at `depth` (ft, relative to the first floor)
    ///
    /// NaN depths evaluate to the lowest control point.
    pub fn interpolate(&self, depth: f64) -> f64 {
        let depths = &self.depths;
        let damages = &self.damages;
        let last = depths.len() - 1;

        if depth.is_nan() || depth <= depths[0] {
            return damages[0];
        }
        if depth >= depths[last] {
            return damages[last];
        }

        // First control point strictly above depth; 1..=last given the clamps
        let hi = depths.partition_point(|&d| d <= depth);
        let lo = hi - 1;
        let span = depths[hi] - depths[lo];
        let fraction = (depth - depths[lo]) / span;

        damages[lo] + fraction * (damages[hi] - damages[lo])
    }

    /// Evaluate many depths against this curve
    pub fn interpolate_many(&self, depths: &[f64]) -> Vec<f64> {
        depths.iter().map(|&d| self.interpolate(d)).collect()
    }

    /// True when damage never decreases with depth
    pub fn is_non_decreasing(&self) -> bool {
        self.damages.windows(2).all(|w| w[1] >= w[0])
    }
}

impl DamageCurveSet {
    /// Percent damage for one damage function, `None` if the id is unknown
    pub fn interpolate(&self, id: DamageFunctionId, depth: f64) -> Option<f64> {
        self.get(id).map(|curve| curve.interpolate(depth))
    }

    /// Match-weighted average of percent damage across damage functions
    ///
    /// Unknown ids contribute nothing. An empty distribution is zero damage.
    pub fn weighted_damage(
        &self,
        functions: impl IntoIterator<Item = (DamageFunctionId, f64)>,
        depth: f64,
    ) -> f64 {
        functions
            .into_iter()
            .filter_map(|(id, weight)| self.interpolate(id, depth).map(|d| d * weight))
            .sum()
    }
}
