//! AAL Integrator
//!
//! Average annualized loss from a loss-vs-return-period curve by a discrete
//! Riemann sum over annual exceedance probability (1 / RP):
//!
//! ```text
//! AAL = sum_i (1/RP[i] - 1/RP[i+1]) * (L[i] + L[i+1]) / 2   for i < last
//!     + (1/RP[last]) * L[last]
//! ```
//!
//! The tail term treats the rarest event's loss as the loss for every
//! rarer event.

use crate::error::AalError;
use crate::types::{BandValues, BuildingId};
use serde::{Deserialize, Serialize};

/// Minimum number of return periods for a meaningful integral
pub const MIN_RETURN_PERIODS: usize = 3;

/// How zero-loss return periods enter the integral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AalMode {
    /// Every supplied return period contributes, zero losses included
    #[default]
    NonTruncated,
    /// Terms anchored on a zero-loss return period are dropped; remaining
    /// points keep their original neighbours
    Truncated,
}

/// Per-building AAL for the low / best / high loss curves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AalSummary {
    pub building_id: BuildingId,
    pub aal_min: f64,
    pub aal_best: f64,
    pub aal_max: f64,
}

fn check_curve(points: &[(u32, f64)]) -> Result<(), AalError> {
    if points.len() < MIN_RETURN_PERIODS {
        return Err(AalError::TooFewReturnPeriods { supplied: points.len() });
    }
    for (index, &(rp, loss)) in points.iter().enumerate() {
        if rp == 0 {
            return Err(AalError::NonPositiveReturnPeriod { value: rp });
        }
        if !loss.is_finite() || loss < 0.0 {
            return Err(AalError::InvalidLoss { index });
        }
        if index > 0 && rp <= points[index - 1].0 {
            return Err(AalError::UnsortedReturnPeriods { index });
        }
    }
    Ok(())
}

/// Integrate one loss curve
///
/// `points` are `(return_period, loss)` in strictly ascending return
/// period. At least [`MIN_RETURN_PERIODS`] points are required.
pub fn annualized_loss(points: &[(u32, f64)], mode: AalMode) -> Result<f64, AalError> {
    check_curve(points)?;

    let keep = |loss: f64| match mode {
        AalMode::NonTruncated => true,
        AalMode::Truncated => loss != 0.0,
    };

    let mut aal = 0.0;
    for pair in points.windows(2) {
        let (rp_lo, loss_lo) = pair[0];
        let (rp_hi, loss_hi) = pair[1];
        if keep(loss_lo) {
            let width = 1.0 / rp_lo as f64 - 1.0 / rp_hi as f64;
            aal += width * (loss_lo + loss_hi) / 2.0;
        }
    }

    if let Some(&(rp_last, loss_last)) = points.last() {
        if keep(loss_last) {
            aal += loss_last / rp_last as f64;
        }
    }

    Ok(aal)
}

/// Integrate the low, best and high curves independently
pub fn annualized_band(points: &[(u32, BandValues)], mode: AalMode) -> Result<BandValues, AalError> {
    let band = |pick: fn(&BandValues) -> f64| -> Result<f64, AalError> {
        let curve: Vec<(u32, f64)> = points.iter().map(|(rp, b)| (*rp, pick(b))).collect();
        annualized_loss(&curve, mode)
    };

    Ok(BandValues {
        low: band(|b| b.low)?,
        best: band(|b| b.best)?,
        high: band(|b| b.high)?,
    })
}

impl AalSummary {
    pub fn from_band(building_id: BuildingId, band: BandValues) -> Self {
        Self {
            building_id,
            aal_min: band.low,
            aal_best: band.best,
            aal_max: band.high,
        }
    }
}
