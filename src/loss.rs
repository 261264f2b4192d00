//! Loss Calculator
//!
//! Percent damage and monetary loss per building, return period and
//! component.
//!
//! - depth in structure = raw depth at the building - first-floor height
//! - raw depth <= 0 (dry at the surface) -> zero loss for every component
//! - percent damage = match-weighted average of the assigned curves
//! - loss = valuation x percent / 100, then optional deductible / limit
//!
//! With a depth uncertainty (one standard deviation) the curves are also
//! evaluated at depth -/+ sigma, giving low / high bands next to the best
//! estimate.

use crate::classify::ClassifiedBuilding;
use crate::matcher::BuildingMatch;
use crate::reference::DamageCurveSet;
use crate::types::{BandValues, DamageStatistics, HazardSample, LossRecord};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-component deductible and limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyTerms {
    #[serde(default)]
    pub deductible: f64,
    #[serde(default = "default_limit")]
    pub limit: f64,
}

fn default_limit() -> f64 {
    100_000_000.0
}

impl Default for PolicyTerms {
    fn default() -> Self {
        Self { deductible: 0.0, limit: default_limit() }
    }
}

/// `min(max(loss - deductible, 0), limit)`
pub fn adjust_loss_for_policy(loss: f64, deductible: f64, limit: f64) -> f64 {
    (loss - deductible).max(0.0).min(limit)
}

impl PolicyTerms {
    pub fn apply(&self, loss: f64) -> f64 {
        adjust_loss_for_policy(loss, self.deductible, self.limit)
    }
}

/// Triangular summary of a damage band (all in percentage points)
pub fn damage_statistics(percent: BandValues) -> DamageStatistics {
    let (lo, mid, hi) = (percent.low, percent.best, percent.high);
    let (floor, ceil) = (lo.min(hi), lo.max(hi));

    let d_mode = (3.0 * mid - lo - hi).clamp(floor, ceil);
    let mean = mid + (lo + hi - 2.0 * mid) / (2.0 * PI).sqrt();
    let std = (hi - lo).abs() / 2.0;
    let variance = lo * lo + hi * hi + d_mode * d_mode - lo * hi - lo * d_mode - hi * d_mode;
    let triangular_std = (variance.abs() / 18.0).sqrt();
    let range = hi - lo;
    let range_std = (range != 0.0).then(|| range / 4.0);

    DamageStatistics { d_mode, mean, std, triangular_std, range_std }
}

/// Converts matched damage functions and hazard samples into loss records
pub struct LossCalculator<'a> {
    curves: &'a DamageCurveSet,
    policy: Option<PolicyTerms>,
}

impl<'a> LossCalculator<'a> {
    pub fn new(curves: &'a DamageCurveSet) -> Self {
        Self { curves, policy: None }
    }

    pub fn with_policy(mut self, policy: Option<PolicyTerms>) -> Self {
        self.policy = policy;
        self
    }

    /// Depths evaluated for each band; `None` for a dry band
    fn band_depths(building: &ClassifiedBuilding, sample: &HazardSample) -> [Option<f64>; 3] {
        let raw = sample.depth;
        if !raw.is_finite() || raw <= 0.0 {
            return [None; 3];
        }

        let sigma = sample
            .uncertainty
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(0.0);
        let in_structure = |raw: f64| (raw > 0.0).then(|| raw - building.first_floor_height);

        [in_structure(raw - sigma), in_structure(raw), in_structure(raw + sigma)]
    }

    /// Weighted percent damage for one band depth
    fn percent_at(&self, matched: &BuildingMatch, depth: Option<f64>) -> f64 {
        match depth {
            Some(depth) if matched.status.is_matched() => self.curves.weighted_damage(matched.weighted_ids(), depth),
            _ => 0.0,
        }
    }

    /// Loss for one component at one return period
    pub fn component_loss(
        &self,
        building: &ClassifiedBuilding,
        sample: &HazardSample,
        matched: &BuildingMatch,
    ) -> LossRecord {
        let component = matched.component;
        let [low, best, high] = Self::band_depths(building, sample);

        let percent_damage = BandValues {
            low: self.percent_at(matched, low),
            best: self.percent_at(matched, best),
            high: self.percent_at(matched, high),
        };

        let valuation = building.valuation(component);
        let loss = percent_damage.map(|pct| {
            let gross = valuation * pct / 100.0;
            match &self.policy {
                Some(policy) => policy.apply(gross),
                None => gross,
            }
        });

        let has_uncertainty = sample.uncertainty.is_some_and(|s| s.is_finite() && s > 0.0);
        let statistics = (has_uncertainty && best.is_some()).then(|| damage_statistics(percent_damage));

        LossRecord {
            building_id: building.id,
            return_period: sample.return_period,
            component,
            depth_in_structure: sample.depth - building.first_floor_height,
            percent_damage,
            loss,
            statistics,
        }
    }

    /// Every (return period, component) record for one building
    ///
    /// `samples` in ascending return period; `matches` one per component.
    pub fn building_losses(
        &self,
        building: &ClassifiedBuilding,
        samples: &[HazardSample],
        matches: &[BuildingMatch],
    ) -> Vec<LossRecord> {
        let mut records = Vec::with_capacity(samples.len() * matches.len());
        for sample in samples {
            for matched in matches {
                records.push(self.component_loss(building, sample, matched));
            }
        }
        records
    }
}

/// Sum of component losses per return period, in the order given
pub fn total_by_return_period(records: &[LossRecord]) -> Vec<(u32, BandValues)> {
    let mut totals: Vec<(u32, BandValues)> = Vec::new();
    for record in records {
        match totals.iter_mut().find(|(rp, _)| *rp == record.return_period) {
            Some((_, band)) => *band += record.loss,
            None => totals.push((record.return_period, record.loss)),
        }
    }
    totals
}
