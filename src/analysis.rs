//! Inland flood analysis run
//!
//! Orchestrates classify -> match -> loss -> AAL over a batch of buildings.
//! Reference data is loaded once and shared read-only; every building is
//! processed independently on the rayon pool and the per-building outputs
//! are merged into result tables afterwards.

use crate::aal::{annualized_band, AalSummary};
use crate::classify::{classify_building, ClassifiedBuilding};
use crate::config::AnalysisConfig;
use crate::error::InputError;
use crate::loss::{total_by_return_period, LossCalculator};
use crate::matcher::{status_counts, BuildingMatch, DdfMatcher};
use crate::reference::ReferenceData;
use crate::types::{BandValues, Building, BuildingId, DamageComponent, HazardSample, LossRecord, MatchStatus};
use crate::validation::{validate_building, validate_hazard, validate_matches, validate_results, ValidationFlag};
use anyhow::{Context, Result};
use polars::prelude::*;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything produced for one building
#[derive(Debug, Clone)]
pub struct BuildingOutcome {
    pub building: ClassifiedBuilding,
    /// One per component that has a lookup table
    pub matches: Vec<BuildingMatch>,
    /// Ascending return period, components in match order
    pub losses: Vec<LossRecord>,
    pub aal: Option<AalSummary>,
    pub flags: Vec<ValidationFlag>,
}

impl BuildingOutcome {
    fn match_for(&self, component: DamageComponent) -> Option<&BuildingMatch> {
        self.matches.iter().find(|m| m.component == component)
    }
}

/// Total losses across all buildings
#[derive(Debug, Clone, Default)]
pub struct PortfolioSummary {
    /// (return period, summed loss band), ascending return period
    pub scenario_losses: Vec<(u32, BandValues)>,
    pub aal: Option<BandValues>,
}

/// Result of one analysis run
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutput {
    pub buildings: Vec<BuildingOutcome>,
    pub portfolio: PortfolioSummary,
}

impl AnalysisOutput {
    pub fn losses(&self) -> impl Iterator<Item = &LossRecord> {
        self.buildings.iter().flat_map(|b| b.losses.iter())
    }

    pub fn aal(&self) -> impl Iterator<Item = &AalSummary> {
        self.buildings.iter().filter_map(|b| b.aal.as_ref())
    }

    pub fn flags(&self) -> impl Iterator<Item = &ValidationFlag> {
        self.buildings.iter().flat_map(|b| b.flags.iter())
    }

    pub fn outcome(&self, id: BuildingId) -> Option<&BuildingOutcome> {
        self.buildings.iter().find(|b| b.building.id == id)
    }

    /// Match status tally over every building and component
    pub fn status_counts(&self) -> FxHashMap<MatchStatus, usize> {
        let all: Vec<BuildingMatch> = self.buildings.iter().flat_map(|b| b.matches.iter().cloned()).collect();
        status_counts(&all)
    }

    /// One row per building, return period and component
    pub fn loss_table(&self) -> PolarsResult<DataFrame> {
        let n = self.losses().count();
        let mut building_id = Vec::with_capacity(n);
        let mut return_period = Vec::with_capacity(n);
        let mut component = Vec::with_capacity(n);
        let mut depth_in_structure = Vec::with_capacity(n);
        let mut damage_function_ids = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        let mut match_status = Vec::with_capacity(n);
        let mut pct = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
        let mut loss = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
        let mut damage_mean = Vec::with_capacity(n);
        let mut damage_std = Vec::with_capacity(n);

        for outcome in &self.buildings {
            for record in &outcome.losses {
                let matched = outcome.match_for(record.component);
                let (ids, ws) = matched.map(pipe_joined).unwrap_or_default();

                building_id.push(record.building_id);
                return_period.push(record.return_period);
                component.push(record.component.as_str());
                depth_in_structure.push(record.depth_in_structure);
                damage_function_ids.push(ids);
                weights.push(ws);
                match_status.push(matched.map_or(MatchStatus::NoMatch, |m| m.status).as_str());
                pct[0].push(record.percent_damage.low);
                pct[1].push(record.percent_damage.best);
                pct[2].push(record.percent_damage.high);
                loss[0].push(record.loss.low);
                loss[1].push(record.loss.best);
                loss[2].push(record.loss.high);
                damage_mean.push(record.statistics.map(|s| s.mean));
                damage_std.push(record.statistics.map(|s| s.std));
            }
        }

        let [pct_low, pct_best, pct_high] = pct;
        let [loss_low, loss_best, loss_high] = loss;

        df!(
            "building_id" => building_id,
            "return_period" => return_period,
            "component" => component,
            "depth_in_structure" => depth_in_structure,
            "damage_function_ids" => damage_function_ids,
            "weights" => weights,
            "match_status" => match_status,
            "percent_damage_low" => pct_low,
            "percent_damage_best" => pct_best,
            "percent_damage_high" => pct_high,
            "loss_low" => loss_low,
            "loss_best" => loss_best,
            "loss_high" => loss_high,
            "damage_percent_mean" => damage_mean,
            "damage_percent_std" => damage_std
        )
    }

    /// One row per building with AAL_min, AAL_best, AAL_max
    pub fn aal_table(&self) -> PolarsResult<DataFrame> {
        let rows: Vec<&AalSummary> = self.aal().collect();
        df!(
            "building_id" => rows.iter().map(|r| r.building_id).collect::<Vec<_>>(),
            "aal_min" => rows.iter().map(|r| r.aal_min).collect::<Vec<_>>(),
            "aal_best" => rows.iter().map(|r| r.aal_best).collect::<Vec<_>>(),
            "aal_max" => rows.iter().map(|r| r.aal_max).collect::<Vec<_>>()
        )
    }

    /// Weighted damage-function assignments, one row per (building, component, function)
    pub fn match_table(&self) -> PolarsResult<DataFrame> {
        let rows: Vec<_> = self
            .buildings
            .iter()
            .flat_map(|b| b.matches.iter().flat_map(|m| m.results()))
            .collect();
        df!(
            "building_id" => rows.iter().map(|r| r.building_id).collect::<Vec<_>>(),
            "component" => rows.iter().map(|r| r.component.as_str()).collect::<Vec<_>>(),
            "damage_function_id" => rows.iter().map(|r| r.damage_function_id).collect::<Vec<_>>(),
            "weight" => rows.iter().map(|r| r.weight).collect::<Vec<_>>(),
            "match_status" => rows.iter().map(|r| r.match_status.as_str()).collect::<Vec<_>>()
        )
    }

    pub fn validation_table(&self) -> PolarsResult<DataFrame> {
        let rows: Vec<&ValidationFlag> = self.flags().collect();
        df!(
            "building_id" => rows.iter().map(|f| f.building_id).collect::<Vec<_>>(),
            "return_period" => rows.iter().map(|f| f.return_period).collect::<Vec<_>>(),
            "table_name" => rows.iter().map(|f| f.source.table_name()).collect::<Vec<_>>(),
            "source" => rows.iter().map(|f| f.source.as_str()).collect::<Vec<_>>(),
            "rule" => rows.iter().map(|f| f.rule.code()).collect::<Vec<_>>(),
            "message" => rows.iter().map(|f| f.message.as_str()).collect::<Vec<_>>(),
            "severity" => rows.iter().map(|f| f.severity.as_str()).collect::<Vec<_>>()
        )
    }

    /// Portfolio loss per return period
    pub fn scenario_table(&self) -> PolarsResult<DataFrame> {
        let s = &self.portfolio.scenario_losses;
        df!(
            "return_period" => s.iter().map(|(rp, _)| *rp).collect::<Vec<_>>(),
            "loss_low" => s.iter().map(|(_, b)| b.low).collect::<Vec<_>>(),
            "loss_best" => s.iter().map(|(_, b)| b.best).collect::<Vec<_>>(),
            "loss_high" => s.iter().map(|(_, b)| b.high).collect::<Vec<_>>()
        )
    }
}

/// `("101|102", "0.5|0.5")` for the loss table
fn pipe_joined(matched: &BuildingMatch) -> (String, String) {
    let ids: Vec<String> = matched.functions.iter().map(|f| f.damage_function_id.to_string()).collect();
    let weights: Vec<String> = matched.functions.iter().map(|f| format!("{:.6}", f.weight)).collect();
    (ids.join("|"), weights.join("|"))
}

/// Hazard samples per building, ascending return period
///
/// Every building needs at least one sample and every sample must belong
/// to a known building.
pub fn group_hazard(
    buildings: &[Building],
    hazard: &[HazardSample],
) -> Result<FxHashMap<BuildingId, Vec<HazardSample>>, InputError> {
    let mut grouped: FxHashMap<BuildingId, Vec<HazardSample>> = FxHashMap::default();
    for b in buildings {
        if grouped.insert(b.id, Vec::new()).is_some() {
            return Err(InputError::DuplicateBuilding { id: b.id });
        }
    }

    for sample in hazard {
        grouped
            .get_mut(&sample.building_id)
            .ok_or(InputError::UnknownBuilding { id: sample.building_id })?
            .push(*sample);
    }

    for (&id, samples) in grouped.iter_mut() {
        if samples.is_empty() {
            return Err(InputError::MissingHazard { id });
        }
        samples.sort_by_key(|s| s.return_period);
        if let Some(pair) = samples.windows(2).find(|p| p[0].return_period == p[1].return_period) {
            return Err(InputError::DuplicateReturnPeriod { id, return_period: pair[0].return_period });
        }
    }

    Ok(grouped)
}

/// Inland flood loss analysis bound to one set of reference data
pub struct InlandFloodAnalysis {
    reference: ReferenceData,
    config: AnalysisConfig,
}

impl InlandFloodAnalysis {
    pub fn new(reference: ReferenceData, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { reference, config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Run the whole batch
    pub fn run(&self, buildings: &[Building], hazard: &[HazardSample]) -> Result<AnalysisOutput> {
        self.run_with_cancel(buildings, hazard, &AtomicBool::new(false))
    }

    /// Run the batch, aborting with [`InputError::Cancelled`] once `cancel` is set
    ///
    /// Partial results are dropped.
    pub fn run_with_cancel(
        &self,
        buildings: &[Building],
        hazard: &[HazardSample],
        cancel: &AtomicBool,
    ) -> Result<AnalysisOutput> {
        let start = Instant::now();
        info!(
            buildings = buildings.len(),
            hazard_samples = hazard.len(),
            mode = ?self.config.aal_mode,
            "Starting inland flood analysis"
        );

        let grouped = group_hazard(buildings, hazard)?;
        let fields = self.config.match_fields()?;

        let matchers: Vec<DdfMatcher<'_>> = DamageComponent::ALL
            .into_iter()
            .filter_map(|c| self.reference.lookup(c).map(|table| DdfMatcher::new(table, c, fields)))
            .collect();
        if matchers.is_empty() {
            warn!("No DDF lookup tables loaded; every loss will be zero");
        }

        let calculator = LossCalculator::new(self.reference.curves()).with_policy(self.config.policy);

        let outcomes: Vec<BuildingOutcome> = buildings
            .par_iter()
            .map(|building| -> Result<BuildingOutcome> {
                if cancel.load(Ordering::Relaxed) {
                    return Err(InputError::Cancelled.into());
                }
                // group_hazard guarantees an entry per building
                let samples = grouped
                    .get(&building.id)
                    .map(Vec::as_slice)
                    .ok_or(InputError::MissingHazard { id: building.id })?;
                self.process_building(building, samples, &matchers, &calculator)
            })
            .collect::<Result<Vec<_>>>()?;

        if cancel.load(Ordering::Relaxed) {
            return Err(InputError::Cancelled.into());
        }

        let portfolio = self.portfolio_summary(&outcomes)?;
        let output = AnalysisOutput { buildings: outcomes, portfolio };

        let counts = output.status_counts();
        info!(
            matched = counts.get(&MatchStatus::Matched).copied().unwrap_or(0),
            no_match = counts.get(&MatchStatus::NoMatch).copied().unwrap_or(0),
            story_out_of_range = counts.get(&MatchStatus::StoryOutOfRange).copied().unwrap_or(0),
            sqft_out_of_range = counts.get(&MatchStatus::SqftOutOfRange).copied().unwrap_or(0),
            "DDF matching complete"
        );
        info!(
            loss_records = output.losses().count(),
            flags = output.flags().count(),
            portfolio_aal = ?output.portfolio.aal.map(|b| b.best),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inland flood analysis complete"
        );

        Ok(output)
    }

    fn process_building(
        &self,
        building: &Building,
        samples: &[HazardSample],
        matchers: &[DdfMatcher<'_>],
        calculator: &LossCalculator<'_>,
    ) -> Result<BuildingOutcome> {
        let thresholds = &self.config.validation;
        let classified = classify_building(building, samples, &self.config);
        let matches: Vec<BuildingMatch> = matchers.iter().map(|m| m.match_building(&classified)).collect();
        let losses = calculator.building_losses(&classified, samples, &matches);

        let aal = if self.config.calculate_aal {
            let totals = total_by_return_period(&losses);
            let curve = if totals.is_empty() {
                // No components to match; the curve is all zeros
                samples.iter().map(|s| (s.return_period, BandValues::default())).collect()
            } else {
                totals
            };
            let band = annualized_band(&curve, self.config.aal_mode)
                .with_context(|| format!("AAL for building {}", building.id))?;
            Some(AalSummary::from_band(building.id, band))
        } else {
            None
        };

        let mut flags = validate_building(building, &classified, thresholds);
        flags.extend(validate_matches(&classified, &matches));
        flags.extend(validate_hazard(building.id, samples, thresholds));
        flags.extend(validate_results(&classified, &losses, aal.as_ref(), thresholds));

        if !flags.is_empty() {
            debug!(building_id = building.id, flags = flags.len(), "Validation flags raised");
        }

        Ok(BuildingOutcome { building: classified, matches, losses, aal, flags })
    }

    fn portfolio_summary(&self, outcomes: &[BuildingOutcome]) -> Result<PortfolioSummary> {
        let mut by_rp: BTreeMap<u32, BandValues> = BTreeMap::new();
        for outcome in outcomes {
            for record in &outcome.losses {
                *by_rp.entry(record.return_period).or_default() += record.loss;
            }
        }

        let scenario_losses: Vec<(u32, BandValues)> = match self.config.portfolio_loss_limits {
            Some((low, high)) => by_rp
                .into_iter()
                .map(|(rp, band)| (rp, band.map(|v| v.clamp(low, high))))
                .collect(),
            None => by_rp.into_iter().collect(),
        };

        let aal = if self.config.calculate_aal && !scenario_losses.is_empty() {
            Some(annualized_band(&scenario_losses, self.config.aal_mode).context("Portfolio AAL")?)
        } else {
            None
        };

        Ok(PortfolioSummary { scenario_losses, aal })
    }
}
