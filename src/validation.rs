//! Advisory validation flags
//!
//! Every check here is non-blocking: a flag is metadata attached to the
//! run output and never removes a building from the results.

use crate::aal::AalSummary;
use crate::classify::ClassifiedBuilding;
use crate::config::ValidationThresholds;
use crate::matcher::BuildingMatch;
use crate::loss::total_by_return_period;
use crate::types::{Building, BuildingId, HazardSample, LossRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
        }
    }
}

/// Which stage raised the flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    BuildingValidation,
    HazardValidation,
    ResultsValidation,
}

impl ValidationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationSource::BuildingValidation => "building_validation",
            ValidationSource::HazardValidation => "hazard_validation",
            ValidationSource::ResultsValidation => "results_validation",
        }
    }

    /// Table the flagged record lives in
    pub fn table_name(self) -> &'static str {
        match self {
            ValidationSource::BuildingValidation => "buildings",
            ValidationSource::HazardValidation => "hazard",
            ValidationSource::ResultsValidation => "losses",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationRule {
    #[serde(rename = "UNUSUAL_STORY_COUNT_RES1")]
    UnusualStoryCountRes1,
    UnusualStoryCountMidRise,
    UnusualAreaOrValuation,
    UnknownFoundationType,
    StoriesClamped,
    NegativeValuationClamped,
    DdfNotMatched,
    DepthDecreasesWithReturnPeriod,
    VelocityDecreasesWithReturnPeriod,
    HighFrequentDepth,
    HighVelocity,
    #[serde(rename = "LOSS_RATIO_EXCEEDS_100")]
    LossRatioExceeds100,
    #[serde(rename = "HIGH_10YR_LOSS")]
    High10yrLoss,
    HighAalLossRatio,
}

impl ValidationRule {
    pub fn code(self) -> &'static str {
        match self {
            ValidationRule::UnusualStoryCountRes1 => "UNUSUAL_STORY_COUNT_RES1",
            ValidationRule::UnusualStoryCountMidRise => "UNUSUAL_STORY_COUNT_MID_RISE",
            ValidationRule::UnusualAreaOrValuation => "UNUSUAL_AREA_OR_VALUATION",
            ValidationRule::UnknownFoundationType => "UNKNOWN_FOUNDATION_TYPE",
            ValidationRule::StoriesClamped => "STORIES_CLAMPED",
            ValidationRule::NegativeValuationClamped => "NEGATIVE_VALUATION_CLAMPED",
            ValidationRule::DdfNotMatched => "DDF_NOT_MATCHED",
            ValidationRule::DepthDecreasesWithReturnPeriod => "DEPTH_DECREASES_WITH_RETURN_PERIOD",
            ValidationRule::VelocityDecreasesWithReturnPeriod => "VELOCITY_DECREASES_WITH_RETURN_PERIOD",
            ValidationRule::HighFrequentDepth => "HIGH_FREQUENT_DEPTH",
            ValidationRule::HighVelocity => "HIGH_VELOCITY",
            ValidationRule::LossRatioExceeds100 => "LOSS_RATIO_EXCEEDS_100",
            ValidationRule::High10yrLoss => "HIGH_10YR_LOSS",
            ValidationRule::HighAalLossRatio => "HIGH_AAL_LOSS_RATIO",
        }
    }

    pub fn source(self) -> ValidationSource {
        use ValidationRule::*;
        match self {
            UnusualStoryCountRes1 | UnusualStoryCountMidRise | UnusualAreaOrValuation | UnknownFoundationType
            | StoriesClamped | NegativeValuationClamped | DdfNotMatched => ValidationSource::BuildingValidation,
            DepthDecreasesWithReturnPeriod | VelocityDecreasesWithReturnPeriod | HighFrequentDepth | HighVelocity => {
                ValidationSource::HazardValidation
            }
            LossRatioExceeds100 | High10yrLoss | HighAalLossRatio => ValidationSource::ResultsValidation,
        }
    }

    /// Input adjustments the engine made itself are informational
    pub fn severity(self) -> Severity {
        match self {
            ValidationRule::UnknownFoundationType | ValidationRule::StoriesClamped => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One advisory finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub building_id: BuildingId,
    pub return_period: Option<u32>,
    pub source: ValidationSource,
    pub rule: ValidationRule,
    pub message: String,
    pub severity: Severity,
}

impl ValidationFlag {
    pub fn new(building_id: BuildingId, rule: ValidationRule, message: String) -> Self {
        Self {
            building_id,
            return_period: None,
            source: rule.source(),
            rule,
            message,
            severity: rule.severity(),
        }
    }

    pub fn at_return_period(mut self, return_period: u32) -> Self {
        self.return_period = Some(return_period);
        self
    }
}

/// Inventory plausibility and the adjustments classification applied
pub fn validate_building(
    building: &Building,
    classified: &ClassifiedBuilding,
    thresholds: &ValidationThresholds,
) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();
    let id = building.id;
    let raw_stories = building.number_stories;

    let occupancy = classified.occupancy_type.as_deref();

    if occupancy == Some("RES1") && raw_stories > thresholds.res1_max_stories as f64 {
        flags.push(ValidationFlag::new(
            id,
            ValidationRule::UnusualStoryCountRes1,
            format!("RES1 building with {} stories (expected <= {})", raw_stories, thresholds.res1_max_stories),
        ));
    }

    if raw_stories > thresholds.mid_rise_max_stories as f64 {
        flags.push(ValidationFlag::new(
            id,
            ValidationRule::UnusualStoryCountMidRise,
            format!("{} stories exceeds {}", raw_stories, thresholds.mid_rise_max_stories),
        ));
    }

    let typical_area = occupancy.and_then(|o| thresholds.typical_area(o));
    if let (Some(area), Some(occupancy), Some(typical)) = (classified.area, occupancy, typical_area) {
        if area > thresholds.area_multiplier * typical {
            flags.push(ValidationFlag::new(
                id,
                ValidationRule::UnusualAreaOrValuation,
                format!(
                    "area {:.0} sqft is more than {}x the typical {:.0} sqft for {}",
                    area, thresholds.area_multiplier, typical, occupancy
                ),
            ));
        }
    }

    if !classified.foundation_recognized {
        flags.push(ValidationFlag::new(
            id,
            ValidationRule::UnknownFoundationType,
            format!(
                "foundation code '{}' not recognized, using {}",
                building.foundation_type, classified.foundation_class
            ),
        ));
    }

    if classified.stories_adjusted {
        flags.push(ValidationFlag::new(
            id,
            ValidationRule::StoriesClamped,
            format!("story count {} adjusted to {}", raw_stories, classified.stories),
        ));
    }

    if classified.valuation_clamped {
        flags.push(ValidationFlag::new(
            id,
            ValidationRule::NegativeValuationClamped,
            "negative valuation set to 0".to_string(),
        ));
    }

    flags
}

/// Components with value at risk but no damage function
pub fn validate_matches(classified: &ClassifiedBuilding, matches: &[BuildingMatch]) -> Vec<ValidationFlag> {
    matches
        .iter()
        .filter(|m| !m.status.is_matched() && classified.valuation(m.component) > 0.0)
        .map(|m| {
            ValidationFlag::new(
                classified.id,
                ValidationRule::DdfNotMatched,
                format!("{} damage function not assigned: {}", m.component, m.status),
            )
        })
        .collect()
}

/// Hazard consistency across return periods
///
/// `samples` must be in ascending return period.
pub fn validate_hazard(
    building_id: BuildingId,
    samples: &[HazardSample],
    thresholds: &ValidationThresholds,
) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();

    for pair in samples.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.depth < prev.depth {
            flags.push(
                ValidationFlag::new(
                    building_id,
                    ValidationRule::DepthDecreasesWithReturnPeriod,
                    format!(
                        "depth {:.2} ft at RP {} is below {:.2} ft at RP {}",
                        next.depth, next.return_period, prev.depth, prev.return_period
                    ),
                )
                .at_return_period(next.return_period),
            );
        }
        if let (Some(v_prev), Some(v_next)) = (prev.velocity, next.velocity) {
            if v_next < v_prev {
                flags.push(
                    ValidationFlag::new(
                        building_id,
                        ValidationRule::VelocityDecreasesWithReturnPeriod,
                        format!(
                            "velocity {:.2} ft/s at RP {} is below {:.2} ft/s at RP {}",
                            v_next, next.return_period, v_prev, prev.return_period
                        ),
                    )
                    .at_return_period(next.return_period),
                );
            }
        }
    }

    for sample in samples {
        if sample.return_period <= thresholds.frequent_return_period && sample.depth > thresholds.frequent_depth_ft {
            flags.push(
                ValidationFlag::new(
                    building_id,
                    ValidationRule::HighFrequentDepth,
                    format!("depth {:.2} ft at frequent RP {}", sample.depth, sample.return_period),
                )
                .at_return_period(sample.return_period),
            );
        }
        if let Some(v) = sample.velocity.filter(|v| *v > thresholds.high_velocity_fps) {
            flags.push(
                ValidationFlag::new(
                    building_id,
                    ValidationRule::HighVelocity,
                    format!("velocity {:.2} ft/s exceeds {} ft/s", v, thresholds.high_velocity_fps),
                )
                .at_return_period(sample.return_period),
            );
        }
    }

    flags
}

/// Loss plausibility against the building's value
pub fn validate_results(
    classified: &ClassifiedBuilding,
    records: &[LossRecord],
    aal: Option<&AalSummary>,
    thresholds: &ValidationThresholds,
) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();
    let id = classified.id;

    for record in records {
        let valuation = classified.valuation(record.component);
        if record.loss_amount() > valuation {
            flags.push(
                ValidationFlag::new(
                    id,
                    ValidationRule::LossRatioExceeds100,
                    format!("{} loss {:.2} exceeds valuation {:.2}", record.component, record.loss_amount(), valuation),
                )
                .at_return_period(record.return_period),
            );
        }
    }

    let total_value = classified.total_value();
    if total_value <= 0.0 {
        return flags;
    }

    for (rp, band) in total_by_return_period(records) {
        let ratio = band.best / total_value;
        if rp <= thresholds.ten_year_return_period && ratio > thresholds.ten_year_loss_ratio {
            flags.push(
                ValidationFlag::new(
                    id,
                    ValidationRule::High10yrLoss,
                    format!("loss ratio {:.2} at RP {}", ratio, rp),
                )
                .at_return_period(rp),
            );
        }
    }

    if let Some(aal) = aal {
        let ratio = aal.aal_best / total_value;
        if ratio > thresholds.aal_loss_ratio {
            flags.push(ValidationFlag::new(
                id,
                ValidationRule::HighAalLossRatio,
                format!("AAL loss ratio {:.4} exceeds {}", ratio, thresholds.aal_loss_ratio),
            ));
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_building;
    use crate::config::AnalysisConfig;
    use crate::types::{BandValues, DamageComponent, MatchStatus};

    fn raw_building(occupancy: &str, stories: f64, area: f64) -> Building {
        Building {
            id: 11,
            occupancy_type: occupancy.to_string(),
            general_building_type: Some("W".to_string()),
            foundation_type: "S".to_string(),
            number_stories: stories,
            area: Some(area),
            building_cost: 100_000.0,
            content_cost: 50_000.0,
            inventory_cost: 0.0,
            first_floor_height: Some(1.0),
            geometry: None,
        }
    }

    fn rules(flags: &[ValidationFlag]) -> Vec<ValidationRule> {
        flags.iter().map(|f| f.rule).collect()
    }

    fn sample(rp: u32, depth: f64, velocity: Option<f64>) -> HazardSample {
        HazardSample {
            building_id: 11,
            return_period: rp,
            depth,
            velocity,
            duration: None,
            uncertainty: None,
        }
    }

    #[test]
    fn test_res1_story_count_and_clamp() {
        let config = AnalysisConfig::default();
        let b = raw_building("RES1", 8.0, 1500.0);
        let classified = classify_building(&b, &[], &config);
        let flags = validate_building(&b, &classified, &config.validation);

        let r = rules(&flags);
        assert!(r.contains(&ValidationRule::UnusualStoryCountRes1));
        assert!(r.contains(&ValidationRule::StoriesClamped));
        assert!(!r.contains(&ValidationRule::UnusualStoryCountMidRise));

        let warning = flags.iter().find(|f| f.rule == ValidationRule::UnusualStoryCountRes1).unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(warning.source, ValidationSource::BuildingValidation);
    }

    #[test]
    fn test_large_commercial_area() {
        let config = AnalysisConfig::default();
        let b = raw_building("COM1", 1.0, 600_000.0);
        let classified = classify_building(&b, &[], &config);
        let r = rules(&validate_building(&b, &classified, &config.validation));
        assert_eq!(r, vec![ValidationRule::UnusualAreaOrValuation]);
    }

    #[test]
    fn test_unknown_foundation_is_info() {
        let config = AnalysisConfig::default();
        let mut b = raw_building("RES1", 1.0, 1500.0);
        b.foundation_type = "Z".to_string();
        let classified = classify_building(&b, &[], &config);
        let flags = validate_building(&b, &classified, &config.validation);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].rule, ValidationRule::UnknownFoundationType);
        assert_eq!(flags[0].severity, Severity::Info);
    }

    #[test]
    fn test_unmatched_component_with_value_flagged() {
        let config = AnalysisConfig::default();
        let b = raw_building("RES1", 1.0, 1500.0);
        let classified = classify_building(&b, &[], &config);
        let matches = vec![
            BuildingMatch::unmatched(11, DamageComponent::Structure, MatchStatus::StoryOutOfRange),
            BuildingMatch::unmatched(11, DamageComponent::Inventory, MatchStatus::NoMatch),
        ];
        let flags = validate_matches(&classified, &matches);
        // Inventory has no value at risk
        assert_eq!(flags.len(), 1);
        assert!(flags[0].message.contains("Story_Out_Of_Range"));
    }

    #[test]
    fn test_hazard_monotonicity_flags() {
        let thresholds = ValidationThresholds::default();
        let samples = vec![
            sample(10, 6.0, Some(2.0)),
            sample(100, 4.0, Some(12.0)),
            sample(500, 7.0, Some(11.0)),
        ];
        let flags = validate_hazard(11, &samples, &thresholds);
        let r = rules(&flags);

        assert_eq!(r.iter().filter(|r| **r == ValidationRule::DepthDecreasesWithReturnPeriod).count(), 1);
        assert_eq!(r.iter().filter(|r| **r == ValidationRule::VelocityDecreasesWithReturnPeriod).count(), 1);
        assert_eq!(r.iter().filter(|r| **r == ValidationRule::HighFrequentDepth).count(), 1);
        assert_eq!(r.iter().filter(|r| **r == ValidationRule::HighVelocity).count(), 2);

        let depth_flag = flags.iter().find(|f| f.rule == ValidationRule::DepthDecreasesWithReturnPeriod).unwrap();
        assert_eq!(depth_flag.return_period, Some(100));
        assert_eq!(depth_flag.source.table_name(), "hazard");
    }

    #[test]
    fn test_results_flags() {
        let config = AnalysisConfig::default();
        let b = raw_building("RES1", 1.0, 1500.0);
        let classified = classify_building(&b, &[], &config);

        let record = |rp: u32, component: DamageComponent, loss: f64| LossRecord {
            building_id: 11,
            return_period: rp,
            component,
            depth_in_structure: 3.0,
            percent_damage: BandValues::uniform(0.0),
            loss: BandValues::uniform(loss),
            statistics: None,
        };
        let records = vec![
            record(10, DamageComponent::Structure, 90_000.0),
            record(10, DamageComponent::Content, 60_000.0),
            record(100, DamageComponent::Structure, 10_000.0),
        ];
        let aal = AalSummary { building_id: 11, aal_min: 0.0, aal_best: 9000.0, aal_max: 0.0 };

        let r = rules(&validate_results(&classified, &records, Some(&aal), &config.validation));
        assert_eq!(
            r,
            vec![
                ValidationRule::LossRatioExceeds100,
                ValidationRule::High10yrLoss,
                ValidationRule::HighAalLossRatio,
            ]
        );
    }

    #[test]
    fn test_rule_codes_round_trip_through_serde() {
        let json = serde_json::to_string(&ValidationRule::High10yrLoss).unwrap();
        assert_eq!(json, "\"HIGH_10YR_LOSS\"");
        let json = serde_json::to_string(&ValidationRule::UnusualStoryCountMidRise).unwrap();
        assert_eq!(json, format!("\"{}\"", ValidationRule::UnusualStoryCountMidRise.code()));
    }
}
