//! Foundation / Peril Classifier
//!
//! Derives the categorical keys the DDF tables are indexed on from raw
//! inventory attributes and the building's hazard samples. Nothing here can
//! fail: unknown or missing inputs resolve to documented defaults and the
//! adjustments are reported back so validation can flag them.
//!
//! Defaults:
//! - unrecognized foundation code -> SLAB
//! - no velocity sample -> low velocity
//! - no duration sample -> short duration
//! - story count below 1 -> 1; above the construction type's cap -> cap
//! - missing first-floor height -> per-foundation default from config

use crate::config::AnalysisConfig;
use crate::types::{Building, BuildingId, DamageComponent, FoundationClass, HazardSample, PerilType};
use serde::{Deserialize, Serialize};

/// Building reduced to normalized matching keys and valuations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedBuilding {
    pub id: BuildingId,
    /// `None` when the inventory has no occupancy; matches every lookup row
    pub occupancy_type: Option<String>,
    pub construction_type: Option<String>,
    pub foundation_class: FoundationClass,
    /// False when the raw foundation code fell back to the default
    pub foundation_recognized: bool,
    pub peril_type: PerilType,
    pub stories: u32,
    /// True when the raw story count was raised to 1 or capped
    pub stories_adjusted: bool,
    pub area: Option<f64>,
    pub first_floor_height: f64,
    /// Structure, content, inventory (indexed by [`DamageComponent::index`])
    pub valuations: [f64; 3],
    /// True when a negative valuation was clamped to zero
    pub valuation_clamped: bool,
}

impl ClassifiedBuilding {
    pub fn valuation(&self, component: DamageComponent) -> f64 {
        self.valuations[component.index()]
    }

    pub fn total_value(&self) -> f64 {
        self.valuations.iter().sum()
    }
}

/// Uppercase and drop NSI sub-codes (`RES1-1SNB` -> `RES1`); blank is `None`
pub fn normalize_occupancy(raw: &str) -> Option<String> {
    let code = raw.trim().split('-').next().unwrap_or_default().trim();
    (!code.is_empty()).then(|| code.to_ascii_uppercase())
}

/// Map a raw foundation code onto its DDF foundation class
///
/// Accepts 4-letter FLSBT codes, NSI letter codes and NSI numeric codes
/// (`1`..`7`, optionally written as floats).
pub fn normalize_foundation_code(raw: &str) -> Option<FoundationClass> {
    let code = raw.trim().to_ascii_uppercase();
    if let Some(class) = FoundationClass::from_code(&code) {
        return Some(class);
    }

    let letter = match code.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 => match n as i64 {
            1 => "I",
            2 => "P",
            3 => "W",
            4 => "B",
            5 => "C",
            6 => "F",
            7 => "S",
            _ => return None,
        },
        Ok(_) => return None,
        Err(_) => code.as_str(),
    };

    match letter {
        "I" => Some(FoundationClass::Pile),
        "P" | "W" | "C" => Some(FoundationClass::Shallow),
        "B" => Some(FoundationClass::Basement),
        "S" | "F" => Some(FoundationClass::Slab),
        _ => None,
    }
}

/// Foundation class with the SLAB fallback; the flag says whether the code was recognized
pub fn classify_foundation(raw: &str) -> (FoundationClass, bool) {
    match normalize_foundation_code(raw) {
        Some(class) => (class, true),
        None => (FoundationClass::Slab, false),
    }
}

/// Peril tag from velocity (ft/s) and duration (hours)
///
/// `None` and NaN both mean "not supplied" and resolve to low velocity /
/// short duration.
pub fn classify_peril(
    velocity: Option<f64>,
    duration: Option<f64>,
    velocity_threshold: f64,
    duration_threshold: f64,
) -> PerilType {
    let high_velocity = velocity.is_some_and(|v| v >= velocity_threshold);
    let long_duration = duration.is_some_and(|d| d >= duration_threshold);
    PerilType::from_flags(high_velocity, long_duration)
}

/// Largest finite value of a per-return-period field, if any
fn max_finite(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values
        .flatten()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// Peril tag for a building across all its return periods
///
/// Uses the worst velocity and duration seen at any return period, so a
/// building is matched against one peril for the whole run.
pub fn classify_building_peril(samples: &[HazardSample], config: &AnalysisConfig) -> PerilType {
    let velocity = max_finite(samples.iter().map(|s| s.velocity));
    let duration = max_finite(samples.iter().map(|s| s.duration));
    classify_peril(
        velocity,
        duration,
        config.high_velocity_threshold_fps,
        config.long_duration_threshold_hours,
    )
}

/// Round the raw story count and keep it within `[1, cap]`
pub fn clamp_stories(raw: f64, cap: Option<u32>) -> (u32, bool) {
    if !raw.is_finite() || raw < 1.0 {
        return (1, true);
    }
    let stories = raw.round().max(1.0) as u32;
    match cap {
        Some(cap) if stories > cap => (cap.max(1), true),
        _ => (stories, false),
    }
}

/// Classify one building given its hazard samples
pub fn classify_building(
    building: &Building,
    samples: &[HazardSample],
    config: &AnalysisConfig,
) -> ClassifiedBuilding {
    let (foundation_class, foundation_recognized) = classify_foundation(&building.foundation_type);

    let construction_type = building
        .general_building_type
        .as_deref()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());

    let cap = construction_type.as_deref().and_then(|c| config.max_stories(c));
    let (stories, stories_adjusted) = clamp_stories(building.number_stories, cap);

    let first_floor_height = building
        .first_floor_height
        .filter(|h| h.is_finite())
        .unwrap_or_else(|| config.default_first_floor_height_ft.get(foundation_class));

    let raw_valuations = DamageComponent::ALL.map(|c| building.valuation(c));
    let valuation_clamped = raw_valuations.iter().any(|v| *v < 0.0);
    let valuations = raw_valuations.map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });

    ClassifiedBuilding {
        id: building.id,
        occupancy_type: normalize_occupancy(&building.occupancy_type),
        construction_type,
        foundation_class,
        foundation_recognized,
        peril_type: classify_building_peril(samples, config),
        stories,
        stories_adjusted,
        area: building.area.filter(|a| a.is_finite()),
        first_floor_height,
        valuations,
        valuation_clamped,
    }
}
