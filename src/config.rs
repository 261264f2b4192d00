//! Analysis configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! (`{}`) is a valid configuration.

use crate::aal::AalMode;
use crate::loss::PolicyTerms;
use crate::matcher::MatchFields;
use crate::types::FoundationClass;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Run-wide settings for [`InlandFloodAnalysis`](crate::analysis::InlandFloodAnalysis)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub aal_mode: AalMode,
    pub calculate_aal: bool,
    /// Matcher predicates to switch off (see [`MatchFields::with_wildcards`])
    pub wildcard_fields: Vec<String>,
    /// Velocity at or above this is high-velocity (ft/s)
    pub high_velocity_threshold_fps: f64,
    /// Duration at or above this is long-duration (hours)
    pub long_duration_threshold_hours: f64,
    pub default_first_floor_height_ft: FirstFloorDefaults,
    /// Construction type -> maximum plausible story count
    pub max_stories_by_construction: HashMap<String, u32>,
    pub policy: Option<PolicyTerms>,
    /// `[low, high]` clip applied to portfolio losses before the portfolio AAL
    pub portfolio_loss_limits: Option<(f64, f64)>,
    pub validation: ValidationThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let max_stories_by_construction = [("W", 6), ("M", 30), ("C", 40), ("S", 108), ("MH", 1), ("H", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self {
            aal_mode: AalMode::NonTruncated,
            calculate_aal: true,
            wildcard_fields: Vec::new(),
            high_velocity_threshold_fps: 5.0,
            long_duration_threshold_hours: 72.0,
            default_first_floor_height_ft: FirstFloorDefaults::default(),
            max_stories_by_construction,
            policy: None,
            portfolio_loss_limits: None,
            validation: ValidationThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read analysis config: {:?}", path))?;

        let config: AnalysisConfig = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse analysis config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make classification or validation meaningless
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("high_velocity_threshold_fps", self.high_velocity_threshold_fps),
            ("long_duration_threshold_hours", self.long_duration_threshold_hours),
            ("validation.area_multiplier", self.validation.area_multiplier),
            ("validation.high_velocity_fps", self.validation.high_velocity_fps),
            ("validation.frequent_depth_ft", self.validation.frequent_depth_ft),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("Config field '{}' must be positive, got {}", name, value);
            }
        }

        for class in FoundationClass::ALL {
            let h = self.default_first_floor_height_ft.get(class);
            if !h.is_finite() || h < 0.0 {
                anyhow::bail!("Default first-floor height for {} must be non-negative", class);
            }
        }

        if let Some(policy) = &self.policy {
            if policy.deductible < 0.0 || policy.limit < 0.0 {
                anyhow::bail!("Policy deductible and limit must be non-negative");
            }
        }

        if let Some((low, high)) = self.portfolio_loss_limits {
            if !(low <= high) {
                anyhow::bail!("Portfolio loss limits must satisfy low <= high, got [{}, {}]", low, high);
            }
        }

        self.match_fields()?;
        Ok(())
    }

    /// Matcher predicates with the configured wildcards switched off
    pub fn match_fields(&self) -> Result<MatchFields> {
        Ok(MatchFields::with_wildcards(self.wildcard_fields.as_slice())?)
    }

    /// Story cap for a construction type, if one is configured
    pub fn max_stories(&self, construction_type: &str) -> Option<u32> {
        self.max_stories_by_construction
            .get(&construction_type.trim().to_ascii_uppercase())
            .copied()
    }
}

/// First-floor height used when the inventory has none (ft)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstFloorDefaults {
    #[serde(rename = "BASE")]
    pub basement: f64,
    #[serde(rename = "SHAL")]
    pub shallow: f64,
    #[serde(rename = "SLAB")]
    pub slab: f64,
    #[serde(rename = "PILE")]
    pub pile: f64,
}

impl Default for FirstFloorDefaults {
    fn default() -> Self {
        Self { basement: 4.0, shallow: 3.0, slab: 1.0, pile: 8.0 }
    }
}

impl FirstFloorDefaults {
    pub fn get(&self, class: FoundationClass) -> f64 {
        match class {
            FoundationClass::Basement => self.basement,
            FoundationClass::Shallow => self.shallow,
            FoundationClass::Slab => self.slab,
            FoundationClass::Pile => self.pile,
        }
    }
}

/// Thresholds for the advisory validation rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// RES1 above this many stories is unusual
    pub res1_max_stories: u32,
    /// Any building above this many stories is unusual
    pub mid_rise_max_stories: u32,
    /// Area above `area_multiplier` x typical area is unusual
    pub area_multiplier: f64,
    /// Occupancy -> typical square footage
    pub typical_area_sqft: HashMap<String, f64>,
    /// Return periods at or below this are "frequent"
    pub frequent_return_period: u32,
    pub frequent_depth_ft: f64,
    pub high_velocity_fps: f64,
    /// Return periods at or below this count for HIGH_10YR_LOSS
    pub ten_year_return_period: u32,
    pub ten_year_loss_ratio: f64,
    pub aal_loss_ratio: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        let typical_area_sqft = [
            ("RES1", 1800.0),
            ("RES2", 1475.0),
            ("RES3", 2200.0),
            ("RES4", 135_000.0),
            ("RES5", 25_000.0),
            ("RES6", 25_000.0),
            ("COM1", 110_000.0),
            ("COM2", 30_000.0),
            ("COM3", 10_000.0),
            ("COM4", 80_000.0),
            ("IND1", 30_000.0),
            ("EDU1", 50_000.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            res1_max_stories: 3,
            mid_rise_max_stories: 50,
            area_multiplier: 5.0,
            typical_area_sqft,
            frequent_return_period: 25,
            frequent_depth_ft: 5.0,
            high_velocity_fps: 10.0,
            ten_year_return_period: 10,
            ten_year_loss_ratio: 0.5,
            aal_loss_ratio: 0.05,
        }
    }
}

impl ValidationThresholds {
    /// Typical area for an occupancy; RES3A..RES3F fall back to RES3
    pub fn typical_area(&self, occupancy: &str) -> Option<f64> {
        self.typical_area_sqft.get(occupancy).copied().or_else(|| {
            if occupancy.starts_with("RES3") {
                self.typical_area_sqft.get("RES3").copied()
            } else {
                None
            }
        })
    }
}
