//! Core data model
//!
//! Buildings and hazard samples arrive already normalized from the inventory
//! and raster adapters. Everything else in this module is produced by the
//! engine: match results, loss records and the small enums that key them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Building identifier (NSI `target_fid` or equivalent)
pub type BuildingId = u64;

/// Damage function identifier from the DDF lookup tables
pub type DamageFunctionId = u32;

/// Normalized building record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    /// Hazus occupancy code, e.g. `RES1`, `COM1`
    pub occupancy_type: String,
    /// Construction type: W, M, C, S, MH
    pub general_building_type: Option<String>,
    /// Raw foundation code (NSI letter, NSI numeric or 4-letter FLSBT code)
    pub foundation_type: String,
    pub number_stories: f64,
    /// Square footage
    pub area: Option<f64>,
    pub building_cost: f64,
    pub content_cost: f64,
    pub inventory_cost: f64,
    /// Feet above grade; defaulted from the foundation class when absent
    pub first_floor_height: Option<f64>,
    /// WKT geometry, carried through untouched
    pub geometry: Option<String>,
}

impl Building {
    /// Valuation for a damage component
    pub fn valuation(&self, component: DamageComponent) -> f64 {
        match component {
            DamageComponent::Structure => self.building_cost,
            DamageComponent::Content => self.content_cost,
            DamageComponent::Inventory => self.inventory_cost,
        }
    }
}

/// Hazard values sampled at one building for one return period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardSample {
    pub building_id: BuildingId,
    pub return_period: u32,
    /// Water depth above grade (ft)
    pub depth: f64,
    /// ft/s
    pub velocity: Option<f64>,
    /// hours
    pub duration: Option<f64>,
    /// One standard deviation of depth (ft)
    pub uncertainty: Option<f64>,
}

/// Foundation class used by the DDF tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FoundationClass {
    #[serde(rename = "BASE")]
    Basement,
    #[serde(rename = "SHAL")]
    Shallow,
    #[serde(rename = "SLAB")]
    Slab,
    #[serde(rename = "PILE")]
    Pile,
}

impl FoundationClass {
    pub const ALL: [FoundationClass; 4] = [
        FoundationClass::Basement,
        FoundationClass::Shallow,
        FoundationClass::Slab,
        FoundationClass::Pile,
    ];

    pub fn code(self) -> &'static str {
        match self {
            FoundationClass::Basement => "BASE",
            FoundationClass::Shallow => "SHAL",
            FoundationClass::Slab => "SLAB",
            FoundationClass::Pile => "PILE",
        }
    }

    /// Parse a 4-letter FLSBT code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "BASE" => Some(FoundationClass::Basement),
            "SHAL" => Some(FoundationClass::Shallow),
            "SLAB" => Some(FoundationClass::Slab),
            "PILE" => Some(FoundationClass::Pile),
            _ => None,
        }
    }
}

impl fmt::Display for FoundationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Inland flood peril: Riverine, Low/High velocity, Short/Long duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerilType {
    Rls,
    Rhs,
    Rll,
    Rhl,
}

impl PerilType {
    pub fn code(self) -> &'static str {
        match self {
            PerilType::Rls => "RLS",
            PerilType::Rhs => "RHS",
            PerilType::Rll => "RLL",
            PerilType::Rhl => "RHL",
        }
    }

    pub fn from_flags(high_velocity: bool, long_duration: bool) -> Self {
        match (high_velocity, long_duration) {
            (false, false) => PerilType::Rls,
            (true, false) => PerilType::Rhs,
            (false, true) => PerilType::Rll,
            (true, true) => PerilType::Rhl,
        }
    }
}

impl fmt::Display for PerilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Damage component, each with its own lookup table and valuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageComponent {
    Structure,
    Content,
    Inventory,
}

impl DamageComponent {
    pub const ALL: [DamageComponent; 3] = [
        DamageComponent::Structure,
        DamageComponent::Content,
        DamageComponent::Inventory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DamageComponent::Structure => "structure",
            DamageComponent::Content => "content",
            DamageComponent::Inventory => "inventory",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DamageComponent::Structure => 0,
            DamageComponent::Content => 1,
            DamageComponent::Inventory => 2,
        }
    }
}

impl fmt::Display for DamageComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of DDF matching for one building and component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "Matched")]
    Matched,
    #[serde(rename = "No_Match")]
    NoMatch,
    #[serde(rename = "Story_Out_Of_Range")]
    StoryOutOfRange,
    #[serde(rename = "SQFT_Out_Of_Range")]
    SqftOutOfRange,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Matched => "Matched",
            MatchStatus::NoMatch => "No_Match",
            MatchStatus::StoryOutOfRange => "Story_Out_Of_Range",
            MatchStatus::SqftOutOfRange => "SQFT_Out_Of_Range",
        }
    }

    pub fn is_matched(self) -> bool {
        self == MatchStatus::Matched
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weighted row of a building's damage-function distribution
///
/// Unmatched buildings produce a single row with no damage function and
/// weight 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub building_id: BuildingId,
    pub component: DamageComponent,
    pub damage_function_id: Option<DamageFunctionId>,
    pub weight: f64,
    pub match_status: MatchStatus,
}

/// Low / best / high estimate triple
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandValues {
    pub low: f64,
    pub best: f64,
    pub high: f64,
}

impl BandValues {
    pub fn uniform(value: f64) -> Self {
        Self { low: value, best: value, high: value }
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self { low: f(self.low), best: f(self.best), high: f(self.high) }
    }

    pub fn is_ordered(&self) -> bool {
        self.low <= self.best && self.best <= self.high
    }
}

impl std::ops::Add for BandValues {
    type Output = BandValues;

    fn add(self, rhs: BandValues) -> BandValues {
        BandValues {
            low: self.low + rhs.low,
            best: self.best + rhs.best,
            high: self.high + rhs.high,
        }
    }
}

impl std::ops::AddAssign for BandValues {
    fn add_assign(&mut self, rhs: BandValues) {
        *self = *self + rhs;
    }
}

/// Triangular-distribution summary of the damage band (percentage points)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageStatistics {
    pub d_mode: f64,
    /// Hinge-corrected mean
    pub mean: f64,
    /// Half-range standard deviation
    pub std: f64,
    pub triangular_std: f64,
    /// `None` when the band has zero width
    pub range_std: Option<f64>,
}

/// Loss for one building, return period and component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub building_id: BuildingId,
    pub return_period: u32,
    pub component: DamageComponent,
    /// Raw depth minus first-floor height (best estimate)
    pub depth_in_structure: f64,
    /// Percentage points (0-100)
    pub percent_damage: BandValues,
    pub loss: BandValues,
    pub statistics: Option<DamageStatistics>,
}

impl LossRecord {
    /// Best-estimate loss amount
    pub fn loss_amount(&self) -> f64 {
        self.loss.best
    }
}
