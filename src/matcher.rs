//! DDF Rule Matcher
//!
//! Assigns each building a discrete distribution over damage functions.
//!
//! Per building and component:
//! 1. Candidate rows come from the occupancy index (exact occupancy plus
//!    null-occupancy rows). A building without an occupancy takes every row.
//! 2. Categorical predicates filter the candidates: foundation class,
//!    construction type, flood peril. A null on either side passes.
//!    No survivors -> `No_Match`.
//! 3. Story range. A story count above every surviving row's `story_max`
//!    is clamped down to the largest `story_max` (clamp-high). No
//!    survivors -> `Story_Out_Of_Range`.
//! 4. Square-footage range, never clamped. No survivors -> `SQFT_Out_Of_Range`.
//! 5. Weight of a damage function = rows assigning it / surviving rows.
//!
//! Every predicate can be switched off with a wildcard
//! ([`MatchFields::with_wildcards`]).

use crate::classify::ClassifiedBuilding;
use crate::error::InputError;
use crate::reference::{DdfLookupRow, DdfLookupTable};
use crate::types::{BuildingId, DamageComponent, DamageFunctionId, MatchResult, MatchStatus};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Which predicates are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFields {
    pub occupancy: bool,
    pub foundation: bool,
    pub stories: bool,
    pub construction: bool,
    pub peril: bool,
    pub area: bool,
}

impl Default for MatchFields {
    fn default() -> Self {
        Self::all()
    }
}

impl MatchFields {
    pub fn all() -> Self {
        Self {
            occupancy: true,
            foundation: true,
            stories: true,
            construction: true,
            peril: true,
            area: true,
        }
    }

    /// All predicates except the named building fields
    ///
    /// Field names follow the building schema: `occupancy_type`,
    /// `foundation_type`, `number_stories`, `general_building_type`,
    /// `flood_peril_type`, `area`.
    pub fn with_wildcards<S: AsRef<str>>(wildcards: &[S]) -> Result<Self, InputError> {
        let mut fields = Self::all();
        for name in wildcards {
            match name.as_ref() {
                "occupancy_type" => fields.occupancy = false,
                "foundation_type" => fields.foundation = false,
                "number_stories" => fields.stories = false,
                "general_building_type" => fields.construction = false,
                "flood_peril_type" => fields.peril = false,
                "area" => fields.area = false,
                other => return Err(InputError::UnknownWildcardField(other.to_string())),
            }
        }
        Ok(fields)
    }
}

/// Damage function with its match weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedFunction {
    pub damage_function_id: DamageFunctionId,
    pub weight: f64,
}

/// Matching outcome for one building and component
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingMatch {
    pub building_id: BuildingId,
    pub component: DamageComponent,
    pub status: MatchStatus,
    /// Sorted by damage function id; weights sum to 1 when matched
    pub functions: SmallVec<[WeightedFunction; 4]>,
    /// Story count actually used when clamp-high applied
    pub clamped_stories: Option<u32>,
}

impl BuildingMatch {
    pub fn unmatched(building_id: BuildingId, component: DamageComponent, status: MatchStatus) -> Self {
        Self {
            building_id,
            component,
            status,
            functions: SmallVec::new(),
            clamped_stories: None,
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.functions.iter().map(|f| f.weight).sum()
    }

    /// (id, weight) pairs for damage evaluation
    pub fn weighted_ids(&self) -> impl Iterator<Item = (DamageFunctionId, f64)> + '_ {
        self.functions.iter().map(|f| (f.damage_function_id, f.weight))
    }

    /// Flatten to weighted result rows (one null row when unmatched)
    pub fn results(&self) -> Vec<MatchResult> {
        if self.functions.is_empty() {
            return vec![MatchResult {
                building_id: self.building_id,
                component: self.component,
                damage_function_id: None,
                weight: 0.0,
                match_status: self.status,
            }];
        }
        self.functions
            .iter()
            .map(|f| MatchResult {
                building_id: self.building_id,
                component: self.component,
                damage_function_id: Some(f.damage_function_id),
                weight: f.weight,
                match_status: self.status,
            })
            .collect()
    }
}

/// Matcher bound to one component's lookup table
pub struct DdfMatcher<'a> {
    table: &'a DdfLookupTable,
    component: DamageComponent,
    fields: MatchFields,
}

impl<'a> DdfMatcher<'a> {
    pub fn new(table: &'a DdfLookupTable, component: DamageComponent, fields: MatchFields) -> Self {
        Self { table, component, fields }
    }

    fn categorical_ok(&self, row: &DdfLookupRow, building: &ClassifiedBuilding) -> bool {
        // Occupancy is handled by the candidate index
        let foundation_ok = !self.fields.foundation
            || row.foundation_type.map_or(true, |f| f == building.foundation_class);

        let construction_ok = !self.fields.construction
            || match (&row.construction_type, &building.construction_type) {
                (Some(r), Some(b)) => r == b,
                _ => true,
            };

        let peril_ok = !self.fields.peril
            || row
                .peril_type
                .as_deref()
                .map_or(true, |p| p == building.peril_type.code());

        foundation_ok && construction_ok && peril_ok
    }

    /// Match one building
    pub fn match_building(&self, building: &ClassifiedBuilding) -> BuildingMatch {
        let occupancy = if self.fields.occupancy { building.occupancy_type.as_deref() } else { None };

        let categorical: SmallVec<[usize; 16]> = self
            .table
            .candidate_rows(occupancy)
            .into_iter()
            .filter(|&idx| self.categorical_ok(self.table.row(idx), building))
            .collect();

        if categorical.is_empty() {
            return BuildingMatch::unmatched(building.id, self.component, MatchStatus::NoMatch);
        }

        let mut clamped_stories = None;
        let story_rows: SmallVec<[usize; 16]> = if self.fields.stories {
            let stories = self.effective_stories(&categorical, building.stories);
            if stories != building.stories {
                clamped_stories = Some(stories);
            }
            categorical
                .into_iter()
                .filter(|&idx| self.table.row(idx).story_contains(stories))
                .collect()
        } else {
            categorical
        };

        if story_rows.is_empty() {
            return BuildingMatch::unmatched(building.id, self.component, MatchStatus::StoryOutOfRange);
        }

        let valid: SmallVec<[usize; 16]> = match (self.fields.area, building.area) {
            (true, Some(area)) => story_rows
                .into_iter()
                .filter(|&idx| self.table.row(idx).sqft_contains(area))
                .collect(),
            _ => story_rows,
        };

        if valid.is_empty() {
            return BuildingMatch::unmatched(building.id, self.component, MatchStatus::SqftOutOfRange);
        }

        BuildingMatch {
            building_id: building.id,
            component: self.component,
            status: MatchStatus::Matched,
            functions: self.weights(&valid),
            clamped_stories,
        }
    }

    /// Clamp-high: stories above every candidate's bounded `story_max`
    /// drop to the largest `story_max`
    fn effective_stories(&self, rows: &[usize], stories: u32) -> u32 {
        let mut largest_max: Option<u32> = None;
        for &idx in rows {
            match self.table.row(idx).story_max {
                // An open upper bound already admits any story count
                None => return stories,
                Some(max) => largest_max = Some(largest_max.map_or(max, |m| m.max(max))),
            }
        }
        match largest_max {
            Some(max) if stories > max => max,
            _ => stories,
        }
    }

    /// Count-based weights over the surviving rows, sorted by id
    fn weights(&self, rows: &[usize]) -> SmallVec<[WeightedFunction; 4]> {
        let mut counts: FxHashMap<DamageFunctionId, usize> = FxHashMap::default();
        for &idx in rows {
            *counts.entry(self.table.row(idx).damage_function_id).or_default() += 1;
        }

        let total = rows.len() as f64;
        let mut functions: SmallVec<[WeightedFunction; 4]> = counts
            .into_iter()
            .map(|(damage_function_id, count)| WeightedFunction {
                damage_function_id,
                weight: count as f64 / total,
            })
            .collect();
        functions.sort_by_key(|f| f.damage_function_id);
        functions
    }
}

/// Tally of match statuses, for logging and reports
pub fn status_counts(matches: &[BuildingMatch]) -> FxHashMap<MatchStatus, usize> {
    let mut counts = FxHashMap::default();
    for m in matches {
        *counts.entry(m.status).or_default() += 1;
    }
    counts
}
