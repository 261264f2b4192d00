//! Reference data: DDF lookup tables and damage curves
//!
//! Loaded once per run and shared read-only across workers. The lookup
//! table is indexed by occupancy so matching never materializes the full
//! buildings x rules cross-product.

use crate::error::ReferenceError;
use crate::types::{DamageComponent, DamageFunctionId, FoundationClass};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One rule of a DDF lookup table
///
/// `None` on any key means the rule does not constrain that attribute.
/// Story and square-footage ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DdfLookupRow {
    pub construction_type: Option<String>,
    pub occupancy_type: Option<String>,
    pub foundation_type: Option<FoundationClass>,
    /// Kept as text: tables also carry coastal perils (CST, CMV, CHW)
    pub peril_type: Option<String>,
    pub story_min: Option<u32>,
    pub story_max: Option<u32>,
    pub sqft_min: Option<f64>,
    pub sqft_max: Option<f64>,
    pub damage_function_id: DamageFunctionId,
}

impl DdfLookupRow {
    /// Story count inside the row's range (null bounds are open)
    pub fn story_contains(&self, stories: u32) -> bool {
        self.story_min.map_or(true, |min| min <= stories) && self.story_max.map_or(true, |max| stories <= max)
    }

    /// Area inside the row's range (null bounds are open)
    pub fn sqft_contains(&self, area: f64) -> bool {
        self.sqft_min.map_or(true, |min| min <= area) && self.sqft_max.map_or(true, |max| area <= max)
    }
}

/// Lookup table with an occupancy index
#[derive(Debug, Clone, Default)]
pub struct DdfLookupTable {
    rows: Vec<DdfLookupRow>,
    /// Occupancy -> row indices (ascending)
    by_occupancy: FxHashMap<String, Vec<usize>>,
    /// Rows with null occupancy (apply to every occupancy)
    any_occupancy: Vec<usize>,
}

impl DdfLookupTable {
    /// Normalize keys, check ranges and build the occupancy index
    pub fn new(rows: Vec<DdfLookupRow>) -> Result<Self, ReferenceError> {
        let mut rows = rows;
        let mut by_occupancy: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut any_occupancy = Vec::new();

        for (idx, row) in rows.iter_mut().enumerate() {
            if let (Some(min), Some(max)) = (row.story_min, row.story_max) {
                if min > max {
                    return Err(ReferenceError::InvalidRange { row: idx, field: "story" });
                }
            }
            if let (Some(min), Some(max)) = (row.sqft_min, row.sqft_max) {
                if min > max {
                    return Err(ReferenceError::InvalidRange { row: idx, field: "sqft" });
                }
            }

            row.construction_type = normalize_key(row.construction_type.take());
            row.occupancy_type = normalize_key(row.occupancy_type.take());
            row.peril_type = normalize_key(row.peril_type.take());

            match &row.occupancy_type {
                Some(occ) => by_occupancy.entry(occ.clone()).or_default().push(idx),
                None => any_occupancy.push(idx),
            }
        }

        Ok(Self { rows, by_occupancy, any_occupancy })
    }

    pub fn rows(&self) -> &[DdfLookupRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &DdfLookupRow {
        &self.rows[idx]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that can apply to an occupancy, in table order
    ///
    /// `None` disables the occupancy constraint and returns every row.
    pub fn candidate_rows(&self, occupancy: Option<&str>) -> SmallVec<[usize; 16]> {
        let Some(occupancy) = occupancy else {
            return (0..self.rows.len()).collect();
        };

        let exact = self.by_occupancy.get(occupancy).map(Vec::as_slice).unwrap_or(&[]);
        let mut out: SmallVec<[usize; 16]> = SmallVec::with_capacity(exact.len() + self.any_occupancy.len());

        // Merge two ascending index lists so table order is preserved
        let (mut i, mut j) = (0, 0);
        while i < exact.len() || j < self.any_occupancy.len() {
            let take_exact = match (exact.get(i), self.any_occupancy.get(j)) {
                (Some(a), Some(b)) => a < b,
                (Some(_), None) => true,
                _ => false,
            };
            if take_exact {
                out.push(exact[i]);
                i += 1;
            } else {
                out.push(self.any_occupancy[j]);
                j += 1;
            }
        }
        out
    }

    /// Every damage function the table can assign
    pub fn damage_function_ids(&self) -> impl Iterator<Item = DamageFunctionId> + '_ {
        self.rows.iter().map(|r| r.damage_function_id)
    }
}

fn normalize_key(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_ascii_uppercase())
        .filter(|v| !v.is_empty())
}

/// Depth-damage curve: strictly increasing depths (ft) -> percent damage (0-100)
///
/// Deserialization goes through [`DamageCurve::new`], so a decoded curve
/// holds the same invariants as a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDamageCurve")]
pub struct DamageCurve {
    pub id: DamageFunctionId,
    pub(crate) depths: Vec<f64>,
    pub(crate) damages: Vec<f64>,
}

impl DamageCurve {
    /// Build from control points sorted by depth
    pub fn new(id: DamageFunctionId, points: Vec<(f64, f64)>) -> Result<Self, ReferenceError> {
        if points.is_empty() {
            return Err(ReferenceError::EmptyCurve { id });
        }

        for (index, (depth, damage)) in points.iter().enumerate() {
            if !depth.is_finite() || !damage.is_finite() {
                return Err(ReferenceError::NonFiniteCurve { id, index });
            }
        }
        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].0 <= pair[0].0 {
                return Err(ReferenceError::NonMonotonicCurve { id, index: index + 1 });
            }
        }

        let (depths, damages) = points.into_iter().unzip();
        Ok(Self { id, depths, damages })
    }

    pub fn depths(&self) -> &[f64] {
        &self.depths
    }

    pub fn damages(&self) -> &[f64] {
        &self.damages
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.depths.iter().copied().zip(self.damages.iter().copied())
    }
}

/// Serialized form of [`DamageCurve`]
#[derive(Deserialize)]
struct RawDamageCurve {
    id: DamageFunctionId,
    depths: Vec<f64>,
    damages: Vec<f64>,
}

impl TryFrom<RawDamageCurve> for DamageCurve {
    type Error = ReferenceError;

    fn try_from(raw: RawDamageCurve) -> Result<Self, Self::Error> {
        if raw.depths.len() != raw.damages.len() {
            return Err(ReferenceError::CurveLengthMismatch {
                id: raw.id,
                depths: raw.depths.len(),
                damages: raw.damages.len(),
            });
        }
        DamageCurve::new(raw.id, raw.depths.into_iter().zip(raw.damages).collect())
    }
}

/// All damage curves of a run, keyed by damage function id
#[derive(Debug, Clone, Default)]
pub struct DamageCurveSet {
    curves: FxHashMap<DamageFunctionId, DamageCurve>,
}

impl DamageCurveSet {
    pub fn new(curves: Vec<DamageCurve>) -> Result<Self, ReferenceError> {
        let mut map = FxHashMap::default();
        for curve in curves {
            let id = curve.id;
            if map.insert(id, curve).is_some() {
                return Err(ReferenceError::DuplicateCurve { id });
            }
        }
        Ok(Self { curves: map })
    }

    pub fn get(&self, id: DamageFunctionId) -> Option<&DamageCurve> {
        self.curves.get(&id)
    }

    pub fn contains(&self, id: DamageFunctionId) -> bool {
        self.curves.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

/// Immutable reference data shared by every worker of a run
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Per component, indexed by [`DamageComponent::index`]
    lookups: [Option<DdfLookupTable>; 3],
    curves: DamageCurveSet,
}

impl ReferenceData {
    /// Bundle tables and curves, checking every assignable function has a curve
    pub fn new(
        structure: Option<DdfLookupTable>,
        content: Option<DdfLookupTable>,
        inventory: Option<DdfLookupTable>,
        curves: DamageCurveSet,
    ) -> Result<Self, ReferenceError> {
        let lookups = [structure, content, inventory];

        for component in DamageComponent::ALL {
            if let Some(table) = &lookups[component.index()] {
                if let Some(id) = table.damage_function_ids().find(|id| !curves.contains(*id)) {
                    return Err(ReferenceError::MissingCurve { id, component });
                }
            }
        }

        Ok(Self { lookups, curves })
    }

    pub fn lookup(&self, component: DamageComponent) -> Option<&DdfLookupTable> {
        self.lookups[component.index()].as_ref()
    }

    pub fn curves(&self) -> &DamageCurveSet {
        &self.curves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(occ: Option<&str>, id: DamageFunctionId) -> DdfLookupRow {
        DdfLookupRow {
            occupancy_type: occ.map(str::to_string),
            damage_function_id: id,
            ..Default::default()
        }
    }

    #[test]
    fn test_candidate_rows_merge_wildcards_in_table_order() {
        let table = DdfLookupTable::new(vec![
            row(Some("res1"), 1),
            row(None, 2),
            row(Some("COM1"), 3),
            row(Some("RES1 "), 4),
        ])
        .unwrap();

        assert_eq!(table.candidate_rows(Some("RES1")).as_slice(), &[0, 1, 3]);
        assert_eq!(table.candidate_rows(Some("COM1")).as_slice(), &[1, 2]);
        assert_eq!(table.candidate_rows(Some("IND1")).as_slice(), &[1]);
        assert_eq!(table.candidate_rows(None).len(), 4);
    }

    #[test]
    fn test_lookup_rejects_inverted_range() {
        let bad = DdfLookupRow {
            story_min: Some(4),
            story_max: Some(2),
            damage_function_id: 1,
            ..Default::default()
        };
        assert_eq!(
            DdfLookupTable::new(vec![bad]).unwrap_err(),
            ReferenceError::InvalidRange { row: 0, field: "story" }
        );
    }

    #[test]
    fn test_ranges_are_inclusive_and_open_when_null() {
        let r = DdfLookupRow {
            story_min: Some(2),
            story_max: Some(4),
            sqft_max: Some(1500.0),
            damage_function_id: 1,
            ..Default::default()
        };
        assert!(r.story_contains(2) && r.story_contains(4));
        assert!(!r.story_contains(1) && !r.story_contains(5));
        assert!(r.sqft_contains(0.0) && r.sqft_contains(1500.0));
        assert!(!r.sqft_contains(1500.5));
    }

    #[test]
    fn test_curve_requires_increasing_depths() {
        assert!(DamageCurve::new(1, vec![(0.0, 0.0), (1.0, 10.0)]).is_ok());
        assert_eq!(
            DamageCurve::new(2, vec![(0.0, 0.0), (0.0, 10.0)]).unwrap_err(),
            ReferenceError::NonMonotonicCurve { id: 2, index: 1 }
        );
        assert_eq!(DamageCurve::new(3, vec![]).unwrap_err(), ReferenceError::EmptyCurve { id: 3 });
    }

    #[test]
    fn test_reference_data_requires_curves_for_lookup_ids() {
        let table = DdfLookupTable::new(vec![row(Some("RES1"), 42)]).unwrap();
        let curves = DamageCurveSet::new(vec![DamageCurve::new(1, vec![(0.0, 0.0)]).unwrap()]).unwrap();
        let err = ReferenceData::new(Some(table), None, None, curves).unwrap_err();
        assert_eq!(err, ReferenceError::MissingCurve { id: 42, component: DamageComponent::Structure });
    }

    #[test]
    fn test_duplicate_curve_rejected() {
        let c = DamageCurve::new(5, vec![(0.0, 0.0)]).unwrap();
        assert_eq!(
            DamageCurveSet::new(vec![c.clone(), c]).unwrap_err(),
            ReferenceError::DuplicateCurve { id: 5 }
        );
    }

    #[test]
    fn test_curve_json_goes_through_constructor() {
        let curve: DamageCurve =
            serde_json::from_str(r#"{"id":4,"depths":[0.0,2.0],"damages":[0.0,50.0]}"#).unwrap();
        assert_eq!(curve.interpolate(1.0), 25.0);

        let round_trip: DamageCurve = serde_json::from_str(&serde_json::to_string(&curve).unwrap()).unwrap();
        assert_eq!(round_trip, curve);

        for bad in [
            r#"{"id":1,"depths":[],"damages":[]}"#,
            r#"{"id":2,"depths":[0.0,1.0,2.0],"damages":[0.0]}"#,
            r#"{"id":3,"depths":[1.0,0.0],"damages":[0.0,10.0]}"#,
        ] {
            assert!(serde_json::from_str::<DamageCurve>(bad).is_err(), "{bad}");
        }

        let err = serde_json::from_str::<DamageCurve>(r#"{"id":2,"depths":[0.0,1.0,2.0],"damages":[0.0]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("3 depths but 1 damage values"));
    }
}
