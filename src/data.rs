//! Data Loading
//!
//! Reads reference tables and input streams from CSV with polars and turns
//! them into the engine's typed records. Frame-level constructors
//! (`*_from_frame`) are public so callers holding a `DataFrame` from
//! elsewhere skip the file round trip.
//!
//! Reference directory layout:
//! - `df_lookup_structures.csv` (required)
//! - `df_lookup_contents.csv` (optional)
//! - `df_lookup_inventory.csv` (optional)
//! - `damage_curves.csv` (required)

use crate::reference::{DamageCurve, DamageCurveSet, DdfLookupRow, DdfLookupTable, ReferenceData};
use crate::types::{Building, DamageFunctionId, FoundationClass, HazardSample};
use crate::utils::columns::{
    f64_column, optional_f64_column, optional_str_column, optional_u32_column, read_csv, require_columns,
    required_value, str_column, u32_column, u64_column,
};
use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const STRUCTURE_LOOKUP_FILE: &str = "df_lookup_structures.csv";
pub const CONTENT_LOOKUP_FILE: &str = "df_lookup_contents.csv";
pub const INVENTORY_LOOKUP_FILE: &str = "df_lookup_inventory.csv";
pub const CURVES_FILE: &str = "damage_curves.csv";

/// Load lookup tables and curves from a reference directory
pub fn load_reference_data(dir: &Path) -> Result<ReferenceData> {
    let structure = load_lookup_table(&dir.join(STRUCTURE_LOOKUP_FILE))?;
    let content = load_optional_lookup(&dir.join(CONTENT_LOOKUP_FILE))?;
    let inventory = load_optional_lookup(&dir.join(INVENTORY_LOOKUP_FILE))?;
    let curves = load_damage_curves(&dir.join(CURVES_FILE))?;

    info!(
        structure_rules = structure.len(),
        content_rules = content.as_ref().map_or(0, DdfLookupTable::len),
        inventory_rules = inventory.as_ref().map_or(0, DdfLookupTable::len),
        curves = curves.len(),
        "Loaded reference data from {:?}",
        dir
    );

    ReferenceData::new(Some(structure), content, inventory, curves)
        .with_context(|| format!("Inconsistent reference data in {:?}", dir))
}

fn load_optional_lookup(path: &Path) -> Result<Option<DdfLookupTable>> {
    if path.exists() {
        load_lookup_table(path).map(Some)
    } else {
        debug!("No lookup table at {:?}; component skipped", path);
        Ok(None)
    }
}

pub fn load_lookup_table(path: &Path) -> Result<DdfLookupTable> {
    let df = read_csv(path)?;
    lookup_table_from_frame(&df).with_context(|| format!("Invalid DDF lookup table {:?}", path))
}

/// Lookup rules; any key column other than `damage_function_id` may be absent
pub fn lookup_table_from_frame(df: &DataFrame) -> Result<DdfLookupTable> {
    const CONTEXT: &str = "DDF lookup";
    require_columns(df, &["damage_function_id"], CONTEXT)?;

    let construction = optional_str_column(df, "construction_type")?;
    let occupancy = optional_str_column(df, "occupancy_type")?;
    let foundation = optional_str_column(df, "foundation_type")?;
    let peril = optional_str_column(df, "flood_peril_type")?;
    let story_min = optional_u32_column(df, "story_min")?;
    let story_max = optional_u32_column(df, "story_max")?;
    let sqft_min = optional_f64_column(df, "sqft_min")?;
    let sqft_max = optional_f64_column(df, "sqft_max")?;
    let ids = u32_column(df, "damage_function_id")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let foundation_type = match &foundation[i] {
            Some(code) => Some(
                FoundationClass::from_code(code)
                    .ok_or_else(|| anyhow!("{}: row {} has unknown foundation_type '{}'", CONTEXT, i, code))?,
            ),
            None => None,
        };

        rows.push(DdfLookupRow {
            construction_type: construction[i].clone(),
            occupancy_type: occupancy[i].clone(),
            foundation_type,
            peril_type: peril[i].clone(),
            story_min: story_min[i],
            story_max: story_max[i],
            sqft_min: sqft_min[i],
            sqft_max: sqft_max[i],
            damage_function_id: required_value(ids[i], "damage_function_id", i, CONTEXT)?,
        });
    }

    Ok(DdfLookupTable::new(rows)?)
}

pub fn load_damage_curves(path: &Path) -> Result<DamageCurveSet> {
    let df = read_csv(path)?;
    damage_curves_from_frame(&df).with_context(|| format!("Invalid damage curves {:?}", path))
}

/// Curves in wide (`ddf_id`, `depth_<d>`...) or long (`ddf_id`, `depth`, `damage_percent`) layout
pub fn damage_curves_from_frame(df: &DataFrame) -> Result<DamageCurveSet> {
    require_columns(df, &["ddf_id"], "damage curves")?;
    let curves = if df.column("depth").is_ok() && df.column("damage_percent").is_ok() {
        long_curves(df)?
    } else {
        wide_curves(df)?
    };

    // Loss bands assume damage grows with depth
    let decreasing: Vec<DamageFunctionId> =
        curves.iter().filter(|c| !c.is_non_decreasing()).map(|c| c.id).collect();
    if !decreasing.is_empty() {
        warn!("{} damage curves decrease with depth: {:?}", decreasing.len(), decreasing);
    }

    Ok(DamageCurveSet::new(curves)?)
}

/// Depth encoded in a wide column name: `depth_m4_5` -> -4.5
pub fn parse_depth_column(name: &str) -> Option<f64> {
    let encoded = name.strip_prefix("depth_")?;
    let (sign, digits) = match encoded.strip_prefix('m') {
        Some(rest) => (-1.0, rest),
        None => (1.0, encoded),
    };
    digits.replace('_', ".").parse::<f64>().ok().map(|d| sign * d)
}

fn wide_curves(df: &DataFrame) -> Result<Vec<DamageCurve>> {
    let mut depth_columns: Vec<(String, f64)> = df
        .get_column_names()
        .iter()
        .filter_map(|name| parse_depth_column(name.as_str()).map(|d| (name.to_string(), d)))
        .collect();
    if depth_columns.is_empty() {
        return Err(anyhow!("damage curves: no depth_<d> columns and no long-format columns"));
    }
    depth_columns.sort_by(|a, b| a.1.total_cmp(&b.1));

    let ids = u32_column(df, "ddf_id")?;
    let values: Vec<Vec<Option<f64>>> = depth_columns
        .iter()
        .map(|(name, _)| f64_column(df, name))
        .collect::<Result<_>>()?;

    let mut curves = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let id = required_value(ids[i], "ddf_id", i, "damage curves")?;
        // Blank cells mean the curve is undefined at that depth
        let points: Vec<(f64, f64)> = depth_columns
            .iter()
            .zip(&values)
            .filter_map(|((_, depth), column)| column[i].map(|damage| (*depth, damage)))
            .collect();
        curves.push(DamageCurve::new(id, points)?);
    }
    Ok(curves)
}

fn long_curves(df: &DataFrame) -> Result<Vec<DamageCurve>> {
    let ids = u32_column(df, "ddf_id")?;
    let depths = f64_column(df, "depth")?;
    let damages = f64_column(df, "damage_percent")?;

    let mut by_id: FxHashMap<DamageFunctionId, Vec<(f64, f64)>> = FxHashMap::default();
    for i in 0..df.height() {
        let id = required_value(ids[i], "ddf_id", i, "damage curves")?;
        let depth = required_value(depths[i], "depth", i, "damage curves")?;
        let damage = required_value(damages[i], "damage_percent", i, "damage curves")?;
        by_id.entry(id).or_default().push((depth, damage));
    }

    let mut ids: Vec<DamageFunctionId> = by_id.keys().copied().collect();
    ids.sort_unstable();

    let mut curves = Vec::with_capacity(ids.len());
    for id in ids {
        let mut points = by_id.remove(&id).unwrap_or_default();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        curves.push(DamageCurve::new(id, points)?);
    }
    Ok(curves)
}

pub fn load_buildings(path: &Path) -> Result<Vec<Building>> {
    let df = read_csv(path)?;
    let buildings = buildings_from_frame(&df).with_context(|| format!("Invalid buildings file {:?}", path))?;
    info!("Loaded {} buildings from {:?}", buildings.len(), path);
    Ok(buildings)
}

pub fn buildings_from_frame(df: &DataFrame) -> Result<Vec<Building>> {
    const CONTEXT: &str = "buildings";
    require_columns(
        df,
        &["id", "occupancy_type", "foundation_type", "number_stories", "building_cost"],
        CONTEXT,
    )?;

    let ids = u64_column(df, "id")?;
    let occupancy = str_column(df, "occupancy_type")?;
    let construction = optional_str_column(df, "general_building_type")?;
    let foundation = str_column(df, "foundation_type")?;
    let stories = f64_column(df, "number_stories")?;
    let area = optional_f64_column(df, "area")?;
    let building_cost = f64_column(df, "building_cost")?;
    let content_cost = optional_f64_column(df, "content_cost")?;
    let inventory_cost = optional_f64_column(df, "inventory_cost")?;
    let first_floor_height = optional_f64_column(df, "first_floor_height")?;
    let geometry = optional_str_column(df, "geometry")?;

    (0..df.height())
        .map(|i| {
            Ok(Building {
                id: required_value(ids[i], "id", i, CONTEXT)?,
                // A missing occupancy matches every lookup row
                occupancy_type: occupancy[i].clone().unwrap_or_default(),
                general_building_type: construction[i].clone(),
                // Unknown codes fall back during classification
                foundation_type: foundation[i].clone().unwrap_or_default(),
                // Missing story counts are raised to 1 during classification
                number_stories: stories[i].unwrap_or(f64::NAN),
                area: area[i],
                building_cost: building_cost[i].unwrap_or(0.0),
                content_cost: content_cost[i].unwrap_or(0.0),
                inventory_cost: inventory_cost[i].unwrap_or(0.0),
                first_floor_height: first_floor_height[i],
                geometry: geometry[i].clone(),
            })
        })
        .collect()
}

pub fn load_hazard(path: &Path) -> Result<Vec<HazardSample>> {
    let df = read_csv(path)?;
    let samples = hazard_from_frame(&df).with_context(|| format!("Invalid hazard file {:?}", path))?;
    info!("Loaded {} hazard samples from {:?}", samples.len(), path);
    Ok(samples)
}

/// Hazard samples; a null depth reads as dry (0 ft)
pub fn hazard_from_frame(df: &DataFrame) -> Result<Vec<HazardSample>> {
    const CONTEXT: &str = "hazard";
    require_columns(df, &["building_id", "return_period", "depth"], CONTEXT)?;

    let ids = u64_column(df, "building_id")?;
    let rps = u32_column(df, "return_period")?;
    let depth = f64_column(df, "depth")?;
    let velocity = optional_f64_column(df, "velocity")?;
    let duration = optional_f64_column(df, "duration")?;
    let uncertainty = optional_f64_column(df, "uncertainty")?;

    (0..df.height())
        .map(|i| {
            Ok(HazardSample {
                building_id: required_value(ids[i], "building_id", i, CONTEXT)?,
                return_period: required_value(rps[i], "return_period", i, CONTEXT)?,
                depth: depth[i].unwrap_or(0.0),
                velocity: velocity[i],
                duration: duration[i],
                uncertainty: uncertainty[i],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_depth_column() {
        assert_eq!(parse_depth_column("depth_m4_0"), Some(-4.0));
        assert_eq!(parse_depth_column("depth_2_5"), Some(2.5));
        assert_eq!(parse_depth_column("depth_10"), Some(10.0));
        assert_eq!(parse_depth_column("depth_x"), None);
        assert_eq!(parse_depth_column("ddf_id"), None);
    }

    #[test]
    fn test_wide_curves_skip_blank_cells() {
        let df = df!(
            "ddf_id" => &[1i64, 2],
            "depth_m1_0" => &[None, Some(0.0)],
            "depth_0" => &[Some(0.0), Some(10.0)],
            "depth_10" => &[Some(100.0), Some(50.0)]
        )
        .unwrap();
        let curves = damage_curves_from_frame(&df).unwrap();
        assert_eq!(curves.get(1).unwrap().depths(), &[0.0, 10.0]);
        assert_eq!(curves.get(2).unwrap().depths(), &[-1.0, 0.0, 10.0]);
        // Decreasing damage is logged, not rejected
        assert!(!curves.get(2).unwrap().is_non_decreasing());
    }

    #[test]
    fn test_long_curves_sorted_by_depth() {
        let df = df!(
            "ddf_id" => &[5i64, 5, 5],
            "depth" => &[4.0, 0.0, 2.0],
            "damage_percent" => &[40.0, 0.0, 20.0]
        )
        .unwrap();
        let curves = damage_curves_from_frame(&df).unwrap();
        assert_eq!(curves.get(5).unwrap().damages(), &[0.0, 20.0, 40.0]);
    }

    #[test]
    fn test_lookup_frame_with_missing_key_columns() {
        let df = df!(
            "occupancy_type" => &["RES1", "RES1"],
            "foundation_type" => &[Some("SLAB"), None],
            "story_min" => &[Some(1i64), None],
            "story_max" => &[Some(2i64), None],
            "damage_function_id" => &[10i64, 11]
        )
        .unwrap();
        let table = lookup_table_from_frame(&df).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).foundation_type, Some(FoundationClass::Slab));
        assert_eq!(table.row(1).story_max, None);
        assert_eq!(table.row(0).construction_type, None);
    }

    #[test]
    fn test_lookup_rejects_unknown_foundation() {
        let df = df!("foundation_type" => &["CRAWL"], "damage_function_id" => &[1i64]).unwrap();
        let err = lookup_table_from_frame(&df).unwrap_err().to_string();
        assert!(err.contains("CRAWL"));
    }

    #[test]
    fn test_buildings_frame_defaults() {
        let df = df!(
            "id" => &[1i64],
            "occupancy_type" => &["RES1"],
            "foundation_type" => &[7i64],
            "number_stories" => &[2i64],
            "building_cost" => &[150_000.0]
        )
        .unwrap();
        let buildings = buildings_from_frame(&df).unwrap();
        assert_eq!(buildings[0].foundation_type, "7");
        assert_eq!(buildings[0].number_stories, 2.0);
        assert_eq!(buildings[0].content_cost, 0.0);
        assert_eq!(buildings[0].first_floor_height, None);
    }

    #[test]
    fn test_buildings_frame_accepts_null_occupancy() {
        let df = df!(
            "id" => &[1i64, 2],
            "occupancy_type" => &[None, Some("COM1")],
            "foundation_type" => &["S", "B"],
            "number_stories" => &[1i64, 2],
            "building_cost" => &[100_000.0, 200_000.0]
        )
        .unwrap();
        let buildings = buildings_from_frame(&df).unwrap();
        assert_eq!(buildings[0].occupancy_type, "");
        assert_eq!(buildings[1].occupancy_type, "COM1");
    }

    #[test]
    fn test_hazard_frame_requires_return_period() {
        let df = df!("building_id" => &[1i64], "depth" => &[1.0]).unwrap();
        assert!(hazard_from_frame(&df).is_err());
    }
}
