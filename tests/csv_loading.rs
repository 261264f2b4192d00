// CSV inputs -> analysis -> CSV outputs through temp files

use approx::assert_relative_eq;
use flood_loss_engine::data::{load_buildings, load_damage_curves, load_hazard, load_reference_data};
use flood_loss_engine::utils::{read_csv, write_csv};
use flood_loss_engine::{AnalysisConfig, DamageComponent, FoundationClass, InlandFloodAnalysis, MatchStatus};
use std::fs;
use std::path::PathBuf;

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("flood_loss_engine_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        TempDir(path)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.0.join(name);
        fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

const STRUCTURES: &str = "\
construction_type,occupancy_type,foundation_type,flood_peril_type,story_min,story_max,sqft_min,sqft_max,damage_function_id
W,RES1,SLAB,RLS,1,1,,,101
W,RES1,SLAB,RLS,2,3,,,102
,RES1,BASE,,1,3,,,103
,COM1,,,,,,,201
";

const CONTENTS: &str = "\
occupancy_type,foundation_type,damage_function_id
RES1,,301
";

const CURVES: &str = "\
ddf_id,depth_m2_0,depth_0,depth_2_5,depth_10
101,0,0,25,100
102,0,0,20,80
103,5,10,30,90
201,0,5,15,60
301,0,0,50,100
";

const BUILDINGS: &str = "\
id,occupancy_type,general_building_type,foundation_type,number_stories,area,building_cost,content_cost,inventory_cost,first_floor_height
1,RES1-1SNB,W,S,1,1500,200000,100000,0,
2,RES1,W,7,2,2000,300000,0,0,1.0
3,RES1,W,B,2,2400,250000,125000,0,
4,COM1,M,S,3,50000,1000000,0,0,2.0
";

const HAZARD: &str = "\
building_id,return_period,depth,velocity,duration,uncertainty
1,10,0.0,,,
1,100,2.0,,,
1,500,3.5,,,
2,10,0.0,1.0,,
2,100,1.0,1.5,,
2,500,3.5,2.0,,
3,10,0.0,,,
3,100,0.5,,,
3,500,2.0,,,
4,10,0.5,,,0.5
4,100,2.5,,,0.5
4,500,4.0,,,0.5
";

fn reference_dir(tmp: &TempDir) -> PathBuf {
    tmp.write("df_lookup_structures.csv", STRUCTURES);
    tmp.write("df_lookup_contents.csv", CONTENTS);
    tmp.write("damage_curves.csv", CURVES);
    tmp.0.clone()
}

#[test]
fn test_reference_directory_loads() {
    let tmp = TempDir::new("reference");
    let reference = load_reference_data(&reference_dir(&tmp)).unwrap();

    let structure = reference.lookup(DamageComponent::Structure).unwrap();
    assert_eq!(structure.len(), 4);
    assert_eq!(structure.row(2).foundation_type, Some(FoundationClass::Basement));
    assert_eq!(structure.row(3).story_min, None);
    assert!(reference.lookup(DamageComponent::Content).is_some());
    assert!(reference.lookup(DamageComponent::Inventory).is_none());

    let curve = reference.curves().get(103).unwrap();
    assert_eq!(curve.depths(), &[-2.0, 0.0, 2.5, 10.0]);
}

#[test]
fn test_missing_curve_is_rejected() {
    let tmp = TempDir::new("missing_curve");
    let dir = reference_dir(&tmp);
    tmp.write("damage_curves.csv", "ddf_id,depth_0,depth_10\n101,0,100\n");
    let err = load_reference_data(&dir).unwrap_err();
    assert!(format!("{err:#}").contains("no curve"));
}

#[test]
fn test_long_format_curves() {
    let tmp = TempDir::new("long_curves");
    let path = tmp.write("curves.csv", "ddf_id,depth,damage_percent\n9,2.0,40\n9,0.0,0\n9,-1.0,0\n");
    let curves = load_damage_curves(&path).unwrap();
    assert_eq!(curves.get(9).unwrap().depths(), &[-1.0, 0.0, 2.0]);
}

#[test]
fn test_csv_round_trip() {
    let tmp = TempDir::new("round_trip");
    let reference = load_reference_data(&reference_dir(&tmp)).unwrap();
    let buildings = load_buildings(&tmp.write("buildings.csv", BUILDINGS)).unwrap();
    let hazard = load_hazard(&tmp.write("hazard.csv", HAZARD)).unwrap();

    assert_eq!(buildings.len(), 4);
    assert_eq!(buildings[1].foundation_type, "7");
    assert_eq!(buildings[0].first_floor_height, None);
    assert_eq!(hazard.len(), 12);
    assert_eq!(hazard[9].uncertainty, Some(0.5));

    let analysis = InlandFloodAnalysis::new(reference, AnalysisConfig::default()).unwrap();
    let output = analysis.run(&buildings, &hazard).unwrap();

    // Building 1: RES1-1SNB -> RES1, slab, 1 story -> 101
    let b1 = output.outcome(1).unwrap();
    assert_eq!(b1.matches[0].functions[0].damage_function_id, 101);
    // 3.5 ft raw - 1.0 ft slab default = 2.5 ft -> 25% of 200k
    let rp500 = b1.losses.iter().find(|r| r.return_period == 500 && r.component == DamageComponent::Structure).unwrap();
    assert_relative_eq!(rp500.loss.best, 50_000.0, epsilon = 1e-6);

    // Building 2: numeric foundation 7 -> SLAB, 2 stories -> 102
    assert_eq!(output.outcome(2).unwrap().matches[0].functions[0].damage_function_id, 102);

    // Building 3: basement row has no construction key
    assert_eq!(output.outcome(3).unwrap().matches[0].functions[0].damage_function_id, 103);

    // Building 4: COM1 catch-all row, bands from the uncertainty column
    let b4 = output.outcome(4).unwrap();
    assert_eq!(b4.matches[0].status, MatchStatus::Matched);
    assert!(b4.losses.iter().all(|r| r.loss.is_ordered()));
    assert!(b4.losses.iter().any(|r| r.statistics.is_some()));

    let out_dir = tmp.0.join("out");
    fs::create_dir_all(&out_dir).unwrap();

    let mut losses = output.loss_table().unwrap();
    write_csv(&mut losses, &out_dir.join("losses.csv")).unwrap();
    let mut aal = output.aal_table().unwrap();
    write_csv(&mut aal, &out_dir.join("aal.csv")).unwrap();

    let losses_back = read_csv(&out_dir.join("losses.csv")).unwrap();
    // 4 buildings x 3 RPs x 2 components
    assert_eq!(losses_back.height(), 24);
    assert!(losses_back.column("loss_best").is_ok());
    assert!(losses_back.column("damage_function_ids").is_ok());

    let aal_back = read_csv(&out_dir.join("aal.csv")).unwrap();
    assert_eq!(aal_back.height(), 4);
    assert_eq!(aal_back.get_column_names().len(), 4);
}

#[test]
fn test_blank_occupancy_matches_every_row() {
    let tmp = TempDir::new("blank_occupancy");
    let reference = load_reference_data(&reference_dir(&tmp)).unwrap();
    let buildings = load_buildings(&tmp.write(
        "buildings.csv",
        "id,occupancy_type,general_building_type,foundation_type,number_stories,building_cost,content_cost\n\
         5,,W,S,1,100000,50000\n\
         6,RES1,W,S,1,100000,50000\n",
    ))
    .unwrap();
    let hazard = load_hazard(&tmp.write(
        "hazard.csv",
        "building_id,return_period,depth\n5,10,0.0\n5,100,2.0\n5,500,3.5\n6,10,0.0\n6,100,2.0\n6,500,3.5\n",
    ))
    .unwrap();
    assert_eq!(buildings[0].occupancy_type, "");

    let analysis = InlandFloodAnalysis::new(reference, AnalysisConfig::default()).unwrap();
    let output = analysis.run(&buildings, &hazard).unwrap();

    // Slab, one story: the RES1 row (101) and the COM1 catch-all (201) both apply
    let blank = output.outcome(5).unwrap();
    assert_eq!(blank.building.occupancy_type, None);
    let structure = &blank.matches[0];
    assert_eq!(structure.status, MatchStatus::Matched);
    let ids: Vec<_> = structure.functions.iter().map(|f| f.damage_function_id).collect();
    assert_eq!(ids, vec![101, 201]);
    assert_relative_eq!(structure.weight_sum(), 1.0, epsilon = 1e-12);
    assert_eq!(blank.matches[1].status, MatchStatus::Matched);

    let res1 = output.outcome(6).unwrap();
    assert_eq!(res1.matches[0].functions.len(), 1);
    assert_eq!(res1.matches[0].functions[0].damage_function_id, 101);
}
