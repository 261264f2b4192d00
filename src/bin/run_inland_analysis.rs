//! Run an inland flood analysis from CSV inputs
//!
//! Usage:
//!   run_inland_analysis <reference_dir> <buildings.csv> <hazard.csv> <output_dir> [config.json]
//!
//! Writes losses.csv, aal.csv, matches.csv, validation.csv and
//! scenario_losses.csv to the output directory.

use anyhow::{bail, Context, Result};
use flood_loss_engine::data::{load_buildings, load_hazard, load_reference_data};
use flood_loss_engine::utils::{init_logging, write_csv};
use flood_loss_engine::{AnalysisConfig, InlandFloodAnalysis};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        bail!(
            "usage: {} <reference_dir> <buildings.csv> <hazard.csv> <output_dir> [config.json]",
            args.first().map(String::as_str).unwrap_or("run_inland_analysis")
        );
    }

    let reference_dir = PathBuf::from(&args[1]);
    let buildings_path = PathBuf::from(&args[2]);
    let hazard_path = PathBuf::from(&args[3]);
    let output_dir = PathBuf::from(&args[4]);

    let config = match args.get(5) {
        Some(path) => AnalysisConfig::load(Path::new(path))?,
        None => AnalysisConfig::default(),
    };

    let load_start = Instant::now();
    let reference = load_reference_data(&reference_dir)?;
    let buildings = load_buildings(&buildings_path)?;
    let hazard = load_hazard(&hazard_path)?;
    info!("Inputs loaded in {:?}", load_start.elapsed());

    let analysis = InlandFloodAnalysis::new(reference, config)?;
    let output = analysis.run(&buildings, &hazard)?;

    fs::create_dir_all(&output_dir).with_context(|| format!("Failed to create {:?}", output_dir))?;

    let tables = [
        ("losses.csv", output.loss_table()?),
        ("aal.csv", output.aal_table()?),
        ("matches.csv", output.match_table()?),
        ("validation.csv", output.validation_table()?),
        ("scenario_losses.csv", output.scenario_table()?),
    ];
    for (name, mut df) in tables {
        let path = output_dir.join(name);
        write_csv(&mut df, &path)?;
        info!("Wrote {} rows to {:?}", df.height(), path);
    }

    if let Some(aal) = output.portfolio.aal {
        info!(
            "Portfolio AAL: {:.2} (min {:.2}, max {:.2})",
            aal.best, aal.low, aal.high
        );
    }

    Ok(())
}
