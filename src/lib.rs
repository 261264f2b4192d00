//! Inland Flood Loss Engine
//!
//! Depth-damage-function assignment, loss and AAL computation for inland
//! flood consequence modeling.
//!
//! Pipeline (leaf to root):
//! - `classify`: foundation class, peril tag, story clamp, first-floor height
//! - `matcher`: weighted DDF assignment from the lookup tables
//! - `curves`: piecewise-linear damage curve evaluation
//! - `loss`: percent damage and monetary loss per component and return period
//! - `aal`: Riemann-sum average annualized loss
//!
//! `analysis` runs the pipeline over a batch with rayon; `data` loads the
//! reference tables and input streams with polars.

pub mod aal;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod curves;
pub mod data;
pub mod error;
pub mod loss;
pub mod matcher;
pub mod reference;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use aal::{annualized_band, annualized_loss, AalMode, AalSummary};
pub use analysis::{AnalysisOutput, BuildingOutcome, InlandFloodAnalysis, PortfolioSummary};
pub use classify::{classify_building, ClassifiedBuilding};
pub use config::AnalysisConfig;
pub use error::{AalError, InputError, ReferenceError};
pub use loss::{adjust_loss_for_policy, damage_statistics, LossCalculator, PolicyTerms};
pub use matcher::{BuildingMatch, DdfMatcher, MatchFields};
pub use reference::{DamageCurve, DamageCurveSet, DdfLookupRow, DdfLookupTable, ReferenceData};
pub use types::*;
pub use validation::{Severity, ValidationFlag, ValidationRule, ValidationSource};
