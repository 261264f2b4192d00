//! Typed errors for the loss engine
//!
//! Data-quality problems are not errors; they surface as
//! [`ValidationFlag`](crate::validation::ValidationFlag) records instead.

use crate::types::{BuildingId, DamageComponent, DamageFunctionId};
use thiserror::Error;

/// Precondition violations of the AAL integrator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AalError {
    #[error("AAL needs at least 3 return periods, got {supplied}")]
    TooFewReturnPeriods { supplied: usize },

    #[error("return periods must be strictly ascending (violated at index {index})")]
    UnsortedReturnPeriods { index: usize },

    #[error("return period must be positive, got {value}")]
    NonPositiveReturnPeriod { value: u32 },

    #[error("loss at index {index} is negative or not finite")]
    InvalidLoss { index: usize },
}

/// Integrity problems in the DDF lookup tables or damage curves
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("damage curve {id} has no control points")]
    EmptyCurve { id: DamageFunctionId },

    #[error("damage curve {id} depths are not strictly increasing at point {index}")]
    NonMonotonicCurve { id: DamageFunctionId, index: usize },

    #[error("damage curve {id} has a non-finite value at point {index}")]
    NonFiniteCurve { id: DamageFunctionId, index: usize },

    #[error("damage curve {id} has {depths} depths but {damages} damage values")]
    CurveLengthMismatch { id: DamageFunctionId, depths: usize, damages: usize },

    #[error("damage curve {id} defined more than once")]
    DuplicateCurve { id: DamageFunctionId },

    #[error("{component} lookup references damage function {id} with no curve")]
    MissingCurve { id: DamageFunctionId, component: DamageComponent },

    #[error("lookup row {row}: {field} minimum exceeds maximum")]
    InvalidRange { row: usize, field: &'static str },
}

/// Inconsistent building / hazard input streams
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("building {id} appears more than once")]
    DuplicateBuilding { id: BuildingId },

    #[error("hazard sample references unknown building {id}")]
    UnknownBuilding { id: BuildingId },

    #[error("building {id} has no hazard samples")]
    MissingHazard { id: BuildingId },

    #[error("building {id} has more than one sample for return period {return_period}")]
    DuplicateReturnPeriod { id: BuildingId, return_period: u32 },

    #[error("unknown wildcard field '{0}'")]
    UnknownWildcardField(String),

    #[error("analysis cancelled")]
    Cancelled,
}
