//! Shared helpers
//!
//! - `columns`: typed column extraction from polars frames with validation
//! - `logging`: tracing subscriber setup for binaries

pub mod columns;
pub mod logging;

pub use columns::{read_csv, require_columns, write_csv};
pub use logging::init_logging;
