//! Typed column extraction from polars frames
//!
//! CSV schema inference varies with content (an all-empty column reads as
//! String, foundation codes may read as integers), so every accessor casts
//! to the target dtype before extracting values. Casts are non-strict:
//! unparsable cells become null.

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read a headered CSV file
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

/// Write a frame to CSV with a header row
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {:?}", path))
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Fail with the available columns listed when any required column is missing
pub fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    for &expected in columns {
        if !has_column(df, expected) {
            let available: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                available
            ));
        }
    }
    Ok(())
}

fn cast_column(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Column> {
    df.column(name)
        .with_context(|| format!("Column '{}' not found", name))?
        .cast(dtype)
        .with_context(|| format!("Column '{}' cannot be cast to {:?}", name, dtype))
}

pub fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = cast_column(df, name, &DataType::Float64)?;
    Ok(col.f64()?.into_iter().collect())
}

pub fn u64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<u64>>> {
    let col = cast_column(df, name, &DataType::UInt64)?;
    Ok(col.u64()?.into_iter().collect())
}

pub fn u32_column(df: &DataFrame, name: &str) -> Result<Vec<Option<u32>>> {
    let col = cast_column(df, name, &DataType::UInt32)?;
    Ok(col.u32()?.into_iter().collect())
}

/// Trimmed strings; empty cells are null
pub fn str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = cast_column(df, name, &DataType::String)?;
    Ok(col
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

/// Like [`f64_column`], all-null when the column is absent
pub fn optional_f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if has_column(df, name) {
        f64_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn optional_u32_column(df: &DataFrame, name: &str) -> Result<Vec<Option<u32>>> {
    if has_column(df, name) {
        u32_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn optional_str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if has_column(df, name) {
        str_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Non-null value or an error naming the row
pub fn required_value<T>(value: Option<T>, column: &str, row: usize, context: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{}: row {} has no value in column '{}'", context, row, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casts_and_optional_columns() {
        let df = df!(
            "id" => &[1i64, 2, 3],
            "depth" => &[Some(1.5), None, Some(3.0)],
            "code" => &[7i64, 4, 1]
        )
        .unwrap();

        assert_eq!(u64_column(&df, "id").unwrap(), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(f64_column(&df, "depth").unwrap(), vec![Some(1.5), None, Some(3.0)]);
        assert_eq!(str_column(&df, "code").unwrap()[0].as_deref(), Some("7"));
        assert_eq!(optional_f64_column(&df, "velocity").unwrap(), vec![None, None, None]);
        assert!(f64_column(&df, "velocity").is_err());
    }

    #[test]
    fn test_require_columns_lists_available() {
        let df = df!("a" => &[1i64]).unwrap();
        assert!(require_columns(&df, &["a"], "test").is_ok());
        let err = require_columns(&df, &["a", "b"], "buildings").unwrap_err().to_string();
        assert!(err.contains("'b'"));
        assert!(err.contains("buildings"));
    }

    #[test]
    fn test_blank_strings_are_null() {
        let df = df!("occ" => &[Some(" RES1 "), Some(""), None]).unwrap();
        assert_eq!(str_column(&df, "occ").unwrap(), vec![Some("RES1".to_string()), None, None]);
    }
}
