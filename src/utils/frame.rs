//! Column access helpers over polars frames

use crate::error::{FlowError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Broad column type as seen by preprocessing selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Nominal,
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

pub fn column_kind(df: &DataFrame, name: &str) -> Result<ColumnKind> {
    Ok(kind_of(df.column(name)?))
}

/// Values of a column as `f64`, with nulls and NaN mapped to `None`
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    column_f64(df.column(name)?)
}

/// Values of a column rendered as strings, with nulls mapped to `None`
pub fn nominal_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    column_strings(df.column(name)?)
}

pub fn column_f64(col: &Column) -> Result<Vec<Option<f64>>> {
    let series = col.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

pub fn column_strings(col: &Column) -> Result<Vec<Option<String>>> {
    let series = col.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

pub fn kind_of(col: &Column) -> ColumnKind {
    if col.dtype().is_primitive_numeric() {
        ColumnKind::Numeric
    } else {
        ColumnKind::Nominal
    }
}

/// Rebuild a frame column by column; `f` returns the replacement columns
/// for each input column (empty to drop it)
pub fn rebuild<F>(df: &DataFrame, mut f: F) -> Result<DataFrame>
where
    F: FnMut(&Column) -> Result<Vec<Column>>,
{
    let mut out = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        out.extend(f(col)?);
    }
    Ok(DataFrame::new(out)?)
}

/// Rows at the given positions, in the given order
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let height = df.height();
    if let Some(&bad) = rows.iter().find(|&&r| r >= height) {
        return Err(FlowError::DataError(format!(
            "row index {} out of range for table with {} rows",
            bad, height
        )));
    }
    let idx = IdxCa::from_vec(
        "idx".into(),
        rows.iter().map(|&r| r as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

pub fn float_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn string_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(name.into(), values)
}

/// Count of missing values per column, in column order
pub fn missing_counts(df: &DataFrame) -> Vec<(String, usize)> {
    df.get_columns()
        .iter()
        .map(|c| (c.name().to_string(), c.null_count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "age" => &[Some(14.0), None, Some(16.0), Some(f64::NAN)],
            "sex" => &[Some("F"), Some("M"), None, Some("F")],
        )
        .unwrap()
    }

    #[test]
    fn test_kinds_and_values() {
        let df = frame();
        assert_eq!(column_kind(&df, "age").unwrap(), ColumnKind::Numeric);
        assert_eq!(column_kind(&df, "sex").unwrap(), ColumnKind::Nominal);

        let ages = numeric_values(&df, "age").unwrap();
        assert_eq!(ages, vec![Some(14.0), None, Some(16.0), None]);

        let sex = nominal_values(&df, "sex").unwrap();
        assert_eq!(sex[2], None);
        assert_eq!(sex[3].as_deref(), Some("F"));
    }

    #[test]
    fn test_integer_and_boolean_kinds() {
        let df = df!(
            "grade" => &[9i32, 10, 11],
            "fights" => &[0i64, 2, 1],
            "bullied" => &[true, false, true],
        )
        .unwrap();
        assert_eq!(column_kind(&df, "grade").unwrap(), ColumnKind::Numeric);
        assert_eq!(column_kind(&df, "fights").unwrap(), ColumnKind::Numeric);
        assert_eq!(column_kind(&df, "bullied").unwrap(), ColumnKind::Nominal);
    }

    #[test]
    fn test_take_rows() {
        let df = frame();
        let taken = take_rows(&df, &[3, 0]).unwrap();
        assert_eq!(taken.height(), 2);
        assert_eq!(nominal_values(&taken, "sex").unwrap()[1].as_deref(), Some("F"));
        assert!(take_rows(&df, &[4]).is_err());
    }

    #[test]
    fn test_missing_counts() {
        let counts = missing_counts(&frame());
        assert_eq!(counts[1], ("sex".to_string(), 1));
        assert!(has_column(&frame(), "age"));
        assert!(!has_column(&frame(), "bmi"));
    }
}
