//! Table loading and writing

use crate::error::{FlowError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Loader for CSV, Parquet and JSON tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Strings read as missing in CSV input
    null_values: Vec<String>,
    /// Rows used for CSV schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            null_values: vec!["NA".to_string()],
            infer_schema_length: 1000,
        }
    }

    pub fn with_null_values(mut self, values: Vec<String>) -> Self {
        self.null_values = values;
        self
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;

        let null_values = match self.null_values.len() {
            0 => None,
            1 => Some(NullValues::AllColumnsSingle(self.null_values[0].as_str().into())),
            _ => Some(NullValues::AllColumns(
                self.null_values.iter().map(|v| v.as_str().into()).collect(),
            )),
        };
        let parse_opts = CsvParseOptions::default().with_null_values(null_values);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| FlowError::DataError(format!("{}: {}", path.display(), e)))
    }

    pub fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| FlowError::DataError(format!("{}: {}", path.display(), e)))
    }

    pub fn load_json(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        JsonReader::new(file)
            .finish()
            .map_err(|e| FlowError::DataError(format!("{}: {}", path.display(), e)))
    }

    /// Detect the format from the extension and load
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "csv" => self.load_csv(path)?,
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" | "jsonl" => self.load_json(path)?,
            other => {
                return Err(FlowError::DataError(format!(
                    "unsupported file format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed = ?start.elapsed(),
            "loaded table"
        );
        Ok(df)
    }

    pub fn write_csv(&self, df: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        let mut df = df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_null_value(self.null_values.first().cloned().unwrap_or_default())
            .finish(&mut df)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_csv_with_na() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "age,sex,weapon").unwrap();
        writeln!(file, "14,F,No").unwrap();
        writeln!(file, "NA,M,Yes").unwrap();
        writeln!(file, "16,NA,No").unwrap();
        drop(file);

        let df = DataLoader::new().load(&path).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("age").unwrap().null_count(), 1);
        assert_eq!(df.column("sex").unwrap().null_count(), 1);
    }

    #[test]
    fn test_write_then_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let df = df!(
            "x" => &[Some(1.5), None],
            "g" => &["a", "b"],
        )
        .unwrap();

        let loader = DataLoader::new();
        loader.write_csv(&df, &path).unwrap();
        let back = loader.load(&path).unwrap();
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.column("x").unwrap().null_count(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DataLoader::new().load("data.xlsx").unwrap_err();
        assert!(matches!(err, FlowError::DataError(_)));
    }
}
