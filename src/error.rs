//! Error types for the modelling workflow

use std::fmt::Display;
use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Main error type for the workflow
#[derive(Error, Debug)]
pub enum FlowError {
    /// A column is missing, renamed or has the wrong type between fit and apply
    #[error("Schema error in {step}: column '{column}' {reason}")]
    Schema {
        step: String,
        column: String,
        reason: String,
    },

    /// Empty partitions, all-missing columns, single-class outcomes
    #[error("Degenerate data in {step}: {reason}")]
    DegenerateData { step: String, reason: String },

    #[error("Invalid hyperparameter: {name} = {value}, {reason}")]
    InvalidHyperparameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Model specification has unresolved tunable parameters: {}", .0.join(", "))]
    NotFinalized(Vec<String>),

    #[error("Metric undefined: {0}")]
    MetricUndefined(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Tuning error: {0}")]
    TuningError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,
}

impl FlowError {
    pub fn schema(
        step: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FlowError::Schema {
            step: step.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn degenerate(step: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::DegenerateData {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_hyperparameter(
        name: impl Into<String>,
        value: impl Display,
        reason: impl Into<String>,
    ) -> Self {
        FlowError::InvalidHyperparameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a tuning sweep may record this error against a single
    /// (candidate, fold) cell and carry on.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidHyperparameter { .. }
                | FlowError::TrainingError(_)
                | FlowError::MetricUndefined(_)
        )
    }
}

impl From<polars::error::PolarsError> for FlowError {
    fn from(err: polars::error::PolarsError) -> Self {
        FlowError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for FlowError {
    fn from(err: ndarray::ShapeError) -> Self {
        FlowError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::schema("impute_mean", "bmi", "is missing from the input table");
        assert_eq!(
            err.to_string(),
            "Schema error in impute_mean: column 'bmi' is missing from the input table"
        );

        let err = FlowError::NotFinalized(vec!["penalty".into(), "mixture".into()]);
        assert!(err.to_string().ends_with("penalty, mixture"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::IoError(_)));
    }

    #[test]
    fn test_contained_errors() {
        assert!(FlowError::invalid_hyperparameter("min_n", -1, "must be >= 1").is_contained());
        assert!(FlowError::TrainingError("diverged".into()).is_contained());
        assert!(!FlowError::degenerate("recipe", "empty").is_contained());
        assert!(!FlowError::schema("bake", "age", "missing").is_contained());
    }
}
