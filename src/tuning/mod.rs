//! Hyperparameter tuning over cross-validation folds

pub mod grid;
pub mod tuner;

pub use grid::{levels, GridSpec};
pub use tuner::{tune_grid, CandidateResult, TuningResult};
