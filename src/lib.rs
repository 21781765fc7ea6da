//! Survey Models - classifier comparison on tabular survey data
//!
//! Each model family runs the same workflow:
//! preprocess → specify → compose → [tune] → finalize → fit → evaluate.
//!
//! # Modules
//!
//! ## Workflow
//! - [`preprocessing`] - Recipes: imputation, filters, dummy encoding
//! - [`model`] - Model specifications and trained engines
//! - [`workflow`] - Recipe + model bundles, fitting and prediction
//! - [`tuning`] - Grid generation and cross-validated tuning
//! - [`evaluation`] - Confusion matrix, ROC curve, variable importance
//!
//! ## Data
//! - [`dataset`] - Train/test split and cross-validation folds
//! - [`training`] - Classifier engines
//!
//! ## Infrastructure
//! - [`cache`] - Artifact cache for tuning results, models and plots
//! - [`config`] - Run configuration
//! - [`families`] - The four model families end to end
//! - [`cli`] - Command-line interface

pub mod error;
pub mod config;
pub mod utils;

pub mod dataset;
pub mod preprocessing;
pub mod training;
pub mod model;
pub mod workflow;
pub mod tuning;
pub mod evaluation;

pub mod cache;
pub mod families;
pub mod cli;

pub use error::{FlowError, Result};
pub use config::{EventLevel, RunConfig};
pub use dataset::Dataset;
pub use preprocessing::Recipe;
pub use model::{specify, Algorithm, Hyperparameter, ModelSpec, ParamRange, ParamSet};
pub use workflow::{compose, FittedWorkflow, Workflow};
pub use tuning::{tune_grid, GridSpec, TuningResult};
pub use evaluation::{Evaluation, Metric};
pub use cache::ArtifactCache;
pub use families::{run_family, FamilyReport, ModelFamily};
