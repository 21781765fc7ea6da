//! Preprocessing recipes: imputation, filtering and dummy encoding

pub mod encoder;
pub mod feature_selection;
pub mod imputer;
pub mod recipe;

pub use encoder::DummyEncoder;
pub use feature_selection::{pearson_correlation, CorrelationFilter, ZeroVarianceFilter};
pub use imputer::{ImputeStrategy, ImputeValue, Imputer};
pub use recipe::{DesignMatrix, FittedRecipe, FittedStep, Recipe, Selector, Step};
