//! Shared classifier trait

use crate::error::{FlowError, Result};
use ndarray::{Array1, Array2};

/// Binary classifier trained on a 0/1 outcome
pub trait Classifier: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Probability of the positive (1) class for each row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels at a 0.5 threshold
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Per-feature importance native to the algorithm, if any
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    fn name(&self) -> &'static str;
}

/// Validate that `x` and `y` line up, are non-empty and `y` is 0/1
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(FlowError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(FlowError::TrainingError("no training rows".to_string()));
    }
    if x.ncols() == 0 {
        return Err(FlowError::TrainingError("no predictor columns".to_string()));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(FlowError::TrainingError(
            "outcome must be encoded as 0/1".to_string(),
        ));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FlowError::TrainingError(
            "predictors contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(FlowError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
