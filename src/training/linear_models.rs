//! Penalized logistic regression
//!
//! Minimises the glmnet objective
//!
//! ```text
//! (1/n) * sum(logloss) + penalty * ((1 - mixture) / 2 * |b|^2 + mixture * |b|_1)
//! ```
//!
//! with accelerated proximal gradient descent (FISTA) on standardized
//! predictors. The intercept is never penalized. `penalty = 0` gives ordinary
//! maximum-likelihood logistic regression; `mixture = 1` is the lasso.

use super::models::{check_features, check_training_data, Classifier};
use crate::error::{FlowError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Overall regularization strength
    pub penalty: f64,
    /// Share of L1 in the penalty (1.0 = lasso, 0.0 = ridge)
    pub mixture: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest coefficient change
    pub tol: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// Coefficients on the standardized scale
    standardized: Option<Array1<f64>>,
    n_iter: usize,
    converged: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Unpenalized logistic regression
    pub fn new() -> Self {
        Self {
            penalty: 0.0,
            mixture: 1.0,
            max_iter: 2000,
            tol: 1e-6,
            coefficients: None,
            intercept: 0.0,
            standardized: None,
            n_iter: 0,
            converged: false,
        }
    }

    /// L1-penalized logistic regression
    pub fn lasso(penalty: f64) -> Self {
        Self::new().with_penalty(penalty).with_mixture(1.0)
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_mixture(mut self, mixture: f64) -> Self {
        self.mixture = mixture;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(FlowError::invalid_hyperparameter(
                "penalty",
                self.penalty,
                "must be a non-negative number",
            ));
        }
        if !(0.0..=1.0).contains(&self.mixture) {
            return Err(FlowError::invalid_hyperparameter(
                "mixture",
                self.mixture,
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Largest eigenvalue of `[1 z]^T [1 z] / n` by power iteration
    fn gram_spectral_norm(z: &Array2<f64>) -> f64 {
        let n = z.nrows() as f64;
        let p = z.ncols();
        let mut v_b = 1.0 / ((p + 1) as f64).sqrt();
        let mut v_w = Array1::from_elem(p, v_b);
        let mut lambda = 1.0;

        for _ in 0..50 {
            let u = z.dot(&v_w) + v_b;
            let g_b = u.sum() / n;
            let g_w = z.t().dot(&u) / n;
            let norm = (g_b * g_b + g_w.mapv(|v| v * v).sum()).sqrt();
            if norm <= f64::EPSILON {
                break;
            }
            lambda = norm;
            v_b = g_b / norm;
            v_w = g_w / norm;
        }
        lambda
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.validate()?;

        let n = x.nrows() as f64;
        let p = x.ncols();

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| FlowError::TrainingError("empty design matrix".to_string()))?;
        let stds = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let z = (x - &means) / &stds;

        let l1 = self.penalty * self.mixture;
        let l2 = self.penalty * (1.0 - self.mixture);
        let lipschitz = 0.25 * Self::gram_spectral_norm(&z) + l2;
        let step = 1.0 / lipschitz.max(1e-8);

        let mut w = Array1::<f64>::zeros(p);
        let mut b = 0.0;
        let mut v_w = w.clone();
        let mut v_b = b;
        let mut t = 1.0f64;

        self.converged = false;
        self.n_iter = 0;
        for iter in 0..self.max_iter {
            let prob = Self::sigmoid(&(z.dot(&v_w) + v_b));
            let residual = &prob - y;
            let grad_w = z.t().dot(&residual) / n + &v_w * l2;
            let grad_b = residual.sum() / n;

            let new_w = (&v_w - &(grad_w * step)).mapv(|v| Self::soft_threshold(v, step * l1));
            let new_b = v_b - step * grad_b;

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;

            let delta = (&new_w - &w)
                .iter()
                .fold((new_b - b).abs(), |acc, d| acc.max(d.abs()));

            v_w = &new_w + &((&new_w - &w) * momentum);
            v_b = new_b + (new_b - b) * momentum;
            w = new_w;
            b = new_b;
            t = t_next;
            self.n_iter = iter + 1;

            if delta < self.tol {
                self.converged = true;
                break;
            }
        }

        if w.iter().any(|v| !v.is_finite()) || !b.is_finite() {
            return Err(FlowError::TrainingError(
                "logistic regression diverged".to_string(),
            ));
        }
        if !self.converged {
            debug!(iterations = self.n_iter, penalty = self.penalty, "logistic regression hit max_iter");
        }

        let coefficients = &w / &stds;
        self.intercept = b - (&coefficients * &means).sum();
        self.coefficients = Some(coefficients);
        self.standardized = Some(w);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(FlowError::ModelNotFitted)?;
        check_features(x, coefficients.len())?;
        Ok(Self::sigmoid(&(x.dot(coefficients) + self.intercept)))
    }

    /// Absolute standardized coefficients
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.standardized.as_ref().map(|w| w.mapv(f64::abs))
    }

    fn name(&self) -> &'static str {
        if self.penalty > 0.0 {
            "penalized logistic regression"
        } else {
            "logistic regression"
        }
    }
}
