//! Bridge from a finalized [`ModelSpec`] to a trained engine

use super::spec::{Algorithm, ModelSpec, ParamSet};
use crate::error::{FlowError, Result};
use crate::training::{
    Classifier, DecisionTree, LogisticRegression, MaxFeatures, RandomForest,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A trained classification engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    Logistic(LogisticRegression),
    Tree(DecisionTree),
    Forest(RandomForest),
}

fn float_param(values: &ParamSet, name: &str) -> Result<f64> {
    values
        .get(name)
        .map(|v| v.as_f64())
        .ok_or_else(|| FlowError::ConfigError(format!("missing parameter '{}'", name)))
}

fn int_param(values: &ParamSet, name: &str) -> Result<usize> {
    values
        .get(name)
        .ok_or_else(|| FlowError::ConfigError(format!("missing parameter '{}'", name)))?
        .as_usize(name)
}

impl TrainedModel {
    /// Train the engine described by `spec` on a 0/1 design matrix
    pub fn train(spec: &ModelSpec, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<Self> {
        let values = spec.fixed_values()?;
        let engine = spec.engine();

        let mut model = match spec.algorithm() {
            Algorithm::LogisticRegression => TrainedModel::Logistic(
                LogisticRegression::new()
                    .with_max_iter(engine.max_iter)
                    .with_tol(engine.tol),
            ),
            Algorithm::LassoLogistic => TrainedModel::Logistic(
                LogisticRegression::lasso(float_param(&values, "penalty")?)
                    .with_mixture(float_param(&values, "mixture")?)
                    .with_max_iter(engine.max_iter)
                    .with_tol(engine.tol),
            ),
            Algorithm::DecisionTree => {
                let min_n = int_param(&values, "min_n")?;
                // leaves hold at least a third of the split minimum
                let min_leaf = ((min_n as f64 / 3.0).round() as usize).max(1);
                TrainedModel::Tree(
                    DecisionTree::new()
                        .with_cost_complexity(float_param(&values, "cost_complexity")?)
                        .with_max_depth(int_param(&values, "tree_depth")?)
                        .with_min_samples_split(min_n)
                        .with_min_samples_leaf(min_leaf)
                        .with_random_state(seed),
                )
            }
            Algorithm::RandomForest => {
                let n_features = x.ncols();
                let max_features = match values.get("mtry") {
                    Some(v) => {
                        let mtry = v.as_usize("mtry")?;
                        if mtry > n_features {
                            warn!(mtry, n_features, "mtry exceeds the number of predictors; clamped");
                        }
                        MaxFeatures::Fixed(mtry.min(n_features))
                    }
                    None => MaxFeatures::Sqrt,
                };
                TrainedModel::Forest(
                    RandomForest::new(int_param(&values, "trees")?)
                        .with_min_samples_split(int_param(&values, "min_n")?)
                        .with_max_features(max_features)
                        .with_oob_score(engine.oob_score)
                        .with_random_state(seed),
                )
            }
        };

        debug!(
            algorithm = %spec.algorithm(),
            rows = x.nrows(),
            features = x.ncols(),
            "training engine"
        );
        model.as_classifier_mut().fit(x, y)?;
        Ok(model)
    }

    pub fn as_classifier(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Logistic(m) => m,
            TrainedModel::Tree(m) => m,
            TrainedModel::Forest(m) => m,
        }
    }

    fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            TrainedModel::Logistic(m) => m,
            TrainedModel::Tree(m) => m,
            TrainedModel::Forest(m) => m,
        }
    }

    /// Probability of the event level per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict_proba(x)
    }

    /// Importance native to the engine: impurity reduction for trees and
    /// forests, absolute standardized coefficients for logistic models
    pub fn native_importance(&self) -> Option<Array1<f64>> {
        self.as_classifier().feature_importances()
    }

    pub fn name(&self) -> &'static str {
        self.as_classifier().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::Hyperparameter;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 1.0],
            [1.0, 0.0],
            [2.0, 1.0],
            [3.0, 0.0],
            [4.0, 1.0],
            [5.0, 0.0],
            [6.0, 1.0],
            [7.0, 0.0]
        ];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_train_each_algorithm() {
        let (x, y) = data();
        let specs = vec![
            ModelSpec::logistic_reg(),
            ModelSpec::lasso_reg(0.01).unwrap(),
            ModelSpec::decision_tree(0.0, 3usize, 2usize).unwrap(),
            ModelSpec::rand_forest(None, 2usize, 10).unwrap(),
        ];
        for spec in specs {
            let model = TrainedModel::train(&spec, &x, &y, 1).unwrap();
            let p = model.predict_proba(&x).unwrap();
            assert_eq!(p.len(), 8);
            assert!(model.native_importance().is_some());
        }
    }

    #[test]
    fn test_unfinalized_spec_is_rejected() {
        let (x, y) = data();
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        assert!(matches!(
            TrainedModel::train(&spec, &x, &y, 1),
            Err(FlowError::NotFinalized(_))
        ));
    }

    #[test]
    fn test_mtry_is_clamped() {
        let (x, y) = data();
        let spec = ModelSpec::rand_forest(Some(9usize.into()), 2usize, 5).unwrap();
        let model = TrainedModel::train(&spec, &x, &y, 3).unwrap();
        match model {
            TrainedModel::Forest(forest) => {
                assert_eq!(forest.max_features, MaxFeatures::Fixed(2))
            }
            other => panic!("unexpected engine {}", other.name()),
        }
    }
}
