//! Random forest of probability trees

use super::decision_tree::DecisionTree;
use super::models::{check_features, check_training_data, Classifier};
use crate::error::{FlowError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for features sampled at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// floor(sqrt(n_features))
    Sqrt,
    /// Fixed number, clamped to n_features
    Fixed(usize),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    /// Minimum rows in a node for it to be split
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub oob_score: bool,
    pub random_state: u64,
    oob_score_value: Option<f64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            min_samples_split: 5,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            oob_score: false,
            random_state: 42,
            oob_score_value: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    /// Out-of-bag accuracy, when requested before fitting
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score_value
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(FlowError::invalid_hyperparameter("trees", 0, "must be at least 1"));
        }
        if self.min_samples_split == 0 {
            return Err(FlowError::invalid_hyperparameter("min_n", 0, "must be at least 1"));
        }
        if self.max_features == MaxFeatures::Fixed(0) {
            return Err(FlowError::invalid_hyperparameter("mtry", 0, "must be at least 1"));
        }
        Ok(())
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (acc, v) in total.iter_mut().zip(imp.iter()) {
                    *acc += v;
                }
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for v in &mut total {
                *v /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    fn compute_oob(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        in_bag: &[Vec<bool>],
    ) -> Result<()> {
        let n = x.nrows();
        let mut sums = vec![0.0; n];
        let mut counts = vec![0usize; n];

        for (tree, bag) in self.trees.iter().zip(in_bag) {
            let oob_rows: Vec<usize> = (0..n).filter(|&i| !bag[i]).collect();
            if oob_rows.is_empty() {
                continue;
            }
            let x_oob = x.select(Axis(0), &oob_rows);
            let p = tree.predict_proba(&x_oob)?;
            for (k, &row) in oob_rows.iter().enumerate() {
                sums[row] += p[k];
                counts[row] += 1;
            }
        }

        let scored: Vec<(f64, f64)> = (0..n)
            .filter(|&i| counts[i] > 0)
            .map(|i| (sums[i] / counts[i] as f64, y[i]))
            .collect();
        self.oob_score_value = if scored.is_empty() {
            None
        } else {
            let correct = scored
                .iter()
                .filter(|(p, t)| (if *p >= 0.5 { 1.0 } else { 0.0 }) == *t)
                .count();
            Some(correct as f64 / scored.len() as f64)
        };
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.validate()?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let max_features = self.compute_max_features(self.n_features);
        let base_seed = self.random_state;

        // Each tree has its own seed so the forest is identical at any thread count
        let fitted: Vec<(DecisionTree, Vec<bool>)> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut in_bag = vec![false; n_samples];
                for &i in &sample_indices {
                    in_bag[i] = true;
                }

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = Array1::from_iter(sample_indices.iter().map(|&i| y[i]));

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_max_features(max_features)
                    .with_random_state(rng.gen());
                tree.fit(&x_boot, &y_boot)?;
                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, in_bag): (Vec<DecisionTree>, Vec<Vec<bool>>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.compute_feature_importances();
        if self.oob_score && self.bootstrap {
            self.compute_oob(x, y, &in_bag)?;
        }
        Ok(())
    }

    /// Mean of the trees' leaf probabilities
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(FlowError::ModelNotFitted);
        }
        check_features(x, self.n_features)?;

        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array1::<f64>::zeros(x.nrows());
        for p in &per_tree {
            sum += p;
        }
        Ok(sum / self.trees.len() as f64)
    }

    /// Mean impurity reduction across trees
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn name(&self) -> &'static str {
        "random forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..80 {
            let label = (i % 2) as f64;
            let shift = if label == 1.0 { 2.0 } else { -2.0 };
            rows.push(shift + ((i * 13) % 7) as f64 / 7.0);
            rows.push(((i * 29) % 11) as f64 / 11.0);
            rows.push(((i * 17) % 5) as f64);
            y.push(label);
        }
        (Array2::from_shape_vec((80, 3), rows).unwrap(), Array1::from_vec(y))
    }

    #[test]
    fn test_forest_fits_and_predicts() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(25).with_random_state(3).with_oob_score(true);
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.n_trees(), 25);
        let p = forest.predict_proba(&x).unwrap();
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));

        let acc = forest
            .predict(&x)
            .unwrap()
            .iter()
            .zip(y.iter())
            .filter(|(a, b)| a == b)
            .count();
        assert!(acc >= 72, "training accuracy {}/80", acc);
        assert!(forest.oob_score().unwrap() > 0.75);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = blobs();
        let mut a = RandomForest::new(10).with_random_state(11);
        let mut b = RandomForest::new(10).with_random_state(11);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_importance_finds_signal() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(30)
            .with_max_features(MaxFeatures::All)
            .with_random_state(5);
        forest.fit(&x, &y).unwrap();
        let imp = forest.feature_importances().unwrap();
        assert!(imp[0] > imp[1] && imp[0] > imp[2]);
    }

    #[test]
    fn test_max_features() {
        let forest = RandomForest::new(1);
        assert_eq!(forest.compute_max_features(10), 3);
        assert_eq!(forest.compute_max_features(1), 1);
        let forest = forest.with_max_features(MaxFeatures::Fixed(50));
        assert_eq!(forest.compute_max_features(10), 10);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(0);
        assert!(matches!(
            forest.fit(&x, &y),
            Err(FlowError::InvalidHyperparameter { .. })
        ));
    }
}
