//! CART classification tree with probability leaves

use super::models::{check_features, check_training_data, Classifier};
use crate::error::{FlowError, Result};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf holding the fraction of positive training rows
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Binary Gini classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum number of split levels
    pub max_depth: Option<usize>,
    /// Minimum rows in a node for it to be split
    pub min_samples_split: usize,
    /// Minimum rows in each child
    pub min_samples_leaf: usize,
    /// A split must reduce total impurity by at least this share of the root impurity
    pub cost_complexity: f64,
    /// Features sampled at each node (None = all)
    pub max_features: Option<usize>,
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

struct BuildContext {
    rng: ChaCha8Rng,
    importances: Vec<f64>,
    /// `n * gini` at the root
    root_risk: f64,
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            cost_complexity: 0.0,
            max_features: None,
            random_state: 42,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_cost_complexity(mut self, cp: f64) -> Self {
        self.cost_complexity = cp;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(FlowError::invalid_hyperparameter("tree_depth", 0, "must be at least 1"));
        }
        if self.min_samples_split == 0 {
            return Err(FlowError::invalid_hyperparameter("min_n", 0, "must be at least 1"));
        }
        if self.min_samples_leaf == 0 {
            return Err(FlowError::invalid_hyperparameter(
                "min_samples_leaf",
                0,
                "must be at least 1",
            ));
        }
        if !self.cost_complexity.is_finite() || self.cost_complexity < 0.0 {
            return Err(FlowError::invalid_hyperparameter(
                "cost_complexity",
                self.cost_complexity,
                "must be a non-negative number",
            ));
        }
        if self.max_features == Some(0) {
            return Err(FlowError::invalid_hyperparameter("mtry", 0, "must be at least 1"));
        }
        Ok(())
    }

    fn gini(positives: f64, n: f64) -> f64 {
        if n <= 0.0 {
            return 0.0;
        }
        let p = positives / n;
        2.0 * p * (1.0 - p)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        ctx: &mut BuildContext,
    ) -> TreeNode {
        let n_samples = indices.len();
        let positives: f64 = indices.iter().map(|&i| y[i]).sum();
        let value = positives / n_samples as f64;
        let impurity = Self::gini(positives, n_samples as f64);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;
        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let features = self.candidate_features(x.ncols(), &mut ctx.rng);
        let Some((feature_idx, threshold, gain)) =
            self.find_best_split(x, y, indices, &features, impurity)
        else {
            return TreeNode::Leaf { value, n_samples };
        };

        // cost-complexity pre-pruning
        let improvement = n_samples as f64 * gain;
        if improvement < self.cost_complexity * ctx.root_risk {
            return TreeNode::Leaf { value, n_samples };
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        ctx.importances[feature_idx] += improvement;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, ctx));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, ctx));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < n_features => {
                let mut chosen = rand::seq::index::sample(rng, n_features, k).into_vec();
                chosen.sort_unstable();
                chosen
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Best `(feature, threshold, gain)` over the candidate features
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len() as f64;
        let total_pos: f64 = indices.iter().map(|&i| y[i]).sum();
        let min_leaf = self.min_samples_leaf;

        // Each feature independently finds its best split
        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut pairs: Vec<(f64, f64)> = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], y[i]))
                    .collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best_gain = 0.0f64;
                let mut best_threshold = 0.0f64;
                let mut left_n = 0usize;
                let mut left_pos = 0.0f64;

                for w in 0..pairs.len() - 1 {
                    left_n += 1;
                    left_pos += pairs[w].1;
                    if pairs[w].0 == pairs[w + 1].0 {
                        continue;
                    }
                    let right_n = pairs.len() - left_n;
                    if left_n < min_leaf || right_n < min_leaf {
                        continue;
                    }

                    let weighted = (left_n as f64 * Self::gini(left_pos, left_n as f64)
                        + right_n as f64 * Self::gini(total_pos - left_pos, right_n as f64))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best_gain {
                        best_gain = gain;
                        best_threshold = (pairs[w].0 + pairs[w + 1].0) / 2.0;
                    }
                }

                (best_gain > 1e-12).then_some((feature_idx, best_threshold, best_gain))
            })
            .collect();

        // strict comparison so the lowest feature index wins ties
        let mut best: Option<(usize, f64, f64)> = None;
        for candidate in feature_results.into_iter().flatten() {
            if best.map_or(true, |b| candidate.2 > b.2) {
                best = Some(candidate);
            }
        }
        best
    }

    fn predict_sample(node: &TreeNode, x: &Array2<f64>, row: usize) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if x[[row, *feature_idx]] <= *threshold {
                    Self::predict_sample(left, x, row)
                } else {
                    Self::predict_sample(right, x, row)
                }
            }
        }
    }

    /// Number of split levels (a single leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map_or(0, count)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;

        let positives = y.sum();
        let mut ctx = BuildContext {
            rng: ChaCha8Rng::seed_from_u64(self.random_state),
            importances: vec![0.0; n_features],
            root_risk: n_samples as f64 * Self::gini(positives, n_samples as f64),
        };

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut ctx));

        let mut importances = ctx.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(FlowError::ModelNotFitted)?;
        check_features(x, self.n_features)?;
        Ok(Array1::from_iter(
            (0..x.nrows()).map(|row| Self::predict_sample(root, x, row)),
        ))
    }

    /// Normalized total impurity reduction per feature
    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn name(&self) -> &'static str {
        "decision tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_depth(), 1);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 2);
    }

    #[test]
    fn test_cost_complexity_prunes() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new().with_cost_complexity(0.9);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_n_leaves(), 1);

        let p = tree.predict_proba(&x).unwrap();
        assert!(p.iter().all(|&v| (v - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_min_samples_split() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new().with_min_samples_split(5);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_n_leaves(), 1);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_invalid_depth() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];
        let mut tree = DecisionTree::new().with_max_depth(0);
        assert!(matches!(
            tree.fit(&x, &y),
            Err(FlowError::InvalidHyperparameter { .. })
        ));
    }
}
