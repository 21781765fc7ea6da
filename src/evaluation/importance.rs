//! Permutation feature importance

use super::metrics::accuracy_score;
use crate::error::Result;
use crate::utils::mean_std;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A named importance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub score: f64,
}

/// Rank `(name, score)` pairs, largest score first. Equal scores keep input order.
pub fn rank_features(names: &[String], scores: &[f64]) -> Vec<FeatureScore> {
    let mut ranked: Vec<FeatureScore> = names
        .iter()
        .zip(scores)
        .map(|(name, &score)| FeatureScore {
            feature: name.clone(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Result of a permutation importance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceResult {
    pub feature_names: Vec<String>,
    /// Baseline score on unpermuted data
    pub baseline: f64,
    /// Mean drop in score per feature
    pub importances_mean: Vec<f64>,
    pub importances_std: Vec<f64>,
    /// Score drop for every repeat, per feature
    pub importances_raw: Vec<Vec<f64>>,
}

impl ImportanceResult {
    pub fn ranking(&self) -> Vec<FeatureScore> {
        rank_features(&self.feature_names, &self.importances_mean)
    }

    pub fn top_k(&self, k: usize) -> Vec<FeatureScore> {
        self.ranking().into_iter().take(k).collect()
    }
}

/// Permutation importance over any probability function.
///
/// Each feature column is shuffled `n_repeats` times; the importance is the
/// mean drop of a larger-is-better score. Feature `j` draws its permutations
/// from its own stream seeded with `seed + j`, so results do not depend on
/// thread scheduling.
pub struct PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    predict_fn: F,
    n_repeats: usize,
    seed: u64,
    feature_names: Option<Vec<String>>,
}

impl<F> PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            n_repeats: 3,
            seed: 42,
            feature_names: None,
        }
    }

    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Importance as the drop in accuracy
    pub fn compute(&self, x: &Array2<f64>, truth: &[bool]) -> Result<ImportanceResult> {
        self.compute_with_scorer(x, truth, accuracy_score)
    }

    pub fn compute_with_scorer<S>(
        &self,
        x: &Array2<f64>,
        truth: &[bool],
        scorer: S,
    ) -> Result<ImportanceResult>
    where
        S: Fn(&[bool], &Array1<f64>) -> f64 + Sync,
    {
        let n_features = x.ncols();
        let baseline = scorer(truth, &(self.predict_fn)(x)?);

        let importances_raw: Vec<Vec<f64>> = (0..n_features)
            .into_par_iter()
            .map(|feature_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(feature_idx as u64));
                let mut x_permuted = x.clone();
                let original: Vec<f64> = x.column(feature_idx).to_vec();
                let mut drops = Vec::with_capacity(self.n_repeats);

                for _ in 0..self.n_repeats {
                    let mut shuffled = original.clone();
                    shuffled.shuffle(&mut rng);
                    x_permuted
                        .column_mut(feature_idx)
                        .assign(&Array1::from_vec(shuffled));
                    let permuted = scorer(truth, &(self.predict_fn)(&x_permuted)?);
                    drops.push(baseline - permuted);
                }
                Ok(drops)
            })
            .collect::<Result<Vec<_>>>()?;

        let (importances_mean, importances_std): (Vec<f64>, Vec<f64>) =
            importances_raw.iter().map(|d| mean_std(d)).unzip();

        let feature_names = self
            .feature_names
            .clone()
            .unwrap_or_else(|| (0..n_features).map(|i| format!("x{}", i)).collect());

        Ok(ImportanceResult {
            feature_names,
            baseline,
            importances_mean,
            importances_std,
            importances_raw,
        })
    }
}
