//! Seeded initial splits and V-fold cross-validation

use crate::error::{FlowError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CVStrategy {
    /// V-fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// V-fold that keeps outcome proportions within each fold
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

/// One resample. Indices are positions within the table that was split.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fold {
    pub id: String,
    /// Rows used to fit
    pub analysis: Vec<usize>,
    /// Held-out rows used to score
    pub assessment: Vec<usize>,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate folds over `n_samples` rows; `strata` is required for stratified folds
    pub fn split(&self, n_samples: usize, strata: Option<&[String]>) -> Result<Vec<Fold>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let strata = strata.ok_or_else(|| {
                    FlowError::ConfigError("stratified folds require outcome labels".to_string())
                })?;
                if strata.len() != n_samples {
                    return Err(FlowError::ShapeError {
                        expected: format!("{} labels", n_samples),
                        actual: format!("{} labels", strata.len()),
                    });
                }
                self.stratified_k_fold_split(strata, *n_splits, *shuffle)
            }
        }
    }

    fn check_sizes(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(FlowError::ConfigError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(FlowError::degenerate(
                "vfold_cv",
                format!("{} rows cannot fill {} folds", n_samples, n_splits),
            ));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<Fold>> {
        Self::check_sizes(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let mut assignments = vec![Vec::new(); n_splits];
        for (i, idx) in indices.into_iter().enumerate() {
            assignments[i % n_splits].push(idx);
        }
        Ok(Self::folds_from_assignments(n_samples, assignments))
    }

    fn stratified_k_fold_split(
        &self,
        strata: &[String],
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<Fold>> {
        let n_samples = strata.len();
        Self::check_sizes(n_samples, n_splits)?;

        // BTreeMap keeps stratum order, and therefore fold contents, reproducible
        let mut by_stratum: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, label) in strata.iter().enumerate() {
            by_stratum.entry(label.as_str()).or_default().push(idx);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut assignments = vec![Vec::new(); n_splits];
        let mut next = 0usize;
        for indices in by_stratum.values_mut() {
            if shuffle {
                indices.shuffle(&mut rng);
            }
            // continue round-robin across strata so fold sizes stay balanced
            for &idx in indices.iter() {
                assignments[next % n_splits].push(idx);
                next += 1;
            }
        }
        Ok(Self::folds_from_assignments(n_samples, assignments))
    }

    fn folds_from_assignments(n_samples: usize, assignments: Vec<Vec<usize>>) -> Vec<Fold> {
        let mut fold_of = vec![0usize; n_samples];
        for (fold_idx, rows) in assignments.iter().enumerate() {
            for &r in rows {
                fold_of[r] = fold_idx;
            }
        }

        assignments
            .into_iter()
            .enumerate()
            .map(|(fold_idx, mut assessment)| {
                assessment.sort_unstable();
                let analysis = (0..n_samples).filter(|&r| fold_of[r] != fold_idx).collect();
                Fold {
                    id: format!("Fold{}", fold_idx + 1),
                    analysis,
                    assessment,
                }
            })
            .collect()
    }
}

/// Seeded train/test partition; returns sorted `(train, test)` row positions.
///
/// With `strata`, each outcome level contributes `floor(prop * n_level)` rows
/// to training so class balance is kept in both partitions.
pub fn initial_split(
    n_samples: usize,
    prop: f64,
    strata: Option<&[String]>,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if n_samples == 0 {
        return Err(FlowError::degenerate("initial_split", "table has no rows"));
    }
    if !(prop > 0.0 && prop <= 1.0) {
        return Err(FlowError::ConfigError(format!(
            "training proportion must be in (0, 1], got {}",
            prop
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let groups: Vec<Vec<usize>> = match strata {
        Some(labels) => {
            if labels.len() != n_samples {
                return Err(FlowError::ShapeError {
                    expected: format!("{} labels", n_samples),
                    actual: format!("{} labels", labels.len()),
                });
            }
            let mut by_stratum: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (idx, label) in labels.iter().enumerate() {
                by_stratum.entry(label.as_str()).or_default().push(idx);
            }
            by_stratum.into_values().collect()
        }
        None => vec![(0..n_samples).collect()],
    };

    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut group in groups {
        group.shuffle(&mut rng);
        let n_train = ((group.len() as f64) * prop).floor() as usize;
        let n_train = n_train.max(1).min(group.len());
        train.extend_from_slice(&group[..n_train]);
        test.extend_from_slice(&group[n_train..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}
