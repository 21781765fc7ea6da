//! Persisted analysis dataset with a fixed train/test split and folds
//!
//! A dataset directory holds the full table as `analysis.csv` and the
//! partition as `split.json`. Every model family reads the same directory,
//! so the partition is fixed for the duration of a run.

pub mod split;

pub use split::{initial_split, CVStrategy, CrossValidator, Fold};

use crate::config::RunConfig;
use crate::error::{FlowError, Result};
use crate::utils::{frame, DataLoader};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub const TABLE_FILE: &str = "analysis.csv";
pub const MANIFEST_FILE: &str = "split.json";

/// Serialized description of a split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitManifest {
    pub seed: u64,
    pub target: String,
    pub train_fraction: f64,
    pub stratified: bool,
    pub n_rows: usize,
    /// Positions in the full table
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
    /// Positions within the training partition
    pub folds: Vec<Fold>,
    pub source: Option<String>,
}

impl SplitManifest {
    /// Partitions must be disjoint and cover the table; fold assessments must
    /// be disjoint and cover the training rows, with analysis as complement.
    pub fn validate(&self) -> Result<()> {
        let mut owner = vec![0u8; self.n_rows];
        for &r in self.train_rows.iter().chain(self.test_rows.iter()) {
            if r >= self.n_rows {
                return Err(FlowError::DataError(format!(
                    "split row {} out of range for {} rows",
                    r, self.n_rows
                )));
            }
            owner[r] = owner[r].saturating_add(1);
        }
        if owner.iter().any(|&c| c != 1) {
            return Err(FlowError::DataError(
                "train and test partitions must be disjoint and cover every row".to_string(),
            ));
        }

        let n_train = self.train_rows.len();
        let mut covered = vec![0u8; n_train];
        for fold in &self.folds {
            if fold.analysis.len() + fold.assessment.len() != n_train {
                return Err(FlowError::DataError(format!(
                    "{} does not partition the training rows",
                    fold.id
                )));
            }
            let mut seen = vec![0u8; n_train];
            for (&r, is_assessment) in fold
                .analysis
                .iter()
                .map(|r| (r, false))
                .chain(fold.assessment.iter().map(|r| (r, true)))
            {
                if r >= n_train {
                    return Err(FlowError::DataError(format!(
                        "{} references training row {} of {}",
                        fold.id, r, n_train
                    )));
                }
                seen[r] = seen[r].saturating_add(1);
                if is_assessment {
                    covered[r] = covered[r].saturating_add(1);
                }
            }
            if seen.iter().any(|&c| c != 1) {
                return Err(FlowError::DataError(format!(
                    "{} analysis and assessment rows must be disjoint and cover the training rows",
                    fold.id
                )));
            }
        }
        if !self.folds.is_empty() && covered.iter().any(|&c| c != 1) {
            return Err(FlowError::DataError(
                "fold assessment sets must be disjoint and cover the training rows".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full table plus its split
#[derive(Debug, Clone)]
pub struct Dataset {
    full: DataFrame,
    manifest: SplitManifest,
}

impl Dataset {
    /// Split `full` according to `config`
    pub fn split(full: DataFrame, config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let target = &config.target_column;
        if !frame::has_column(&full, target) {
            return Err(FlowError::schema(
                "initial_split",
                target.as_str(),
                "is not present in the table",
            ));
        }

        let labels = outcome_labels(&full, target)?;
        let strata = config.stratify.then_some(labels.as_slice());
        let (train_rows, test_rows) =
            initial_split(full.height(), config.train_fraction, strata, config.seed)?;

        let train_labels: Vec<String> = train_rows.iter().map(|&r| labels[r].clone()).collect();
        let strategy = if config.stratify {
            CVStrategy::StratifiedKFold { n_splits: config.cv_folds, shuffle: true }
        } else {
            CVStrategy::KFold { n_splits: config.cv_folds, shuffle: true }
        };
        let folds = CrossValidator::new(strategy)
            .with_random_state(config.seed)
            .split(train_rows.len(), Some(&train_labels))?;

        let manifest = SplitManifest {
            seed: config.seed,
            target: target.clone(),
            train_fraction: config.train_fraction,
            stratified: config.stratify,
            n_rows: full.height(),
            train_rows,
            test_rows,
            folds,
            source: None,
        };

        info!(
            rows = manifest.n_rows,
            train = manifest.train_rows.len(),
            test = manifest.test_rows.len(),
            folds = manifest.folds.len(),
            "split dataset"
        );
        Self::from_parts(full, manifest)
    }

    pub fn from_parts(full: DataFrame, manifest: SplitManifest) -> Result<Self> {
        if manifest.n_rows != full.height() {
            return Err(FlowError::DataError(format!(
                "split describes {} rows but the table has {}",
                manifest.n_rows,
                full.height()
            )));
        }
        manifest.validate()?;
        Ok(Self { full, manifest })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.manifest.source = Some(source.into());
        self
    }

    pub fn full(&self) -> &DataFrame {
        &self.full
    }

    pub fn manifest(&self) -> &SplitManifest {
        &self.manifest
    }

    pub fn target(&self) -> &str {
        &self.manifest.target
    }

    pub fn folds(&self) -> &[Fold] {
        &self.manifest.folds
    }

    pub fn train(&self) -> Result<DataFrame> {
        frame::take_rows(&self.full, &self.manifest.train_rows)
    }

    pub fn test(&self) -> Result<DataFrame> {
        frame::take_rows(&self.full, &self.manifest.test_rows)
    }

    /// Stable identity of table contents and partition, used in cache keys
    pub fn identity(&self) -> Result<String> {
        let mut table = Vec::new();
        CsvWriter::new(&mut table)
            .include_header(true)
            .finish(&mut self.full.clone())?;

        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_string(&self.manifest)?.as_bytes());
        hasher.update(b"|");
        hasher.update(&table);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        DataLoader::new().write_csv(&self.full, dir.join(TABLE_FILE))?;
        let json = serde_json::to_string_pretty(&self.manifest)?;
        std::fs::write(dir.join(MANIFEST_FILE), json)?;
        info!(dir = %dir.display(), "saved dataset");
        Ok(())
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let full = DataLoader::new().load(dir.join(TABLE_FILE))?;
        let json = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: SplitManifest = serde_json::from_str(&json)?;
        Self::from_parts(full, manifest)
    }
}

/// Outcome labels used for stratification; missing values form their own stratum
fn outcome_labels(df: &DataFrame, target: &str) -> Result<Vec<String>> {
    Ok(frame::nominal_values(df, target)?
        .into_iter()
        .map(|v| v.unwrap_or_else(|| "<missing>".to_string()))
        .collect())
}
