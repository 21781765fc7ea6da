//! Run configuration
//!
//! One `RunConfig` is threaded explicitly through splitting, tuning and
//! fitting. There is no process-wide seed.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which outcome level counts as the event (the "positive" class).
///
/// Levels are sorted lexicographically before `First`/`Second` are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventLevel {
    #[default]
    First,
    Second,
    Named(String),
}

impl EventLevel {
    /// Resolve against the two sorted outcome levels, returning `(event, other)`.
    pub fn resolve(&self, levels: &[String]) -> Result<(String, String)> {
        if levels.len() != 2 {
            return Err(FlowError::DataError(format!(
                "binary outcome expected, found {} levels",
                levels.len()
            )));
        }
        match self {
            EventLevel::First => Ok((levels[0].clone(), levels[1].clone())),
            EventLevel::Second => Ok((levels[1].clone(), levels[0].clone())),
            EventLevel::Named(name) => {
                if name == &levels[0] {
                    Ok((levels[0].clone(), levels[1].clone()))
                } else if name == &levels[1] {
                    Ok((levels[1].clone(), levels[0].clone()))
                } else {
                    Err(FlowError::ConfigError(format!(
                        "event level '{}' is not one of {:?}",
                        name, levels
                    )))
                }
            }
        }
    }
}

/// Configuration for one modelling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seed for splitting, fold assignment, grids and model randomness
    pub seed: u64,

    /// Outcome column
    pub target_column: String,

    /// Event level of the outcome
    pub event_level: EventLevel,

    /// Proportion of rows assigned to the training partition
    pub train_fraction: f64,

    /// Stratify the initial split and the folds by outcome
    pub stratify: bool,

    /// Number of cross-validation folds
    pub cv_folds: usize,

    /// Absolute correlation above which the correlation filter drops a predictor
    pub corr_threshold: f64,

    /// Worker threads for tuning and forests (None = rayon default)
    pub n_jobs: Option<usize>,

    /// Directory for cached artifacts (None = in-memory only)
    pub artifact_dir: Option<PathBuf>,

    /// Reuse cached tuning results, fitted models and plots
    pub use_cache: bool,

    /// Permutation rounds for forest importance
    pub permutation_repeats: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            target_column: "weapon_carrying".to_string(),
            event_level: EventLevel::First,
            train_fraction: 0.75,
            stratify: true,
            cv_folds: 5,
            corr_threshold: 0.7,
            n_jobs: None,
            artifact_dir: None,
            use_cache: true,
            permutation_repeats: 3,
        }
    }
}

impl RunConfig {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_event_level(mut self, level: EventLevel) -> Self {
        self.event_level = level;
        self
    }

    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction;
        self
    }

    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_corr_threshold(mut self, threshold: f64) -> Self {
        self.corr_threshold = threshold;
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_permutation_repeats(mut self, repeats: usize) -> Self {
        self.permutation_repeats = repeats;
        self
    }

    /// Check that every field is inside its domain
    pub fn validate(&self) -> Result<()> {
        if self.target_column.is_empty() {
            return Err(FlowError::ConfigError("target_column must not be empty".into()));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(FlowError::ConfigError(format!(
                "train_fraction must be in (0, 1], got {}",
                self.train_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(FlowError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if !(self.corr_threshold > 0.0 && self.corr_threshold <= 1.0) {
            return Err(FlowError::ConfigError(format!(
                "corr_threshold must be in (0, 1], got {}",
                self.corr_threshold
            )));
        }
        if self.n_jobs == Some(0) {
            return Err(FlowError::ConfigError("n_jobs must be positive".into()));
        }
        Ok(())
    }

    /// Run `f` inside a dedicated rayon pool when `n_jobs` is set
    pub fn install<R, F>(&self, f: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self.n_jobs {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| FlowError::ConfigError(format!("thread pool: {}", e)))?;
                Ok(pool.install(f))
            }
            None => Ok(f()),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<String> {
        vec!["No".to_string(), "Yes".to_string()]
    }

    #[test]
    fn test_event_level_resolution() {
        let (event, other) = EventLevel::First.resolve(&levels()).unwrap();
        assert_eq!((event.as_str(), other.as_str()), ("No", "Yes"));

        let (event, other) = EventLevel::Second.resolve(&levels()).unwrap();
        assert_eq!((event.as_str(), other.as_str()), ("Yes", "No"));

        let (event, _) = EventLevel::Named("Yes".into()).resolve(&levels()).unwrap();
        assert_eq!(event, "Yes");

        assert!(EventLevel::Named("Maybe".into()).resolve(&levels()).is_err());
        assert!(EventLevel::First.resolve(&["only".to_string()]).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(RunConfig::new("y").validate().is_ok());
        assert!(RunConfig::new("y").with_cv_folds(1).validate().is_err());
        assert!(RunConfig::new("y").with_train_fraction(0.0).validate().is_err());
        assert!(RunConfig::new("y").with_corr_threshold(1.5).validate().is_err());
        assert!(RunConfig::new("").validate().is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let config = RunConfig::new("weapon")
            .with_seed(7)
            .with_event_level(EventLevel::Second)
            .with_cv_folds(10);
        config.save(&path).unwrap();

        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.cv_folds, 10);
        assert_eq!(loaded.event_level, EventLevel::Second);
    }

    #[test]
    fn test_install_with_pool() {
        let config = RunConfig::new("y").with_n_jobs(2);
        let n = config.install(rayon::current_num_threads).unwrap();
        assert_eq!(n, 2);
    }
}
