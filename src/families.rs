//! The four model families compared on the survey data
//!
//! Each family is one independent run of
//! preprocess → specify → compose → [tune] → finalize → fit → evaluate
//! over a shared [`Dataset`], producing a [`FamilyReport`].

use crate::cache::{ArtifactCache, ArtifactKind, CacheKey};
use crate::config::RunConfig;
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::evaluation::{Evaluation, FeatureScore, Metric, RocPlot};
use crate::model::{EngineOptions, Hyperparameter, Importance, ModelSpec, ParamRange, ParamSet};
use crate::preprocessing::Recipe;
use crate::tuning::{tune_grid, CandidateResult, GridSpec, TuningResult};
use crate::workflow::{compose, FittedWorkflow, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    Logistic,
    Lasso,
    DecisionTree,
    RandomForest,
}

impl ModelFamily {
    pub fn all() -> [ModelFamily; 4] {
        [
            ModelFamily::Logistic,
            ModelFamily::Lasso,
            ModelFamily::DecisionTree,
            ModelFamily::RandomForest,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Logistic => "logistic",
            ModelFamily::Lasso => "lasso",
            ModelFamily::DecisionTree => "tree",
            ModelFamily::RandomForest => "forest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ModelFamily::Logistic => "Logistic regression",
            ModelFamily::Lasso => "Lasso logistic regression",
            ModelFamily::DecisionTree => "Decision tree",
            ModelFamily::RandomForest => "Random forest",
        }
    }

    /// Model specification with tuning placeholders
    pub fn spec(&self, config: &RunConfig) -> Result<ModelSpec> {
        let spec = match self {
            ModelFamily::Logistic => ModelSpec::logistic_reg(),
            ModelFamily::Lasso => {
                ModelSpec::lasso_reg(Hyperparameter::tune_in(ParamRange::log10(-4.0, -1.0)))?
            }
            ModelFamily::DecisionTree => ModelSpec::decision_tree(
                Hyperparameter::tune(),
                Hyperparameter::tune(),
                Hyperparameter::tune(),
            )?
            .with_importance(Importance::Impurity),
            ModelFamily::RandomForest => {
                ModelSpec::rand_forest(Some(Hyperparameter::tune()), Hyperparameter::tune(), 100)?
                    .with_engine(EngineOptions {
                        importance: Importance::Permutation,
                        permutation_repeats: config.permutation_repeats,
                        ..EngineOptions::default()
                    })
            }
        };
        Ok(spec)
    }

    /// Tuning grid, if the family has anything to tune
    pub fn grid(&self) -> Option<GridSpec> {
        match self {
            ModelFamily::Logistic => None,
            ModelFamily::Lasso => Some(GridSpec::Regular { levels: 30 }),
            ModelFamily::DecisionTree => Some(GridSpec::Regular { levels: 4 }),
            ModelFamily::RandomForest => Some(GridSpec::SpaceFilling { size: 20 }),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "logistic" | "logistic_reg" => Ok(ModelFamily::Logistic),
            "lasso" | "lasso_reg" => Ok(ModelFamily::Lasso),
            "tree" | "decision_tree" => Ok(ModelFamily::DecisionTree),
            "forest" | "rand_forest" | "random_forest" => Ok(ModelFamily::RandomForest),
            other => Err(FlowError::ConfigError(format!(
                "unknown model family '{}' (expected logistic, lasso, tree or forest)",
                other
            ))),
        }
    }
}

/// Everything one family run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyReport {
    pub family: ModelFamily,
    /// Final model specification
    pub model: String,
    pub n_candidates: usize,
    pub n_failed: usize,
    pub best_params: Option<ParamSet>,
    /// Best candidates from tuning
    pub top_candidates: Vec<CandidateResult>,
    pub train_evaluation: Evaluation,
    /// `None` when there is no usable test partition
    pub test_evaluation: Option<Evaluation>,
    pub importance: Vec<FeatureScore>,
    pub roc_plot: RocPlot,
}

impl FamilyReport {
    pub fn train_auc(&self) -> f64 {
        self.train_evaluation.auc
    }

    pub fn test_auc(&self) -> Option<f64> {
        self.test_evaluation.as_ref().map(|e| e.auc)
    }
}

fn cached<T, F>(
    cache: Option<&ArtifactCache>,
    kind: ArtifactKind,
    workflow: &Workflow,
    dataset: &str,
    params: &impl Serialize,
    compute: F,
) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    match cache {
        Some(cache) => {
            let key = CacheKey::new(kind, workflow.fingerprint()?, dataset, params)?;
            cache.get_or_compute(&key, compute)
        }
        None => compute(),
    }
}

/// Run one family end to end inside the configured thread pool
pub fn run_family(
    family: ModelFamily,
    dataset: &Dataset,
    config: &RunConfig,
    cache: Option<&ArtifactCache>,
) -> Result<FamilyReport> {
    run_family_with_model(family, dataset, config, cache).map(|(report, _)| report)
}

/// Like [`run_family`], also returning the fitted workflow
pub fn run_family_with_model(
    family: ModelFamily,
    dataset: &Dataset,
    config: &RunConfig,
    cache: Option<&ArtifactCache>,
) -> Result<(FamilyReport, FittedWorkflow)> {
    config.validate()?;
    config.install(|| run_family_inner(family, dataset, config, cache))?
}

fn run_family_inner(
    family: ModelFamily,
    dataset: &Dataset,
    config: &RunConfig,
    cache: Option<&ArtifactCache>,
) -> Result<(FamilyReport, FittedWorkflow)> {
    run_spec(family, family.spec(config)?, family.grid(), dataset, config, cache)
}

fn run_spec(
    family: ModelFamily,
    spec: ModelSpec,
    grid: Option<GridSpec>,
    dataset: &Dataset,
    config: &RunConfig,
    cache: Option<&ArtifactCache>,
) -> Result<(FamilyReport, FittedWorkflow)> {
    info!(family = family.name(), "starting model family");
    let train = dataset.train()?;
    let dataset_id = dataset.identity()?;
    let seed = config.seed;

    let recipe = Recipe::standard(dataset.target(), config.corr_threshold)
        .with_event_level(config.event_level.clone());
    let workflow = compose(&recipe, &spec);

    let mut tuning: Option<TuningResult> = None;
    let final_workflow = match grid {
        Some(grid) if !workflow.is_finalized() => {
            let mut key_params = BTreeMap::new();
            key_params.insert("grid", serde_json::to_value(&grid)?);
            key_params.insert("metric", serde_json::to_value(Metric::RocAuc)?);
            key_params.insert("seed", serde_json::to_value(seed)?);

            let result: TuningResult = cached(
                cache,
                ArtifactKind::Tuning,
                &workflow,
                &dataset_id,
                &key_params,
                || tune_grid(&workflow, &train, dataset.folds(), &grid, Metric::RocAuc, seed),
            )?;
            let best = result.select_best(Metric::RocAuc)?;
            info!(
                family = family.name(),
                candidate = %best.id,
                mean = best.mean.unwrap_or(f64::NAN),
                "selected best candidate"
            );
            let finalized = workflow.finalize(&best.params)?;
            tuning = Some(result);
            finalized
        }
        _ => workflow,
    };

    let fitted: FittedWorkflow = cached(
        cache,
        ArtifactKind::FittedModel,
        &final_workflow,
        &dataset_id,
        &seed,
        || final_workflow.fit(&train, seed),
    )?;

    let train_evaluation = fitted.evaluate(&train)?;
    let title = format!("{} (training data)", family.title());
    let roc_plot: RocPlot = cached(
        cache,
        ArtifactKind::RocPlot,
        &final_workflow,
        &dataset_id,
        &(seed, "train"),
        || Ok(train_evaluation.plot(title)),
    )?;

    let test = dataset.test()?;
    let test_evaluation = if test.height() == 0 {
        None
    } else {
        match fitted.evaluate(&test) {
            Ok(eval) => Some(eval),
            Err(e) if e.is_contained() => {
                warn!(family = family.name(), error = %e, "test evaluation undefined");
                None
            }
            Err(e) => return Err(e),
        }
    };

    let report = FamilyReport {
        family,
        model: final_workflow.spec().to_string(),
        n_candidates: tuning.as_ref().map_or(0, |t| t.candidates.len()),
        n_failed: tuning.as_ref().map_or(0, |t| t.n_failed()),
        best_params: tuning
            .as_ref()
            .and_then(|t| t.select_best(Metric::RocAuc).ok())
            .map(|c| c.params.clone()),
        top_candidates: tuning
            .as_ref()
            .map(|t| t.show_best(5).into_iter().cloned().collect())
            .unwrap_or_default(),
        train_evaluation,
        test_evaluation,
        importance: fitted.feature_importance(),
        roc_plot,
    };
    info!(
        family = family.name(),
        train_auc = report.train_auc(),
        "finished model family"
    );
    Ok((report, fitted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names_round_trip() {
        for family in ModelFamily::all() {
            assert_eq!(family.name().parse::<ModelFamily>().unwrap(), family);
        }
        assert!("svm".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_specs_and_grids() {
        let config = RunConfig::default();
        assert!(ModelFamily::Logistic.spec(&config).unwrap().is_finalized());
        assert!(ModelFamily::Logistic.grid().is_none());

        let tree = ModelFamily::DecisionTree.spec(&config).unwrap();
        assert_eq!(tree.tunable_parameters().len(), 3);

        let forest = ModelFamily::RandomForest.spec(&config).unwrap();
        assert_eq!(forest.engine().importance, Importance::Permutation);
        let names: Vec<String> = forest.tunable_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["mtry", "min_n"]);
    }

    fn survey(n: usize) -> polars::prelude::DataFrame {
        use polars::prelude::*;
        let hours: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
        let sleep: Vec<f64> = (0..n).map(|i| ((i * 5) % 9) as f64).collect();
        let carried: Vec<&str> = (0..n)
            .map(|i| if (i * 7) % 11 + (i % 4) >= 8 { "Yes" } else { "No" })
            .collect();
        df!("hours_online" => hours, "sleep_hours" => sleep, "weapon_carrying" => carried).unwrap()
    }

    #[test]
    fn test_plot_is_cached_per_seed() {
        let dataset = Dataset::split(survey(120), &RunConfig::new("weapon_carrying")).unwrap();
        let cache = ArtifactCache::memory();
        let spec = ModelSpec::rand_forest(Some(Hyperparameter::from(1usize)), 5usize, 15).unwrap();

        for seed in [3, 4] {
            let config = RunConfig::new("weapon_carrying").with_seed(seed);
            let (report, _) =
                run_spec(ModelFamily::RandomForest, spec.clone(), None, &dataset, &config, Some(&cache))
                    .unwrap();
            assert_eq!(report.roc_plot.auc, report.train_auc());
        }
        // one fitted model and one plot per seed
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.stats().hits, 0);
    }
}
