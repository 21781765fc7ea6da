//! Workflows: a recipe paired with a model specification
//!
//! A [`Workflow`] is immutable. Finalizing returns a new workflow with every
//! tunable hyperparameter fixed; fitting learns the recipe and trains the
//! engine on one training table, producing a [`FittedWorkflow`].

use crate::error::{FlowError, Result};
use crate::evaluation::{
    rank_features, Evaluation, FeatureScore, ImportanceResult, PermutationImportance,
};
use crate::model::{Importance, ModelSpec, ParamRange, ParamSet, TrainedModel};
use crate::preprocessing::{FittedRecipe, Recipe};
use crate::utils::frame;
use crate::utils::sha256_hex;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Pair a recipe with a model specification. Neither input is modified.
pub fn compose(recipe: &Recipe, spec: &ModelSpec) -> Workflow {
    Workflow::new(recipe.clone(), spec.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    recipe: Recipe,
    spec: ModelSpec,
}

impl Workflow {
    pub fn new(recipe: Recipe, spec: ModelSpec) -> Self {
        Self { recipe, spec }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Same recipe, different model
    pub fn with_spec(&self, spec: ModelSpec) -> Self {
        Self::new(self.recipe.clone(), spec)
    }

    pub fn tunable_parameters(&self) -> Vec<(String, ParamRange)> {
        self.spec.tunable_parameters()
    }

    pub fn is_finalized(&self) -> bool {
        self.spec.is_finalized()
    }

    /// Fix every tunable hyperparameter from `params`
    pub fn finalize(&self, params: &ParamSet) -> Result<Workflow> {
        Ok(self.with_spec(self.spec.finalize(params)?))
    }

    /// Content hash of recipe and specification
    pub fn fingerprint(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(sha256_hex(json.as_bytes()))
    }

    /// Fit the recipe on `train`, bake it and train the engine
    pub fn fit(&self, train: &DataFrame, seed: u64) -> Result<FittedWorkflow> {
        self.spec.fixed_values()?;

        let recipe = self.recipe.fit(train)?;
        let design = recipe.bake_matrix(train)?;
        if design.feature_names.is_empty() {
            return Err(FlowError::degenerate(
                "fit",
                "no predictor columns remain after preprocessing",
            ));
        }

        let model = TrainedModel::train(&self.spec, &design.x, &design.y, seed)?;

        let engine = self.spec.engine();
        let permutation_importance = if engine.importance == Importance::Permutation {
            let truth: Vec<bool> = design.y.iter().map(|&v| v == 1.0).collect();
            let result = PermutationImportance::new(|x: &Array2<f64>| model.predict_proba(x))
                .with_n_repeats(engine.permutation_repeats)
                .with_seed(seed)
                .with_feature_names(design.feature_names.clone())
                .compute(&design.x, &truth)?;
            debug!(features = result.feature_names.len(), "recorded permutation importance");
            Some(result)
        } else {
            None
        };

        info!(
            model = %self.spec,
            engine = model.name(),
            rows = design.n_rows(),
            predictors = design.feature_names.len(),
            "fitted workflow"
        );

        Ok(FittedWorkflow {
            workflow: self.clone(),
            recipe,
            model,
            feature_names: design.feature_names,
            n_train: design.y.len(),
            seed,
            permutation_importance,
        })
    }
}

/// Class predictions with both class probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    pub event_level: String,
    pub other_level: String,
    pub class: Vec<String>,
    pub prob_event: Array1<f64>,
    pub prob_other: Array1<f64>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class.is_empty()
    }

    /// `.pred_class`, `.pred_{event}` and `.pred_{other}` columns
    pub fn to_frame(&self) -> Result<DataFrame> {
        let class: Vec<Option<String>> = self.class.iter().cloned().map(Some).collect();
        let columns = vec![
            frame::string_column(".pred_class", class),
            frame::float_column(
                &format!(".pred_{}", self.event_level),
                self.prob_event.iter().map(|&p| Some(p)).collect(),
            ),
            frame::float_column(
                &format!(".pred_{}", self.other_level),
                self.prob_other.iter().map(|&p| Some(p)).collect(),
            ),
        ];
        Ok(DataFrame::new(columns)?)
    }
}

/// A workflow with its fitted recipe and trained engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedWorkflow {
    workflow: Workflow,
    recipe: FittedRecipe,
    model: TrainedModel,
    feature_names: Vec<String>,
    n_train: usize,
    seed: u64,
    permutation_importance: Option<ImportanceResult>,
}

impl FittedWorkflow {
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn recipe(&self) -> &FittedRecipe {
        &self.recipe
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn permutation_importance(&self) -> Option<&ImportanceResult> {
        self.permutation_importance.as_ref()
    }

    /// Predict every row of `df`; the outcome column is not needed
    pub fn predict(&self, df: &DataFrame) -> Result<Predictions> {
        let x = self.recipe.bake_features(df)?;
        let prob_event = self.model.predict_proba(&x)?;
        let event = self.recipe.event_level().to_string();
        let other = self.recipe.other_level().to_string();
        let class = prob_event
            .iter()
            .map(|&p| if p >= 0.5 { event.clone() } else { other.clone() })
            .collect();
        Ok(Predictions {
            prob_other: prob_event.mapv(|p| 1.0 - p),
            prob_event,
            class,
            event_level: event,
            other_level: other,
        })
    }

    /// Confusion matrix, ROC curve and summary metrics on `df`. Rows with a
    /// missing outcome are skipped.
    pub fn evaluate(&self, df: &DataFrame) -> Result<Evaluation> {
        let design = self.recipe.bake_matrix(df)?;
        let prob = self.model.predict_proba(&design.x)?;
        let truth: Vec<bool> = design.y.iter().map(|&v| v == 1.0).collect();
        Evaluation::compute(
            &truth,
            &prob,
            self.recipe.event_level(),
            self.recipe.other_level(),
        )
    }

    /// Ranked importance: recorded permutation importance when available,
    /// otherwise the engine's own measure
    pub fn feature_importance(&self) -> Vec<FeatureScore> {
        if let Some(result) = &self.permutation_importance {
            return result.ranking();
        }
        match self.model.native_importance() {
            Some(scores) => rank_features(&self.feature_names, &scores.to_vec()),
            None => Vec::new(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hyperparameter;

    fn survey() -> DataFrame {
        let n = 60;
        let hours: Vec<Option<f64>> = (0..n)
            .map(|i| if i == 3 { None } else { Some((i % 10) as f64) })
            .collect();
        let grade: Vec<Option<&str>> = (0..n)
            .map(|i| Some(["9", "10", "11", "12"][i % 4]))
            .collect();
        let carried: Vec<&str> = (0..n)
            .map(|i| if (i % 10) >= 6 || i % 13 == 0 { "Yes" } else { "No" })
            .collect();
        df!(
            "hours_online" => hours,
            "grade" => grade,
            "weapon_carrying" => carried,
        )
        .unwrap()
    }

    fn recipe() -> Recipe {
        Recipe::standard("weapon_carrying", 0.7)
    }

    #[test]
    fn test_compose_does_not_modify_inputs() {
        let recipe = recipe();
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        let wf = compose(&recipe, &spec);
        assert_eq!(wf.recipe(), &recipe);
        assert_eq!(wf.spec(), &spec);
        assert!(!wf.is_finalized());
    }

    #[test]
    fn test_fit_requires_finalized_spec() {
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        let wf = compose(&recipe(), &spec);
        assert!(matches!(
            wf.fit(&survey(), 1),
            Err(FlowError::NotFinalized(_))
        ));
    }

    #[test]
    fn test_fit_predict_evaluate() {
        let wf = compose(&recipe(), &ModelSpec::logistic_reg());
        let fitted = wf.fit(&survey(), 1).unwrap();
        assert_eq!(fitted.n_train(), 60);

        let preds = fitted.predict(&survey()).unwrap();
        assert_eq!(preds.len(), 60);
        for (e, o) in preds.prob_event.iter().zip(preds.prob_other.iter()) {
            assert!((e + o - 1.0).abs() < 1e-12);
        }
        let frame = preds.to_frame().unwrap();
        assert_eq!(frame.width(), 3);

        let eval = fitted.evaluate(&survey()).unwrap();
        assert_eq!(eval.confusion.total(), 60);
        assert!((0.0..=1.0).contains(&eval.auc));
        assert!(!fitted.feature_importance().is_empty());
    }

    #[test]
    fn test_no_predictors_left() {
        let df = df!(
            "constant" => [1.0, 1.0, 1.0, 1.0],
            "weapon_carrying" => ["Yes", "No", "Yes", "No"],
        )
        .unwrap();
        let wf = compose(&recipe(), &ModelSpec::logistic_reg());
        assert!(matches!(
            wf.fit(&df, 1),
            Err(FlowError::DegenerateData { .. })
        ));
    }

    #[test]
    fn test_finalize_and_fingerprint() {
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        let wf = compose(&recipe(), &spec);
        let mut params = ParamSet::new();
        params.insert("penalty".into(), 0.01.into());
        let finalized = wf.finalize(&params).unwrap();
        assert!(finalized.is_finalized());
        assert_ne!(wf.fingerprint().unwrap(), finalized.fingerprint().unwrap());
        assert_eq!(wf.fingerprint().unwrap(), compose(&recipe(), &spec).fingerprint().unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let spec = ModelSpec::decision_tree(0.01, 4usize, 2usize).unwrap();
        let fitted = compose(&recipe(), &spec).fit(&survey(), 2).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fitted.save(&path).unwrap();
        let loaded = FittedWorkflow::load(&path).unwrap();

        let a = fitted.predict(&survey()).unwrap();
        let b = loaded.predict(&survey()).unwrap();
        assert_eq!(a.class, b.class);
        for (p, q) in a.prob_event.iter().zip(b.prob_event.iter()) {
            assert!((p - q).abs() < 1e-12);
        }
    }
}
