//! Declarative preprocessing recipes
//!
//! A [`Recipe`] is an ordered list of [`Step`] records. Fitting interprets the
//! steps left to right against the training table, producing a
//! [`FittedRecipe`] that can be baked onto any table with the same schema.

use super::encoder::DummyEncoder;
use super::feature_selection::{CorrelationFilter, ZeroVarianceFilter};
use super::imputer::{ImputeStrategy, Imputer};
use crate::config::EventLevel;
use crate::error::{FlowError, Result};
use crate::utils::frame::{self, ColumnKind};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Which columns a step applies to. The outcome is never selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    AllPredictors,
    AllNumericPredictors,
    AllNominalPredictors,
    Columns(Vec<String>),
}

impl Selector {
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Columns(names.into_iter().map(Into::into).collect())
    }

    /// Resolve against the current schema, in column order
    pub fn resolve(&self, df: &DataFrame, target: &str, step: &str) -> Result<Vec<String>> {
        let predictors = df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != target);

        match self {
            Selector::AllPredictors => Ok(predictors.map(|c| c.name().to_string()).collect()),
            Selector::AllNumericPredictors => Ok(predictors
                .filter(|c| frame::kind_of(c) == ColumnKind::Numeric)
                .map(|c| c.name().to_string())
                .collect()),
            Selector::AllNominalPredictors => Ok(predictors
                .filter(|c| frame::kind_of(c) == ColumnKind::Nominal)
                .map(|c| c.name().to_string())
                .collect()),
            Selector::Columns(names) => {
                for name in names {
                    if name == target {
                        return Err(FlowError::schema(step, name.as_str(), "is the outcome and cannot be selected"));
                    }
                    if !frame::has_column(df, name) {
                        return Err(FlowError::schema(step, name.as_str(), "is not present"));
                    }
                }
                Ok(names.clone())
            }
        }
    }
}

/// One declarative preprocessing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    ImputeMode { selector: Selector },
    ImputeMean { selector: Selector },
    ZeroVariance { selector: Selector },
    Correlation { selector: Selector, threshold: f64 },
    Dummy { selector: Selector },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::ImputeMode { .. } => "impute_mode",
            Step::ImputeMean { .. } => "impute_mean",
            Step::ZeroVariance { .. } => "zero_variance",
            Step::Correlation { .. } => "correlation",
            Step::Dummy { .. } => "dummy",
        }
    }

    fn selector(&self) -> &Selector {
        match self {
            Step::ImputeMode { selector }
            | Step::ImputeMean { selector }
            | Step::ZeroVariance { selector }
            | Step::Correlation { selector, .. }
            | Step::Dummy { selector } => selector,
        }
    }

    fn required_kind(&self) -> Option<ColumnKind> {
        match self {
            Step::ImputeMode { .. } | Step::Dummy { .. } => Some(ColumnKind::Nominal),
            Step::ImputeMean { .. } | Step::Correlation { .. } => Some(ColumnKind::Numeric),
            Step::ZeroVariance { .. } => None,
        }
    }

    fn fit(&self, df: &DataFrame, target: &str) -> Result<FittedStep> {
        let columns = self.selector().resolve(df, target, self.name())?;
        if let Some(kind) = self.required_kind() {
            for name in &columns {
                if frame::column_kind(df, name)? != kind {
                    let reason = match kind {
                        ColumnKind::Numeric => "is not numeric",
                        ColumnKind::Nominal => "is not nominal",
                    };
                    return Err(FlowError::schema(self.name(), name.as_str(), reason));
                }
            }
        }

        let fitted = match self {
            Step::ImputeMode { .. } => {
                let mut imputer = Imputer::new(ImputeStrategy::MostFrequent);
                imputer.fit(df, &columns)?;
                FittedStep::Impute(imputer)
            }
            Step::ImputeMean { .. } => {
                let mut imputer = Imputer::new(ImputeStrategy::Mean);
                imputer.fit(df, &columns)?;
                FittedStep::Impute(imputer)
            }
            Step::ZeroVariance { .. } => {
                let mut filter = ZeroVarianceFilter::new();
                filter.fit(df, &columns)?;
                FittedStep::ZeroVariance(filter)
            }
            Step::Correlation { threshold, .. } => {
                let mut filter = CorrelationFilter::new(*threshold);
                filter.fit(df, &columns)?;
                FittedStep::Correlation(filter)
            }
            Step::Dummy { .. } => {
                let mut encoder = DummyEncoder::new();
                encoder.fit(df, &columns)?;
                FittedStep::Dummy(encoder)
            }
        };
        debug!(step = self.name(), columns = columns.len(), "fitted step");
        Ok(fitted)
    }
}

/// A step together with the parameters learned from training data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedStep {
    Impute(Imputer),
    ZeroVariance(ZeroVarianceFilter),
    Correlation(CorrelationFilter),
    Dummy(DummyEncoder),
}

impl FittedStep {
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        match self {
            FittedStep::Impute(imputer) => imputer.transform(df),
            FittedStep::ZeroVariance(filter) => filter.transform(df),
            FittedStep::Correlation(filter) => filter.transform(df),
            FittedStep::Dummy(encoder) => encoder.transform(df),
        }
    }

    /// Columns this step removes from the schema
    pub fn removed(&self) -> &[String] {
        match self {
            FittedStep::ZeroVariance(filter) => filter.removed(),
            FittedStep::Correlation(filter) => filter.removed(),
            _ => &[],
        }
    }
}

/// Unfitted preprocessing recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    target: String,
    event_level: EventLevel,
    steps: Vec<Step>,
}

impl Recipe {
    /// All columns other than `target` are predictors
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            event_level: EventLevel::First,
            steps: Vec::new(),
        }
    }

    /// Mode and mean imputation, zero-variance filter, correlation filter,
    /// then dummy encoding of nominal predictors
    pub fn standard(target: impl Into<String>, corr_threshold: f64) -> Self {
        Self::new(target)
            .impute_mode(Selector::AllNominalPredictors)
            .impute_mean(Selector::AllNumericPredictors)
            .zero_variance(Selector::AllPredictors)
            .correlation(Selector::AllNumericPredictors, corr_threshold)
            .dummy(Selector::AllNominalPredictors)
    }

    pub fn with_event_level(mut self, level: EventLevel) -> Self {
        self.event_level = level;
        self
    }

    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn impute_mode(self, selector: Selector) -> Self {
        self.add_step(Step::ImputeMode { selector })
    }

    pub fn impute_mean(self, selector: Selector) -> Self {
        self.add_step(Step::ImputeMean { selector })
    }

    pub fn zero_variance(self, selector: Selector) -> Self {
        self.add_step(Step::ZeroVariance { selector })
    }

    pub fn correlation(self, selector: Selector, threshold: f64) -> Self {
        self.add_step(Step::Correlation { selector, threshold })
    }

    pub fn dummy(self, selector: Selector) -> Self {
        self.add_step(Step::Dummy { selector })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn event_level(&self) -> &EventLevel {
        &self.event_level
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Learn every step's parameters from `train`
    pub fn fit(&self, train: &DataFrame) -> Result<FittedRecipe> {
        if train.height() == 0 {
            return Err(FlowError::degenerate("recipe", "training table is empty"));
        }
        if !frame::has_column(train, &self.target) {
            return Err(FlowError::schema("recipe", self.target.as_str(), "outcome is not present"));
        }
        for step in &self.steps {
            if let Step::Correlation { threshold, .. } = step {
                if !(*threshold > 0.0 && *threshold <= 1.0) {
                    return Err(FlowError::ConfigError(format!(
                        "correlation threshold must be in (0, 1], got {}",
                        threshold
                    )));
                }
            }
        }

        let levels: Vec<String> = frame::nominal_values(train, &self.target)?
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        match levels.len() {
            0 => {
                return Err(FlowError::degenerate(
                    "recipe",
                    format!("outcome '{}' is entirely missing", self.target),
                ))
            }
            1 => {
                return Err(FlowError::degenerate(
                    "recipe",
                    format!("outcome '{}' has a single class '{}'", self.target, levels[0]),
                ))
            }
            2 => {}
            n => {
                return Err(FlowError::DataError(format!(
                    "outcome '{}' has {} classes; only binary outcomes are supported",
                    self.target, n
                )))
            }
        }
        let (event, other) = self.event_level.resolve(&levels)?;

        let input_columns: Vec<String> = frame::column_names(train)
            .into_iter()
            .filter(|c| c != &self.target)
            .collect();

        let mut current = train.clone();
        let mut fitted_steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let fitted = step.fit(&current, &self.target)?;
            current = fitted.apply(&current)?;
            fitted_steps.push(fitted);
        }

        let predictors: Vec<String> = frame::column_names(&current)
            .into_iter()
            .filter(|c| c != &self.target)
            .collect();

        debug!(
            inputs = input_columns.len(),
            outputs = predictors.len(),
            "fitted recipe"
        );

        Ok(FittedRecipe {
            target: self.target.clone(),
            event,
            other,
            input_columns,
            steps: fitted_steps,
            predictors,
        })
    }
}

/// Dense predictors with a 0/1 outcome (1 = event level)
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl DesignMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }
}

/// Recipe with parameters learned from a training table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedRecipe {
    target: String,
    event: String,
    other: String,
    input_columns: Vec<String>,
    steps: Vec<FittedStep>,
    predictors: Vec<String>,
}

impl FittedRecipe {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn event_level(&self) -> &str {
        &self.event
    }

    pub fn other_level(&self) -> &str {
        &self.other
    }

    /// Predictors expected in the input table
    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    /// Predictors produced by baking
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Apply the fitted steps. The outcome is carried through when present.
    pub fn bake(&self, df: &DataFrame) -> Result<DataFrame> {
        for name in &self.input_columns {
            if !frame::has_column(df, name) {
                return Err(FlowError::schema("bake", name.as_str(), "is missing from the input table"));
            }
        }

        let mut keep: Vec<Column> = Vec::with_capacity(self.input_columns.len() + 1);
        for col in df.get_columns() {
            let name = col.name().as_str();
            if name == self.target || self.input_columns.iter().any(|c| c == name) {
                keep.push(col.clone());
            }
        }
        let mut current = DataFrame::new(keep)?;

        for step in &self.steps {
            current = step.apply(&current)?;
        }
        Ok(current)
    }

    /// Bake and convert to a dense matrix with outcome. Rows with a missing
    /// outcome are dropped.
    pub fn bake_matrix(&self, df: &DataFrame) -> Result<DesignMatrix> {
        if !frame::has_column(df, &self.target) {
            return Err(FlowError::schema("bake", self.target.as_str(), "outcome is not present"));
        }
        let baked = self.bake(df)?;

        let outcome = frame::nominal_values(&baked, &self.target)?;
        let mut rows = Vec::with_capacity(outcome.len());
        let mut y = Vec::with_capacity(outcome.len());
        for (i, value) in outcome.iter().enumerate() {
            match value {
                Some(v) if v == &self.event => {
                    rows.push(i);
                    y.push(1.0);
                }
                Some(v) if v == &self.other => {
                    rows.push(i);
                    y.push(0.0);
                }
                Some(v) => {
                    return Err(FlowError::DataError(format!(
                        "outcome level '{}' was not seen during training",
                        v
                    )))
                }
                None => {}
            }
        }
        let dropped = outcome.len() - rows.len();
        if dropped > 0 {
            warn!(rows = dropped, "rows with missing outcome dropped");
        }

        let columns = self.predictor_values(&baked)?;
        let x = Array2::from_shape_fn((rows.len(), columns.len()), |(i, j)| columns[j][rows[i]]);
        Ok(DesignMatrix {
            x,
            y: Array1::from_vec(y),
            feature_names: self.predictors.clone(),
        })
    }

    /// Bake and convert predictors only; every input row is kept
    pub fn bake_features(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let baked = self.bake(df)?;
        let columns = self.predictor_values(&baked)?;
        Ok(Array2::from_shape_fn((df.height(), columns.len()), |(i, j)| {
            columns[j][i]
        }))
    }

    fn predictor_values(&self, baked: &DataFrame) -> Result<Vec<Vec<f64>>> {
        self.predictors
            .iter()
            .map(|name| {
                let col = baked
                    .column(name)
                    .map_err(|_| FlowError::schema("bake", name.as_str(), "was not produced"))?;
                if frame::kind_of(col) != ColumnKind::Numeric {
                    return Err(FlowError::DataError(format!(
                        "predictor '{}' is nominal after preprocessing; add a dummy step",
                        name
                    )));
                }
                frame::column_f64(col)?
                    .into_iter()
                    .map(|v| {
                        v.ok_or_else(|| {
                            FlowError::DataError(format!(
                                "predictor '{}' has missing values after preprocessing",
                                name
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}
