//! Model specifications: algorithm, hyperparameters and engine options

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported algorithm families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    LogisticRegression,
    LassoLogistic,
    DecisionTree,
    RandomForest,
}

impl Algorithm {
    /// Hyperparameters accepted by the algorithm, in canonical order
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Algorithm::LogisticRegression => &[],
            Algorithm::LassoLogistic => &["penalty", "mixture"],
            Algorithm::DecisionTree => &["cost_complexity", "tree_depth", "min_n"],
            Algorithm::RandomForest => &["mtry", "min_n", "trees"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::LogisticRegression => "logistic_reg",
            Algorithm::LassoLogistic => "lasso_reg",
            Algorithm::DecisionTree => "decision_tree",
            Algorithm::RandomForest => "rand_forest",
        }
    }

    /// Key that orders parameter sets from simplest to most complex.
    ///
    /// Larger `penalty`, `cost_complexity` and `min_n` give simpler models;
    /// smaller `tree_depth`, `mtry` and `trees` do.
    pub fn simplicity_key(&self, params: &ParamSet) -> Vec<f64> {
        self.parameter_names()
            .iter()
            .filter_map(|name| {
                let value = params.get(*name)?.as_f64();
                Some(match *name {
                    "penalty" | "cost_complexity" | "min_n" => -value,
                    _ => value,
                })
            })
            .collect()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prediction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Classification,
    Regression,
}

/// A concrete hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(usize),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Int(v) => *v as f64,
            ParamValue::Float(v) => *v,
        }
    }

    /// Integer view; fractional floats are rejected
    pub fn as_usize(&self, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) => Ok(*v),
            ParamValue::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                Ok(*v as usize)
            }
            ParamValue::Float(v) => Err(FlowError::invalid_hyperparameter(
                name,
                v,
                "must be a non-negative integer",
            )),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) if *v != 0.0 && (v.abs() < 1e-3 || v.abs() >= 1e4) => {
                write!(f, "{:.3e}", v)
            }
            ParamValue::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v)
    }
}

/// Range explored for a tunable parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamRange {
    /// Continuous range; `log_scale` bounds are the raw values, not exponents
    Float { low: f64, high: f64, log_scale: bool },
    /// Inclusive integer range
    Int { low: usize, high: usize },
    /// `[low, number of predictors]`, resolved once the baked width is known
    PredictorCount { low: usize },
}

impl ParamRange {
    pub fn float(low: f64, high: f64) -> Self {
        ParamRange::Float { low, high, log_scale: false }
    }

    /// Log-scaled range given as base-10 exponents, e.g. `log10(-4.0, -1.0)`
    pub fn log10(low_exp: f64, high_exp: f64) -> Self {
        ParamRange::Float {
            low: 10f64.powf(low_exp),
            high: 10f64.powf(high_exp),
            log_scale: true,
        }
    }

    pub fn int(low: usize, high: usize) -> Self {
        ParamRange::Int { low, high }
    }

    pub fn predictors(low: usize) -> Self {
        ParamRange::PredictorCount { low }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ParamRange::PredictorCount { .. })
    }

    /// Replace a predictor-count bound with a concrete integer range
    pub fn resolve(&self, n_predictors: usize) -> ParamRange {
        match *self {
            ParamRange::PredictorCount { low } => ParamRange::Int {
                low: low.min(n_predictors.max(1)),
                high: n_predictors.max(1),
            },
            other => other,
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let ok = match *self {
            ParamRange::Float { low, high, log_scale } => {
                low.is_finite() && high.is_finite() && low <= high && (!log_scale || low > 0.0)
            }
            ParamRange::Int { low, high } => low <= high,
            ParamRange::PredictorCount { .. } => true,
        };
        if ok {
            Ok(())
        } else {
            Err(FlowError::ConfigError(format!(
                "invalid range for '{}': {:?}",
                name, self
            )))
        }
    }
}

/// A hyperparameter is either fixed or awaiting tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparameter {
    Fixed(ParamValue),
    /// `None` uses the parameter's default range
    Tunable(Option<ParamRange>),
}

impl Hyperparameter {
    pub fn tune() -> Self {
        Hyperparameter::Tunable(None)
    }

    pub fn tune_in(range: ParamRange) -> Self {
        Hyperparameter::Tunable(Some(range))
    }

    pub fn is_tunable(&self) -> bool {
        matches!(self, Hyperparameter::Tunable(_))
    }
}

impl From<f64> for Hyperparameter {
    fn from(v: f64) -> Self {
        Hyperparameter::Fixed(ParamValue::Float(v))
    }
}

impl From<usize> for Hyperparameter {
    fn from(v: usize) -> Self {
        Hyperparameter::Fixed(ParamValue::Int(v))
    }
}

impl From<ParamValue> for Hyperparameter {
    fn from(v: ParamValue) -> Self {
        Hyperparameter::Fixed(v)
    }
}

/// One concrete assignment of hyperparameters
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Importance recorded by the engine while fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Importance {
    #[default]
    None,
    Impurity,
    Permutation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Iteration cap for gradient-based engines
    pub max_iter: usize,
    pub tol: f64,
    pub importance: Importance,
    /// Out-of-bag accuracy for forests
    pub oob_score: bool,
    /// Shuffles per feature for permutation importance
    pub permutation_repeats: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tol: 1e-6,
            importance: Importance::None,
            oob_score: false,
            permutation_repeats: 3,
        }
    }
}

fn default_range(name: &str) -> Option<ParamRange> {
    match name {
        "penalty" => Some(ParamRange::log10(-10.0, 0.0)),
        "cost_complexity" => Some(ParamRange::log10(-10.0, -1.0)),
        "tree_depth" => Some(ParamRange::int(1, 15)),
        "min_n" => Some(ParamRange::int(2, 40)),
        "mtry" => Some(ParamRange::predictors(1)),
        _ => None,
    }
}

fn is_integer_param(name: &str) -> bool {
    matches!(name, "tree_depth" | "min_n" | "mtry" | "trees")
}

/// Check a fixed value against the parameter's domain, normalising integral floats
fn check_value(name: &str, value: ParamValue) -> Result<ParamValue> {
    if is_integer_param(name) {
        let v = value.as_usize(name)?;
        if v < 1 {
            return Err(FlowError::invalid_hyperparameter(name, v, "must be at least 1"));
        }
        return Ok(ParamValue::Int(v));
    }

    let v = value.as_f64();
    let ok = match name {
        "mixture" => (0.0..=1.0).contains(&v),
        _ => v.is_finite() && v >= 0.0,
    };
    if !ok {
        let reason = if name == "mixture" {
            "must be in [0, 1]"
        } else {
            "must be a non-negative number"
        };
        return Err(FlowError::invalid_hyperparameter(name, v, reason));
    }
    Ok(ParamValue::Float(v))
}

/// Algorithm, mode, hyperparameters and engine options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    algorithm: Algorithm,
    mode: Mode,
    params: BTreeMap<String, Hyperparameter>,
    engine: EngineOptions,
}

/// Build a validated specification. Parameters not given take the
/// algorithm's defaults; `penalty` has none and must be supplied.
pub fn specify<I, S>(algorithm: Algorithm, params: I, mode: Mode) -> Result<ModelSpec>
where
    I: IntoIterator<Item = (S, Hyperparameter)>,
    S: Into<String>,
{
    if mode == Mode::Regression {
        return Err(FlowError::ConfigError(format!(
            "{} is only available in classification mode",
            algorithm
        )));
    }

    let known = algorithm.parameter_names();
    let mut map = BTreeMap::new();
    for (name, hp) in params {
        let name = name.into();
        if !known.contains(&name.as_str()) {
            return Err(FlowError::ConfigError(format!(
                "unknown parameter '{}' for {}",
                name, algorithm
            )));
        }
        let hp = match hp {
            Hyperparameter::Fixed(v) => Hyperparameter::Fixed(check_value(&name, v)?),
            Hyperparameter::Tunable(Some(range)) => {
                range.validate(&name)?;
                Hyperparameter::Tunable(Some(range))
            }
            Hyperparameter::Tunable(None) => Hyperparameter::Tunable(None),
        };
        map.insert(name, hp);
    }

    match algorithm {
        Algorithm::LassoLogistic => {
            if !map.contains_key("penalty") {
                return Err(FlowError::ConfigError(
                    "lasso_reg requires a penalty".to_string(),
                ));
            }
            map.entry("mixture".to_string())
                .or_insert(Hyperparameter::Fixed(ParamValue::Float(1.0)));
        }
        Algorithm::DecisionTree => {
            map.entry("cost_complexity".to_string()).or_insert(0.01.into());
            map.entry("tree_depth".to_string()).or_insert(30usize.into());
            map.entry("min_n".to_string()).or_insert(2usize.into());
        }
        Algorithm::RandomForest => {
            map.entry("min_n".to_string()).or_insert(5usize.into());
            map.entry("trees".to_string()).or_insert(100usize.into());
        }
        Algorithm::LogisticRegression => {}
    }

    Ok(ModelSpec {
        algorithm,
        mode,
        params: map,
        engine: EngineOptions::default(),
    })
}

impl ModelSpec {
    /// Unpenalized logistic regression
    pub fn logistic_reg() -> Self {
        Self {
            algorithm: Algorithm::LogisticRegression,
            mode: Mode::Classification,
            params: BTreeMap::new(),
            engine: EngineOptions::default(),
        }
    }

    /// L1-penalized logistic regression (mixture fixed at 1)
    pub fn lasso_reg(penalty: impl Into<Hyperparameter>) -> Result<Self> {
        specify(
            Algorithm::LassoLogistic,
            [("penalty", penalty.into())],
            Mode::Classification,
        )
    }

    pub fn decision_tree(
        cost_complexity: impl Into<Hyperparameter>,
        tree_depth: impl Into<Hyperparameter>,
        min_n: impl Into<Hyperparameter>,
    ) -> Result<Self> {
        specify(
            Algorithm::DecisionTree,
            [
                ("cost_complexity", cost_complexity.into()),
                ("tree_depth", tree_depth.into()),
                ("min_n", min_n.into()),
            ],
            Mode::Classification,
        )
    }

    /// Random forest; `mtry = None` samples floor(sqrt(p)) predictors per split
    pub fn rand_forest(
        mtry: Option<Hyperparameter>,
        min_n: impl Into<Hyperparameter>,
        trees: usize,
    ) -> Result<Self> {
        let mut params = vec![("min_n", min_n.into()), ("trees", trees.into())];
        if let Some(mtry) = mtry {
            params.push(("mtry", mtry));
        }
        specify(Algorithm::RandomForest, params, Mode::Classification)
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.engine.importance = importance;
        self
    }

    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn engine(&self) -> &EngineOptions {
        &self.engine
    }

    pub fn parameter(&self, name: &str) -> Option<&Hyperparameter> {
        self.params.get(name)
    }

    /// Tunable parameters with their ranges, in canonical order
    pub fn tunable_parameters(&self) -> Vec<(String, ParamRange)> {
        self.algorithm
            .parameter_names()
            .iter()
            .filter_map(|name| match self.params.get(*name)? {
                Hyperparameter::Tunable(range) => {
                    let range = range.or_else(|| default_range(name))?;
                    Some((name.to_string(), range))
                }
                Hyperparameter::Fixed(_) => None,
            })
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        !self.params.values().any(Hyperparameter::is_tunable)
    }

    /// Replace every tunable parameter with its value from `values`.
    /// Fixed parameters are kept; extra keys are ignored.
    pub fn finalize(&self, values: &ParamSet) -> Result<ModelSpec> {
        let mut finalized = self.clone();
        for (name, hp) in finalized.params.iter_mut() {
            if hp.is_tunable() {
                let value = values.get(name).ok_or_else(|| {
                    FlowError::ConfigError(format!("no value supplied for tunable parameter '{}'", name))
                })?;
                *hp = Hyperparameter::Fixed(check_value(name, *value)?);
            }
        }
        Ok(finalized)
    }

    /// The fixed parameter values; fails while anything is still tunable
    pub fn fixed_values(&self) -> Result<ParamSet> {
        let pending: Vec<String> = self
            .params
            .iter()
            .filter(|(_, hp)| hp.is_tunable())
            .map(|(name, _)| name.clone())
            .collect();
        if !pending.is_empty() {
            return Err(FlowError::NotFinalized(pending));
        }
        Ok(self
            .params
            .iter()
            .filter_map(|(name, hp)| match hp {
                Hyperparameter::Fixed(v) => Some((name.clone(), *v)),
                Hyperparameter::Tunable(_) => None,
            })
            .collect())
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.algorithm)?;
        let mut first = true;
        for name in self.algorithm.parameter_names() {
            if let Some(hp) = self.params.get(*name) {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                match hp {
                    Hyperparameter::Fixed(v) => write!(f, "{} = {}", name, v)?,
                    Hyperparameter::Tunable(_) => write!(f, "{} = tune()", name)?,
                }
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_defaults() {
        let spec = specify(
            Algorithm::DecisionTree,
            Vec::<(String, Hyperparameter)>::new(),
            Mode::Classification,
        )
        .unwrap();
        let values = spec.fixed_values().unwrap();
        assert_eq!(values["cost_complexity"], ParamValue::Float(0.01));
        assert_eq!(values["tree_depth"], ParamValue::Int(30));
        assert_eq!(values["min_n"], ParamValue::Int(2));
    }

    #[test]
    fn test_unknown_parameter() {
        let err = specify(
            Algorithm::DecisionTree,
            [("learn_rate", Hyperparameter::from(0.1))],
            Mode::Classification,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::ConfigError(_)));
    }

    #[test]
    fn test_out_of_domain_values() {
        assert!(matches!(
            ModelSpec::lasso_reg(-1.0),
            Err(FlowError::InvalidHyperparameter { .. })
        ));
        assert!(matches!(
            ModelSpec::decision_tree(0.01, 0usize, 2usize),
            Err(FlowError::InvalidHyperparameter { .. })
        ));
        assert!(matches!(
            ModelSpec::decision_tree(0.01, 2.5, 2usize),
            Err(FlowError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_regression_mode_rejected() {
        let err = specify(
            Algorithm::RandomForest,
            Vec::<(String, Hyperparameter)>::new(),
            Mode::Regression,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::ConfigError(_)));
    }

    #[test]
    fn test_finalize_replaces_tunables() {
        let spec = ModelSpec::decision_tree(
            Hyperparameter::tune(),
            Hyperparameter::tune(),
            Hyperparameter::tune(),
        )
        .unwrap();
        assert!(!spec.is_finalized());
        assert!(matches!(spec.fixed_values(), Err(FlowError::NotFinalized(p)) if p.len() == 3));

        let names: Vec<String> = spec.tunable_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["cost_complexity", "tree_depth", "min_n"]);

        let mut values = ParamSet::new();
        values.insert("cost_complexity".into(), ParamValue::Float(0.001));
        values.insert("tree_depth".into(), ParamValue::Float(4.0));
        values.insert("min_n".into(), ParamValue::Int(10));
        values.insert("unused".into(), ParamValue::Int(1));

        let finalized = spec.finalize(&values).unwrap();
        assert!(finalized.is_finalized());
        assert_eq!(
            finalized.fixed_values().unwrap()["tree_depth"],
            ParamValue::Int(4)
        );
        // the source spec is untouched
        assert!(!spec.is_finalized());
    }

    #[test]
    fn test_finalize_requires_every_tunable() {
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        assert!(matches!(
            spec.finalize(&ParamSet::new()),
            Err(FlowError::ConfigError(_))
        ));
    }

    #[test]
    fn test_lasso_mixture_fixed() {
        let spec = ModelSpec::lasso_reg(Hyperparameter::tune()).unwrap();
        let tunable = spec.tunable_parameters();
        assert_eq!(tunable.len(), 1);
        assert_eq!(tunable[0].0, "penalty");
        assert_eq!(
            spec.parameter("mixture"),
            Some(&Hyperparameter::Fixed(ParamValue::Float(1.0)))
        );
    }

    #[test]
    fn test_predictor_count_range() {
        let range = ParamRange::predictors(1).resolve(7);
        assert_eq!(range, ParamRange::int(1, 7));
        assert!(ParamRange::int(3, 2).validate("min_n").is_err());
    }

    #[test]
    fn test_simplicity_key() {
        let mut a = ParamSet::new();
        a.insert("cost_complexity".into(), ParamValue::Float(0.1));
        a.insert("tree_depth".into(), ParamValue::Int(3));
        let mut b = a.clone();
        b.insert("cost_complexity".into(), ParamValue::Float(0.01));
        let key_a = Algorithm::DecisionTree.simplicity_key(&a);
        let key_b = Algorithm::DecisionTree.simplicity_key(&b);
        assert!(key_a < key_b);
    }

    #[test]
    fn test_param_value_json() {
        let mut set = ParamSet::new();
        set.insert("min_n".into(), ParamValue::Int(5));
        set.insert("penalty".into(), ParamValue::Float(0.5));
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"min_n":5,"penalty":0.5}"#);
        let back: ParamSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
