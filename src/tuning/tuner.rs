//! Cross-validated grid tuning

use super::grid::GridSpec;
use crate::dataset::Fold;
use crate::error::{FlowError, Result};
use crate::evaluation::Metric;
use crate::model::{Algorithm, ParamRange, ParamSet, TrainedModel};
use crate::preprocessing::DesignMatrix;
use crate::utils::frame;
use crate::workflow::Workflow;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cross-validation summary of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub id: String,
    pub params: ParamSet,
    /// One entry per fold; `None` when the cell failed or the metric was undefined
    pub fold_metrics: Vec<Option<f64>>,
    /// Mean over successful folds
    pub mean: Option<f64>,
    /// Standard error of the mean (sample sd / sqrt(n))
    pub std_err: Option<f64>,
    /// Number of successful folds
    pub n: usize,
    pub notes: Vec<String>,
}

impl CandidateResult {
    fn from_cells(id: String, params: ParamSet, cells: Vec<Cell>, fold_ids: &[String]) -> Self {
        let mut fold_metrics = Vec::with_capacity(cells.len());
        let mut notes = Vec::new();
        for (cell, fold_id) in cells.into_iter().zip(fold_ids) {
            match cell {
                Cell::Scored(v) => fold_metrics.push(Some(v)),
                Cell::Failed(reason) => {
                    notes.push(format!("{}: {}", fold_id, reason));
                    fold_metrics.push(None);
                }
            }
        }

        let values: Vec<f64> = fold_metrics.iter().flatten().copied().collect();
        let n = values.len();
        let mean = (n > 0).then(|| values.iter().sum::<f64>() / n as f64);
        let std_err = match mean {
            Some(m) if n > 1 => {
                let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
                Some((var / n as f64).sqrt())
            }
            _ => None,
        };

        Self {
            id,
            params,
            fold_metrics,
            mean,
            std_err,
            n,
            notes,
        }
    }
}

/// Outcome of a tuning sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    pub algorithm: Algorithm,
    pub metric: Metric,
    pub fold_ids: Vec<String>,
    pub candidates: Vec<CandidateResult>,
}

impl TuningResult {
    /// Best mean first; equal means prefer the simpler model, then the
    /// earlier candidate
    fn compare(&self, a: (usize, &CandidateResult), b: (usize, &CandidateResult)) -> Ordering {
        let (ma, mb) = (a.1.mean.unwrap_or(f64::NEG_INFINITY), b.1.mean.unwrap_or(f64::NEG_INFINITY));
        mb.total_cmp(&ma)
            .then_with(|| {
                let ka = self.algorithm.simplicity_key(&a.1.params);
                let kb = self.algorithm.simplicity_key(&b.1.params);
                ka.iter()
                    .zip(&kb)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then(a.0.cmp(&b.0))
    }

    /// Candidates with a mean, best first
    pub fn ranked(&self) -> Vec<&CandidateResult> {
        let mut scored: Vec<(usize, &CandidateResult)> = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.mean.is_some())
            .collect();
        scored.sort_by(|a, b| self.compare(*a, *b));
        scored.into_iter().map(|(_, c)| c).collect()
    }

    /// The candidate with the largest mean metric
    pub fn select_best(&self, metric: Metric) -> Result<&CandidateResult> {
        if metric != self.metric {
            return Err(FlowError::TuningError(format!(
                "results were scored with {}, not {}",
                self.metric, metric
            )));
        }
        self.ranked().into_iter().next().ok_or_else(|| {
            FlowError::TuningError(format!(
                "all {} candidates failed on every fold",
                self.candidates.len()
            ))
        })
    }

    pub fn show_best(&self, n: usize) -> Vec<&CandidateResult> {
        self.ranked().into_iter().take(n).collect()
    }

    /// Candidates without a single successful fold
    pub fn n_failed(&self) -> usize {
        self.candidates.iter().filter(|c| c.mean.is_none()).count()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

enum Cell {
    Scored(f64),
    Failed(String),
}

struct PreparedFold {
    id: String,
    analysis: DesignMatrix,
    assessment: DesignMatrix,
}

/// Number of predictors the recipe produces on `train`
fn predictor_count(workflow: &Workflow, train: &DataFrame) -> Result<usize> {
    Ok(workflow.recipe().fit(train)?.predictors().len())
}

fn resolve_ranges(
    workflow: &Workflow,
    train: &DataFrame,
) -> Result<Vec<(String, ParamRange)>> {
    let params = workflow.tunable_parameters();
    if params.iter().all(|(_, r)| r.is_resolved()) {
        return Ok(params);
    }
    let n_predictors = predictor_count(workflow, train)?;
    debug!(predictors = n_predictors, "resolved predictor-count ranges");
    Ok(params
        .into_iter()
        .map(|(name, range)| (name, range.resolve(n_predictors)))
        .collect())
}

fn prepare_fold(workflow: &Workflow, train: &DataFrame, fold: &Fold) -> Result<PreparedFold> {
    let analysis = frame::take_rows(train, &fold.analysis)?;
    let assessment = frame::take_rows(train, &fold.assessment)?;
    let recipe = workflow.recipe().fit(&analysis)?;
    let analysis = recipe.bake_matrix(&analysis)?;
    if analysis.feature_names.is_empty() {
        return Err(FlowError::degenerate(
            "tune_grid",
            format!("no predictors remain in {}", fold.id),
        ));
    }
    let assessment = recipe.bake_matrix(&assessment)?;
    Ok(PreparedFold {
        id: fold.id.clone(),
        analysis,
        assessment,
    })
}

fn score_cell(
    workflow: &Workflow,
    params: &ParamSet,
    fold: &PreparedFold,
    metric: Metric,
    seed: u64,
) -> Result<f64> {
    let spec = workflow.spec().finalize(params)?;
    let model = TrainedModel::train(&spec, &fold.analysis.x, &fold.analysis.y, seed)?;
    let prob = model.predict_proba(&fold.assessment.x)?;
    let truth: Vec<bool> = fold.assessment.y.iter().map(|&v| v == 1.0).collect();
    metric.score(&truth, &prob)
}

/// Score every grid candidate on every fold.
///
/// Each fold's recipe is fit on its analysis rows once. Cells are evaluated
/// in parallel; a cell failing with a contained error is recorded as missing
/// and the sweep continues, any other error aborts it.
pub fn tune_grid(
    workflow: &Workflow,
    train: &DataFrame,
    folds: &[Fold],
    grid: &GridSpec,
    metric: Metric,
    seed: u64,
) -> Result<TuningResult> {
    if folds.is_empty() {
        return Err(FlowError::ConfigError("tuning needs at least one fold".to_string()));
    }
    if workflow.is_finalized() {
        return Err(FlowError::ConfigError(
            "workflow has no tunable parameters".to_string(),
        ));
    }

    let params = resolve_ranges(workflow, train)?;
    let candidates = grid.generate(&params, seed)?;
    if candidates.is_empty() {
        return Err(FlowError::TuningError("grid produced no candidates".to_string()));
    }

    info!(
        model = %workflow.spec(),
        candidates = candidates.len(),
        folds = folds.len(),
        metric = %metric,
        "tuning"
    );

    let prepared: Vec<PreparedFold> = folds
        .par_iter()
        .map(|fold| prepare_fold(workflow, train, fold))
        .collect::<Result<Vec<_>>>()?;

    let n_folds = prepared.len();
    let cells: Vec<Cell> = (0..candidates.len() * n_folds)
        .into_par_iter()
        .map(|k| {
            let (c, f) = (k / n_folds, k % n_folds);
            match score_cell(workflow, &candidates[c], &prepared[f], metric, seed) {
                Ok(value) => Ok(Cell::Scored(value)),
                Err(e) if e.is_contained() => Ok(Cell::Failed(e.to_string())),
                Err(e) => Err(e),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let fold_ids: Vec<String> = prepared.iter().map(|f| f.id.clone()).collect();
    let width = candidates.len().to_string().len().max(2);
    let mut cells = cells.into_iter();
    let results: Vec<CandidateResult> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, params)| {
            let row: Vec<Cell> = cells.by_ref().take(n_folds).collect();
            let id = format!("Model{:0width$}", i + 1, width = width);
            CandidateResult::from_cells(id, params, row, &fold_ids)
        })
        .collect();

    for candidate in results.iter().filter(|c| !c.notes.is_empty()) {
        warn!(
            candidate = %candidate.id,
            failed = candidate.notes.len(),
            first = %candidate.notes[0],
            "candidate failed on some folds"
        );
    }

    let result = TuningResult {
        algorithm: workflow.spec().algorithm(),
        metric,
        fold_ids,
        candidates: results,
    };
    info!(failed = result.n_failed(), "tuning finished");
    Ok(result)
}
