//! Zero-variance and correlation filters

use crate::error::{FlowError, Result};
use crate::utils::frame::{self, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Drops columns holding a single distinct observed value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeroVarianceFilter {
    removed: Vec<String>,
    is_fitted: bool,
}

impl ZeroVarianceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.removed.clear();
        for name in columns {
            let col = df
                .column(name)
                .map_err(|_| FlowError::schema("zero_variance", name.as_str(), "is not present"))?;

            let distinct = match frame::kind_of(col) {
                ColumnKind::Numeric => {
                    let observed: Vec<f64> = frame::column_f64(col)?.into_iter().flatten().collect();
                    let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    match observed.len() {
                        0 => 0,
                        _ if max > min => 2,
                        _ => 1,
                    }
                }
                ColumnKind::Nominal => frame::column_strings(col)?
                    .into_iter()
                    .flatten()
                    .collect::<BTreeSet<_>>()
                    .len(),
            };

            if distinct < 2 {
                debug!(column = %name, "zero-variance predictor removed");
                self.removed.push(name.clone());
            }
        }
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(FlowError::ModelNotFitted);
        }
        drop_columns(df, &self.removed)
    }
}

/// Greedy correlation filter.
///
/// Columns are scanned in order; a column is dropped when its absolute
/// Pearson correlation with any earlier retained column exceeds the
/// threshold, so of any correlated pair the earlier column survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationFilter {
    threshold: f64,
    removed: Vec<String>,
    /// (kept, dropped, correlation)
    removed_pairs: Vec<(String, String, f64)>,
    is_fitted: bool,
}

impl CorrelationFilter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
            removed: Vec::new(),
            removed_pairs: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn removed_pairs(&self) -> &[(String, String, f64)] {
        &self.removed_pairs
    }

    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        let mut values = Vec::with_capacity(columns.len());
        for name in columns {
            let col = df
                .column(name)
                .map_err(|_| FlowError::schema("correlation", name.as_str(), "is not present"))?;
            if frame::kind_of(col) != ColumnKind::Numeric {
                return Err(FlowError::schema("correlation", name.as_str(), "is not numeric"));
            }
            values.push(frame::column_f64(col)?);
        }

        self.removed.clear();
        self.removed_pairs.clear();
        let mut kept: Vec<usize> = Vec::new();
        for j in 0..columns.len() {
            let hit = kept.iter().find_map(|&i| {
                pearson_correlation(&values[i], &values[j])
                    .filter(|r| r.abs() > self.threshold)
                    .map(|r| (i, r))
            });
            match hit {
                Some((i, r)) => {
                    debug!(kept = %columns[i], dropped = %columns[j], corr = r, "correlated predictor removed");
                    self.removed.push(columns[j].clone());
                    self.removed_pairs.push((columns[i].clone(), columns[j].clone(), r));
                }
                None => kept.push(j),
            }
        }

        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(FlowError::ModelNotFitted);
        }
        drop_columns(df, &self.removed)
    }
}

/// Pearson correlation over pairwise-complete rows; `None` when either
/// side is constant or fewer than two rows are complete
pub fn pearson_correlation(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for &(a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

fn drop_columns(df: &DataFrame, removed: &[String]) -> Result<DataFrame> {
    frame::rebuild(df, |col| {
        if removed.iter().any(|r| r == col.name().as_str()) {
            Ok(Vec::new())
        } else {
            Ok(vec![col.clone()])
        }
    })
}
