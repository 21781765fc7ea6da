//! Candidate grids for tuning

use crate::error::{FlowError, Result};
use crate::model::{ParamRange, ParamSet, ParamValue};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How candidate hyperparameter sets are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridSpec {
    /// Cartesian product of `levels` evenly spaced values per parameter
    Regular { levels: usize },
    /// Cartesian product with a level count per parameter
    RegularPer(BTreeMap<String, usize>),
    /// Latin hypercube of `size` points
    SpaceFilling { size: usize },
    /// Candidates given directly
    Explicit(Vec<ParamSet>),
}

impl GridSpec {
    /// Generate candidates for `params`, given in canonical order.
    ///
    /// Log-scaled ranges are spaced evenly in log10. Integer ranges are
    /// rounded and duplicates removed. In regular grids the first parameter
    /// varies fastest.
    pub fn generate(&self, params: &[(String, ParamRange)], seed: u64) -> Result<Vec<ParamSet>> {
        for (name, range) in params {
            if !range.is_resolved() {
                return Err(FlowError::ConfigError(format!(
                    "range for '{}' depends on the number of predictors and is unresolved",
                    name
                )));
            }
            range.validate(name)?;
        }

        match self {
            GridSpec::Regular { levels } => {
                let per: Vec<usize> = vec![*levels; params.len()];
                regular(params, &per)
            }
            GridSpec::RegularPer(levels) => {
                let per = params
                    .iter()
                    .map(|(name, _)| {
                        levels.get(name).copied().ok_or_else(|| {
                            FlowError::ConfigError(format!("no level count for '{}'", name))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                regular(params, &per)
            }
            GridSpec::SpaceFilling { size } => latin_hypercube(params, *size, seed),
            GridSpec::Explicit(sets) => {
                for set in sets {
                    if let Some((name, _)) = params.iter().find(|(n, _)| !set.contains_key(n)) {
                        return Err(FlowError::ConfigError(format!(
                            "candidate {:?} has no value for '{}'",
                            set, name
                        )));
                    }
                }
                Ok(sets.clone())
            }
        }
    }
}

/// `n` evenly spaced values over a range
pub fn levels(range: &ParamRange, n: usize) -> Vec<ParamValue> {
    if n == 0 {
        return Vec::new();
    }
    let fraction = |i: usize| if n == 1 { 0.0 } else { i as f64 / (n - 1) as f64 };

    match *range {
        ParamRange::Float { low, high, log_scale } => (0..n)
            .map(|i| ParamValue::Float(interpolate(low, high, log_scale, fraction(i))))
            .collect(),
        ParamRange::Int { low, high } => {
            let mut values: Vec<usize> = (0..n)
                .map(|i| (low as f64 + (high - low) as f64 * fraction(i)).round() as usize)
                .collect();
            values.dedup();
            values.into_iter().map(ParamValue::Int).collect()
        }
        // unresolved ranges are rejected before levels are drawn
        ParamRange::PredictorCount { low } => vec![ParamValue::Int(low)],
    }
}

fn interpolate(low: f64, high: f64, log_scale: bool, t: f64) -> f64 {
    if log_scale {
        let (lo, hi) = (low.log10(), high.log10());
        10f64.powf(lo + (hi - lo) * t)
    } else {
        low + (high - low) * t
    }
}

fn regular(params: &[(String, ParamRange)], per: &[usize]) -> Result<Vec<ParamSet>> {
    if per.iter().any(|&n| n == 0) {
        return Err(FlowError::ConfigError("grid levels must be at least 1".to_string()));
    }
    let axes: Vec<Vec<ParamValue>> = params
        .iter()
        .zip(per)
        .map(|((_, range), &n)| levels(range, n))
        .collect();

    let total: usize = axes.iter().map(Vec::len).product();
    let mut grid = Vec::with_capacity(total);
    for k in 0..total {
        let mut rest = k;
        let mut set = ParamSet::new();
        for ((name, _), axis) in params.iter().zip(&axes) {
            set.insert(name.clone(), axis[rest % axis.len()]);
            rest /= axis.len();
        }
        grid.push(set);
    }
    Ok(grid)
}

fn latin_hypercube(params: &[(String, ParamRange)], size: usize, seed: u64) -> Result<Vec<ParamSet>> {
    if size == 0 {
        return Err(FlowError::ConfigError("space-filling grid size must be at least 1".to_string()));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let columns: Vec<Vec<ParamValue>> = params
        .iter()
        .map(|(_, range)| {
            let mut strata: Vec<usize> = (0..size).collect();
            strata.shuffle(&mut rng);
            strata
                .into_iter()
                .map(|s| {
                    let u = (s as f64 + rng.gen::<f64>()) / size as f64;
                    from_unit(range, u)
                })
                .collect()
        })
        .collect();

    let mut grid: Vec<ParamSet> = Vec::with_capacity(size);
    for i in 0..size {
        let set: ParamSet = params
            .iter()
            .zip(&columns)
            .map(|((name, _), column)| (name.clone(), column[i]))
            .collect();
        if !grid.contains(&set) {
            grid.push(set);
        }
    }
    Ok(grid)
}

/// Map `u` in [0, 1) onto a range
fn from_unit(range: &ParamRange, u: f64) -> ParamValue {
    match *range {
        ParamRange::Float { low, high, log_scale } => {
            ParamValue::Float(interpolate(low, high, log_scale, u))
        }
        ParamRange::Int { low, high } => {
            let width = (high - low + 1) as f64;
            ParamValue::Int((low + (u * width).floor() as usize).min(high))
        }
        ParamRange::PredictorCount { low } => ParamValue::Int(low),
    }
}
