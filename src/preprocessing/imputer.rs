//! Mean and mode imputation

use crate::error::{FlowError, Result};
use crate::utils::frame;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strategy for imputing missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Training mean (numeric columns)
    Mean,
    /// Training mode (nominal columns); ties go to the smallest level
    MostFrequent,
}

impl ImputeStrategy {
    pub fn step_name(&self) -> &'static str {
        match self {
            ImputeStrategy::Mean => "impute_mean",
            ImputeStrategy::MostFrequent => "impute_mode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeValue {
    Numeric(f64),
    String(String),
}

/// Imputer holding one fill value per column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: BTreeMap<String, ImputeValue>,
    is_fitted: bool,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: BTreeMap::new(),
            is_fitted: false,
        }
    }

    pub fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    pub fn fill_values(&self) -> &BTreeMap<String, ImputeValue> {
        &self.fill_values
    }

    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        let step = self.strategy.step_name();
        for name in columns {
            let col = df
                .column(name)
                .map_err(|_| FlowError::schema(step, name.as_str(), "is not present"))?;

            let fill = match self.strategy {
                ImputeStrategy::Mean => {
                    let observed: Vec<f64> = frame::column_f64(col)?.into_iter().flatten().collect();
                    if observed.is_empty() {
                        return Err(FlowError::degenerate(
                            step,
                            format!("column '{}' is entirely missing", name),
                        ));
                    }
                    ImputeValue::Numeric(observed.iter().sum::<f64>() / observed.len() as f64)
                }
                ImputeStrategy::MostFrequent => {
                    let mode = Self::compute_mode(&frame::column_strings(col)?).ok_or_else(|| {
                        FlowError::degenerate(step, format!("column '{}' is entirely missing", name))
                    })?;
                    ImputeValue::String(mode)
                }
            };
            self.fill_values.insert(name.clone(), fill);
        }

        self.is_fitted = true;
        Ok(self)
    }

    fn compute_mode(values: &[Option<String>]) -> Option<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v.as_str()).or_insert(0) += 1;
        }
        // strict comparison keeps the first (smallest) level among ties
        let mut best: Option<(&str, usize)> = None;
        for (level, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((level, count));
            }
        }
        best.map(|(level, _)| level.to_string())
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(FlowError::ModelNotFitted);
        }
        let step = self.strategy.step_name();
        for name in self.fill_values.keys() {
            if !frame::has_column(df, name) {
                return Err(FlowError::schema(step, name.as_str(), "is missing from the input table"));
            }
        }

        frame::rebuild(df, |col| {
            let name = col.name().as_str();
            match self.fill_values.get(name) {
                Some(ImputeValue::Numeric(fill)) => {
                    let filled = frame::column_f64(col)?
                        .into_iter()
                        .map(|v| Some(v.unwrap_or(*fill)))
                        .collect();
                    Ok(vec![frame::float_column(name, filled)])
                }
                Some(ImputeValue::String(fill)) => {
                    let filled = frame::column_strings(col)?
                        .into_iter()
                        .map(|v| Some(v.unwrap_or_else(|| fill.clone())))
                        .collect();
                    Ok(vec![frame::string_column(name, filled)])
                }
                None => Ok(vec![col.clone()]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_imputation_keeps_observed() {
        let df = df!("bmi" => &[Some(20.0), None, Some(24.0), None]).unwrap();
        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        imputer.fit(&df, &["bmi".to_string()]).unwrap();

        let out = imputer.transform(&df).unwrap();
        let values = frame::numeric_values(&out, "bmi").unwrap();
        assert_eq!(values, vec![Some(20.0), Some(22.0), Some(24.0), Some(22.0)]);
    }

    #[test]
    fn test_mode_tie_breaks_to_smallest_level() {
        let df = df!("grade" => &[Some("10"), Some("9"), None, Some("9"), Some("10")]).unwrap();
        let mut imputer = Imputer::new(ImputeStrategy::MostFrequent);
        imputer.fit(&df, &["grade".to_string()]).unwrap();

        assert_eq!(
            imputer.fill_values().get("grade"),
            Some(&ImputeValue::String("10".to_string()))
        );
        let out = imputer.transform(&df).unwrap();
        assert_eq!(out.column("grade").unwrap().null_count(), 0);
    }

    #[test]
    fn test_all_missing_is_degenerate() {
        let df = df!("x" => &[None::<f64>, None]).unwrap();
        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        let err = imputer.fit(&df, &["x".to_string()]).unwrap_err();
        assert!(matches!(err, FlowError::DegenerateData { .. }));
    }

    #[test]
    fn test_transform_requires_columns() {
        let df = df!("x" => &[Some(1.0), None]).unwrap();
        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        imputer.fit(&df, &["x".to_string()]).unwrap();

        let other = df!("y" => &[1.0]).unwrap();
        assert!(matches!(
            imputer.transform(&other),
            Err(FlowError::Schema { .. })
        ));
    }
}
