//! Dummy (indicator) encoding for nominal predictors

use crate::error::{FlowError, Result};
use crate::utils::frame::{self, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Training levels of one encoded column and the indicator name for each
/// non-reference level
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LevelMap {
    column: String,
    levels: Vec<String>,
    indicators: Vec<String>,
}

/// One 0/1 column per level except the reference (first sorted) level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DummyEncoder {
    mappings: Vec<LevelMap>,
    is_fitted: bool,
}

impl DummyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn mapping(&self, column: &str) -> Option<&LevelMap> {
        self.mappings.iter().find(|m| m.column == column)
    }

    pub fn levels(&self, column: &str) -> Option<&[String]> {
        self.mapping(column).map(|m| m.levels.as_slice())
    }

    /// Name of the indicator column for `level` of `column`
    pub fn dummy_name(column: &str, level: &str) -> String {
        let level: String = level
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", column, level)
    }

    pub fn output_names(&self, column: &str) -> Vec<String> {
        self.mapping(column)
            .map(|m| m.indicators.clone())
            .unwrap_or_default()
    }

    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.mappings.clear();
        // names already taken by columns that survive encoding
        let mut taken: BTreeSet<String> = frame::column_names(df)
            .into_iter()
            .filter(|c| !columns.contains(c))
            .collect();

        for name in columns {
            let col = df
                .column(name)
                .map_err(|_| FlowError::schema("dummy", name.as_str(), "is not present"))?;
            if frame::kind_of(col) != ColumnKind::Nominal {
                return Err(FlowError::schema("dummy", name.as_str(), "is not nominal"));
            }
            let levels: Vec<String> = frame::column_strings(col)?
                .into_iter()
                .flatten()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if levels.is_empty() {
                return Err(FlowError::degenerate(
                    "dummy",
                    format!("column '{}' has no observed levels", name),
                ));
            }

            let indicators: Vec<String> = levels
                .iter()
                .skip(1)
                .map(|level| {
                    let base = Self::dummy_name(name, level);
                    let mut candidate = base.clone();
                    let mut suffix = 2;
                    while taken.contains(&candidate) {
                        candidate = format!("{}_{}", base, suffix);
                        suffix += 1;
                    }
                    if candidate != base {
                        warn!(
                            column = name.as_str(),
                            level = level.as_str(),
                            indicator = candidate.as_str(),
                            "indicator name disambiguated"
                        );
                    }
                    taken.insert(candidate.clone());
                    candidate
                })
                .collect();

            self.mappings.push(LevelMap {
                column: name.clone(),
                levels,
                indicators,
            });
        }
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(FlowError::ModelNotFitted);
        }
        for LevelMap { column: name, .. } in &self.mappings {
            if !frame::has_column(df, name) {
                return Err(FlowError::schema("dummy", name.as_str(), "is missing from the input table"));
            }
        }

        frame::rebuild(df, |col| {
            let name = col.name().as_str();
            let Some(LevelMap { levels, indicators, .. }) = self.mapping(name) else {
                return Ok(vec![col.clone()]);
            };

            let values = frame::column_strings(col)?;
            let unseen = values
                .iter()
                .flatten()
                .filter(|v| !levels.contains(v))
                .count();
            if unseen > 0 {
                warn!(column = name, rows = unseen, "levels unseen during training encoded as all zeros");
            }

            Ok(levels
                .iter()
                .skip(1)
                .zip(indicators)
                .map(|(level, indicator_name)| {
                    let indicator = values
                        .iter()
                        .map(|v| v.as_ref().map(|v| if v == level { 1.0 } else { 0.0 }))
                        .collect();
                    frame::float_column(indicator_name, indicator)
                })
                .collect())
        })
    }
}
