//! Model evaluation: predictions against observed outcomes
//!
//! Provides:
//! - Confusion matrix with accuracy, sensitivity and specificity
//! - ROC curve and trapezoidal AUC
//! - Permutation feature importance

pub mod importance;
pub mod metrics;

pub use importance::{rank_features, FeatureScore, ImportanceResult, PermutationImportance};
pub use metrics::{
    accuracy_score, roc_auc, roc_curve, ConfusionMatrix, Metric, RocCurve, RocPlot, RocPoint,
};

use crate::error::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Metrics of one set of predictions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub roc: RocCurve,
    pub auc: f64,
    pub accuracy: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl Evaluation {
    /// Score event probabilities against event indicators, calling
    /// `prob >= 0.5` an event
    pub fn compute(truth: &[bool], prob_event: &Array1<f64>, event: &str, other: &str) -> Result<Self> {
        let predicted: Vec<bool> = prob_event.iter().map(|&p| p >= 0.5).collect();
        let confusion = ConfusionMatrix::from_flags(truth, &predicted, event, other);
        let roc = roc_curve(truth, prob_event)?;
        let auc = roc_auc(&roc);
        Ok(Self {
            accuracy: confusion.accuracy(),
            sensitivity: confusion.sensitivity(),
            specificity: confusion.specificity(),
            confusion,
            roc,
            auc,
        })
    }

    pub fn plot(&self, title: impl Into<String>) -> RocPlot {
        RocPlot {
            title: title.into(),
            event_level: self.confusion.event_level.clone(),
            auc: self.auc,
            curve: self.roc.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_evaluation_summary() {
        let truth = [true, false, true, false];
        let prob = array![0.8, 0.3, 0.4, 0.1];
        let eval = Evaluation::compute(&truth, &prob, "yes", "no").unwrap();
        assert_eq!(eval.confusion.total(), 4);
        assert_eq!(eval.accuracy, Some(0.75));
        assert_eq!(eval.sensitivity, Some(0.5));
        assert_eq!(eval.specificity, Some(1.0));
        assert!((eval.auc - 1.0).abs() < 1e-12);

        let plot = eval.plot("test");
        assert_eq!(plot.event_level, "yes");
        assert_eq!(plot.curve.points.len(), 5);
    }
}
