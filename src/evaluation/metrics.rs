//! Classification metrics: confusion matrix, ROC curve, AUC

use crate::error::{FlowError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 2x2 confusion matrix with the event level as the positive class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub event_level: String,
    pub other_level: String,
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
}

impl ConfusionMatrix {
    /// Tabulate predicted against observed labels. `levels` is `[event, other]`.
    pub fn new(truth: &[String], predicted: &[String], levels: [&str; 2]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(FlowError::ShapeError {
                expected: format!("{} predictions", truth.len()),
                actual: format!("{} predictions", predicted.len()),
            });
        }
        let [event, other] = levels;
        let as_event = |label: &str| -> Result<bool> {
            if label == event {
                Ok(true)
            } else if label == other {
                Ok(false)
            } else {
                Err(FlowError::DataError(format!(
                    "label '{}' is neither '{}' nor '{}'",
                    label, event, other
                )))
            }
        };

        let mut truth_flags = Vec::with_capacity(truth.len());
        let mut pred_flags = Vec::with_capacity(truth.len());
        for (t, p) in truth.iter().zip(predicted) {
            truth_flags.push(as_event(t)?);
            pred_flags.push(as_event(p)?);
        }
        Ok(Self::from_flags(&truth_flags, &pred_flags, event, other))
    }

    /// Tabulate boolean event indicators
    pub fn from_flags(truth: &[bool], predicted: &[bool], event: &str, other: &str) -> Self {
        let mut cm = ConfusionMatrix {
            event_level: event.to_string(),
            other_level: other.to_string(),
            true_positive: 0,
            false_positive: 0,
            false_negative: 0,
            true_negative: 0,
        };
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (true, true) => cm.true_positive += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
                (false, false) => cm.true_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.false_negative + self.true_negative
    }

    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// Share of observed events predicted as events
    pub fn sensitivity(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// Share of observed non-events predicted as non-events
    pub fn specificity(&self) -> Option<f64> {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .event_level
            .len()
            .max(self.other_level.len())
            .max(10);
        writeln!(f, "{:>w$}  {:>w$}", "", "Truth", w = width)?;
        writeln!(
            f,
            "{:>w$}  {:>w$}  {:>w$}",
            "Prediction",
            self.event_level,
            self.other_level,
            w = width
        )?;
        writeln!(
            f,
            "{:>w$}  {:>w$}  {:>w$}",
            self.event_level,
            self.true_positive,
            self.false_positive,
            w = width
        )?;
        write!(
            f,
            "{:>w$}  {:>w$}  {:>w$}",
            self.other_level,
            self.false_negative,
            self.true_negative,
            w = width
        )
    }
}

/// One point of an ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Rows with probability >= threshold are called events; `None` is the
    /// starting point where nothing is
    pub threshold: Option<f64>,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

impl RocPoint {
    pub fn specificity(&self) -> f64 {
        1.0 - self.false_positive_rate
    }

    pub fn sensitivity(&self) -> f64 {
        self.true_positive_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
}

/// ROC curve over every distinct probability, from the highest threshold down
pub fn roc_curve(truth: &[bool], prob_event: &Array1<f64>) -> Result<RocCurve> {
    if truth.len() != prob_event.len() {
        return Err(FlowError::ShapeError {
            expected: format!("{} probabilities", truth.len()),
            actual: format!("{} probabilities", prob_event.len()),
        });
    }
    if prob_event.iter().any(|p| !p.is_finite()) {
        return Err(FlowError::MetricUndefined(
            "probabilities contain non-finite values".to_string(),
        ));
    }
    let positives = truth.iter().filter(|&&t| t).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(FlowError::MetricUndefined(
            "ROC curve needs both outcome classes".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..truth.len()).collect();
    order.sort_by(|&a, &b| prob_event[b].total_cmp(&prob_event[a]));

    let mut points = vec![RocPoint {
        threshold: None,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = prob_event[order[i]];
        // consume every row tied at this probability
        while i < order.len() && prob_event[order[i]] == threshold {
            if truth[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(RocPoint {
            threshold: Some(threshold),
            false_positive_rate: fp as f64 / negatives as f64,
            true_positive_rate: tp as f64 / positives as f64,
        });
    }
    Ok(RocCurve { points })
}

/// Trapezoidal area under an ROC curve
pub fn roc_auc(curve: &RocCurve) -> f64 {
    curve
        .points
        .windows(2)
        .map(|w| {
            let dx = w[1].false_positive_rate - w[0].false_positive_rate;
            dx * (w[0].true_positive_rate + w[1].true_positive_rate) / 2.0
        })
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Metric used to score tuning candidates; larger is better for both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    RocAuc,
    Accuracy,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::RocAuc => "roc_auc",
            Metric::Accuracy => "accuracy",
        }
    }

    pub fn score(&self, truth: &[bool], prob_event: &Array1<f64>) -> Result<f64> {
        match self {
            Metric::RocAuc => Ok(roc_auc(&roc_curve(truth, prob_event)?)),
            Metric::Accuracy => {
                if truth.is_empty() {
                    return Err(FlowError::MetricUndefined("no rows to score".to_string()));
                }
                Ok(accuracy_score(truth, prob_event))
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accuracy of calling `prob >= 0.5` an event
pub fn accuracy_score(truth: &[bool], prob_event: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(prob_event.iter())
        .filter(|(t, p)| (**p >= 0.5) == **t)
        .count();
    correct as f64 / truth.len() as f64
}

/// Serializable ROC plot object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocPlot {
    pub title: String,
    pub event_level: String,
    pub auc: f64,
    pub curve: RocCurve,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let truth = labels(&["yes", "yes", "no", "no", "no"]);
        let pred = labels(&["yes", "no", "no", "yes", "no"]);
        let cm = ConfusionMatrix::new(&truth, &pred, ["yes", "no"]).unwrap();
        assert_eq!(cm.true_positive, 1);
        assert_eq!(cm.false_negative, 1);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.true_negative, 2);
        assert_eq!(cm.total(), 5);
        assert_eq!(cm.accuracy(), Some(0.6));
        assert_eq!(cm.sensitivity(), Some(0.5));
        assert!(cm.to_string().contains("Prediction"));
    }

    #[test]
    fn test_confusion_matrix_rejects_unknown_label() {
        let err = ConfusionMatrix::new(&labels(&["maybe"]), &labels(&["yes"]), ["yes", "no"]);
        assert!(matches!(err, Err(FlowError::DataError(_))));
    }

    #[test]
    fn test_roc_curve_shape() {
        let truth = [true, false, true, false, true, false];
        let prob = array![0.9, 0.8, 0.7, 0.3, 0.3, 0.1];
        let curve = roc_curve(&truth, &prob).unwrap();

        let first = curve.points.first().unwrap();
        let last = curve.points.last().unwrap();
        assert_eq!((first.false_positive_rate, first.true_positive_rate), (0.0, 0.0));
        assert_eq!((last.false_positive_rate, last.true_positive_rate), (1.0, 1.0));
        for w in curve.points.windows(2) {
            assert!(w[1].false_positive_rate >= w[0].false_positive_rate);
            assert!(w[1].true_positive_rate >= w[0].true_positive_rate);
        }
        // tied 0.3 scores collapse into one point
        assert_eq!(curve.points.len(), 6);

        let auc = roc_auc(&curve);
        assert!((0.0..=1.0).contains(&auc));
    }

    #[test]
    fn test_auc_extremes() {
        let truth = [true, true, false, false];
        let perfect = roc_curve(&truth, &array![0.9, 0.8, 0.2, 0.1]).unwrap();
        assert!((roc_auc(&perfect) - 1.0).abs() < 1e-12);
        let inverted = roc_curve(&truth, &array![0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!(roc_auc(&inverted).abs() < 1e-12);
        let flat = roc_curve(&truth, &array![0.5, 0.5, 0.5, 0.5]).unwrap();
        assert!((roc_auc(&flat) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_undefined() {
        let err = roc_curve(&[true, true], &array![0.2, 0.4]).unwrap_err();
        assert!(matches!(err, FlowError::MetricUndefined(_)));
        assert!(matches!(
            Metric::RocAuc.score(&[false], &array![0.2]),
            Err(FlowError::MetricUndefined(_))
        ));
    }

    #[test]
    fn test_accuracy_metric() {
        let truth = [true, false, true, false];
        let prob = array![0.6, 0.4, 0.3, 0.5];
        assert_eq!(Metric::Accuracy.score(&truth, &prob).unwrap(), 0.5);
    }
}
