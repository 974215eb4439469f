//! Binary classification metrics

use crate::structs::{CryoError, Result, RocCurve};
use linfa::dataset::Pr;
use linfa::metrics::BinaryClassification;

/// Logistic function
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[allow(clippy::cast_possible_truncation)]
fn to_probability(score: f64) -> Result<Pr> {
    Pr::try_from(score as f32)
        .map_err(|p| CryoError::Ml(format!("Scores must be probabilities in [0, 1], got {p}")))
}

/// Receiver operating characteristic and its area for binary labels.
///
/// Thresholds are the distinct scores in decreasing order, preceded by
/// `max + 1` so the curve starts at `(0, 0)`. Every threshold is kept.
/// Scores are compared at `f32` precision.
///
/// # Errors
/// Returns error if lengths differ, a label is not 0/1, a score is not a
/// probability, or only one class is present
pub fn roc(y_true: &[f64], scores: &[f64]) -> Result<(RocCurve, f64)> {
    if y_true.len() != scores.len() {
        return Err(CryoError::Ml(format!(
            "Got {} labels but {} scores",
            y_true.len(),
            scores.len()
        )));
    }
    if let Some(bad) = y_true.iter().find(|&&y| y != 0.0 && y != 1.0) {
        return Err(CryoError::Ml(format!("Labels must be 0 or 1, got {bad}")));
    }
    let probs = scores
        .iter()
        .map(|&s| to_probability(s))
        .collect::<Result<Vec<Pr>>>()?;

    let labels: Vec<bool> = y_true.iter().map(|&y| y == 1.0).collect();
    let n_pos = labels.iter().filter(|&&y| y).count();
    if n_pos == 0 || n_pos == labels.len() {
        return Err(CryoError::Ml(
            "ROC is undefined when only one class is present".into(),
        ));
    }

    let characteristic = probs
        .as_slice()
        .roc(labels.as_slice())
        .map_err(|e| CryoError::Ml(e.to_string()))?;

    // Points are (positives, negatives) strictly below each threshold, in
    // ascending threshold order
    let mut below = characteristic.get_curve();
    let mut ascending = characteristic.get_thresholds();
    let mut area = f64::from(characteristic.area_under_curve());

    // Scores of exactly zero never open their own point
    if let Some(&(pos, neg)) = below.first().filter(|&&p| p != (0.0, 0.0)) {
        area += f64::from(pos) * f64::from(neg) / 2.0;
        below.insert(0, (0.0, 0.0));
        ascending.insert(0, 0.0);
    }

    let top = ascending.last().map_or(0.0, |&t| f64::from(t)) + 1.0;
    let (tpr, fpr): (Vec<f64>, Vec<f64>) = below
        .iter()
        .rev()
        .map(|&(pos, neg)| (1.0 - f64::from(pos), 1.0 - f64::from(neg)))
        .unzip();
    let thresholds = std::iter::once(top)
        .chain(ascending.iter().rev().map(|&t| f64::from(t)))
        .collect();

    Ok((
        RocCurve {
            fpr,
            tpr,
            thresholds,
        },
        area,
    ))
}

/// Area under the ROC curve
///
/// # Errors
/// Same conditions as [`roc`]
pub fn roc_auc_score(y_true: &[f64], scores: &[f64]) -> Result<f64> {
    roc(y_true, scores).map(|(_, area)| area)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_roc_curve_points() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let s = [0.1, 0.4, 0.35, 0.8];
        let (curve, area) = roc(&y, &s).expect("roc");

        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert!((curve.thresholds[0] - 1.8).abs() < 1e-6);
        for (got, want) in curve.thresholds[1..].iter().zip([0.8, 0.4, 0.35, 0.1]) {
            assert!((got - want).abs() < 1e-6);
        }
        assert!((area - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_roc_auc_score() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let s = [0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc_score(&y, &s).expect("auc") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_scores_are_no_skill() {
        let y = [0.0, 1.0, 1.0, 0.0, 1.0];
        let (curve, area) = roc(&y, &[0.0; 5]).expect("roc");
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0]);
        assert_eq!(curve.thresholds, vec![1.0, 0.0]);
        assert!((area - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_scores_below_others() {
        let y = [0.0, 1.0, 0.0, 1.0];
        let s = [0.0, 0.0, 0.3, 0.9];
        let (curve, area) = roc(&y, &s).expect("roc");
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.thresholds.len(), 4);
        assert_eq!(curve.thresholds[3], 0.0);
        assert!((area - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_perfect_separation() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let s = [0.1, 0.2, 0.8, 0.9];
        assert!((roc_auc_score(&y, &s).expect("auc") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_roc_errors() {
        assert!(roc(&[1.0, 1.0], &[0.2, 0.3]).is_err());
        assert!(roc(&[0.0, 2.0], &[0.2, 0.3]).is_err());
        assert!(roc(&[0.0, 1.0], &[0.2]).is_err());
        assert!(roc(&[0.0, 1.0], &[f64::NAN, 0.3]).is_err());
        assert!(roc(&[0.0, 1.0], &[1.5, 0.3]).is_err());
    }
}
