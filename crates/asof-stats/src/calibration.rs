//! Probability quality metrics for binary outcomes.
//!
//! All functions take parallel slices of outcomes and predicted
//! probabilities. Probabilities are expected in `[0, 1]`; range checking is
//! the caller's concern.

use serde::Serialize;

/// Clip applied to probabilities before taking logarithms.
pub const LOG_LOSS_EPS: f64 = 1e-15;

/// Bin count used for expected calibration error.
pub const DEFAULT_CALIBRATION_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum MetricError {
    #[display("{labels} labels but {probabilities} probabilities")]
    LengthMismatch { labels: usize, probabilities: usize },
    #[display("no samples to score")]
    Empty,
}

fn check(labels: &[bool], probabilities: &[f64]) -> Result<(), MetricError> {
    if labels.len() != probabilities.len() {
        return Err(MetricError::LengthMismatch {
            labels: labels.len(),
            probabilities: probabilities.len(),
        });
    }
    if labels.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(())
}

fn outcome(label: bool) -> f64 {
    if label { 1.0 } else { 0.0 }
}

/// Mean squared error between probabilities and outcomes.
#[expect(clippy::cast_precision_loss)]
pub fn brier_score(labels: &[bool], probabilities: &[f64]) -> Result<f64, MetricError> {
    check(labels, probabilities)?;
    let sum = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| (p - outcome(y)).powi(2))
        .sum::<f64>();
    Ok(sum / labels.len() as f64)
}

/// Mean negative log-likelihood, with probabilities clipped to
/// `[LOG_LOSS_EPS, 1 - LOG_LOSS_EPS]`.
#[expect(clippy::cast_precision_loss)]
pub fn log_loss(labels: &[bool], probabilities: &[f64]) -> Result<f64, MetricError> {
    check(labels, probabilities)?;
    let sum = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum::<f64>();
    Ok(sum / labels.len() as f64)
}

/// One bin of a reliability diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Mean predicted probability in the bin.
    pub mean_predicted: f64,
    /// Observed positive rate in the bin.
    pub observed_rate: f64,
}

/// Groups predictions into `n_bins` equal-width bins `(lo, hi]` and reports
/// the mean prediction and observed rate of each non-empty bin.
///
/// A probability of exactly `0.0` is placed in the first bin.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn reliability_bins(
    labels: &[bool],
    probabilities: &[f64],
    n_bins: usize,
) -> Result<Vec<ReliabilityBin>, MetricError> {
    check(labels, probabilities)?;
    let n_bins = n_bins.max(1);
    let mut sums = vec![(0_usize, 0.0_f64, 0.0_f64); n_bins];
    for (&y, &p) in labels.iter().zip(probabilities) {
        let idx = ((p * n_bins as f64).ceil() as usize)
            .saturating_sub(1)
            .min(n_bins - 1);
        let slot = &mut sums[idx];
        slot.0 += 1;
        slot.1 += p;
        slot.2 += outcome(y);
    }
    let width = 1.0 / n_bins as f64;
    Ok(sums
        .into_iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(i, (count, p_sum, y_sum))| ReliabilityBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
            mean_predicted: p_sum / count as f64,
            observed_rate: y_sum / count as f64,
        })
        .collect())
}

/// Expected calibration error: the count-weighted mean absolute gap between
/// predicted probability and observed rate over `n_bins` equal-width bins.
#[expect(clippy::cast_precision_loss)]
pub fn expected_calibration_error(
    labels: &[bool],
    probabilities: &[f64],
    n_bins: usize,
) -> Result<f64, MetricError> {
    let bins = reliability_bins(labels, probabilities, n_bins)?;
    let n = labels.len() as f64;
    Ok(bins
        .iter()
        .map(|b| (b.mean_predicted - b.observed_rate).abs() * b.count as f64 / n)
        .sum())
}

/// Area under the ROC curve via the rank-sum statistic, with tied scores
/// sharing their average rank.
///
/// Returns `Ok(None)` when only one class is present.
#[expect(clippy::cast_precision_loss)]
pub fn roc_auc(labels: &[bool], probabilities: &[f64]) -> Result<Option<f64>, MetricError> {
    check(labels, probabilities)?;
    let positives = labels.iter().filter(|&&y| y).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Ok(None);
    }

    let mut order = (0..labels.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && probabilities[order[end]] == probabilities[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group [start, end) shares the mean rank
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            if labels[idx] {
                positive_rank_sum += rank;
            }
        }
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok(Some(u / (p * negatives as f64)))
}

/// Summary of probability quality for one scored partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub samples: usize,
    pub positive_rate: f64,
    pub brier: f64,
    pub log_loss: f64,
    pub ece: f64,
    /// `None` when only one class is present.
    pub auc: Option<f64>,
}

impl CalibrationReport {
    #[expect(clippy::cast_precision_loss)]
    pub fn compute(labels: &[bool], probabilities: &[f64]) -> Result<Self, MetricError> {
        check(labels, probabilities)?;
        let positives = labels.iter().filter(|&&y| y).count();
        Ok(Self {
            samples: labels.len(),
            positive_rate: positives as f64 / labels.len() as f64,
            brier: brier_score(labels, probabilities)?,
            log_loss: log_loss(labels, probabilities)?,
            ece: expected_calibration_error(labels, probabilities, DEFAULT_CALIBRATION_BINS)?,
            auc: roc_auc(labels, probabilities)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brier_perfect_and_worst() {
        let labels = [true, false];
        assert_eq!(brier_score(&labels, &[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(brier_score(&labels, &[0.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_log_loss_is_finite_at_extremes() {
        let loss = log_loss(&[true], &[0.0]).unwrap();
        assert!(loss.is_finite());
        assert!(loss > 30.0);
        let half = log_loss(&[true, false], &[0.5, 0.5]).unwrap();
        assert!((half - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            brier_score(&[true], &[0.1, 0.2]),
            Err(MetricError::LengthMismatch {
                labels: 1,
                probabilities: 2
            })
        );
        assert_eq!(log_loss(&[], &[]), Err(MetricError::Empty));
    }

    #[test]
    fn test_ece_of_calibrated_bins_is_zero() {
        // 0.25 predicted for four samples, one positive
        let labels = [true, false, false, false];
        let probs = [0.25; 4];
        let ece = expected_calibration_error(&labels, &probs, 10).unwrap();
        assert!(ece.abs() < 1e-12);
    }

    #[test]
    fn test_ece_of_overconfident_predictions() {
        let labels = [false, false];
        let probs = [0.9, 0.9];
        let ece = expected_calibration_error(&labels, &probs, 10).unwrap();
        assert!((ece - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_reliability_bins_edges() {
        let bins = reliability_bins(&[false, true, true], &[0.0, 0.1, 1.0], 10).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 1);
        assert!((bins[1].lower - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_auc() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), Some(1.0));
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), Some(0.0));
        assert_eq!(roc_auc(&labels, &[0.5; 4]).unwrap(), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]).unwrap(), None);
    }

    #[test]
    fn test_report_collects_all_metrics() {
        let labels = [false, true, false, true];
        let probs = [0.2, 0.7, 0.4, 0.6];
        let report = CalibrationReport::compute(&labels, &probs).unwrap();
        assert_eq!(report.samples, 4);
        assert_eq!(report.positive_rate, 0.5);
        assert_eq!(report.auc, Some(1.0));
        assert!(report.brier > 0.0 && report.brier < 0.25);
    }
}
