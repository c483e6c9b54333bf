//! The hand-off to a trainer.
//!
//! A model sees only feature rows that the splitter put on the train side and
//! scores the validation rows. Whatever it returns is checked against the
//! `[0, 1]` contract before any metric is computed.

use std::fmt;

use asof_data::FeatureRow;

pub trait ProbabilityModel: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Fits on `train` and returns one probability per row of `validation`,
    /// in the same order.
    fn fit_predict(&self, train: &[&FeatureRow], validation: &[&FeatureRow]) -> Vec<f64>;
}

/// Predicts the train positive rate for every row.
///
/// A reference point for calibration metrics; any useful model must beat it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseRateModel {
    /// Rate used when the train side is empty.
    pub prior: Option<f64>,
}

impl ProbabilityModel for BaseRateModel {
    fn name(&self) -> &str {
        "base_rate"
    }

    #[expect(clippy::cast_precision_loss)]
    fn fit_predict(&self, train: &[&FeatureRow], validation: &[&FeatureRow]) -> Vec<f64> {
        let rate = if train.is_empty() {
            self.prior.unwrap_or(0.5)
        } else {
            train.iter().filter(|r| r.label).count() as f64 / train.len() as f64
        };
        vec![rate; validation.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: bool) -> FeatureRow {
        FeatureRow {
            subject_id: String::new(),
            label,
            cutoff_ts: "2017-01-01".parse().unwrap(),
            values: vec![],
            lineage: vec![],
        }
    }

    #[test]
    fn test_base_rate() {
        let train = [row(true), row(false), row(false), row(false)];
        let train = train.iter().collect::<Vec<_>>();
        let validation = [row(true), row(false)];
        let validation = validation.iter().collect::<Vec<_>>();
        let model = BaseRateModel::default();
        assert_eq!(model.fit_predict(&train, &validation), [0.25, 0.25]);
    }

    #[test]
    fn test_prior_when_train_is_empty() {
        let validation = [row(true)];
        let validation = validation.iter().collect::<Vec<_>>();
        let model = BaseRateModel { prior: Some(0.1) };
        assert_eq!(model.fit_predict(&[], &validation), [0.1]);
    }
}
