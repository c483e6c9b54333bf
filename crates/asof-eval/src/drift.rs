//! Per-feature distribution drift between the train and validation partitions.

use asof_data::{DataError, FeatureRow, FeatureTable};
use asof_stats::{
    descriptive::DescriptiveStats,
    psi::{self, DEFAULT_BINS},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::split::{Partition, SplitAssignment};

/// PSI above this is conventionally read as a significant shift.
pub const HIGH_DRIFT_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    /// `None` when either partition has no values for the feature.
    pub psi: Option<f64>,
    pub train_count: usize,
    pub validation_count: usize,
    pub high_drift: bool,
    pub train_stats: Option<DescriptiveStats>,
    pub validation_stats: Option<DescriptiveStats>,
}

/// Computes PSI for every column with train as the reference distribution.
///
/// Fails if the table is ragged or its rows are out of order.
pub fn drift_report(
    table: &FeatureTable,
    assignment: &SplitAssignment,
) -> Result<Vec<FeatureDrift>, DataError> {
    table.check_shape()?;
    let mut train_rows = Vec::new();
    let mut validation_rows = Vec::new();
    for row in &table.rows {
        match assignment.partition(&row.subject_id) {
            Some(Partition::Train) => train_rows.push(row),
            Some(Partition::Validation) => validation_rows.push(row),
            Some(Partition::Excluded) | None => {}
        }
    }

    let report = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let column = |rows: &[&FeatureRow]| {
                rows.iter()
                    .filter_map(|r| r.values.get(i).copied())
                    .collect::<Vec<_>>()
            };
            let train = column(&train_rows);
            let validation = column(&validation_rows);
            let psi = psi::population_stability_index(&train, &validation, DEFAULT_BINS);
            let high_drift = psi.is_some_and(|v| v > HIGH_DRIFT_THRESHOLD);
            if high_drift {
                warn!(%feature, ?psi, "high drift between train and validation");
            }
            FeatureDrift {
                feature: feature.clone(),
                psi,
                train_count: train.len(),
                validation_count: validation.len(),
                high_drift,
                train_stats: DescriptiveStats::new(train),
                validation_stats: DescriptiveStats::new(validation),
            }
        })
        .collect::<Vec<_>>();

    info!(
        features = report.len(),
        high_drift = report.iter().filter(|d| d.high_drift).count(),
        "drift report"
    );
    Ok(report)
}
