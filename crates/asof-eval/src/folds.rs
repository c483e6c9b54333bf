//! Walk-forward temporal cross-validation.
//!
//! Boundaries `b0 < b1 < … < bn` cut the cutoff axis into periods. Fold `i`
//! validates on period `[b_i, b_{i+1})` and trains on what came before it,
//! with the same symmetric purge as [`split`](crate::split::split):
//!
//! ```text
//! expanding, fold 2:  train (−∞, b2−p)            validate [b2+p, b3)
//! sliding,   fold 2:  train [b1, b2−p)            validate [b2+p, b3)
//! ```
//!
//! Folds in which either side is empty are skipped.

use asof_data::{Subject, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::split::{PurgedRule, SplitAssignment, SplitError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldMode {
    /// Train on every earlier period.
    #[default]
    Expanding,
    /// Train only on the immediately preceding period.
    Sliding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    /// Inclusive start of the training period, `None` when expanding from the beginning.
    pub train_from: Option<Timestamp>,
    pub boundary: Timestamp,
    /// Exclusive end of the validation period.
    pub validation_until: Timestamp,
    pub assignment: SplitAssignment,
}

/// Builds one fold per consecutive pair of `boundaries`.
pub fn walk_forward<'a, I>(
    subjects: I,
    boundaries: &[Timestamp],
    purge_days: i64,
    mode: FoldMode,
) -> Result<Vec<Fold>, SplitError>
where
    I: IntoIterator<Item = &'a Subject>,
    I::IntoIter: Clone,
{
    if purge_days < 0 {
        return Err(SplitError::NegativePurge { purge_days });
    }
    for pair in boundaries.windows(2) {
        if pair[0] >= pair[1] {
            return Err(SplitError::UnorderedBoundaries {
                previous: pair[0],
                next: pair[1],
            });
        }
    }

    let subjects = subjects.into_iter();
    let mut folds = Vec::new();
    for (i, pair) in boundaries.windows(2).enumerate() {
        let (boundary, until) = (pair[0], pair[1]);
        let train_from = match mode {
            FoldMode::Expanding => None,
            FoldMode::Sliding => i.checked_sub(1).map(|prev| boundaries[prev]),
        };
        let rule = PurgedRule {
            train_from,
            val_until: Some(until),
            ..PurgedRule::around(boundary, purge_days)?
        };
        let assignment = rule.assign(subjects.clone(), boundary, purge_days)?;
        if assignment.counts.train == 0 || assignment.counts.validation == 0 {
            debug!(fold = i, %boundary, "skipping fold with an empty side");
            continue;
        }
        folds.push(Fold {
            index: i,
            train_from,
            boundary,
            validation_until: until,
            assignment,
        });
    }

    info!(folds = folds.len(), ?mode, purge_days, "built walk-forward folds");
    Ok(folds)
}
