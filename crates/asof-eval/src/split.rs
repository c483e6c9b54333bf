//! Purged temporal train/validation split.
//!
//! Subjects are partitioned by their own cutoff around a single boundary,
//! with a symmetric purge gap of `purge_days` on either side:
//!
//! ```text
//!            train            │   excluded    │      validation
//! ───────────────────────────[b−p────b────b+p)──────────────────────►
//!                                                            cutoff_ts
//! ```
//!
//! - train:      `cutoff_ts <  boundary − purge_days`
//! - validation: `cutoff_ts >= boundary + purge_days`
//! - excluded:   everything in between
//!
//! After assignment, `max(train cutoffs) < min(validation cutoffs)` is
//! re-checked and a violation is reported as [`SplitError::SplitOverlap`].

use std::collections::{BTreeMap, BTreeSet};

use asof_data::{Subject, Timestamp};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Train,
    Validation,
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SplitError {
    #[display("subject {subject_id} appears more than once")]
    DuplicateSubject { subject_id: String },
    #[display(
        "split overlap: latest train cutoff {train_max} is not before earliest validation cutoff {val_min} ({in_both} subjects qualify for both)"
    )]
    SplitOverlap {
        train_max: Timestamp,
        val_min: Timestamp,
        in_both: usize,
    },
    #[display("purge_days must be >= 0, got {purge_days}")]
    NegativePurge { purge_days: i64 },
    #[display("purge of {purge_days} days around {boundary} leaves the representable time range")]
    PurgeOutOfRange { boundary: Timestamp, purge_days: i64 },
    #[display("fold boundaries must be strictly increasing: {previous} is followed by {next}")]
    UnorderedBoundaries { previous: Timestamp, next: Timestamp },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCounts {
    pub train: usize,
    pub validation: usize,
    pub excluded: usize,
}

/// Partition of every subject, keyed and serialized in subject-id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub boundary: Timestamp,
    pub purge_days: i64,
    pub train_max_cutoff: Option<Timestamp>,
    pub val_min_cutoff: Option<Timestamp>,
    pub counts: PartitionCounts,
    pub assignments: BTreeMap<String, Partition>,
}

impl SplitAssignment {
    #[must_use]
    pub fn partition(&self, subject_id: &str) -> Option<Partition> {
        self.assignments.get(subject_id).copied()
    }

    /// Ids assigned to `partition`, in id order.
    pub fn ids(&self, partition: Partition) -> impl Iterator<Item = &str> + '_ {
        self.assignments
            .iter()
            .filter(move |(_, p)| **p == partition)
            .map(|(id, _)| id.as_str())
    }
}

/// Half-open cutoff ranges for the two sides of one purged boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PurgedRule {
    /// Inclusive lower bound of train; `None` for an expanding window.
    pub(crate) train_from: Option<Timestamp>,
    /// Exclusive upper bound of train: `boundary − purge`.
    pub(crate) train_until: Timestamp,
    /// Inclusive lower bound of validation: `boundary + purge`.
    pub(crate) val_from: Timestamp,
    /// Exclusive upper bound of validation; `None` for open-ended.
    pub(crate) val_until: Option<Timestamp>,
}

impl PurgedRule {
    pub(crate) fn around(boundary: Timestamp, purge_days: i64) -> Result<Self, SplitError> {
        let out_of_range = || SplitError::PurgeOutOfRange {
            boundary,
            purge_days,
        };
        let purge = TimeDelta::try_days(purge_days).ok_or_else(out_of_range)?;
        Ok(Self {
            train_from: None,
            train_until: boundary.checked_sub(purge).ok_or_else(out_of_range)?,
            val_from: boundary.checked_add(purge).ok_or_else(out_of_range)?,
            val_until: None,
        })
    }

    fn is_train(&self, cutoff: Timestamp) -> bool {
        cutoff < self.train_until && self.train_from.is_none_or(|from| from <= cutoff)
    }

    fn is_validation(&self, cutoff: Timestamp) -> bool {
        cutoff >= self.val_from && self.val_until.is_none_or(|until| cutoff < until)
    }

    /// Assigns each subject, then enforces the ordering invariant.
    pub(crate) fn assign<'a, I>(
        &self,
        subjects: I,
        boundary: Timestamp,
        purge_days: i64,
    ) -> Result<SplitAssignment, SplitError>
    where
        I: IntoIterator<Item = &'a Subject>,
    {
        let mut assignments = BTreeMap::new();
        let mut seen = BTreeSet::new();
        let mut counts = PartitionCounts::default();
        let mut train_max: Option<Timestamp> = None;
        let mut val_min: Option<Timestamp> = None;
        let mut in_both = 0;

        for subject in subjects {
            if !seen.insert(subject.subject_id.as_str()) {
                return Err(SplitError::DuplicateSubject {
                    subject_id: subject.subject_id.clone(),
                });
            }
            let cutoff = subject.cutoff_ts;
            let train = self.is_train(cutoff);
            let validation = self.is_validation(cutoff);
            if train {
                train_max = Some(train_max.map_or(cutoff, |m| m.max(cutoff)));
            }
            if validation {
                val_min = Some(val_min.map_or(cutoff, |m| m.min(cutoff)));
            }
            let partition = match (train, validation) {
                (true, true) => {
                    in_both += 1;
                    Partition::Excluded
                }
                (true, false) => {
                    counts.train += 1;
                    Partition::Train
                }
                (false, true) => {
                    counts.validation += 1;
                    Partition::Validation
                }
                (false, false) => {
                    counts.excluded += 1;
                    Partition::Excluded
                }
            };
            assignments.insert(subject.subject_id.clone(), partition);
        }

        if let (Some(train_max), Some(val_min)) = (train_max, val_min) {
            if in_both > 0 || train_max >= val_min {
                warn!(%train_max, %val_min, in_both, "split overlap");
                return Err(SplitError::SplitOverlap {
                    train_max,
                    val_min,
                    in_both,
                });
            }
        }

        Ok(SplitAssignment {
            boundary,
            purge_days,
            train_max_cutoff: train_max,
            val_min_cutoff: val_min,
            counts,
            assignments,
        })
    }
}

/// Splits `subjects` around `boundary` with a symmetric `purge_days` gap.
///
/// Checks run in order: duplicate subjects, the train/validation ordering
/// invariant, then the sign of `purge_days`. A negative purge therefore
/// reports the overlap it causes when subjects straddle the boundary, and
/// [`SplitError::NegativePurge`] otherwise.
pub fn split<'a, I>(
    subjects: I,
    boundary: Timestamp,
    purge_days: i64,
) -> Result<SplitAssignment, SplitError>
where
    I: IntoIterator<Item = &'a Subject>,
{
    let rule = PurgedRule::around(boundary, purge_days)?;
    let assignment = rule.assign(subjects, boundary, purge_days)?;
    if purge_days < 0 {
        return Err(SplitError::NegativePurge { purge_days });
    }
    info!(
        %boundary,
        purge_days,
        train = assignment.counts.train,
        validation = assignment.counts.validation,
        excluded = assignment.counts.excluded,
        "split subjects"
    );
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn subject(id: &str, cutoff: &str) -> Subject {
        Subject {
            subject_id: id.to_owned(),
            label: false,
            cutoff_ts: ts(cutoff),
        }
    }

    fn reference_subjects() -> Vec<Subject> {
        vec![
            subject("jan15", "2017-01-15"),
            subject("feb05", "2017-02-05"),
            subject("feb20", "2017-02-20"),
        ]
    }

    #[test]
    fn test_reference_dates_with_thirty_day_purge() {
        // b ± 30d = [2017-01-02, 2017-03-03): all three dates fall in the gap
        let split = split(&reference_subjects(), ts("2017-02-01"), 30).unwrap();
        assert_eq!(split.partition("jan15"), Some(Partition::Excluded));
        assert_eq!(split.partition("feb05"), Some(Partition::Excluded));
        assert_eq!(split.partition("feb20"), Some(Partition::Excluded));
        assert_eq!(split.counts.excluded, 3);

        let wider = [
            subject("dec31", "2016-12-31"),
            subject("jan02", "2017-01-02"),
            subject("mar02", "2017-03-02"),
            subject("mar03", "2017-03-03"),
        ];
        let split = super::split(&wider, ts("2017-02-01"), 30).unwrap();
        assert_eq!(split.partition("dec31"), Some(Partition::Train));
        assert_eq!(split.partition("jan02"), Some(Partition::Excluded));
        assert_eq!(split.partition("mar02"), Some(Partition::Excluded));
        assert_eq!(split.partition("mar03"), Some(Partition::Validation));
    }

    #[test]
    fn test_reference_dates_with_ten_day_purge() {
        let split = split(&reference_subjects(), ts("2017-02-01"), 10).unwrap();
        assert_eq!(split.partition("jan15"), Some(Partition::Train));
        assert_eq!(split.partition("feb05"), Some(Partition::Excluded));
        assert_eq!(split.partition("feb20"), Some(Partition::Validation));
        assert_eq!(split.train_max_cutoff, Some(ts("2017-01-15")));
        assert_eq!(split.val_min_cutoff, Some(ts("2017-02-20")));
        assert_eq!(split.ids(Partition::Train).collect::<Vec<_>>(), ["jan15"]);
    }

    #[test]
    fn test_negative_purge_with_straddlers_overlaps() {
        let subjects = [
            subject("a", "2017-01-20"),
            subject("b", "2017-02-01"),
            subject("c", "2017-02-10"),
        ];
        match split(&subjects, ts("2017-02-01"), -1) {
            Err(SplitError::SplitOverlap {
                train_max,
                val_min,
                in_both,
            }) => {
                assert_eq!(train_max, ts("2017-02-01"));
                assert_eq!(val_min, ts("2017-02-01"));
                assert_eq!(in_both, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_negative_purge_without_straddlers() {
        let subjects = [subject("a", "2016-01-01"), subject("c", "2018-01-01")];
        assert_eq!(
            split(&subjects, ts("2017-02-01"), -1),
            Err(SplitError::NegativePurge { purge_days: -1 })
        );
    }

    #[test]
    fn test_duplicates_and_range() {
        let subjects = [subject("a", "2016-01-01"), subject("a", "2018-01-01")];
        assert!(matches!(
            split(&subjects, ts("2017-02-01"), 0),
            Err(SplitError::DuplicateSubject { .. })
        ));
        let none: [Subject; 0] = [];
        assert!(matches!(
            split(&none, ts("2017-02-01"), i64::MAX),
            Err(SplitError::PurgeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_purge_boundary_goes_to_validation() {
        let subjects = [subject("at", "2017-02-01"), subject("before", "2017-01-31")];
        let split = split(&subjects, ts("2017-02-01"), 0).unwrap();
        assert_eq!(split.partition("at"), Some(Partition::Validation));
        assert_eq!(split.partition("before"), Some(Partition::Train));
    }

    #[test]
    fn test_serialized_shape() {
        let split = split(&reference_subjects(), ts("2017-02-01"), 10).unwrap();
        let json = serde_json::to_value(&split).unwrap();
        assert_eq!(json["assignments"]["jan15"], "train");
        assert_eq!(json["assignments"]["feb20"], "validation");
        assert_eq!(json["counts"]["excluded"], 1);
    }

    proptest! {
        #[test]
        fn partitions_are_ordered_and_purged(
            offsets in prop::collection::vec(-400i64..400, 0..80),
            purge in 0i64..60,
        ) {
            let boundary = ts("2017-02-01");
            let subjects = offsets
                .iter()
                .enumerate()
                .map(|(i, &d)| Subject {
                    subject_id: format!("s{i:03}"),
                    label: i % 2 == 0,
                    cutoff_ts: boundary.checked_add(TimeDelta::days(d)).unwrap(),
                })
                .collect::<Vec<_>>();
            let assignment = split(&subjects, boundary, purge).unwrap();
            let lower = boundary.checked_sub(TimeDelta::days(purge)).unwrap();
            let upper = boundary.checked_add(TimeDelta::days(purge)).unwrap();
            for s in &subjects {
                match assignment.partition(&s.subject_id).unwrap() {
                    Partition::Train => prop_assert!(s.cutoff_ts < lower),
                    Partition::Validation => prop_assert!(s.cutoff_ts >= upper),
                    Partition::Excluded => {
                        prop_assert!(s.cutoff_ts >= lower && s.cutoff_ts < upper);
                    }
                }
            }
            if let (Some(t), Some(v)) = (assignment.train_max_cutoff, assignment.val_min_cutoff) {
                prop_assert!(t < v);
            }
            let again = split(&subjects, boundary, purge).unwrap();
            prop_assert_eq!(assignment, again);
        }
    }
}
