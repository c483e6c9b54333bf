//! Post-hoc leakage and split verification.
//!
//! The auditor trusts nothing the extractor computed. For every event a
//! feature row claims to have used it goes back to the raw store, and it
//! judges each event by the signed distance `cutoff − event_ts`: a distance
//! of zero or less is a leak. It also re-derives the train/validation
//! cutoff extremes from the feature rows rather than reading the splitter's.
//!
//! Findings are reported, never corrected.

use std::collections::BTreeSet;

use asof_data::{EventStore, FeatureTable, Timestamp};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::split::{Partition, SplitAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakKind {
    /// The event is dated at or after the row's cutoff.
    AtOrAfterCutoff,
    /// The event belongs to another subject.
    ForeignSubject,
    /// The referenced event does not exist in the raw store.
    MissingEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffendingEvent {
    pub subject_id: String,
    pub event_ts: Timestamp,
    pub cutoff_ts: Timestamp,
    pub stream: String,
    pub seq: usize,
    pub kind: LeakKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub leak_count: usize,
    pub offending_subjects: Vec<OffendingEvent>,
    pub split_overlap: bool,
    pub train_max_cutoff: Option<Timestamp>,
    pub val_min_cutoff: Option<Timestamp>,
    pub rows_checked: usize,
    pub events_checked: usize,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leak_count == 0 && !self.split_overlap
    }

    /// Distinct subjects with at least one offending event.
    #[must_use]
    pub fn offending_subject_ids(&self) -> BTreeSet<&str> {
        self.offending_subjects
            .iter()
            .map(|o| o.subject_id.as_str())
            .collect()
    }

    /// Gate for the pipeline: a dirty report becomes a [`LeakageError`].
    pub fn into_result(self) -> Result<Self, LeakageError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(LeakageError { report: self })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display(
    "leakage audit failed: {} leaked events across {} subjects, split overlap: {}",
    report.leak_count,
    report.offending_subject_ids().len(),
    report.split_overlap
)]
pub struct LeakageError {
    pub report: AuditReport,
}

/// Checks every lineage entry of every row against the raw store.
pub fn audit_leakage(table: &FeatureTable, store: &EventStore) -> AuditReport {
    let mut report = AuditReport {
        rows_checked: table.rows.len(),
        ..AuditReport::default()
    };

    for row in &table.rows {
        for r in &row.lineage {
            report.events_checked += 1;
            let offence = |event_ts, kind| OffendingEvent {
                subject_id: row.subject_id.clone(),
                event_ts,
                cutoff_ts: row.cutoff_ts,
                stream: r.stream.clone(),
                seq: r.seq,
                kind,
            };
            let Some(raw) = store.event(&r.stream, r.seq) else {
                report
                    .offending_subjects
                    .push(offence(r.event_ts, LeakKind::MissingEvent));
                continue;
            };
            if raw.subject_id != row.subject_id {
                report
                    .offending_subjects
                    .push(offence(raw.event_ts, LeakKind::ForeignSubject));
                continue;
            }
            // judge both the stored timestamp and the one the row recorded
            let lead = row
                .cutoff_ts
                .since(raw.event_ts)
                .min(row.cutoff_ts.since(r.event_ts));
            if lead <= TimeDelta::zero() {
                let event_ts = raw.event_ts.max(r.event_ts);
                report
                    .offending_subjects
                    .push(offence(event_ts, LeakKind::AtOrAfterCutoff));
            }
        }
    }
    report.leak_count = report.offending_subjects.len();

    if report.leak_count > 0 {
        warn!(
            leak_count = report.leak_count,
            subjects = report.offending_subject_ids().len(),
            "leakage detected"
        );
    } else {
        info!(
            rows = report.rows_checked,
            events = report.events_checked,
            "no leakage"
        );
    }
    report
}

/// Re-derives the split invariant from the rows' own cutoffs.
///
/// Flags an overlap when the latest train cutoff is not strictly before the
/// earliest validation cutoff, or when any assigned subject sits on the wrong
/// side of `boundary ± purge_days`.
pub fn audit_split(report: &mut AuditReport, table: &FeatureTable, assignment: &SplitAssignment) {
    let purge = TimeDelta::try_days(assignment.purge_days);
    let lower = purge.and_then(|p| assignment.boundary.checked_sub(p));
    let upper = purge.and_then(|p| assignment.boundary.checked_add(p));

    let mut train_max: Option<Timestamp> = None;
    let mut val_min: Option<Timestamp> = None;
    let mut misplaced = 0_usize;

    for row in &table.rows {
        let cutoff = row.cutoff_ts;
        match assignment.partition(&row.subject_id) {
            Some(Partition::Train) => {
                train_max = train_max.max(Some(cutoff));
                if lower.is_none_or(|lower| cutoff.since(lower) >= TimeDelta::zero()) {
                    misplaced += 1;
                }
            }
            Some(Partition::Validation) => {
                val_min = Some(val_min.map_or(cutoff, |v| v.min(cutoff)));
                if upper.is_none_or(|upper| cutoff.since(upper) < TimeDelta::zero()) {
                    misplaced += 1;
                }
            }
            Some(Partition::Excluded) | None => {}
        }
    }

    let ordered = match (train_max, val_min) {
        (Some(t), Some(v)) => v.since(t) > TimeDelta::zero(),
        _ => true,
    };
    report.train_max_cutoff = train_max;
    report.val_min_cutoff = val_min;
    report.split_overlap = !ordered || misplaced > 0;

    if report.split_overlap {
        warn!(?train_max, ?val_min, misplaced, "split overlap detected");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use asof_data::{EventRef, EventStream, FeatureRow, RawEvent};

    use super::*;
    use crate::split::{PartitionCounts, split};

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn store() -> EventStore {
        let ev = |subject: &str, at: &str| RawEvent {
            subject_id: subject.to_owned(),
            event_ts: ts(at),
            event_type: "log".to_owned(),
            payload: BTreeMap::new(),
        };
        let mut store = EventStore::new();
        store
            .insert(EventStream::from_events(
                "logs",
                [
                    ev("u1", "2017-02-20"),
                    ev("u1", "2017-03-01"),
                    ev("u2", "2017-02-21"),
                ],
            ))
            .unwrap();
        store
    }

    fn row(subject: &str, cutoff: &str, lineage: &[(usize, &str)]) -> FeatureRow {
        FeatureRow {
            subject_id: subject.to_owned(),
            label: false,
            cutoff_ts: ts(cutoff),
            values: vec![],
            lineage: lineage
                .iter()
                .map(|&(seq, at)| EventRef {
                    stream: "logs".to_owned(),
                    seq,
                    event_ts: ts(at),
                })
                .collect(),
        }
    }

    fn table(rows: Vec<FeatureRow>) -> FeatureTable {
        FeatureTable {
            columns: vec![],
            rows,
        }
    }

    #[test]
    fn test_clean_table_passes() {
        let table = table(vec![
            row("u1", "2017-03-01", &[(0, "2017-02-20")]),
            row("u2", "2017-03-01", &[(2, "2017-02-21")]),
        ]);
        let report = audit_leakage(&table, &store());
        assert_eq!(report.leak_count, 0);
        assert_eq!(report.events_checked, 2);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_event_at_cutoff_is_a_leak() {
        let table = table(vec![row(
            "u1",
            "2017-03-01",
            &[(0, "2017-02-20"), (1, "2017-03-01")],
        )]);
        let report = audit_leakage(&table, &store());
        assert_eq!(report.leak_count, 1);
        let offence = &report.offending_subjects[0];
        assert_eq!(offence.subject_id, "u1");
        assert_eq!(offence.event_ts, ts("2017-03-01"));
        assert_eq!(offence.cutoff_ts, ts("2017-03-01"));
        assert_eq!(offence.kind, LeakKind::AtOrAfterCutoff);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.report.leak_count, 1);
        assert!(err.to_string().contains("1 leaked events across 1 subjects"));
    }

    #[test]
    fn test_tampered_lineage_timestamp_is_caught() {
        // the raw event is at 2017-03-01 but the row claims it was earlier
        let table = table(vec![row("u1", "2017-03-01", &[(1, "2017-02-01")])]);
        let report = audit_leakage(&table, &store());
        assert_eq!(report.leak_count, 1);
        assert_eq!(report.offending_subjects[0].event_ts, ts("2017-03-01"));
    }

    #[test]
    fn test_foreign_and_missing_events() {
        let table = table(vec![row(
            "u1",
            "2017-03-01",
            &[(2, "2017-02-21"), (99, "2017-02-01")],
        )]);
        let report = audit_leakage(&table, &store());
        let kinds = report
            .offending_subjects
            .iter()
            .map(|o| o.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, [LeakKind::ForeignSubject, LeakKind::MissingEvent]);
        assert_eq!(report.offending_subject_ids().len(), 1);
    }

    #[test]
    fn test_audit_split_accepts_valid_split() {
        let table = table(vec![
            row("a", "2017-01-01", &[]),
            row("b", "2017-02-01", &[]),
            row("c", "2017-03-01", &[]),
        ]);
        let subjects = table
            .rows
            .iter()
            .map(|r| asof_data::Subject {
                subject_id: r.subject_id.clone(),
                label: r.label,
                cutoff_ts: r.cutoff_ts,
            })
            .collect::<Vec<_>>();
        let assignment = split(&subjects, ts("2017-02-01"), 10).unwrap();
        let mut report = AuditReport::default();
        audit_split(&mut report, &table, &assignment);
        assert!(!report.split_overlap);
        assert_eq!(report.train_max_cutoff, Some(ts("2017-01-01")));
        assert_eq!(report.val_min_cutoff, Some(ts("2017-03-01")));
    }

    #[test]
    fn test_audit_split_flags_tampered_assignment() {
        let table = table(vec![
            row("a", "2017-01-01", &[]),
            row("b", "2017-02-01", &[]),
        ]);
        let assignment = SplitAssignment {
            boundary: ts("2017-02-01"),
            purge_days: 0,
            train_max_cutoff: None,
            val_min_cutoff: None,
            counts: PartitionCounts::default(),
            assignments: BTreeMap::from([
                ("a".to_owned(), Partition::Validation),
                ("b".to_owned(), Partition::Train),
            ]),
        };
        let mut report = AuditReport::default();
        audit_split(&mut report, &table, &assignment);
        assert!(report.split_overlap);
        assert!(report.into_result().is_err());
    }
}
