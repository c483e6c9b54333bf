//! Churn labels derived from a transactions stream.
//!
//! A subject's reference expiry is the latest `membership_expire_date` that
//! falls before the cutoff. The subject is retained when a non-cancel
//! transaction dated on or after that expiry extends membership past it
//! within `window_days`, and churns otherwise. Transactions dated at or after
//! the cutoff are never read, so a label cannot depend on data the features
//! are forbidden to see.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{EventStream, Subject, Timestamp, timestamp::parse_compact_date};

/// Payload field holding the expiry as a `YYYYMMDD` number.
pub const EXPIRE_FIELD: &str = "membership_expire_date";
/// Payload field that is non-zero for a cancellation.
pub const CANCEL_FIELD: &str = "is_cancel";
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnRule {
    pub cutoff: Timestamp,
    /// Days after the expiry in which a renewal still counts.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChurnLabel {
    pub subject_id: String,
    pub is_churn: bool,
    pub last_expire: NaiveDate,
    pub next_transaction: Option<NaiveDate>,
    pub days_to_next: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelReport {
    pub rule: ChurnRule,
    /// One label per subject, in subject-id order.
    pub labels: Vec<ChurnLabel>,
    /// Subjects with transactions before the cutoff but no expiry before it.
    pub unlabeled: usize,
    /// Transactions before the cutoff whose expiry is missing or malformed.
    pub skipped_events: usize,
}

#[derive(Debug, Clone, Copy)]
struct Visible {
    date: NaiveDate,
    expire: NaiveDate,
    cancel: bool,
}

/// Reads a `YYYYMMDD` number such as `20170215.0`.
#[must_use]
pub fn decode_compact_date(value: f64) -> Option<NaiveDate> {
    if !(0.0..1e8).contains(&value) || value.fract() != 0.0 {
        return None;
    }
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = value as u32;
    parse_compact_date(&format!("{n:08}"))
}

/// Writes `date` as a `YYYYMMDD` number; `None` outside years 0..=9999.
#[must_use]
pub fn encode_compact_date(date: NaiveDate) -> Option<f64> {
    let year = u32::try_from(date.year()).ok().filter(|&y| y <= 9999)?;
    Some(f64::from(year * 10_000 + date.month() * 100 + date.day()))
}

impl ChurnRule {
    #[must_use]
    pub fn new(cutoff: Timestamp) -> Self {
        Self {
            cutoff,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Labels every subject that has an expiry before the cutoff.
    #[must_use]
    pub fn label(&self, transactions: &EventStream) -> LabelReport {
        let mut by_subject = BTreeMap::<&str, Vec<Visible>>::new();
        let mut skipped_events = 0;
        for (_, event) in transactions.iter() {
            if event.event_ts >= self.cutoff {
                continue;
            }
            let visible = by_subject.entry(event.subject_id.as_str()).or_default();
            let Some(expire) = event.field(EXPIRE_FIELD).and_then(decode_compact_date) else {
                skipped_events += 1;
                continue;
            };
            visible.push(Visible {
                date: event.event_ts.date(),
                expire,
                cancel: event.field(CANCEL_FIELD).is_some_and(|v| v.abs() > 0.0),
            });
        }

        let mut labels = Vec::with_capacity(by_subject.len());
        let mut unlabeled = 0;
        for (subject_id, visible) in by_subject {
            match self.label_subject(subject_id, &visible) {
                Some(label) => labels.push(label),
                None => unlabeled += 1,
            }
        }
        if skipped_events > 0 {
            warn!(
                stream = transactions.name(),
                skipped_events, "transactions without a usable expiry date"
            );
        }
        info!(
            cutoff = %self.cutoff,
            window_days = self.window_days,
            labeled = labels.len(),
            churned = labels.iter().filter(|l| l.is_churn).count(),
            unlabeled,
            "built churn labels"
        );
        LabelReport {
            rule: *self,
            labels,
            unlabeled,
            skipped_events,
        }
    }

    fn label_subject(&self, subject_id: &str, visible: &[Visible]) -> Option<ChurnLabel> {
        let last_expire = visible
            .iter()
            .map(|t| t.expire)
            .filter(|&d| Timestamp::from_date(d) < self.cutoff)
            .max()?;
        let next_transaction = visible
            .iter()
            .filter(|t| !t.cancel && t.date >= last_expire && t.expire > last_expire)
            .map(|t| t.date)
            .min();
        let days_to_next = next_transaction.map(|d| d.signed_duration_since(last_expire).num_days());
        Some(ChurnLabel {
            subject_id: subject_id.to_owned(),
            is_churn: days_to_next.is_none_or(|d| d > i64::from(self.window_days)),
            last_expire,
            next_transaction,
            days_to_next,
        })
    }
}

impl LabelReport {
    /// Labeled subjects, all sharing the rule's cutoff.
    #[must_use]
    pub fn subjects(&self) -> Vec<Subject> {
        self.labels
            .iter()
            .map(|l| Subject {
                subject_id: l.subject_id.clone(),
                label: l.is_churn,
                cutoff_ts: self.rule.cutoff,
            })
            .collect()
    }
}
