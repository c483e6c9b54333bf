//! Seeded synthetic subscription data.
//!
//! Produces subjects with spread-out cutoffs and three streams shaped like a
//! music subscription service: `members` (one registration event each),
//! `transactions` (renewals and cancellations) and `user_logs` (daily
//! listening). Every stream deliberately contains events dated on and after
//! each subject's cutoff, so a dataset built from it only stays leak-free if
//! the extractor filters correctly.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use asof_data::{
    DataError, EventStore, EventStream, RawEvent, Subject, Timestamp,
    labels::{EXPIRE_FIELD, encode_compact_date},
};
use chrono::{NaiveDate, TimeDelta};
use rand::{Rng, SeedableRng as _, seq::IndexedRandom as _};
use rand_distr::Poisson;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::io::{self, IoError};

pub const MEMBERS: &str = "members";
pub const TRANSACTIONS: &str = "transactions";
pub const USER_LOGS: &str = "user_logs";

const PLANS: [(u32, f64); 4] = [(30, 149.0), (90, 399.0), (180, 799.0), (365, 1590.0)];
const DISCOUNTS: [f64; 6] = [1.0, 0.9, 0.8, 0.7, 1.0, 1.0];

const DEFAULT_FIRST_CUTOFF: NaiveDate = match NaiveDate::from_ymd_opt(2017, 1, 1) {
    Some(date) => date,
    None => panic!("invalid default cutoff"),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub subjects: usize,
    pub seed: u64,
    pub churn_rate: f64,
    pub first_cutoff: Timestamp,
    /// Cutoffs are drawn uniformly from `first_cutoff + [0, cutoff_span_days)`.
    pub cutoff_span_days: u32,
    /// Mean number of transactions per subject.
    pub transactions_mean: f64,
    /// Mean number of listening days per retained subject.
    pub logs_mean: f64,
    /// Probability that an event is placed on or after the cutoff.
    pub future_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            subjects: 1000,
            seed: 0,
            churn_rate: 0.1,
            first_cutoff: Timestamp::from_date(DEFAULT_FIRST_CUTOFF),
            cutoff_span_days: 120,
            transactions_mean: 4.0,
            logs_mean: 30.0,
            future_rate: 0.1,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SyntheticError {
    #[display("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[display("generated date out of range")]
    DateOutOfRange,
    #[display("failed to assemble the event store")]
    Data { source: DataError },
}

#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub subjects: Vec<Subject>,
    pub store: EventStore,
}

fn check_probability(name: &'static str, value: f64) -> Result<(), SyntheticError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SyntheticError::InvalidParameter { name, value })
    }
}

fn poisson(name: &'static str, mean: f64) -> Result<Poisson<f64>, SyntheticError> {
    Poisson::new(mean).map_err(|_| SyntheticError::InvalidParameter { name, value: mean })
}

fn shift(ts: Timestamp, days: i64) -> Result<Timestamp, SyntheticError> {
    let delta = TimeDelta::try_days(days).ok_or(SyntheticError::DateOutOfRange)?;
    ts.checked_add(delta).ok_or(SyntheticError::DateOutOfRange)
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_count<R>(rng: &mut R, dist: &Poisson<f64>) -> usize
where
    R: Rng + ?Sized,
{
    let count: f64 = rng.sample(dist);
    count as usize
}

/// Day offset of an event relative to the cutoff: negative before it,
/// zero or positive on or after it.
fn event_offset<R>(rng: &mut R, future_rate: f64, history_days: i64) -> i64
where
    R: Rng + ?Sized,
{
    if rng.random_bool(future_rate) {
        rng.random_range(0..=30)
    } else {
        -rng.random_range(1..=history_days)
    }
}

fn event(
    subject_id: &str,
    event_ts: Timestamp,
    event_type: &str,
    payload: &[(&str, f64)],
) -> RawEvent {
    RawEvent {
        subject_id: subject_id.to_owned(),
        event_ts,
        event_type: event_type.to_owned(),
        payload: payload.iter().map(|&(k, v)| (k.to_owned(), v)).collect(),
    }
}

pub fn generate(config: &SyntheticConfig) -> Result<SyntheticDataset, SyntheticError> {
    check_probability("churn_rate", config.churn_rate)?;
    check_probability("future_rate", config.future_rate)?;
    let transactions = poisson("transactions_mean", config.transactions_mean)?;
    let retained_logs = poisson("logs_mean", config.logs_mean)?;
    let churned_logs = poisson("logs_mean", config.logs_mean * 0.4)?;

    let mut rng = Pcg32::seed_from_u64(config.seed);
    let mut subjects = Vec::with_capacity(config.subjects);
    let mut members = vec![];
    let mut tx_events = vec![];
    let mut log_events = vec![];

    for i in 0..config.subjects {
        let subject_id = format!("m{i:05}");
        let churned = rng.random_bool(config.churn_rate);
        let cutoff = shift(
            config.first_cutoff,
            rng.random_range(0..i64::from(config.cutoff_span_days.max(1))),
        )?;

        let registered = shift(cutoff, -rng.random_range(100..=3000))?;
        members.push(event(
            &subject_id,
            registered,
            "registration",
            &[
                ("bd", f64::from(rng.random_range(15..=70_u32))),
                ("city", f64::from(rng.random_range(1..=22_u32))),
                ("registered_via", f64::from(rng.random_range(1..=13_u32))),
            ],
        ));

        for _ in 0..=draw_count(&mut rng, &transactions) {
            let offset = event_offset(&mut rng, config.future_rate, 400);
            let &(plan_days, list_price) = PLANS.choose(&mut rng).unwrap_or(&PLANS[0]);
            let discount = DISCOUNTS.choose(&mut rng).copied().unwrap_or(1.0);
            let cancel_rate = if churned { 0.5 } else { 0.1 };
            let auto_renew_rate = if churned { 0.3 } else { 0.8 };
            let paid_at = shift(cutoff, offset)?;
            let expires = shift(paid_at, i64::from(plan_days))?;
            let expires =
                encode_compact_date(expires.date()).ok_or(SyntheticError::DateOutOfRange)?;
            tx_events.push(event(
                &subject_id,
                paid_at,
                "transaction",
                &[
                    ("payment_plan_days", f64::from(plan_days)),
                    (EXPIRE_FIELD, expires),
                    ("plan_list_price", list_price),
                    ("actual_amount_paid", (list_price * discount).floor()),
                    ("is_auto_renew", f64::from(u8::from(rng.random_bool(auto_renew_rate)))),
                    ("is_cancel", f64::from(u8::from(rng.random_bool(cancel_rate)))),
                ],
            ));
        }

        let logs = if churned { &churned_logs } else { &retained_logs };
        // churners go quiet well before their cutoff
        let history = if churned { 120 } else { 60 };
        let mut days = (0..draw_count(&mut rng, logs))
            .map(|_| event_offset(&mut rng, config.future_rate, history))
            .collect::<Vec<_>>();
        if i % 10 == 0 {
            // on the cutoff itself
            days.push(0);
        }
        for offset in days {
            let num_25: u32 = rng.random_range(0..=50);
            let num_100 = rng.random_range(0..=num_25);
            let num_unq = rng.random_range(num_100..=num_25 + 20);
            let total_secs = rng.random_range(num_25 * 30..=num_25 * 300 + 30);
            log_events.push(event(
                &subject_id,
                shift(cutoff, offset)?,
                "listen",
                &[
                    ("num_25", f64::from(num_25)),
                    ("num_100", f64::from(num_100)),
                    ("num_unq", f64::from(num_unq)),
                    ("total_secs", f64::from(total_secs)),
                ],
            ));
        }

        subjects.push(Subject {
            subject_id,
            label: churned,
            cutoff_ts: cutoff,
        });
    }

    let mut store = EventStore::new();
    for stream in [
        EventStream::from_events(MEMBERS, members),
        EventStream::from_events(TRANSACTIONS, tx_events),
        EventStream::from_events(USER_LOGS, log_events),
    ] {
        store
            .insert(stream)
            .map_err(|source| SyntheticError::Data { source })?;
    }

    info!(
        subjects = subjects.len(),
        churned = subjects.iter().filter(|s| s.label).count(),
        events = store.total_events(),
        seed = config.seed,
        "generated synthetic dataset"
    );
    Ok(SyntheticDataset { subjects, store })
}

impl SyntheticDataset {
    /// Writes `subjects.json` and one `<stream>.jsonl` per stream into `dir`,
    /// returning the stream paths.
    pub fn write_to(&self, dir: &Path) -> Result<BTreeMap<String, PathBuf>, IoError> {
        fs::create_dir_all(dir).map_err(|source| IoError::Write {
            path: dir.to_owned(),
            source,
        })?;
        io::write_json_new(&dir.join("subjects.json"), &self.subjects)?;
        let mut paths = BTreeMap::new();
        for stream in self.store.streams() {
            let path = dir.join(format!("{}.jsonl", stream.name()));
            io::write_jsonl(&path, stream.iter().map(|(_, event)| event))?;
            paths.insert(stream.name().to_owned(), path);
        }
        Ok(paths)
    }
}
