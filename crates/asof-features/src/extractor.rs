//! Leak-free feature extraction.
//!
//! One parameterized routine drives every feature: the feature's window is
//! resolved against each subject's cutoff into `[start, cutoff)`, the
//! subject's events in the feature's source stream are restricted to that
//! interval, and the feature's aggregation runs over what remains.
//!
//! # Stages
//!
//! 1. **Plan**: look up each feature's stream and resolve its window for every
//!    subject. Any failure here aborts the whole extraction before a single
//!    value is computed.
//! 2. **Compute**: subjects are split into contiguous chunks, one per worker;
//!    each worker reads the shared store and plan and writes only its own
//!    output slots.
//! 3. **Fill**: empty windows take the feature's null policy (median across the
//!    subjects that did have data, zero, or the constant), zero-denominator
//!    ratios take `ratio_default`, and every value is cast to the feature's dtype.
//!
//! Rows come out in subject-id order regardless of worker count, so the same
//! inputs always produce the same table.

use std::{num::NonZeroUsize, thread};

use asof_data::{
    EventRef, EventStore, EventStream, FeatureRow, FeatureTable, LabelIndex, RawEvent, Subject,
    Timestamp,
};
use asof_stats::percentiles;
use tracing::{debug, info};

use crate::{
    aggregation::Outcome,
    registry::{FeatureSpec, NullPolicy, Registry},
    window::{ResolvedWindow, Window, WindowError},
};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ExtractError {
    #[display(
        "feature {feature}: window {window:?} cannot be resolved for subject {subject_id} (cutoff {cutoff_ts}): {reason}"
    )]
    UnresolvedWindow {
        feature: String,
        window: String,
        subject_id: String,
        cutoff_ts: Timestamp,
        reason: WindowError,
    },
    #[display("feature {feature}: source stream {source_name:?} is not loaded")]
    UnknownSource {
        feature: String,
        source_name: String,
    },
    #[display("feature {feature}: field {field:?} never appears in stream {source_name:?}")]
    MissingField {
        feature: String,
        source_name: String,
        field: String,
    },
}

/// Number of worker threads used when none is configured.
#[must_use]
pub fn default_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Extracts one row per subject using [`default_workers`] threads.
pub fn extract(
    subjects: &LabelIndex,
    store: &EventStore,
    registry: &Registry,
) -> Result<FeatureTable, ExtractError> {
    extract_with_workers(subjects, store, registry, default_workers())
}

/// Per-feature plan: the stream to read and the resolved window of every subject.
struct FeaturePlan<'a> {
    spec: &'a FeatureSpec,
    stream: &'a EventStream,
    windows: Vec<ResolvedWindow>,
}

/// Raw outcomes of one subject, before null filling.
#[derive(Debug, Clone, Default)]
struct SubjectCells {
    outcomes: Vec<Outcome>,
    lineage: Vec<EventRef>,
}

pub fn extract_with_workers(
    subjects: &LabelIndex,
    store: &EventStore,
    registry: &Registry,
    workers: NonZeroUsize,
) -> Result<FeatureTable, ExtractError> {
    let subjects = subjects.iter().collect::<Vec<_>>();
    info!(
        subjects = subjects.len(),
        features = registry.features().len(),
        workers = workers.get(),
        "extracting features"
    );

    let plans = plan(&subjects, store, registry)?;
    let cells = compute(&subjects, &plans, workers);
    let table = fill(&subjects, &plans, cells);

    info!(
        rows = table.rows.len(),
        lineage_events = table.lineage_len(),
        "extracted features"
    );
    Ok(table)
}

fn plan<'a>(
    subjects: &[&Subject],
    store: &'a EventStore,
    registry: &'a Registry,
) -> Result<Vec<FeaturePlan<'a>>, ExtractError> {
    registry
        .features()
        .iter()
        .map(|spec| {
            let stream = store
                .stream(&spec.source)
                .ok_or_else(|| ExtractError::UnknownSource {
                    feature: spec.name.clone(),
                    source_name: spec.source.clone(),
                })?;

            if !stream.is_empty() {
                let fields = stream.fields();
                if let Some(field) = spec
                    .aggregation
                    .fields()
                    .into_iter()
                    .find(|f| !fields.contains(f))
                {
                    return Err(ExtractError::MissingField {
                        feature: spec.name.clone(),
                        source_name: spec.source.clone(),
                        field: field.to_owned(),
                    });
                }
            }

            let window = spec.window.parse::<Window>();
            let windows = subjects
                .iter()
                .map(|subject| {
                    window
                        .clone()
                        .and_then(|w| w.resolve(subject.cutoff_ts))
                        .map_err(|reason| ExtractError::UnresolvedWindow {
                            feature: spec.name.clone(),
                            window: spec.window.clone(),
                            subject_id: subject.subject_id.clone(),
                            cutoff_ts: subject.cutoff_ts,
                            reason,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(FeaturePlan {
                spec,
                stream,
                windows,
            })
        })
        .collect()
}

fn compute(
    subjects: &[&Subject],
    plans: &[FeaturePlan<'_>],
    workers: NonZeroUsize,
) -> Vec<SubjectCells> {
    let mut cells = vec![SubjectCells::default(); subjects.len()];
    if subjects.is_empty() {
        return cells;
    }
    let chunk_size = subjects.len().div_ceil(workers.get());

    thread::scope(|s| {
        for (chunk_index, (out, chunk)) in cells
            .chunks_mut(chunk_size)
            .zip(subjects.chunks(chunk_size))
            .enumerate()
        {
            let offset = chunk_index * chunk_size;
            s.spawn(move || {
                for (i, (slot, subject)) in out.iter_mut().zip(chunk).enumerate() {
                    *slot = compute_subject(subject, offset + i, plans);
                }
            });
        }
    });

    cells
}

fn compute_subject(subject: &Subject, index: usize, plans: &[FeaturePlan<'_>]) -> SubjectCells {
    let mut outcomes = Vec::with_capacity(plans.len());
    let mut lineage = Vec::new();
    let mut in_window: Vec<&RawEvent> = Vec::new();

    for plan in plans {
        let window = plan.windows[index];
        in_window.clear();
        for (seq, event) in plan.stream.subject_events(&subject.subject_id) {
            if window.contains(event.event_ts) {
                in_window.push(event);
                lineage.push(EventRef {
                    stream: plan.stream.name().to_owned(),
                    seq,
                    event_ts: event.event_ts,
                });
            }
        }
        outcomes.push(plan.spec.aggregation.apply(&in_window, subject.cutoff_ts));
    }

    lineage.sort();
    lineage.dedup();
    SubjectCells { outcomes, lineage }
}

fn fill(
    subjects: &[&Subject],
    plans: &[FeaturePlan<'_>],
    cells: Vec<SubjectCells>,
) -> FeatureTable {
    let fills = plans
        .iter()
        .enumerate()
        .map(|(col, plan)| {
            let spec = plan.spec;
            let fill = match spec.null_policy {
                NullPolicy::FillZero => 0.0,
                NullPolicy::FillConstant => spec.fill_value,
                NullPolicy::FillMedian => {
                    let observed = cells
                        .iter()
                        .filter_map(|c| match c.outcomes[col] {
                            Outcome::Value(v) => Some(v),
                            Outcome::Empty | Outcome::ZeroDenominator => None,
                        })
                        .collect::<Vec<_>>();
                    percentiles::median(&observed).unwrap_or(spec.fill_value)
                }
            };
            let empty = cells
                .iter()
                .filter(|c| c.outcomes[col] == Outcome::Empty)
                .count();
            debug!(feature = %spec.name, fill, empty, "null fill");
            fill
        })
        .collect::<Vec<_>>();

    let rows = subjects
        .iter()
        .zip(cells)
        .map(|(subject, cell)| {
            let values = cell
                .outcomes
                .iter()
                .zip(plans)
                .zip(&fills)
                .map(|((outcome, plan), &fill)| {
                    let raw = match *outcome {
                        Outcome::Value(v) => v,
                        Outcome::Empty => fill,
                        Outcome::ZeroDenominator => plan.spec.ratio_default(),
                    };
                    plan.spec.dtype.cast(raw)
                })
                .collect();
            FeatureRow {
                subject_id: subject.subject_id.clone(),
                label: subject.label,
                cutoff_ts: subject.cutoff_ts,
                values,
                lineage: cell.lineage,
            }
        })
        .collect();

    FeatureTable {
        columns: plans.iter().map(|p| p.spec.name.clone()).collect(),
        rows,
    }
}
