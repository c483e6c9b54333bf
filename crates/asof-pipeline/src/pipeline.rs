//! Staged, fail-fast orchestration of one run.
//!
//! ```text
//! registry availability -> extract -> leakage gate -> split -> split gate
//!     -> folds -> sample -> model hand-off -> probability contract
//!     -> metrics, drift, digests -> run directory + run log
//! ```
//!
//! Every stage error is terminal and nothing is written for a failed run:
//! artifacts are staged in a hidden directory that is renamed to the run
//! directory only once the record is finalized, and removed on any failure.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use asof_data::{DataError, EventStore, FeatureRow, FeatureTable, LabelIndex, LoadReport};
use asof_eval::{
    AuditReport, FeatureDrift, Fold, LeakageError, Partition, ProbabilityRangeError, Sample,
    SplitAssignment, SplitError, audit_leakage, audit_split, drift_report, split,
    stratified_sample, validate_probabilities, walk_forward,
};
use asof_features::{
    ExtractError, Registry, RegistryError, extract_with_workers, extractor::default_workers,
    load_registry,
};
use asof_stats::calibration::{CalibrationReport, MetricError};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    config::{PipelineConfig, RunParams},
    digest::content_digest,
    io::{self, IoError},
    model::ProbabilityModel,
    run_record::{RunError, RunLog, RunRecord, start_run},
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum PipelineError {
    #[display("registry check failed")]
    Registry { source: RegistryError },
    #[display("feature extraction failed")]
    Extract { source: ExtractError },
    #[display("leakage gate failed")]
    Leakage { source: LeakageError },
    #[display("temporal split failed")]
    Split { source: SplitError },
    #[display("model output rejected")]
    Probability { source: ProbabilityRangeError },
    #[display("failed to score predictions")]
    Metric { source: MetricError },
    #[display("pipeline I/O failed")]
    Io { source: IoError },
    #[display("run record failed")]
    Run { source: RunError },
    #[display("feature table is malformed")]
    Data { source: DataError },
    #[display("failed to encode run artifacts")]
    Encode { source: serde_json::Error },
}

/// Everything a run reads, loaded up front.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub subjects: LabelIndex,
    pub store: EventStore,
    pub registry: Registry,
    pub load_reports: BTreeMap<String, LoadReport>,
}

impl PipelineInputs {
    pub fn load(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let registry = load_registry(&config.registry)?;
        let subjects = io::read_subjects(&config.subjects)?;
        let (store, load_reports) = io::load_event_store(&config.events)?;
        Ok(Self {
            subjects,
            store,
            registry,
            load_reports,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digests {
    pub features: String,
    pub split: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub assignment: SplitAssignment,
    pub audit: AuditReport,
    pub folds: Vec<Fold>,
    /// Train-side sample the model was fitted on, when sampling is configured.
    pub train_sample: Option<Sample>,
    pub model: String,
    /// `None` when the validation partition is empty.
    pub calibration: Option<CalibrationReport>,
    pub drift: Vec<FeatureDrift>,
    pub digests: Digests,
}

impl PipelineOutput {
    fn metrics(&self) -> Result<BTreeMap<String, serde_json::Value>, serde_json::Error> {
        let counts = self.assignment.counts;
        Ok(BTreeMap::from([
            ("rows".to_owned(), json!(self.table.rows.len())),
            ("leak_count".to_owned(), json!(self.audit.leak_count)),
            ("split_overlap".to_owned(), json!(self.audit.split_overlap)),
            ("train".to_owned(), json!(counts.train)),
            ("validation".to_owned(), json!(counts.validation)),
            ("excluded".to_owned(), json!(counts.excluded)),
            ("folds".to_owned(), json!(self.folds.len())),
            ("model".to_owned(), json!(self.model)),
            (
                "calibration".to_owned(),
                serde_json::to_value(&self.calibration)?,
            ),
            (
                "high_drift_features".to_owned(),
                json!(
                    self.drift
                        .iter()
                        .filter(|d| d.high_drift)
                        .map(|d| d.feature.as_str())
                        .collect::<Vec<_>>()
                ),
            ),
            ("features_digest".to_owned(), json!(self.digests.features)),
            ("split_digest".to_owned(), json!(self.digests.split)),
        ]))
    }
}

/// Rows of `ids` in id order; ids without a row are skipped.
fn rows_of<'a, I>(table: &'a FeatureTable, ids: I) -> Vec<&'a FeatureRow>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    ids.into_iter()
        .filter_map(|id| table.row(id.as_ref()))
        .collect()
}

/// Runs every in-memory stage on loaded inputs.
pub fn run_stages(
    inputs: &PipelineInputs,
    params: &RunParams,
    model: &dyn ProbabilityModel,
) -> Result<PipelineOutput, PipelineError> {
    let subjects = &inputs.subjects;
    let registry = inputs.registry.clone().with_observed_sources(&inputs.store);

    let as_of = params
        .as_of
        .or_else(|| subjects.cutoff_range().map(|(earliest, _)| earliest));
    if let Some(as_of) = as_of {
        registry.require_available(as_of)?;
        info!(%as_of, features = registry.features().len(), "registry sources available");
    }

    let workers = params.workers.unwrap_or_else(default_workers);
    let table = extract_with_workers(subjects, &inputs.store, &registry, workers)?;

    let mut audit = audit_leakage(&table, &inputs.store).into_result()?;

    let assignment = split(subjects, params.boundary, params.purge_days)?;
    audit_split(&mut audit, &table, &assignment);
    let audit = audit.into_result()?;

    let folds = match &params.folds {
        Some(folds) => walk_forward(subjects, &folds.boundaries, params.purge_days, folds.mode)?,
        None => vec![],
    };

    let train_sample = params.sampling.map(|config| {
        stratified_sample(subjects, &assignment, Partition::Train, config, params.seed)
    });
    let train = match &train_sample {
        Some(sample) => rows_of(&table, &sample.subject_ids),
        None => rows_of(&table, assignment.ids(Partition::Train)),
    };
    let validation = rows_of(&table, assignment.ids(Partition::Validation));

    let probabilities = model.fit_predict(&train, &validation);
    validate_probabilities(&probabilities)?;
    let calibration = if validation.is_empty() {
        None
    } else {
        let labels = validation.iter().map(|r| r.label).collect::<Vec<_>>();
        Some(CalibrationReport::compute(&labels, &probabilities)?)
    };
    info!(
        model = model.name(),
        train = train.len(),
        validation = validation.len(),
        brier = ?calibration.as_ref().map(|c| c.brier),
        "scored validation partition"
    );

    let drift = drift_report(&table, &assignment)?;
    let digests = Digests {
        features: content_digest(&table)?,
        split: content_digest(&assignment)?,
    };
    info!(features = %digests.features, split = %digests.split, "content digests");

    Ok(PipelineOutput {
        table,
        assignment,
        audit,
        folds,
        train_sample,
        model: model.name().to_owned(),
        calibration,
        drift,
        digests,
    })
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub record: RunRecord,
    pub run_dir: PathBuf,
    pub output: PipelineOutput,
}

fn write_artifacts(
    dir: &Path,
    inputs: &PipelineInputs,
    output: &PipelineOutput,
) -> Result<(), IoError> {
    io::write_json_new(&dir.join("features.json"), &output.table)?;
    io::write_json_new(&dir.join("split.json"), &output.assignment)?;
    io::write_json_new(&dir.join("audit.json"), &output.audit)?;
    io::write_json_new(&dir.join("drift.json"), &output.drift)?;
    if !output.folds.is_empty() {
        io::write_json_new(&dir.join("folds.json"), &output.folds)?;
    }
    if let Some(sample) = &output.train_sample {
        io::write_json_new(&dir.join("sample.json"), sample)?;
    }
    if !inputs.load_reports.is_empty() {
        io::write_json_new(&dir.join("load.json"), &inputs.load_reports)?;
    }
    Ok(())
}

fn discard(dir: &Path) {
    if let Err(error) = fs::remove_dir_all(dir) {
        warn!(%error, dir = %dir.display(), "failed to remove partial run directory");
    }
}

/// Loads inputs, runs every stage and persists a finalized run.
///
/// Artifacts go to a new `<output_dir>/<run_id>` directory; an existing
/// directory is never reused. The run log is read before anything is
/// written, so a corrupt log or a duplicate run id leaves no trace on disk.
pub fn execute(
    config: &PipelineConfig,
    model: &dyn ProbabilityModel,
) -> Result<RunSummary, PipelineError> {
    let params = &config.params;
    let mut record = start_run(params.seed, &config.data_snapshot_id, &config.code_revision);

    let inputs = PipelineInputs::load(config)?;
    let output = run_stages(&inputs, params, model)?;

    let log = RunLog::new(config.run_log_path());
    if log.read()?.iter().any(|r| r.run_id == record.run_id) {
        return Err(RunError::DuplicateRun {
            run_id: record.run_id,
        }
        .into());
    }

    let run_dir = config.output_dir.join(&record.run_id);
    let staging = config.output_dir.join(format!(".{}.partial", record.run_id));
    let write_err = |path: &PathBuf, source: std::io::Error| IoError::Write {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(&config.output_dir).map_err(|e| write_err(&config.output_dir, e))?;
    if run_dir.exists() {
        return Err(write_err(&run_dir, ErrorKind::AlreadyExists.into()).into());
    }
    fs::create_dir(&staging).map_err(|e| write_err(&staging, e))?;

    let staged = write_artifacts(&staging, &inputs, &output)
        .map_err(PipelineError::from)
        .and_then(|()| {
            record.finalize_run(serde_json::to_value(params)?, output.metrics()?)?;
            io::write_json_new(&staging.join("run.json"), &record)?;
            fs::rename(&staging, &run_dir).map_err(|e| write_err(&run_dir, e))?;
            Ok(())
        });
    if let Err(err) = staged {
        discard(&staging);
        return Err(err);
    }
    if let Err(err) = log.append(&record) {
        discard(&run_dir);
        return Err(err.into());
    }

    info!(run_id = %record.run_id, dir = %run_dir.display(), "run complete");
    Ok(RunSummary {
        record,
        run_dir,
        output,
    })
}
