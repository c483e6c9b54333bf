//! Reproducibility records and the append-only run log.
//!
//! A [`RunRecord`] is opened with [`start_run`], finalized exactly once with
//! [`RunRecord::finalize_run`] and then appended to a [`RunLog`]. The log is
//! a JSON Lines file that is only ever opened for appending.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, BufRead as _, BufReader, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::digest::short_digest;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RunError {
    #[display("run {run_id} is already finalized")]
    RunAlreadyFinalized { run_id: String },
    #[display("run {run_id} has not been finalized")]
    RunNotFinalized { run_id: String },
    #[display("run {run_id} is already recorded in the run log")]
    DuplicateRun { run_id: String },
    #[display("run log I/O failed: {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("run log {} line {line} is not a valid record", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[display("failed to encode run {run_id}")]
    Encode {
        run_id: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub seed: u64,
    pub data_snapshot_id: String,
    pub code_revision: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Opens a run stamped with the current time.
#[must_use]
pub fn start_run(seed: u64, data_snapshot_id: &str, code_revision: &str) -> RunRecord {
    start_run_at(seed, data_snapshot_id, code_revision, Utc::now())
}

/// Opens a run stamped with `created_at`.
///
/// The run id is the creation time followed by a short digest of the run's
/// identity, so two runs started within the same second still differ.
#[must_use]
pub fn start_run_at(
    seed: u64,
    data_snapshot_id: &str,
    code_revision: &str,
    created_at: DateTime<Utc>,
) -> RunRecord {
    let identity = format!(
        "{seed}\0{data_snapshot_id}\0{code_revision}\0{}",
        created_at.to_rfc3339()
    );
    let run_id = format!(
        "{}-{}",
        created_at.format("%Y%m%dT%H%M%SZ"),
        short_digest(identity.as_bytes())
    );
    info!(%run_id, seed, data_snapshot_id, code_revision, "started run");
    RunRecord {
        run_id,
        seed,
        data_snapshot_id: data_snapshot_id.to_owned(),
        code_revision: code_revision.to_owned(),
        params: serde_json::Value::Null,
        metrics: BTreeMap::new(),
        created_at,
        finalized_at: None,
    }
}

impl RunRecord {
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    /// Records the run's parameters and metrics; allowed once.
    pub fn finalize_run(
        &mut self,
        params: serde_json::Value,
        metrics: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), RunError> {
        if self.is_finalized() {
            return Err(RunError::RunAlreadyFinalized {
                run_id: self.run_id.clone(),
            });
        }
        self.params = params;
        self.metrics = metrics;
        self.finalized_at = Some(Utc::now());
        info!(run_id = %self.run_id, metrics = self.metrics.len(), "finalized run");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in append order; a missing log is empty.
    pub fn read(&self) -> Result<Vec<RunRecord>, RunError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(source) => {
                return Err(RunError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let mut records = vec![];
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| RunError::Io {
                path: self.path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| RunError::Corrupt {
                path: self.path.clone(),
                line: i + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Appends a finalized record as one line.
    pub fn append(&self, record: &RunRecord) -> Result<(), RunError> {
        if !record.is_finalized() {
            return Err(RunError::RunNotFinalized {
                run_id: record.run_id.clone(),
            });
        }
        if self.read()?.iter().any(|r| r.run_id == record.run_id) {
            return Err(RunError::DuplicateRun {
                run_id: record.run_id.clone(),
            });
        }

        let mut line = serde_json::to_string(record).map_err(|source| RunError::Encode {
            run_id: record.run_id.clone(),
            source,
        })?;
        line.push('\n');
        let io_err = |source| RunError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        info!(run_id = %record.run_id, log = %self.path.display(), "appended run record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use serde_json::json;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_500_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_run_id_is_stable_for_same_identity() {
        let a = start_run_at(42, "snap-1", "abc123", at(0));
        let b = start_run_at(42, "snap-1", "abc123", at(0));
        let c = start_run_at(43, "snap-1", "abc123", at(0));
        assert_eq!(a.run_id, b.run_id);
        assert_ne!(a.run_id, c.run_id);
        assert!(a.run_id.starts_with("20170714T024000Z-"));
        assert!(!a.is_finalized());
    }

    #[test]
    fn test_finalize_twice_fails() {
        let mut run = start_run_at(1, "snap", "rev", at(0));
        run.finalize_run(json!({"purge_days": 30}), BTreeMap::new())
            .unwrap();
        let err = run
            .finalize_run(json!({}), BTreeMap::from([("auc".to_owned(), json!(0.5))]))
            .unwrap_err();
        assert!(matches!(err, RunError::RunAlreadyFinalized { .. }));
        // the first finalization is untouched
        assert_eq!(run.params, json!({"purge_days": 30}));
        assert!(run.metrics.is_empty());
    }

    #[test]
    fn test_log_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("runs.jsonl"));
        assert!(log.read().unwrap().is_empty());

        let mut first = start_run_at(1, "snap", "rev", at(0));
        assert!(matches!(
            log.append(&first),
            Err(RunError::RunNotFinalized { .. })
        ));
        first
            .finalize_run(json!({"seed": 1}), BTreeMap::from([("leaks".to_owned(), json!(0))]))
            .unwrap();
        log.append(&first).unwrap();

        let mut second = start_run_at(2, "snap", "rev", at(5));
        second.finalize_run(json!({"seed": 2}), BTreeMap::new()).unwrap();
        log.append(&second).unwrap();

        assert!(matches!(
            log.append(&first),
            Err(RunError::DuplicateRun { .. })
        ));

        let records = log.read().unwrap();
        assert_eq!(records, [first, second]);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        std::fs::write(&path, "{\"run_id\": 3}\n").unwrap();
        let err = RunLog::new(&path).read().unwrap_err();
        assert!(matches!(err, RunError::Corrupt { line: 1, .. }));
    }
}
