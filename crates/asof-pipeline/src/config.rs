//! Explicit run configuration.
//!
//! Everything a stage needs arrives through [`PipelineConfig`]; no stage
//! reads the environment.

use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use asof_data::Timestamp;
use asof_eval::{FoldMode, SamplingConfig};
use serde::{Deserialize, Serialize};

use crate::io::{self, IoError};

/// Parameters that determine the run's outputs; recorded in the run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub boundary: Timestamp,
    pub purge_days: i64,
    pub seed: u64,
    /// Availability horizon; the earliest subject cutoff when absent.
    #[serde(default)]
    pub as_of: Option<Timestamp>,
    /// Extraction threads; all available cores when absent.
    #[serde(default)]
    pub workers: Option<NonZeroUsize>,
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
    #[serde(default)]
    pub folds: Option<FoldsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldsConfig {
    pub boundaries: Vec<Timestamp>,
    #[serde(default)]
    pub mode: FoldMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub registry: PathBuf,
    pub subjects: PathBuf,
    /// Stream name to JSON Lines file.
    pub events: BTreeMap<String, PathBuf>,
    pub data_snapshot_id: String,
    pub code_revision: String,
    /// Each run writes a fresh sub-directory here.
    pub output_dir: PathBuf,
    /// Defaults to `runs.jsonl` inside `output_dir`.
    #[serde(default)]
    pub run_log: Option<PathBuf>,
    #[serde(flatten)]
    pub params: RunParams,
}

impl PipelineConfig {
    /// Reads a JSON config; relative paths are taken relative to its directory.
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let mut config: Self = io::read_json_file("pipeline config", path)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.registry);
        resolve(&mut self.subjects);
        resolve(&mut self.output_dir);
        self.events.values_mut().for_each(resolve);
        if let Some(p) = &mut self.run_log {
            resolve(p);
        }
    }

    #[must_use]
    pub fn run_log_path(&self) -> PathBuf {
        self.run_log
            .clone()
            .unwrap_or_else(|| self.output_dir.join("runs.jsonl"))
    }
}
