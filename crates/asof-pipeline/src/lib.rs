//! End-to-end runs: configuration, staged execution and reproducibility
//! records.
//!
//! - [`config`]: the explicit run configuration
//! - [`pipeline`]: the staged orchestrator
//! - [`run_record`]: run records and the append-only run log
//! - [`model`]: the trainer hand-off and a base-rate reference model
//! - [`synthetic`]: seeded synthetic subjects and event streams
//! - [`digest`]: content digests for replay checks
//! - [`io`]: JSON and JSON Lines file edges

pub mod config;
pub mod digest;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod run_record;
pub mod synthetic;

pub use self::{
    config::{FoldsConfig, PipelineConfig, RunParams},
    model::{BaseRateModel, ProbabilityModel},
    pipeline::{
        PipelineError, PipelineInputs, PipelineOutput, RunSummary, execute, run_stages,
    },
    run_record::{RunError, RunLog, RunRecord, start_run},
};
