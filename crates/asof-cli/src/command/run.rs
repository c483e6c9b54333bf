use std::path::PathBuf;

use anyhow::Context as _;
use asof_pipeline::{BaseRateModel, PipelineConfig, PipelineError, execute};
use tracing::error;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Pipeline config JSON
    #[arg(long)]
    config: PathBuf,
    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the configured output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Prior used by the base-rate model when the training partition is empty
    #[arg(long)]
    prior: Option<f64>,
}

pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load(&arg.config)
        .with_context(|| format!("Failed to load config: {}", arg.config.display()))?;
    if let Some(seed) = arg.seed {
        config.params.seed = seed;
    }
    if let Some(dir) = &arg.output_dir {
        config.output_dir.clone_from(dir);
    }

    let model = BaseRateModel { prior: arg.prior };
    match execute(&config, &model) {
        Ok(summary) => Output::save_json(&summary.record, None),
        Err(PipelineError::Leakage { source }) => {
            error!(
                leaks = source.report.leak_count,
                split_overlap = source.report.split_overlap,
                "run aborted by the leakage gate"
            );
            Output::save_json(&source.report, None)?;
            Err(source.into())
        }
        Err(err) => Err(err.into()),
    }
}
