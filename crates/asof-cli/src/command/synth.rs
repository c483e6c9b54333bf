use std::path::PathBuf;

use asof_pipeline::synthetic::{SyntheticConfig, generate};
use tracing::info;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SynthArg {
    /// Directory to write `subjects.json` and the stream files into
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 1000)]
    subjects: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Fraction of subjects labeled as churned
    #[arg(long, default_value_t = 0.1)]
    churn_rate: f64,
    /// Fraction of events placed on or after their subject's cutoff
    #[arg(long, default_value_t = 0.1)]
    future_rate: f64,
}

pub(crate) fn run(arg: &SynthArg) -> anyhow::Result<()> {
    let config = SyntheticConfig {
        subjects: arg.subjects,
        seed: arg.seed,
        churn_rate: arg.churn_rate,
        future_rate: arg.future_rate,
        ..SyntheticConfig::default()
    };
    let dataset = generate(&config)?;
    let paths = dataset.write_to(&arg.out)?;
    for (stream, path) in &paths {
        info!(%stream, path = %path.display(), "wrote event stream");
    }
    Ok(())
}
