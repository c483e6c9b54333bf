use std::path::PathBuf;

use asof_eval::{SplitAssignment, drift_report};
use asof_pipeline::io::{read_feature_table, read_json_file};

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct DriftArg {
    /// Feature table JSON written by `extract`
    #[arg(long)]
    features: PathBuf,
    /// Split assignment JSON written by `split`
    #[arg(long)]
    split: PathBuf,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &DriftArg) -> anyhow::Result<()> {
    let table = read_feature_table(&arg.features)?;
    let assignment: SplitAssignment = read_json_file("split", &arg.split)?;

    let report = drift_report(&table, &assignment)?;
    Output::save_json(&report, arg.output.clone())?;
    Ok(())
}
