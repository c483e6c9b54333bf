use std::{collections::BTreeMap, path::PathBuf};

use asof_eval::validate_probabilities;
use asof_pipeline::io::{read_json_file, read_subjects};
use asof_stats::calibration::CalibrationReport;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CheckScoresArg {
    /// JSON object mapping subject id to predicted probability
    #[arg(long)]
    scores: PathBuf,
    /// Subjects JSON file; when given, also reports calibration against the labels
    #[arg(long)]
    subjects: Option<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &CheckScoresArg) -> anyhow::Result<()> {
    let scores: BTreeMap<String, f64> = read_json_file("scores", &arg.scores)?;
    let probabilities = scores.values().copied().collect::<Vec<_>>();
    validate_probabilities(&probabilities)?;

    let Some(path) = &arg.subjects else {
        return Ok(());
    };
    let subjects = read_subjects(path)?;
    let labels = scores
        .keys()
        .map(|id| {
            subjects
                .get(id)
                .map(|s| s.label)
                .ok_or_else(|| anyhow::anyhow!("Scored subject {id} has no label"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let report = CalibrationReport::compute(&labels, &probabilities)?;
    Output::save_json(&report, arg.output.clone())?;
    Ok(())
}
