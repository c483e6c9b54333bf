use std::path::PathBuf;

use asof_eval::{SplitAssignment, audit_leakage, audit_split};
use asof_pipeline::io::{read_feature_table, read_json_file};

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AuditArg {
    /// Feature table JSON written by `extract`
    #[arg(long)]
    features: PathBuf,
    /// Event stream as <stream>=<path.jsonl>; repeat for each stream
    #[arg(long = "events", value_parser = util::parse_stream, required = true)]
    events: Vec<(String, PathBuf)>,
    /// Split assignment JSON written by `split`, to verify as well
    #[arg(long)]
    split: Option<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Writes the report, then fails if it found anything.
pub(crate) fn run(arg: &AuditArg) -> anyhow::Result<()> {
    let table = read_feature_table(&arg.features)?;
    let store = util::read_event_store(&arg.events)?;

    let mut report = audit_leakage(&table, &store);
    if let Some(path) = &arg.split {
        let assignment: SplitAssignment = read_json_file("split", path)?;
        audit_split(&mut report, &table, &assignment);
    }
    Output::save_json(&report, arg.output.clone())?;
    report.into_result()?;
    Ok(())
}
