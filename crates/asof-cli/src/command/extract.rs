use std::{num::NonZeroUsize, path::PathBuf};

use asof_features::{extract_with_workers, extractor::default_workers, load_registry};
use asof_pipeline::io::read_subjects;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ExtractArg {
    /// Feature registry (JSON or YAML)
    #[arg(long)]
    registry: PathBuf,
    /// Subjects JSON file
    #[arg(long)]
    subjects: PathBuf,
    /// Event stream as <stream>=<path.jsonl>; repeat for each stream
    #[arg(long = "events", value_parser = util::parse_stream, required = true)]
    events: Vec<(String, PathBuf)>,
    /// Worker threads [default: available cores]
    #[arg(long)]
    workers: Option<NonZeroUsize>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &ExtractArg) -> anyhow::Result<()> {
    let store = util::read_event_store(&arg.events)?;
    let registry = load_registry(&arg.registry)?.with_observed_sources(&store);
    let subjects = read_subjects(&arg.subjects)?;
    let workers = arg.workers.unwrap_or_else(default_workers);

    let table = extract_with_workers(&subjects, &store, &registry, workers)?;
    Output::save_json(&table, arg.output.clone())?;
    Ok(())
}
