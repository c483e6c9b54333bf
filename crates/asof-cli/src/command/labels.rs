use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context as _;
use asof_data::{ChurnRule, Timestamp, labels::DEFAULT_WINDOW_DAYS};
use asof_pipeline::io::load_event_store;

use crate::util::Output;

const STREAM: &str = "transactions";

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct LabelsArg {
    /// Transactions JSON Lines file
    #[arg(long)]
    transactions: PathBuf,
    /// Cutoff shared by every labeled subject
    #[arg(long)]
    cutoff: Timestamp,
    /// Days after expiry in which a renewal still counts
    #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
    window_days: u32,
    /// Also write the per-subject label details here
    #[arg(long)]
    report: Option<PathBuf>,
    /// Output file path for the subjects JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &LabelsArg) -> anyhow::Result<()> {
    let paths = BTreeMap::from([(STREAM.to_owned(), arg.transactions.clone())]);
    let (store, _reports) = load_event_store(&paths)?;
    let transactions = store
        .stream(STREAM)
        .context("Transactions stream was not loaded")?;

    let rule = ChurnRule {
        cutoff: arg.cutoff,
        window_days: arg.window_days,
    };
    let report = rule.label(transactions);
    if let Some(path) = &arg.report {
        Output::save_json(&report, Some(path.clone()))?;
    }
    Output::save_json(&report.subjects(), arg.output.clone())?;
    Ok(())
}
