use clap::{Parser, Subcommand};

use self::{
    audit::AuditArg, check_scores::CheckScoresArg, drift::DriftArg, extract::ExtractArg,
    labels::LabelsArg, run::RunArg, split::SplitArg, synth::SynthArg,
};

mod audit;
mod check_scores;
mod drift;
mod extract;
mod labels;
mod run;
mod split;
mod synth;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Derive churn labels from a transactions stream
    Labels(#[clap(flatten)] LabelsArg),
    /// Build the point-in-time feature table
    Extract(#[clap(flatten)] ExtractArg),
    /// Verify a feature table against the raw events
    Audit(#[clap(flatten)] AuditArg),
    /// Assign subjects to train/validation around a purged boundary
    Split(#[clap(flatten)] SplitArg),
    /// Run the full pipeline from a config file
    Run(#[clap(flatten)] RunArg),
    /// Generate a synthetic dataset
    Synth(#[clap(flatten)] SynthArg),
    /// Report per-feature drift between partitions
    Drift(#[clap(flatten)] DriftArg),
    /// Check model scores against the probability contract
    CheckScores(#[clap(flatten)] CheckScoresArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Labels(arg) => labels::run(&arg)?,
        Mode::Extract(arg) => extract::run(&arg)?,
        Mode::Audit(arg) => audit::run(&arg)?,
        Mode::Split(arg) => split::run(&arg)?,
        Mode::Run(arg) => run::run(&arg)?,
        Mode::Synth(arg) => synth::run(&arg)?,
        Mode::Drift(arg) => drift::run(&arg)?,
        Mode::CheckScores(arg) => check_scores::run(&arg)?,
    }
    Ok(())
}
