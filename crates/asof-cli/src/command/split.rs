use std::path::PathBuf;

use asof_data::Timestamp;
use asof_eval::{FoldMode, walk_forward};
use asof_pipeline::io::read_subjects;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SplitArg {
    /// Subjects JSON file
    #[arg(long)]
    subjects: PathBuf,
    /// Split boundary (RFC 3339, YYYY-MM-DD or YYYYMMDD)
    #[arg(long)]
    boundary: Timestamp,
    /// Days excluded on each side of the boundary
    #[arg(long, allow_negative_numbers = true)]
    purge_days: i64,
    /// Further boundaries; emits walk-forward folds over `boundary` and these
    #[arg(long = "fold-boundaries", value_delimiter = ',')]
    folds: Vec<Timestamp>,
    /// How training periods grow across folds
    #[arg(long, value_enum, default_value = "expanding")]
    fold_mode: FoldModeArg,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum FoldModeArg {
    Expanding,
    Sliding,
}

impl From<FoldModeArg> for FoldMode {
    fn from(arg: FoldModeArg) -> Self {
        match arg {
            FoldModeArg::Expanding => FoldMode::Expanding,
            FoldModeArg::Sliding => FoldMode::Sliding,
        }
    }
}

pub(crate) fn run(arg: &SplitArg) -> anyhow::Result<()> {
    let subjects = read_subjects(&arg.subjects)?;
    if arg.folds.is_empty() {
        let assignment = asof_eval::split(&subjects, arg.boundary, arg.purge_days)?;
        Output::save_json(&assignment, arg.output.clone())?;
    } else {
        let boundaries = std::iter::once(arg.boundary)
            .chain(arg.folds.iter().copied())
            .collect::<Vec<_>>();
        let folds = walk_forward(
            &subjects,
            &boundaries,
            arg.purge_days,
            arg.fold_mode.into(),
        )?;
        Output::save_json(&folds, arg.output.clone())?;
    }
    Ok(())
}
