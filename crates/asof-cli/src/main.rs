use anyhow::Context as _;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod command;
mod util;

const DEFAULT_LOG_FILTER: &str =
    "asof_cli=info,asof_data=info,asof_features=info,asof_eval=info,asof_pipeline=info";

/// Logs go to stderr; stdout carries JSON output only.
fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialize tracing")
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    command::run()
}
