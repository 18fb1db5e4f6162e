use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use janus_worker::mapreduce::apps::{get_app, APP_NAMES};
use janus_worker::mapreduce::sequential::{run_sequential, write_output};

/// Run a map-reduce application over input files in a single process.
#[derive(Debug, Parser)]
#[command(name = "mrsequential")]
struct Cli {
    /// Application to run
    app: String,

    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file
    #[arg(short, long, default_value = "mr-out-0")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app = get_app(&cli.app)
        .ok_or_else(|| anyhow!("unknown app {:?}, expected one of {:?}", cli.app, APP_NAMES))?;

    let results = run_sequential(&app, &cli.inputs)?;
    write_output(&cli.output, &results)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    info!(keys = results.len(), output = %cli.output.display(), "done");
    Ok(())
}
