use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, trace};

use janus_worker::mapreduce::apps::{get_shared_app, APP_NAMES};
use janus_worker::mapreduce::{CallBudget, Worker, WorkerConfig};

/// Map-reduce worker: registers with a coordinator and runs the tasks it is sent.
#[derive(Debug, Parser)]
#[command(name = "mrworker")]
struct Cli {
    /// Application whose map and reduce functions this worker runs
    #[arg(long, env = "MR_APP")]
    app: String,

    /// JSON config file; command line flags override its values
    #[arg(long, env = "MR_CONFIG")]
    config: Option<PathBuf>,

    /// Coordinator endpoint
    #[arg(long, env = "MR_COORDINATOR")]
    coordinator: Option<String>,

    /// Address to listen on
    #[arg(long, env = "MR_LISTEN")]
    listen: Option<SocketAddr>,

    /// Identity to register under, defaults to http://<listen address>
    #[arg(long, env = "MR_ADVERTISE")]
    advertise: Option<String>,

    /// Directory holding intermediate and output files
    #[arg(long, env = "MR_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Number of calls to service before exiting, -1 for no limit
    #[arg(long, env = "MR_RPC_BUDGET", allow_negative_numbers = true)]
    rpc_budget: Option<i64>,

    /// Exit the process shortly after a Shutdown call
    #[arg(long, env = "MR_EXIT_ON_SHUTDOWN")]
    exit_on_shutdown: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn worker_config(&self) -> anyhow::Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)?,
            None => {
                let coordinator = self
                    .coordinator
                    .clone()
                    .ok_or_else(|| anyhow!("--coordinator is required without --config"))?;
                let listen = self
                    .listen
                    .ok_or_else(|| anyhow!("--listen is required without --config"))?;
                WorkerConfig::new(coordinator, listen)
            }
        };

        if let Some(coordinator) = &self.coordinator {
            config.coordinator = coordinator.clone();
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.advertise.is_some() {
            config.advertise = self.advertise.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(budget) = self.rpc_budget {
            config.call_budget = CallBudget::from(budget);
        }
        if self.exit_on_shutdown {
            config.exit_on_shutdown = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 2)
        .init();

    debug!("mrworker started with verbosity level: {}", cli.verbose);
    trace!("full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let app = get_shared_app(&cli.app)
        .ok_or_else(|| anyhow!("unknown app {:?}, expected one of {:?}", cli.app, APP_NAMES))?;
    let config = cli.worker_config()?;
    let listen = config.listen;

    Worker::new(config, app)
        .run()
        .await
        .with_context(|| format!("worker on {}", listen))
}
