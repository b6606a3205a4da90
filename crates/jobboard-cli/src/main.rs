//! Job board operator CLI.

use clap::{Parser, Subcommand};
use jobboard_config::{DEFAULT_PATH, JobBoardConfig, LogFormat};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Job board operator CLI", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "JOBBOARD_CONFIG", default_value = DEFAULT_PATH)]
    config: String,

    /// Site to operate on (defaults to the configured site)
    #[arg(long, global = true)]
    site: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconciliation sweep and print the report
    Reconcile {
        /// Keep sweeping on the configured interval until interrupted
        #[arg(long = "loop")]
        repeat: bool,
    },
    /// Create a job and add it to its queue
    Enqueue {
        /// Unique job id
        #[arg(long)]
        id: String,
        /// Queue to add the job to (defaults to the configured queue)
        #[arg(long)]
        queue: Option<String>,
        /// Job payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Mark a worker alive
    Heartbeat {
        /// Worker id
        #[arg(long)]
        worker: String,
        /// Seconds the heartbeat lasts (defaults to the configured worker TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Drop a worker's liveness key so the next sweep reclaims its jobs
    Forget {
        /// Worker id
        #[arg(long)]
        worker: String,
    },
    /// Show queue depths and worker claims
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = JobBoardConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let site = commands::resolve_site(&config, cli.site)?;

    match cli.command {
        Commands::Reconcile { repeat } => {
            commands::reconcile::run(&config, repeat).await?;
        }
        Commands::Enqueue { id, queue, payload } => {
            commands::jobs::enqueue(&config, &site, id, queue, &payload).await?;
        }
        Commands::Heartbeat { worker, ttl } => {
            commands::workers::heartbeat(&config, &site, &worker, ttl).await?;
        }
        Commands::Forget { worker } => {
            commands::workers::forget(&config, &site, &worker).await?;
        }
        Commands::Stats => {
            commands::stats::show(&config, &site).await?;
        }
    }

    Ok(())
}
