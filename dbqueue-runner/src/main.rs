//! Claim and execute `dbqueue` jobs until told to stop.
use std::sync::Arc;

use clap::{Parser, Subcommand};
use envconfig::Envconfig;

use dbqueue_runner::config::Config;
use dbqueue_runner::handlers;
use dbqueue_runner::supervisor;

#[derive(Parser)]
#[command(name = "dbqueue-runner", about = "Runs the dbqueue task runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run job runners against the configured store until interrupted.
    #[command(name = "run_queue")]
    RunQueue {
        /// Forced task queue rescan interval, in seconds. Zero disables the
        /// periodic rescan.
        #[arg(long, default_value_t = 60)]
        rescan_period: u64,

        /// Number of job runners to have.
        #[arg(long, default_value_t = 1)]
        job_runners: usize,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config =
        Config::init_from_env().map_err(|error| eyre::eyre!("invalid configuration: {error}"))?;

    match cli.command {
        Command::RunQueue {
            rescan_period,
            job_runners,
        } => {
            let registry = Arc::new(handlers::base_registry());
            supervisor::run_queue(&config, rescan_period, job_runners, registry).await?;
        }
    }

    Ok(())
}
