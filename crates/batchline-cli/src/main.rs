mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "batchline",
    version,
    about = "Restartable chunk-oriented batch jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job, resuming its last failed or stopped instance
    Run {
        /// Path to job YAML file
        job: PathBuf,
        /// Resume a failed or stopped instance (overrides `restart_enabled`)
        #[arg(long, overrides_with = "no_restart")]
        restart: bool,
        /// Always start a new job instance
        #[arg(long, overrides_with = "restart")]
        no_restart: bool,
    },
    /// Validate a job file, its components and the state store
    Check {
        /// Path to job YAML file
        job: PathBuf,
    },
    /// Show the latest instance of a job and its step executions
    Status {
        /// Path to job YAML file
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            job,
            restart,
            no_restart,
        } => {
            let restart = match (restart, no_restart) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::run::execute(&job, restart).await
        }
        Commands::Check { job } => {
            commands::check::execute(&job)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { job } => {
            commands::status::execute(&job)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
