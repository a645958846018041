mod cmd_plan;
mod cmd_run;
mod cmd_status;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harvest", version, about = "Batch harvester for APM controller data")]
struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job, resuming any checkpoint found in the output directory
    Run {
        /// Path to the job YAML file
        job: PathBuf,
        /// Output directory (checkpoint, event log and artifacts)
        #[arg(long, short)]
        output: PathBuf,
        /// Directory of recorded controller responses to harvest from
        #[arg(long)]
        replay: PathBuf,
        /// Put a job that ended in error back on its failed step
        #[arg(long)]
        retry: bool,
    },
    /// Show the checkpoint of an output directory
    Status {
        /// Output directory of a previous run
        output: PathBuf,
    },
    /// Validate a job file and print what a run would do
    Plan {
        /// Path to the job YAML file
        job: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.cmd {
        Command::Run {
            job,
            output,
            replay,
            retry,
        } => cmd_run::execute(&job, &output, &replay, retry),
        Command::Status { output } => cmd_status::execute(&output),
        Command::Plan { job } => cmd_plan::execute(&job),
    }
}
