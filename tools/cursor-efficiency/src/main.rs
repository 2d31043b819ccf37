mod end;
mod start;
mod usage;

use clap::{Parser, Subcommand};
use reconciler::{EfficiencyConfig, Error};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "cursor-efficiency",
    about = "Measure token usage, chat counts, code changes and adoption rate for a Cursor session"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the current branch, HEAD and time as the session start
    Start,
    /// Close the session and print the efficiency report as JSON
    End {
        /// Branch you expect to be on (defaults to the current branch)
        branch: Option<String>,
        /// Include every chat message in the report
        #[arg(short = 'c', long, default_value_t = false)]
        include_chat_entries: bool,
        /// Include the unified diff between the start and end commits
        #[arg(long, default_value_t = false)]
        include_diff: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EfficiencyConfig::from_env();

    let result = match cli.command {
        Commands::Start => start::run_start(&config),
        Commands::End {
            branch,
            include_chat_entries,
            include_diff,
        } => end::run_end(&config, branch.as_deref(), include_chat_entries, include_diff),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(Error::CheckpointNotFound(_)) = err.downcast_ref::<Error>() {
                eprintln!("No .cursor-efficiency.json found. Run `cursor-efficiency start` first.");
            } else {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
