//! CLI for the vodq download queue.

mod backend;
mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use vodq_core::config;

use backend::Backend;
use commands::{
    print_completions, print_man_page, run_add, run_clear_completed, run_metrics, run_remove,
    run_reorder, run_retry_failed, run_session, run_start, run_status, run_stop, AddArgs,
};
use vodq_core::runner::StopKind;

/// Top-level CLI for vodq.
#[derive(Debug, Parser)]
#[command(name = "vodq")]
#[command(about = "vodq: persistent VOD and clip download queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a VOD or clip for download.
    Add(AddArgs),

    /// Show the queue in order.
    Status,

    /// Remove a job that is not downloading.
    Remove {
        /// Job identifier.
        id: i64,
    },

    /// Set the queue order. Must list every job exactly once.
    Reorder {
        /// Job identifiers in the new order.
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },

    /// Drop completed jobs from the queue.
    ClearCompleted,

    /// Own the queue: serve the control socket and download until the queue drains.
    Run {
        /// Keep running after the queue is drained (for jobs added later).
        #[arg(long)]
        watch: bool,
    },

    /// Start downloading in a running `vodq run` (after a pause or cancel).
    Start,

    /// Pause the active download, keeping partial output.
    Pause,

    /// Cancel the active download and discard its partial output.
    Cancel,

    /// Re-queue failed jobs with a fresh attempt budget.
    RetryFailed,

    /// Print the runtime metrics snapshot as JSON.
    Metrics,

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> anyhow::Result<()> {
        let cli = Cli::parse();

        // Generated output needs neither config nor database.
        match cli.command {
            CliCommand::Completions { shell } => return print_completions(shell),
            CliCommand::Man => return print_man_page(),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::Run { watch } = cli.command {
            return run_session(cfg, watch).await;
        }

        let backend = Backend::connect(cfg).await?;
        let res = dispatch(&backend, cli.command).await;
        backend.close().await?;
        res
    }
}

async fn dispatch(backend: &Backend, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Add(args) => run_add(backend, args).await,
        CliCommand::Status => run_status(backend).await,
        CliCommand::Remove { id } => run_remove(backend, id).await,
        CliCommand::Reorder { ids } => run_reorder(backend, ids).await,
        CliCommand::ClearCompleted => run_clear_completed(backend).await,
        CliCommand::Start => run_start(backend).await,
        CliCommand::Pause => run_stop(backend, StopKind::Pause).await,
        CliCommand::Cancel => run_stop(backend, StopKind::Cancel).await,
        CliCommand::RetryFailed => run_retry_failed(backend).await,
        CliCommand::Metrics => run_metrics(backend).await,
        other => anyhow::bail!("{:?} is not a queue command", other),
    }
}

#[cfg(test)]
mod tests;
