//! mooring: keep orchestrator jobs in line with the job files in git.
//!
//! # Usage
//!
//! ```text
//! mooring daemon start|stop|status
//! mooring source add <file> | remove <id> | list [--json]
//! mooring sync <id> [--restart]
//! mooring sync --repo <org/repo> --branch <branch> [--restart]
//! mooring pause <id>
//! mooring resume <id>
//! mooring status [--json]
//! mooring plan <live> <desired> [--force] [--restart] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, pause::PauseArgs, plan::PlanArgs, source::SourceCommand,
    status::StatusArgs, sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "mooring",
    version,
    about = "Reconcile orchestrator jobs against job files tracked in git",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the reconciliation daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Manage registered sources.
    Source {
        #[command(subcommand)]
        command: SourceCommand,
    },

    /// Ask the daemon to reconcile a source now.
    Sync(SyncArgs),

    /// Stop applying changes for a source; it keeps reporting drift.
    Pause(PauseArgs),

    /// Resume applying changes for a paused source.
    Resume(PauseArgs),

    /// Show the last published status of every source.
    Status(StatusArgs),

    /// Diff two job files offline and report whether an update would be applied.
    Plan(PlanArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Source { command } => commands::source::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Pause(args) => args.run(true),
        Commands::Resume(args) => args.run(false),
        Commands::Status(args) => args.run(),
        Commands::Plan(args) => args.run(),
    }
}
