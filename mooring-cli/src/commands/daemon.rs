//! `mooring daemon`: run the reconciliation daemon or talk to a running one.

use anyhow::{Context, Result};
use clap::Subcommand;

use mooring_daemon::paths::socket_path;
use mooring_daemon::{request_status, request_stop, start_blocking, DaemonConfig, DaemonError};

use super::home;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (source loops + control socket).
    Start,
    /// Request graceful daemon shutdown over the control socket.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            let config = DaemonConfig::from_env().context("invalid daemon configuration")?;
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => {
            let home = home()?;
            match request_stop(&home) {
                Ok(()) => println!("daemon stop requested"),
                Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
                Err(err) => return Err(err).context("failed to stop daemon"),
            }
        }
        DaemonCommand::Status => {
            let home = home()?;
            let payload = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
    }

    Ok(())
}
