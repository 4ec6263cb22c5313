//! `mooring pause` / `mooring resume`.
//!
//! The flag is saved on the source record first so it survives a daemon
//! restart, then pushed to the running loop if there is one.

use anyhow::{Context, Result};
use clap::Args;

use mooring_core::registry;
use mooring_core::types::SourceId;
use mooring_daemon::{request_pause, DaemonError};

use super::home;

#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Source id.
    pub id: String,
}

impl PauseArgs {
    pub fn run(self, paused: bool) -> Result<()> {
        let home = home()?;
        let id = SourceId::from(self.id.as_str());
        let verb = if paused { "paused" } else { "resumed" };

        let mut source = registry::load_source_at(&home, &id)
            .with_context(|| format!("unknown source '{id}'"))?;
        source.paused = paused;
        registry::save_source_at(&home, &source)
            .with_context(|| format!("failed to save source '{id}'"))?;

        match request_pause(&home, &id.0, paused) {
            Ok(_) => println!("✓ '{id}' {verb}"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("✓ '{id}' {verb} (daemon not running; takes effect on next start)");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("saved, but the daemon rejected the change for '{id}'"))
            }
        }
        Ok(())
    }
}
