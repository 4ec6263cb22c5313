//! `mooring sync`: queue an immediate reconciliation on the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;

use mooring_daemon::{request_sync, request_sync_repo};

use super::home;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source id to reconcile.
    #[arg(conflicts_with = "repo")]
    pub id: Option<String>,

    /// Reconcile every source tracking this repository (`org/repo` or a clone URL).
    #[arg(long, requires = "branch")]
    pub repo: Option<String>,

    /// Branch to match together with `--repo`.
    #[arg(long, requires = "repo")]
    pub branch: Option<String>,

    /// Apply every job and stamp a restart marker, even without drift.
    #[arg(long)]
    pub restart: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;

        match (self.id, self.repo, self.branch) {
            (Some(id), _, _) => {
                request_sync(&home, &id, self.restart)
                    .with_context(|| format!("sync failed for '{id}'"))?;
                println!("✓ sync queued for '{id}'{}", restart_suffix(self.restart));
            }
            (None, Some(repo), Some(branch)) => {
                let data = request_sync_repo(&home, &repo, &branch, self.restart)
                    .with_context(|| format!("sync failed for {repo}@{branch}"))?;
                let queued = data.get("queued").and_then(|v| v.as_u64()).unwrap_or(0);
                println!(
                    "✓ sync queued for {queued} source(s) tracking {repo}@{branch}{}",
                    restart_suffix(self.restart)
                );
            }
            _ => bail!("provide a source id, or --repo together with --branch"),
        }

        Ok(())
    }
}

fn restart_suffix(restart: bool) -> &'static str {
    if restart {
        " (forced restart)"
    } else {
        ""
    }
}
