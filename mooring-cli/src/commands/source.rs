//! `mooring source`: register, remove and list sources.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use mooring_core::registry;
use mooring_core::types::{Source, SourceId};
use mooring_daemon::{request_remove_source, request_upsert_source, DaemonError};

use super::home;

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Register or replace a source from a YAML file.
    Add {
        /// YAML file holding one source record.
        file: PathBuf,
    },
    /// Forget a source and stop watching it.
    Remove {
        /// Source id.
        id: String,
    },
    /// List registered sources.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct SourceRow {
    id: String,
    url: String,
    branch: String,
    path: String,
    #[tabled(rename = "namespace")]
    namespace: String,
    paused: bool,
}

pub fn run(command: SourceCommand) -> Result<()> {
    let home = home()?;

    match command {
        SourceCommand::Add { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let source: Source = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            if source.url.trim().is_empty() {
                bail!("source '{}' has no url", source.id);
            }

            let existing = registry::source_path_at(&home, &source.id).exists();
            registry::save_source_at(&home, &source)
                .with_context(|| format!("failed to save source '{}'", source.id))?;
            let verb = if existing { "updated" } else { "added" };

            match request_upsert_source(&home, &source, existing) {
                Ok(_) => println!("✓ source '{}' {verb}; daemon notified", source.id),
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    println!("✓ source '{}' {verb}; daemon not running", source.id)
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("saved, but the daemon rejected '{}'", source.id))
                }
            }
        }
        SourceCommand::Remove { id } => {
            let id = SourceId::from(id);
            let removed = registry::remove_source_at(&home, &id)
                .with_context(|| format!("failed to remove source '{id}'"))?;
            if !removed {
                bail!("unknown source '{id}'");
            }

            match request_remove_source(&home, &id.0) {
                Ok(_) | Err(DaemonError::DaemonNotRunning { .. }) => {
                    println!("✓ source '{id}' removed")
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("removed, but the daemon rejected '{id}'"))
                }
            }
        }
        SourceCommand::List { json } => {
            let sources = registry::list_sources_at(&home).context("failed to load sources")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&sources)
                        .context("failed to serialize sources JSON")?
                );
                return Ok(());
            }
            if sources.is_empty() {
                println!("No sources registered. Run `mooring source add <file>` first.");
                return Ok(());
            }
            let rows: Vec<SourceRow> = sources
                .into_iter()
                .map(|s| SourceRow {
                    id: s.id.0,
                    url: s.url,
                    branch: s.branch,
                    path: s.path,
                    namespace: s.namespace,
                    paused: s.paused,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }

    Ok(())
}
