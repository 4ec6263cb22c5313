//! `mooring status`: last published status per source.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mooring_core::store;
use mooring_core::types::{SourceStatus, SyncStatus};

use super::home;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson {
    id: String,
    #[serde(flatten)]
    status: SourceStatus,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "message")]
    message: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "jobs")]
    jobs: usize,
    #[tabled(rename = "last check")]
    last_check: String,
    #[tabled(rename = "last update")]
    last_update: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let statuses = store::list_statuses_at(&home).context("failed to load source statuses")?;

        if self.json {
            let payload: Vec<StatusJson> = statuses
                .into_iter()
                .map(|(id, status)| StatusJson { id: id.0, status })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        if statuses.is_empty() {
            println!("No source status published yet. Is the daemon running?");
            return Ok(());
        }

        let now = Utc::now();
        let failing = statuses
            .iter()
            .filter(|(_, s)| matches!(s.status, SyncStatus::Error | SyncStatus::SyncedWithError))
            .count();
        println!(
            "mooring v{} | {} sources | {} failing",
            env!("CARGO_PKG_VERSION"),
            statuses.len(),
            failing,
        );

        let rows: Vec<StatusTableRow> = statuses
            .into_iter()
            .map(|(id, s)| StatusTableRow {
                source: id.0,
                status: status_label(s.status),
                message: s.message,
                commit: s
                    .git_commit
                    .as_deref()
                    .map(short_commit)
                    .unwrap_or_else(|| "-".to_owned()),
                jobs: s.jobs.len(),
                last_check: format_age(s.last_check_time, now),
                last_update: format_age(s.last_update_time, now),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn status_label(status: SyncStatus) -> String {
    let label = status.to_string();
    match status {
        SyncStatus::Synced => label.green().bold().to_string(),
        SyncStatus::Error | SyncStatus::SyncedWithError => label.red().bold().to_string(),
        SyncStatus::OutOfSync => label.yellow().bold().to_string(),
        SyncStatus::Paused => label.magenta().to_string(),
        SyncStatus::Init | SyncStatus::Syncing | SyncStatus::Unknown => {
            label.bright_black().to_string()
        }
    }
}

fn short_commit(commit: &str) -> String {
    commit.chars().take(8).collect()
}

fn format_age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_owned();
    };
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_are_bucketed() {
        let now = Utc::now();
        assert_eq!(format_age(None, now), "never");
        assert_eq!(format_age(Some(now - Duration::seconds(5)), now), "5s ago");
        assert_eq!(format_age(Some(now - Duration::minutes(3)), now), "3m ago");
        assert_eq!(format_age(Some(now - Duration::hours(26)), now), "1d ago");
        assert_eq!(format_age(Some(now + Duration::seconds(2)), now), "0s ago");
    }

    #[test]
    fn commits_are_shortened() {
        assert_eq!(short_commit("0123456789abcdef"), "01234567");
        assert_eq!(short_commit("abc"), "abc");
    }
}
