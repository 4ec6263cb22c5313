//! `mooring plan`: offline diff and update decision for one job.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use mooring_core::plan::{DiffType, JobDiff};
use mooring_sync::{assess, carry_autoscaler_values, decide, diff_jobs, read_job_file, UpdatePolicy};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Job file as it currently runs.
    pub live: PathBuf,

    /// Job file as it should run.
    pub desired: PathBuf,

    /// Apply whenever anything differs.
    #[arg(long)]
    pub force: bool,

    /// Treat this as a forced-restart sync.
    #[arg(long)]
    pub restart: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanReport {
    job: String,
    changed: bool,
    significant: bool,
    update: bool,
    reasons: Vec<String>,
    diff: JobDiff,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let live = read_job_file(&self.live)
            .with_context(|| format!("failed to load {}", self.live.display()))?;
        let mut desired = read_job_file(&self.desired)
            .with_context(|| format!("failed to load {}", self.desired.display()))?;

        let diff = diff_jobs(Some(&live), &desired);
        carry_autoscaler_values(&mut desired, &diff);
        let assessment = assess(&desired, &diff);
        let update = decide(
            &assessment,
            UpdatePolicy {
                force: self.force,
                restart: self.restart,
            },
        );

        let report = PlanReport {
            job: desired.name.clone(),
            changed: assessment.changed,
            significant: assessment.significant,
            update,
            reasons: assessment.reasons,
            diff,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize plan JSON")?
            );
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &PlanReport) {
    println!("job: {}", report.job.bold());
    if !report.changed {
        println!("{} no differences", "=".bright_black());
    } else {
        for line in diff_lines(&report.diff) {
            println!("  {line}");
        }
    }
    for reason in &report.reasons {
        println!("  {} {reason}", "!".yellow());
    }
    if report.update {
        println!("{}", "decision: update".green().bold());
    } else {
        println!("{}", "decision: skip".bright_black().bold());
    }
}

/// One line per changed leaf, prefixed with its path.
fn diff_lines(diff: &JobDiff) -> Vec<String> {
    let mut out = Vec::new();
    for field in &diff.fields {
        push_field(&mut out, "", &field.name, field.diff_type, &field.old, &field.new);
    }
    for object in &diff.objects {
        push_object(&mut out, "", object);
    }
    for group in &diff.task_groups {
        let prefix = format!("group[{}].", group.name);
        if group.diff_type != DiffType::Edited && group.diff_type != DiffType::None {
            out.push(format!("{} {}", marker(group.diff_type), prefix.trim_end_matches('.')));
        }
        for field in &group.fields {
            push_field(&mut out, &prefix, &field.name, field.diff_type, &field.old, &field.new);
        }
        for object in &group.objects {
            push_object(&mut out, &prefix, object);
        }
        for task in &group.tasks {
            let prefix = format!("{prefix}task[{}].", task.name);
            if task.diff_type != DiffType::Edited && task.diff_type != DiffType::None {
                out.push(format!("{} {}", marker(task.diff_type), prefix.trim_end_matches('.')));
            }
            for field in &task.fields {
                push_field(&mut out, &prefix, &field.name, field.diff_type, &field.old, &field.new);
            }
            for object in &task.objects {
                push_object(&mut out, &prefix, object);
            }
        }
    }
    out
}

fn push_object(out: &mut Vec<String>, prefix: &str, object: &mooring_core::plan::ObjectDiff) {
    let prefix = format!("{prefix}{}.", object.name);
    for field in &object.fields {
        push_field(out, &prefix, &field.name, field.diff_type, &field.old, &field.new);
    }
    for nested in &object.objects {
        push_object(out, &prefix, nested);
    }
}

fn push_field(
    out: &mut Vec<String>,
    prefix: &str,
    name: &str,
    diff_type: DiffType,
    old: &str,
    new: &str,
) {
    if diff_type == DiffType::None {
        return;
    }
    out.push(format!("{} {prefix}{name}: {old:?} => {new:?}", marker(diff_type)));
}

fn marker(diff_type: DiffType) -> colored::ColoredString {
    match diff_type {
        DiffType::Added => "+".green(),
        DiffType::Deleted => "-".red(),
        DiffType::Edited => "~".yellow(),
        DiffType::None => " ".normal(),
    }
}
