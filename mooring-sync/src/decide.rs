//! Change-worthiness decision engine.
//!
//! A desired job always differs from the live one in its stamped commit,
//! and an external autoscaler may legitimately own replica counts and
//! resource quantities. [`assess`] walks a [`JobDiff`] and separates those
//! expected differences from real drift; [`has_update`] folds the result
//! with the source's force/restart policy.
//!
//! Autoscaler ownership is always read from the job being registered.

use tracing::warn;

use mooring_core::plan::{DiffType, FieldDiff, JobDiff, ObjectDiff, TaskDiff, TaskGroupDiff};
use mooring_core::types::{JobSpec, ScalingKind};

use crate::planner::{META_FORCE_RESTART, META_SRC_COMMIT};

/// Policy flags that can force an apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Source-level "always apply".
    pub force: bool,
    /// One-shot forced restart requested with a sync signal.
    pub restart: bool,
}

/// Outcome of walking a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    /// Some node of the diff records a change.
    pub changed: bool,
    /// At least one change is real drift.
    pub significant: bool,
    /// Why each significant change counted, for logs and `mooring plan`.
    pub reasons: Vec<String>,
}

impl Assessment {
    fn note_change(&mut self) {
        self.changed = true;
    }

    fn significant(&mut self, reason: impl Into<String>) {
        self.changed = true;
        self.significant = true;
        self.reasons.push(reason.into());
    }
}

/// Apply when something changed and it is drift or a flag forces it.
pub fn has_update(job: &JobSpec, diff: &JobDiff, policy: UpdatePolicy) -> bool {
    let assessment = assess(job, diff);
    decide(&assessment, policy)
}

pub fn decide(assessment: &Assessment, policy: UpdatePolicy) -> bool {
    if !assessment.changed {
        return false;
    }
    assessment.significant || policy.force || policy.restart
}

/// Classify every change in `diff` against the scaling policies of `job`.
pub fn assess(job: &JobSpec, diff: &JobDiff) -> Assessment {
    let mut out = Assessment::default();

    if diff.diff_type == DiffType::Added {
        out.significant("job does not exist yet");
        return out;
    }

    for object in &diff.objects {
        out.significant(format!("{} changed", object.name));
    }

    let fields: Vec<&FieldDiff> = changed_fields(&diff.fields).collect();
    if !fields.is_empty() {
        out.note_change();
        for field in fields {
            if !is_stamp_marker(&field.name) {
                out.significant(format!("{} changed", field.name));
            }
        }
    }

    for group in &diff.task_groups {
        assess_group(job, group, &mut out);
    }
    out
}

fn assess_group(job: &JobSpec, group: &TaskGroupDiff, out: &mut Assessment) {
    match group.diff_type {
        DiffType::Added => return out.significant(format!("task group {} added", group.name)),
        DiffType::Deleted => return out.significant(format!("task group {} removed", group.name)),
        _ => {}
    }

    for field in changed_fields(&group.fields) {
        if field.name == "Count" && job.has_group_scaling(&group.name) {
            out.note_change();
        } else {
            out.significant(format!("task group {}: {} changed", group.name, field.name));
        }
    }

    // An object entry counts even without nested changes; plans report an
    // autoscaler touching its own block that way.
    match group.objects.as_slice() {
        [] => {}
        [only] if only.name == "Scaling" && !has_nested_changes(only) => out.note_change(),
        objects => {
            for object in objects {
                out.significant(format!("task group {}: {} changed", group.name, object.name));
            }
        }
    }

    for task in &group.tasks {
        assess_task(job, &group.name, task, out);
    }
}

fn assess_task(job: &JobSpec, group: &str, task: &TaskDiff, out: &mut Assessment) {
    match task.diff_type {
        DiffType::Added => return out.significant(format!("task {group}/{} added", task.name)),
        DiffType::Deleted => return out.significant(format!("task {group}/{} removed", task.name)),
        _ => {}
    }

    for field in changed_fields(&task.fields) {
        out.significant(format!("task {group}/{}: {} changed", task.name, field.name));
    }

    match task.objects.as_slice() {
        [] => {}
        [only] if only.name == "Resources" => {
            out.note_change();
            if !only.objects.is_empty() {
                out.significant(format!("task {group}/{}: Resources changed", task.name));
                return;
            }
            for field in changed_fields(&only.fields) {
                let owner = match field.name.as_str() {
                    "CPU" => Some(ScalingKind::VerticalCpu),
                    "MemoryMB" => Some(ScalingKind::VerticalMem),
                    _ => None,
                };
                let covered = owner.is_some_and(|kind| job.has_task_scaling(group, &task.name, kind));
                if !covered {
                    out.significant(format!(
                        "task {group}/{}: {} changed without a matching scaling policy",
                        task.name, field.name
                    ));
                }
            }
        }
        objects => {
            for object in objects {
                out.significant(format!("task {group}/{}: {} changed", task.name, object.name));
            }
        }
    }
}

/// Copy autoscaler-owned values from the live side of `diff` onto `job`.
///
/// Group counts are kept when horizontal scaling is enabled; CPU and
/// memory when the task has the matching vertical policy. Only edited
/// values are carried; added or removed groups and tasks keep the desired
/// values.
pub fn carry_autoscaler_values(job: &mut JobSpec, diff: &JobDiff) {
    let horizontal: Vec<String> = job
        .task_groups
        .iter()
        .filter(|g| job.has_group_scaling(&g.name))
        .map(|g| g.name.clone())
        .collect();
    let vertical: Vec<(String, String, ScalingKind)> = job
        .task_groups
        .iter()
        .flat_map(|g| g.tasks.iter().map(move |t| (g, t)))
        .flat_map(|(g, t)| {
            [ScalingKind::VerticalCpu, ScalingKind::VerticalMem]
                .into_iter()
                .filter(|kind| job.has_task_scaling(&g.name, &t.name, *kind))
                .map(|kind| (g.name.clone(), t.name.clone(), kind))
                .collect::<Vec<_>>()
        })
        .collect();

    for group_diff in &diff.task_groups {
        let Some(group) = job.task_groups.iter_mut().find(|g| g.name == group_diff.name) else {
            continue;
        };

        if horizontal.contains(&group.name) {
            if let Some(field) = edited(&group_diff.fields, "Count") {
                match field.old.parse() {
                    Ok(count) => group.count = count,
                    Err(err) => warn!(group = %group.name, error = %err, "could not parse live count"),
                }
            }
        }

        for task_diff in &group_diff.tasks {
            let Some(task) = group.tasks.iter_mut().find(|t| t.name == task_diff.name) else {
                continue;
            };
            let Some(resources) = task_diff.objects.iter().find(|o| o.name == "Resources") else {
                continue;
            };
            for (g, t, kind) in &vertical {
                if *g != group.name || *t != task.name {
                    continue;
                }
                let (name, slot) = match kind {
                    ScalingKind::VerticalCpu => ("CPU", &mut task.resources.cpu),
                    ScalingKind::VerticalMem => ("MemoryMB", &mut task.resources.memory_mb),
                    ScalingKind::Horizontal => continue,
                };
                if let Some(field) = edited(&resources.fields, name) {
                    match field.old.parse() {
                        Ok(value) => *slot = value,
                        Err(err) => {
                            warn!(task = %task.name, field = name, error = %err, "could not parse live resource value")
                        }
                    }
                }
            }
        }
    }
}

fn is_stamp_marker(name: &str) -> bool {
    name == format!("Meta[{META_SRC_COMMIT}]") || name == format!("Meta[{META_FORCE_RESTART}]")
}

fn edited<'a>(fields: &'a [FieldDiff], name: &str) -> Option<&'a FieldDiff> {
    fields
        .iter()
        .find(|f| f.name == name && f.diff_type == DiffType::Edited)
}

fn changed_fields(fields: &[FieldDiff]) -> impl Iterator<Item = &FieldDiff> {
    fields.iter().filter(|f| f.diff_type != DiffType::None)
}

fn has_nested_changes(object: &ObjectDiff) -> bool {
    object.fields.iter().any(|f| f.diff_type != DiffType::None)
        || object.objects.iter().any(|o| o.diff_type != DiffType::None || has_nested_changes(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::diff_jobs;
    use mooring_core::types::{GroupScaling, Resources, ScalingPolicy, Task, TaskGroup};
    use rstest::rstest;

    fn job(horizontal: bool, policies: &[ScalingKind]) -> JobSpec {
        JobSpec {
            id: "api".into(),
            name: "api".into(),
            job_type: "service".into(),
            namespace: Some("default".into()),
            region: Some("global".into()),
            datacenters: vec!["dc1".into()],
            task_groups: vec![TaskGroup {
                name: "web".into(),
                count: 2,
                scaling: horizontal.then(|| GroupScaling { enabled: true, min: 1, max: 10 }),
                tasks: vec![Task {
                    name: "server".into(),
                    driver: "docker".into(),
                    resources: Resources { cpu: 500, memory_mb: 256 },
                    scaling_policies: policies
                        .iter()
                        .map(|kind| ScalingPolicy { kind: *kind, enabled: true })
                        .collect(),
                    ..Task::default()
                }],
                ..TaskGroup::default()
            }],
            ..JobSpec::default()
        }
    }

    fn field(name: &str, old: &str, new: &str) -> FieldDiff {
        FieldDiff {
            diff_type: DiffType::Edited,
            name: name.into(),
            old: old.into(),
            new: new.into(),
        }
    }

    fn stamped(commit: &str) -> JobSpec {
        let mut j = job(false, &[]);
        j.meta.insert(META_SRC_COMMIT.into(), commit.into());
        j
    }

    #[test]
    fn empty_diff_never_updates() {
        let j = job(false, &[]);
        let diff = diff_jobs(Some(&j), &j);
        for (force, restart) in [(false, false), (true, false), (false, true), (true, true)] {
            assert!(!has_update(&j, &diff, UpdatePolicy { force, restart }));
        }
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, true)]
    #[case(false, true, true)]
    fn commit_only_change_needs_a_flag(#[case] force: bool, #[case] restart: bool, #[case] expected: bool) {
        let live = stamped("aaa");
        let desired = stamped("bbb");
        let diff = diff_jobs(Some(&live), &desired);
        let assessment = assess(&desired, &diff);
        assert!(assessment.changed);
        assert!(!assessment.significant);
        assert_eq!(has_update(&desired, &diff, UpdatePolicy { force, restart }), expected);
    }

    #[test]
    fn commit_and_restart_markers_together_are_insignificant() {
        let live = stamped("aaa");
        let mut desired = stamped("bbb");
        desired.meta.insert(META_FORCE_RESTART.into(), "2026-01-01T00:00:00Z".into());
        let diff = diff_jobs(Some(&live), &desired);
        assert!(!has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn marker_plus_real_field_is_significant() {
        let live = stamped("aaa");
        let mut desired = stamped("bbb");
        desired.priority = 80;
        let diff = diff_jobs(Some(&live), &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    fn count_change_depends_on_horizontal_scaling(#[case] horizontal: bool, #[case] expected: bool) {
        let live = job(horizontal, &[]);
        let mut desired = job(horizontal, &[]);
        desired.task_groups[0].count = 7;
        let diff = diff_jobs(Some(&live), &desired);
        assert_eq!(has_update(&desired, &diff, UpdatePolicy::default()), expected);
    }

    #[test]
    fn scaled_count_still_applies_on_restart() {
        let live = job(true, &[]);
        let mut desired = job(true, &[]);
        desired.task_groups[0].count = 7;
        let diff = diff_jobs(Some(&live), &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy { force: false, restart: true }));
    }

    #[rstest]
    #[case(&[ScalingKind::VerticalCpu], "CPU", false)]
    #[case(&[ScalingKind::VerticalMem], "CPU", true)]
    #[case(&[ScalingKind::VerticalMem], "MemoryMB", false)]
    #[case(&[], "MemoryMB", true)]
    fn resource_change_needs_matching_policy(
        #[case] policies: &[ScalingKind],
        #[case] resource: &str,
        #[case] expected: bool,
    ) {
        let live = job(false, policies);
        let mut desired = job(false, policies);
        match resource {
            "CPU" => desired.task_groups[0].tasks[0].resources.cpu = 900,
            _ => desired.task_groups[0].tasks[0].resources.memory_mb = 1024,
        }
        let diff = diff_jobs(Some(&live), &desired);
        assert_eq!(has_update(&desired, &diff, UpdatePolicy::default()), expected);
    }

    #[test]
    fn task_field_change_is_significant() {
        let live = job(true, &[ScalingKind::VerticalCpu]);
        let mut desired = job(true, &[ScalingKind::VerticalCpu]);
        desired.task_groups[0].tasks[0].config.insert("image".into(), "api:2".into());
        let diff = diff_jobs(Some(&live), &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn top_level_object_change_is_significant() {
        let live = job(false, &[]);
        let mut desired = job(false, &[]);
        desired.datacenters.push("dc2".into());
        let diff = diff_jobs(Some(&live), &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn new_job_always_applies() {
        let desired = job(false, &[]);
        let diff = diff_jobs(None, &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn bare_scaling_object_is_insignificant() {
        let j = job(true, &[]);
        let diff = JobDiff {
            diff_type: DiffType::Edited,
            id: "api".into(),
            task_groups: vec![TaskGroupDiff {
                diff_type: DiffType::Edited,
                name: "web".into(),
                objects: vec![ObjectDiff {
                    diff_type: DiffType::Edited,
                    name: "Scaling".into(),
                    ..ObjectDiff::default()
                }],
                ..TaskGroupDiff::default()
            }],
            ..JobDiff::default()
        };
        let assessment = assess(&j, &diff);
        assert!(assessment.changed);
        assert!(!assessment.significant);
        assert!(has_update(&j, &diff, UpdatePolicy { force: true, restart: false }));
    }

    #[test]
    fn scaling_object_with_field_changes_is_significant() {
        let mut live = job(true, &[]);
        let desired = job(true, &[]);
        if let Some(s) = live.task_groups[0].scaling.as_mut() {
            s.max = 3;
        }
        let diff = diff_jobs(Some(&live), &desired);
        assert!(has_update(&desired, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn scaling_object_next_to_another_object_is_significant() {
        let j = job(true, &[]);
        let bare = |name: &str| ObjectDiff {
            diff_type: DiffType::Edited,
            name: name.into(),
            ..ObjectDiff::default()
        };
        let diff = JobDiff {
            diff_type: DiffType::Edited,
            task_groups: vec![TaskGroupDiff {
                diff_type: DiffType::Edited,
                name: "web".into(),
                objects: vec![bare("Scaling"), bare("Service")],
                ..TaskGroupDiff::default()
            }],
            ..JobDiff::default()
        };
        assert!(has_update(&j, &diff, UpdatePolicy::default()));
    }

    #[test]
    fn added_task_group_is_significant() {
        let live = job(true, &[]);
        let mut desired = job(true, &[]);
        desired.task_groups.push(TaskGroup {
            name: "worker".into(),
            count: 1,
            ..TaskGroup::default()
        });
        let diff = diff_jobs(Some(&live), &desired);
        let assessment = assess(&desired, &diff);
        assert!(assessment.significant);
        assert!(assessment.reasons.iter().any(|r| r.contains("worker added")));
    }

    #[test]
    fn carry_keeps_live_count_and_covered_resources() {
        let mut live = job(true, &[ScalingKind::VerticalCpu]);
        live.task_groups[0].count = 6;
        live.task_groups[0].tasks[0].resources = Resources { cpu: 1200, memory_mb: 512 };
        let mut desired = job(true, &[ScalingKind::VerticalCpu]);

        let diff = diff_jobs(Some(&live), &desired);
        carry_autoscaler_values(&mut desired, &diff);

        assert_eq!(desired.task_groups[0].count, 6);
        assert_eq!(desired.task_groups[0].tasks[0].resources.cpu, 1200);
        assert_eq!(desired.task_groups[0].tasks[0].resources.memory_mb, 256, "memory is not owned");
    }

    #[test]
    fn carry_leaves_unscaled_values_alone() {
        let mut live = job(false, &[]);
        live.task_groups[0].count = 6;
        let mut desired = job(false, &[]);
        let diff = diff_jobs(Some(&live), &desired);
        carry_autoscaler_values(&mut desired, &diff);
        assert_eq!(desired.task_groups[0].count, 2);
    }

    #[test]
    fn unparseable_live_value_is_ignored() {
        let mut desired = job(true, &[]);
        let diff = JobDiff {
            diff_type: DiffType::Edited,
            task_groups: vec![TaskGroupDiff {
                diff_type: DiffType::Edited,
                name: "web".into(),
                fields: vec![field("Count", "many", "2")],
                ..TaskGroupDiff::default()
            }],
            ..JobDiff::default()
        };
        carry_autoscaler_values(&mut desired, &diff);
        assert_eq!(desired.task_groups[0].count, 2);
    }
}
