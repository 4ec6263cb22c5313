//! Structural differ between a live job and the job about to be registered.
//!
//! Only changed nodes are emitted. Server-populated attributes (status,
//! parent id) are not compared.
//!
//! Field names follow the orchestrator's plan output: top-level `Name`,
//! `Type`, `Priority`, `Namespace`, `Region`, `Meta[k]`; objects
//! `Datacenters`, `Periodic`, `Vault`; group field `Count`; group objects
//! `Scaling`, `Service`; task fields `Driver`, `Env[k]`, `Config[k]`; task
//! objects `Resources`, `Scaling[kind]`.

use std::collections::{BTreeMap, BTreeSet};

use mooring_core::plan::{DiffType, FieldDiff, JobDiff, ObjectDiff, TaskDiff, TaskGroupDiff};
use mooring_core::types::{GroupScaling, JobSpec, Resources, Service, Task, TaskGroup};

/// Diff `desired` against `live`; `live = None` yields an `Added` job diff.
pub fn diff_jobs(live: Option<&JobSpec>, desired: &JobSpec) -> JobDiff {
    let empty = JobSpec::default();
    let old = live.unwrap_or(&empty);

    let mut fields = Vec::new();
    push_field(&mut fields, "Name", opt(&old.name), opt(&desired.name));
    push_field(&mut fields, "Type", opt(&old.job_type), opt(&desired.job_type));
    push_field(
        &mut fields,
        "Priority",
        live.map(|j| j.priority.to_string()),
        Some(desired.priority.to_string()),
    );
    push_field(&mut fields, "Namespace", old.namespace.clone(), desired.namespace.clone());
    push_field(&mut fields, "Region", old.region.clone(), desired.region.clone());
    fields.extend(map_fields("Meta", &old.meta, &desired.meta));

    let mut objects = Vec::new();
    objects.extend(list_object("Datacenters", &old.datacenters, &desired.datacenters));
    if old.periodic != desired.periodic {
        let mut periodic = Vec::new();
        push_field(
            &mut periodic,
            "Enabled",
            old.periodic.then(|| "true".to_string()),
            desired.periodic.then(|| "true".to_string()),
        );
        objects.extend(object("Periodic", periodic, vec![]));
    }
    let mut vault = Vec::new();
    push_field(&mut vault, "Token", old.vault_token.clone(), desired.vault_token.clone());
    objects.extend(object("Vault", vault, vec![]));

    let task_groups = pair_by_name(&old.task_groups, &desired.task_groups, |g| &g.name)
        .into_iter()
        .filter_map(|(name, o, n)| diff_group(name, o, n))
        .collect();

    let diff_type = match live {
        None => DiffType::Added,
        Some(_) => DiffType::Edited,
    };
    let mut diff = JobDiff {
        diff_type,
        id: desired.id.clone(),
        fields,
        objects,
        task_groups,
    };
    if diff.is_empty() {
        diff.diff_type = DiffType::None;
    }
    diff
}

fn diff_group(name: &str, old: Option<&TaskGroup>, new: Option<&TaskGroup>) -> Option<TaskGroupDiff> {
    let empty = TaskGroup::default();
    let (o, n) = (old.unwrap_or(&empty), new.unwrap_or(&empty));

    let mut fields = Vec::new();
    push_field(
        &mut fields,
        "Count",
        old.map(|g| g.count.to_string()),
        new.map(|g| g.count.to_string()),
    );

    let mut objects = Vec::new();
    objects.extend(scaling_object(o.scaling.as_ref(), n.scaling.as_ref()));
    for (svc, os, ns) in pair_by_name(&o.services, &n.services, |s| &s.name) {
        objects.extend(service_object(svc, os, ns));
    }

    let tasks: Vec<TaskDiff> = pair_by_name(&o.tasks, &n.tasks, |t| &t.name)
        .into_iter()
        .filter_map(|(task, ot, nt)| diff_task(task, ot, nt))
        .collect();

    if fields.is_empty() && objects.is_empty() && tasks.is_empty() {
        return None;
    }
    Some(TaskGroupDiff {
        diff_type: presence(old.is_some(), new.is_some()),
        name: name.to_owned(),
        fields,
        objects,
        tasks,
    })
}

fn diff_task(name: &str, old: Option<&Task>, new: Option<&Task>) -> Option<TaskDiff> {
    let empty = Task::default();
    let (o, n) = (old.unwrap_or(&empty), new.unwrap_or(&empty));

    let mut fields = Vec::new();
    push_field(
        &mut fields,
        "Driver",
        old.map(|t| t.driver.clone()),
        new.map(|t| t.driver.clone()),
    );
    fields.extend(map_fields("Env", &o.env, &n.env));
    fields.extend(map_fields("Config", &o.config, &n.config));

    let mut objects = Vec::new();
    objects.extend(resources_object(old.map(|t| &t.resources), new.map(|t| &t.resources)));
    let old_policies: BTreeMap<String, bool> = o
        .scaling_policies
        .iter()
        .map(|p| (p.kind.to_string(), p.enabled))
        .collect();
    let new_policies: BTreeMap<String, bool> = n
        .scaling_policies
        .iter()
        .map(|p| (p.kind.to_string(), p.enabled))
        .collect();
    let kinds: BTreeSet<&String> = old_policies.keys().chain(new_policies.keys()).collect();
    for kind in kinds {
        let mut policy = Vec::new();
        push_field(
            &mut policy,
            "Enabled",
            old_policies.get(kind).map(|e| e.to_string()),
            new_policies.get(kind).map(|e| e.to_string()),
        );
        objects.extend(object(&format!("Scaling[{kind}]"), policy, vec![]));
    }

    if fields.is_empty() && objects.is_empty() {
        return None;
    }
    Some(TaskDiff {
        diff_type: presence(old.is_some(), new.is_some()),
        name: name.to_owned(),
        fields,
        objects,
    })
}

fn scaling_object(old: Option<&GroupScaling>, new: Option<&GroupScaling>) -> Option<ObjectDiff> {
    let mut fields = Vec::new();
    push_field(&mut fields, "Enabled", old.map(|s| s.enabled.to_string()), new.map(|s| s.enabled.to_string()));
    push_field(&mut fields, "Min", old.map(|s| s.min.to_string()), new.map(|s| s.min.to_string()));
    push_field(&mut fields, "Max", old.map(|s| s.max.to_string()), new.map(|s| s.max.to_string()));
    object("Scaling", fields, vec![])
}

fn service_object(name: &str, old: Option<&Service>, new: Option<&Service>) -> Option<ObjectDiff> {
    let mut fields = Vec::new();
    push_field(&mut fields, "Name", old.map(|_| name.to_owned()), new.map(|_| name.to_owned()));
    push_field(
        &mut fields,
        "PortLabel",
        old.map(|s| s.port_label.clone()),
        new.map(|s| s.port_label.clone()),
    );
    object("Service", fields, vec![])
}

fn resources_object(old: Option<&Resources>, new: Option<&Resources>) -> Option<ObjectDiff> {
    let mut fields = Vec::new();
    push_field(&mut fields, "CPU", old.map(|r| r.cpu.to_string()), new.map(|r| r.cpu.to_string()));
    push_field(
        &mut fields,
        "MemoryMB",
        old.map(|r| r.memory_mb.to_string()),
        new.map(|r| r.memory_mb.to_string()),
    );
    object("Resources", fields, vec![])
}

fn list_object(name: &str, old: &[String], new: &[String]) -> Option<ObjectDiff> {
    let old_set: BTreeSet<&String> = old.iter().collect();
    let new_set: BTreeSet<&String> = new.iter().collect();
    let mut fields = Vec::new();
    for gone in old_set.difference(&new_set) {
        push_field(&mut fields, name, Some((*gone).clone()), None);
    }
    for added in new_set.difference(&old_set) {
        push_field(&mut fields, name, None, Some((*added).clone()));
    }
    object(name, fields, vec![])
}

fn map_fields(prefix: &str, old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Vec<FieldDiff> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let mut out = Vec::new();
    for key in keys {
        push_field(
            &mut out,
            &format!("{prefix}[{key}]"),
            old.get(key).cloned(),
            new.get(key).cloned(),
        );
    }
    out
}

fn object(name: &str, fields: Vec<FieldDiff>, objects: Vec<ObjectDiff>) -> Option<ObjectDiff> {
    if fields.is_empty() && objects.is_empty() {
        return None;
    }
    let all_added = fields.iter().all(|f| f.diff_type == DiffType::Added);
    let all_deleted = fields.iter().all(|f| f.diff_type == DiffType::Deleted);
    let diff_type = match (all_added, all_deleted) {
        (true, false) => DiffType::Added,
        (false, true) => DiffType::Deleted,
        _ => DiffType::Edited,
    };
    Some(ObjectDiff {
        diff_type,
        name: name.to_owned(),
        fields,
        objects,
    })
}

fn push_field(out: &mut Vec<FieldDiff>, name: &str, old: Option<String>, new: Option<String>) {
    if let Some(diff) = FieldDiff::between(name, old, new) {
        out.push(diff);
    }
}

fn opt(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

fn presence(old: bool, new: bool) -> DiffType {
    match (old, new) {
        (false, true) => DiffType::Added,
        (true, false) => DiffType::Deleted,
        _ => DiffType::Edited,
    }
}

/// Union of both lists by name, in desired order then live-only leftovers.
fn pair_by_name<'a, T>(
    old: &'a [T],
    new: &'a [T],
    name: impl Fn(&T) -> &String,
) -> Vec<(&'a str, Option<&'a T>, Option<&'a T>)> {
    let mut out: Vec<(&'a str, Option<&'a T>, Option<&'a T>)> = Vec::new();
    for n in new {
        let key = name(n);
        let o = old.iter().find(|o| name(o) == key);
        out.push((key.as_str(), o, Some(n)));
    }
    for o in old {
        let key = name(o);
        if !new.iter().any(|n| name(n) == key) {
            out.push((key.as_str(), Some(o), None));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooring_core::types::{ScalingKind, ScalingPolicy};

    fn job() -> JobSpec {
        JobSpec {
            id: "api".into(),
            name: "api".into(),
            job_type: "service".into(),
            namespace: Some("default".into()),
            region: Some("global".into()),
            datacenters: vec!["dc1".into()],
            priority: 50,
            task_groups: vec![TaskGroup {
                name: "web".into(),
                count: 2,
                tasks: vec![Task {
                    name: "server".into(),
                    driver: "docker".into(),
                    resources: Resources { cpu: 500, memory_mb: 256 },
                    ..Task::default()
                }],
                ..TaskGroup::default()
            }],
            ..JobSpec::default()
        }
    }

    #[test]
    fn identical_jobs_have_empty_diff() {
        let diff = diff_jobs(Some(&job()), &job());
        assert!(diff.is_empty());
        assert_eq!(diff.diff_type, DiffType::None);
    }

    #[test]
    fn missing_live_job_is_added() {
        let diff = diff_jobs(None, &job());
        assert_eq!(diff.diff_type, DiffType::Added);
        assert!(diff.fields.iter().any(|f| f.name == "Name" && f.diff_type == DiffType::Added));
        assert_eq!(diff.task_groups[0].diff_type, DiffType::Added);
    }

    #[test]
    fn meta_change_is_a_top_level_field() {
        let live = job();
        let mut desired = job();
        desired.meta.insert("mooringsrccommit".into(), "abc".into());
        let diff = diff_jobs(Some(&live), &desired);
        assert_eq!(diff.fields.len(), 1);
        assert_eq!(diff.fields[0].name, "Meta[mooringsrccommit]");
        assert!(diff.objects.is_empty());
        assert!(diff.task_groups.is_empty());
    }

    #[test]
    fn count_change_lands_on_group_fields() {
        let live = job();
        let mut desired = job();
        desired.task_groups[0].count = 5;
        let diff = diff_jobs(Some(&live), &desired);
        let group = diff.task_group("web").expect("group diff");
        assert_eq!(group.fields.len(), 1);
        assert_eq!(group.fields[0].name, "Count");
        assert_eq!(group.fields[0].old, "2");
        assert_eq!(group.fields[0].new, "5");
    }

    #[test]
    fn cpu_change_lands_on_task_resources() {
        let live = job();
        let mut desired = job();
        desired.task_groups[0].tasks[0].resources.cpu = 800;
        let diff = diff_jobs(Some(&live), &desired);
        let task = &diff.task_group("web").expect("group").tasks[0];
        assert!(task.fields.is_empty());
        assert_eq!(task.objects.len(), 1);
        assert_eq!(task.objects[0].name, "Resources");
        assert_eq!(task.objects[0].fields[0].name, "CPU");
    }

    #[test]
    fn datacenter_change_is_an_object() {
        let live = job();
        let mut desired = job();
        desired.datacenters = vec!["dc1".into(), "dc2".into()];
        let diff = diff_jobs(Some(&live), &desired);
        assert_eq!(diff.objects.len(), 1);
        assert_eq!(diff.objects[0].name, "Datacenters");
        assert_eq!(diff.objects[0].fields[0].new, "dc2");
    }

    #[test]
    fn new_scaling_policy_is_a_task_object() {
        let live = job();
        let mut desired = job();
        desired.task_groups[0].tasks[0].scaling_policies.push(ScalingPolicy {
            kind: ScalingKind::VerticalMem,
            enabled: true,
        });
        let diff = diff_jobs(Some(&live), &desired);
        let task = &diff.task_group("web").expect("group").tasks[0];
        assert_eq!(task.objects[0].name, "Scaling[vertical_mem]");
        assert_eq!(task.objects[0].diff_type, DiffType::Added);
    }

    #[test]
    fn removed_group_is_deleted() {
        let mut live = job();
        live.task_groups.push(TaskGroup {
            name: "worker".into(),
            count: 1,
            ..TaskGroup::default()
        });
        let diff = diff_jobs(Some(&live), &job());
        let group = diff.task_group("worker").expect("worker diff");
        assert_eq!(group.diff_type, DiffType::Deleted);
    }
}
