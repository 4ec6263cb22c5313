//! Structured plan diff between a live job and the job about to be registered.
//!
//! Mirrors the shape orchestrators report from a dry-run plan: top-level
//! field and object changes, then one section per task group and per task.
//! Nodes whose `diff_type` is [`DiffType::None`] carry no change and are
//! never emitted by the differ.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiffType {
    Added,
    Deleted,
    Edited,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub diff_type: DiffType,
    pub name: String,
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
}

impl FieldDiff {
    /// Classify a scalar change; `None` when both sides are equal.
    pub fn between(name: impl Into<String>, old: Option<String>, new: Option<String>) -> Option<Self> {
        let diff_type = match (&old, &new) {
            (None, None) => return None,
            (None, Some(_)) => DiffType::Added,
            (Some(_), None) => DiffType::Deleted,
            (Some(o), Some(n)) if o == n => return None,
            (Some(_), Some(_)) => DiffType::Edited,
        };
        Some(Self {
            diff_type,
            name: name.into(),
            old: old.unwrap_or_default(),
            new: new.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDiff {
    pub diff_type: DiffType,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDiff>,
    #[serde(default)]
    pub objects: Vec<ObjectDiff>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.objects.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDiff {
    pub diff_type: DiffType,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDiff>,
    #[serde(default)]
    pub objects: Vec<ObjectDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupDiff {
    pub diff_type: DiffType,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDiff>,
    #[serde(default)]
    pub objects: Vec<ObjectDiff>,
    #[serde(default)]
    pub tasks: Vec<TaskDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDiff {
    pub diff_type: DiffType,
    pub id: String,
    #[serde(default)]
    pub fields: Vec<FieldDiff>,
    #[serde(default)]
    pub objects: Vec<ObjectDiff>,
    #[serde(default)]
    pub task_groups: Vec<TaskGroupDiff>,
}

impl JobDiff {
    /// True when no node of the diff records a change.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.objects.is_empty() && self.task_groups.is_empty()
    }

    pub fn task_group(&self, name: &str) -> Option<&TaskGroupDiff> {
        self.task_groups.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_produce_no_field_diff() {
        assert!(FieldDiff::between("Count", Some("2".into()), Some("2".into())).is_none());
        assert!(FieldDiff::between("Count", None, None).is_none());
    }

    #[test]
    fn field_diff_classification() {
        let added = FieldDiff::between("Meta[a]", None, Some("x".into())).expect("added");
        assert_eq!(added.diff_type, DiffType::Added);
        let deleted = FieldDiff::between("Meta[a]", Some("x".into()), None).expect("deleted");
        assert_eq!(deleted.diff_type, DiffType::Deleted);
        assert_eq!(deleted.new, "");
        let edited = FieldDiff::between("CPU", Some("100".into()), Some("200".into())).expect("edited");
        assert_eq!(edited.diff_type, DiffType::Edited);
        assert_eq!(edited.old, "100");
    }
}
