//! Registry and store integration tests against a throwaway home directory.

use assert_fs::prelude::*;
use mooring_core::{
    registry, store,
    types::{Source, SourceId, SourceStatus, SyncStatus},
    CoreError,
};
use predicates::prelude::predicate;
use std::fs;

fn source(id: &str) -> Source {
    Source::new(id, "https://git.example.com/acme/platform.git", "main", "jobs")
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_source_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = registry::load_source_at(home.path(), &SourceId::from("api")).unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)), "got: {err}");
    assert!(err.to_string().contains("source api"));
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".mooring").join("sources");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("api.yaml"), b"- this is a list, not a mapping\n").expect("write");

    let err = registry::load_source_at(home.path(), &SourceId::from("api")).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("api.yaml"));
}

// ---------------------------------------------------------------------------
// 2. Save layout
// ---------------------------------------------------------------------------

#[test]
fn save_writes_yaml_under_sources_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut src = source("api");
    src.data_center = "dc1,dc2".into();
    registry::save_source_at(home.path(), &src).expect("save");

    home.child(".mooring/sources/api.yaml")
        .assert(predicate::path::exists())
        .assert(predicate::str::contains("data_center: dc1,dc2"));
}

#[test]
fn save_rejects_path_like_ids() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = registry::save_source_at(home.path(), &source("../escape")).unwrap_err();
    assert!(matches!(err, CoreError::InvalidSource { .. }), "got: {err}");
    home.child(".mooring/sources").assert(predicate::path::missing());
}

#[test]
fn update_replaces_previous_document() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut src = source("api");
    registry::save_source_at(home.path(), &src).expect("save");
    src.paused = true;
    registry::save_source_at(home.path(), &src).expect("save again");

    let all = registry::list_sources_at(home.path()).expect("list");
    assert_eq!(all.len(), 1);
    assert!(all[0].paused);
}

// ---------------------------------------------------------------------------
// 3. Status store alongside the registry
// ---------------------------------------------------------------------------

#[test]
fn statuses_are_independent_of_sources() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let id = SourceId::from("api");
    store::save_status_at(home.path(), &id, &SourceStatus::new(SyncStatus::Error, "boom"))
        .expect("save status");
    registry::remove_source_at(home.path(), &id).expect("remove");

    let status = store::load_status_at(home.path(), &id)
        .expect("load")
        .expect("still there");
    assert_eq!(status.status, SyncStatus::Error);
    home.child(".mooring/status/api.json")
        .assert(predicate::str::contains("\"error\""));
}
