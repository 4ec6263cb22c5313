//! Job spec and source document parsing.
//!
//! Job files are hand-written, so every field except the name must default.

use mooring_core::types::{JobSpec, ScalingKind, Source, SyncStatus};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FULL_YAML: &str = r#"
id: api
name: api
type: service
datacenters: [dc1, dc2]
priority: 50
meta:
  team: payments
task_groups:
  - name: web
    count: 3
    scaling: { enabled: true, min: 1, max: 10 }
    services:
      - { name: api-http, port_label: http }
    tasks:
      - name: server
        driver: docker
        resources: { cpu: 500, memory_mb: 256 }
        scaling_policies:
          - kind: vertical_cpu
        config:
          image: "acme/api:1.4.2"
"#;

const FULL_JSON: &str = r#"{
  "id": "api",
  "name": "api",
  "type": "service",
  "datacenters": ["dc1", "dc2"],
  "priority": 50,
  "meta": { "team": "payments" },
  "task_groups": [{
    "name": "web",
    "count": 3,
    "scaling": { "enabled": true, "min": 1, "max": 10 },
    "services": [{ "name": "api-http", "port_label": "http" }],
    "tasks": [{
      "name": "server",
      "driver": "docker",
      "resources": { "cpu": 500, "memory_mb": 256 },
      "scaling_policies": [{ "kind": "vertical_cpu" }],
      "config": { "image": "acme/api:1.4.2" }
    }]
  }]
}"#;

fn parse(format: &str, text: &str) -> JobSpec {
    match format {
        "yaml" => serde_yaml::from_str(text).expect("yaml job"),
        "json" => serde_json::from_str(text).expect("json job"),
        other => panic!("unknown format {other}"),
    }
}

// ---------------------------------------------------------------------------
// Both formats describe the same job
// ---------------------------------------------------------------------------

#[rstest]
#[case("yaml", FULL_YAML)]
#[case("json", FULL_JSON)]
fn full_job_parses(#[case] format: &str, #[case] text: &str) {
    let job = parse(format, text);
    assert_eq!(job.name, "api", "[{format}] name");
    assert_eq!(job.job_type, "service", "[{format}] type");
    assert_eq!(job.datacenters, vec!["dc1", "dc2"], "[{format}] datacenters");
    let group = job.group("web").expect("group");
    assert_eq!(group.count, 3, "[{format}] count");
    assert!(job.has_group_scaling("web"), "[{format}] scaling");
    let task = group.task("server").expect("task");
    assert_eq!(task.resources.cpu, 500, "[{format}] cpu");
    assert!(task.scaling_policies[0].enabled, "[{format}] policy defaults to enabled");
    assert!(job.has_task_scaling("web", "server", ScalingKind::VerticalCpu));
}

#[test]
fn yaml_and_json_agree() {
    assert_eq!(parse("yaml", FULL_YAML), parse("json", FULL_JSON));
}

#[test]
fn minimal_job_defaults_everything_else() {
    let job: JobSpec = serde_yaml::from_str("name: batch\n").expect("minimal job");
    assert_eq!(job.name, "batch");
    assert!(job.namespace.is_none());
    assert!(job.task_groups.is_empty());
    assert!(!job.periodic);
    assert!(job.parent_id.is_none());
}

#[test]
fn source_document_defaults_flags() {
    let yaml = "id: api\nname: API\nurl: https://git.example.com/acme/api.git\nbranch: main\npath: deploy\n";
    let src: Source = serde_yaml::from_str(yaml).expect("source");
    assert!(!src.paused);
    assert!(!src.force);
    assert!(src.vault_token_id.is_none());
    assert!(src.data_center.is_empty());
}

#[rstest]
#[case(SyncStatus::Init, "init")]
#[case(SyncStatus::Syncing, "syncing")]
#[case(SyncStatus::Synced, "synced")]
#[case(SyncStatus::SyncedWithError, "syncedwitherror")]
#[case(SyncStatus::Error, "error")]
#[case(SyncStatus::Paused, "paused")]
#[case(SyncStatus::OutOfSync, "outofsync")]
#[case(SyncStatus::Unknown, "unknown")]
fn sync_status_display_matches_wire_name(#[case] status: SyncStatus, #[case] wire: &str) {
    assert_eq!(status.to_string(), wire);
    let json = serde_json::to_string(&status).expect("serialize");
    assert_eq!(json, format!("\"{wire}\""));
}
