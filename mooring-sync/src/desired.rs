//! Desired-state watcher over local checkouts.
//!
//! A source resolves to `<repos_dir>/<org/repo>/<path>`, or to the
//! directory of a `file://` URL joined with `<path>`. The path may name a
//! single job file or a directory of them (`.json`, `.yaml`, `.yml`, not
//! recursive). The provenance tag is a SHA-256 over file names and
//! contents, so it changes exactly when a job file changes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use mooring_core::error::{io_err, CoreError};
use mooring_core::giturl;
use mooring_core::ports::DesiredStateWatcher;
use mooring_core::types::{DesiredState, GitInfo, JobInfo, JobSpec, Source};

const JOB_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    repos_dir: PathBuf,
}

impl DirectoryWatcher {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
        }
    }

    /// Checkout directory for `source`, before joining its job path.
    pub fn checkout_dir(&self, source: &Source) -> Result<PathBuf, CoreError> {
        if let Some(local) = giturl::local_checkout(&source.url) {
            return Ok(local);
        }
        let repo = giturl::repo_path(&source.url).ok_or_else(|| CoreError::InvalidSource {
            id: source.id.0.clone(),
            reason: format!("cannot derive a repository path from {}", source.url),
        })?;
        Ok(self.repos_dir.join(repo))
    }

    fn load(&self, source: &Source) -> Result<DesiredState, CoreError> {
        let root = self.checkout_dir(source)?.join(source.path.trim_start_matches('/'));
        let files = job_files(&root)?;

        let mut hasher = Sha256::new();
        let mut jobs = Vec::new();
        for path in files {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            if let Some(name) = path.file_name() {
                hasher.update(name.to_string_lossy().as_bytes());
            }
            hasher.update(contents.as_bytes());
            match parse_job(&path, &contents) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!(file = %path.display(), error = %err, "skipping unparseable job file"),
            }
        }
        let git_info = GitInfo {
            git_commit: hex::encode(hasher.finalize())[..40].to_owned(),
        };

        let mut state = DesiredState {
            git_info: git_info.clone(),
            ..DesiredState::default()
        };
        for job in jobs {
            if state.jobs.contains_key(&job.name) {
                return Err(CoreError::InvalidSource {
                    id: source.id.0.clone(),
                    reason: format!("job {} is defined more than once", job.name),
                });
            }
            state.jobs.insert(
                job.name.clone(),
                JobInfo {
                    git_info: git_info.clone(),
                    job,
                },
            );
        }
        Ok(state)
    }
}

#[async_trait]
impl DesiredStateWatcher for DirectoryWatcher {
    async fn fetch_desired_state(&self, source: &Source) -> Result<DesiredState, CoreError> {
        let watcher = self.clone();
        let source = source.clone();
        tokio::task::spawn_blocking(move || watcher.load(&source))
            .await
            .map_err(|err| CoreError::Backend(format!("checkout read join error: {err}")))?
    }
}

fn job_files(root: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if meta.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|e| io_err(root, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| JOB_EXTENSIONS.contains(&e))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Read one job file, JSON or YAML by extension.
pub fn read_job_file(path: &Path) -> Result<JobSpec, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_job(path, &contents)
}

fn parse_job(path: &Path, contents: &str) -> Result<JobSpec, CoreError> {
    let mut job: JobSpec = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(contents)?,
        _ => serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?,
    };
    if job.name.is_empty() {
        job.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_for(dir: &Path, path: &str) -> Source {
        let url = format!("file://{}", dir.display());
        Source::new("local", url, "main", path)
    }

    #[tokio::test]
    async fn reads_every_job_file_in_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let jobs = tmp.path().join("deploy");
        std::fs::create_dir_all(&jobs).expect("mkdir");
        std::fs::write(jobs.join("api.yaml"), "name: api\ntype: service\n").expect("write");
        std::fs::write(jobs.join("batch.json"), r#"{"type": "batch"}"#).expect("write");
        std::fs::write(jobs.join("README.md"), "not a job").expect("write");

        let watcher = DirectoryWatcher::new(tmp.path().join("unused"));
        let state = watcher
            .fetch_desired_state(&source_for(tmp.path(), "deploy"))
            .await
            .expect("fetch");

        assert_eq!(state.jobs.len(), 2);
        assert_eq!(state.jobs["batch"].job.job_type, "batch");
        assert_eq!(state.git_info.git_commit.len(), 40);
        assert_eq!(state.jobs["api"].git_info, state.git_info);
    }

    #[tokio::test]
    async fn revision_changes_with_content() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("api.yaml");
        std::fs::write(&file, "name: api\npriority: 50\n").expect("write");
        let watcher = DirectoryWatcher::new(tmp.path());
        let src = source_for(tmp.path(), "api.yaml");

        let first = watcher.fetch_desired_state(&src).await.expect("first");
        let again = watcher.fetch_desired_state(&src).await.expect("again");
        std::fs::write(&file, "name: api\npriority: 70\n").expect("rewrite");
        let changed = watcher.fetch_desired_state(&src).await.expect("changed");

        assert_eq!(first.git_info, again.git_info);
        assert_ne!(first.git_info, changed.git_info);
    }

    #[tokio::test]
    async fn unparseable_files_are_skipped() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join("good.yaml"), "name: good\n").expect("write");
        std::fs::write(tmp.path().join("bad.yaml"), "name: [oops").expect("write");
        let watcher = DirectoryWatcher::new(tmp.path());
        let state = watcher
            .fetch_desired_state(&source_for(tmp.path(), ""))
            .await
            .expect("fetch");
        assert_eq!(state.jobs.keys().collect::<Vec<_>>(), vec!["good"]);
    }

    #[tokio::test]
    async fn duplicate_job_names_are_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join("a.yaml"), "name: api\n").expect("write");
        std::fs::write(tmp.path().join("b.yaml"), "name: api\n").expect("write");
        let watcher = DirectoryWatcher::new(tmp.path());
        let err = watcher
            .fetch_desired_state(&source_for(tmp.path(), ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn missing_checkout_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let watcher = DirectoryWatcher::new(tmp.path());
        let src = Source::new("remote", "git@github.com:acme/platform.git", "main", "jobs");
        assert_eq!(
            watcher.checkout_dir(&src).expect("dir"),
            tmp.path().join("acme/platform")
        );
        assert!(watcher.fetch_desired_state(&src).await.is_err());
    }
}
