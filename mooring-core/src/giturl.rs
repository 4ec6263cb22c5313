//! Repository URL helpers.
//!
//! Sources are routed by repository path (`org/repo`), which has to come
//! out the same for `https://host/org/repo.git`, `ssh://git@host/org/repo`
//! and scp-like `git@host:org/repo.git`.

use std::path::PathBuf;

use url::Url;

/// `org/repo` for any supported git URL form; `None` if nothing parses.
pub fn repo_path(raw: &str) -> Option<String> {
    let path = match scp_path(raw) {
        Some(p) => p.to_owned(),
        None => Url::parse(raw).ok()?.path().to_owned(),
    };
    let trimmed = normalize(&path);
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// True when `raw` points at repository `repo` (given as `org/repo`).
pub fn matches_repo(raw: &str, repo: &str) -> bool {
    repo_path(raw).is_some_and(|p| p == normalize(repo))
}

/// Filesystem checkout named by a `file://` URL.
pub fn local_checkout(raw: &str) -> Option<PathBuf> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

fn normalize(path: &str) -> &str {
    let path = path.trim_matches('/');
    path.strip_suffix(".git").unwrap_or(path)
}

// `user@host:path`, no scheme. A colon after the first slash is a port or a
// Windows drive, not scp syntax.
fn scp_path(raw: &str) -> Option<&str> {
    if raw.contains("://") {
        return None;
    }
    let colon = raw.find(':')?;
    if raw[..colon].contains('/') {
        return None;
    }
    Some(&raw[colon + 1..])
}
