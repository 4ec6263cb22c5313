//! Daemon configuration, resolved from `MOORING_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use mooring_core::paths;

use crate::error::DaemonError;

pub const POLLING_INTERVAL_ENV: &str = "MOORING_POLLING_INTERVAL";
pub const ERROR_RETRY_COUNT_ENV: &str = "MOORING_ERROR_RETRY_COUNT";
pub const APP_NAME_ENV: &str = "MOORING_APP_NAME";
pub const REPOS_DIR_ENV: &str = "MOORING_REPOS_DIR";
pub const LOG_JSON_ENV: &str = "MOORING_LOG_JSON";

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ERROR_RETRY_COUNT: u32 = 2;
pub const DEFAULT_APP_NAME: &str = "mooring";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub home: PathBuf,
    /// Checkout root the directory watcher resolves repositories under.
    pub repos_dir: PathBuf,
    pub polling_interval: Duration,
    /// Consecutive failed cycles before an error notification is sent.
    pub error_retry_count: u32,
    /// Used only to label metrics.
    pub app_name: String,
    pub log_json: bool,
}

impl DaemonConfig {
    pub fn defaults(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            repos_dir: paths::repos_dir_at(home),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            error_retry_count: DEFAULT_ERROR_RETRY_COUNT,
            app_name: DEFAULT_APP_NAME.to_owned(),
            log_json: false,
        }
    }

    pub fn from_env() -> Result<Self, DaemonError> {
        let home = paths::home()?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    /// Resolve every setting through `lookup`; unset or blank values keep the default.
    pub fn from_lookup(
        home: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DaemonError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut config = Self::defaults(home);

        if let Some(raw) = get(POLLING_INTERVAL_ENV) {
            let interval = humantime::parse_duration(&raw).map_err(|e| DaemonError::Config {
                var: POLLING_INTERVAL_ENV,
                reason: e.to_string(),
            })?;
            if interval.is_zero() {
                return Err(DaemonError::Config {
                    var: POLLING_INTERVAL_ENV,
                    reason: "must be greater than zero".into(),
                });
            }
            config.polling_interval = interval;
        }
        if let Some(raw) = get(ERROR_RETRY_COUNT_ENV) {
            config.error_retry_count = raw.parse().map_err(|e: std::num::ParseIntError| {
                DaemonError::Config {
                    var: ERROR_RETRY_COUNT_ENV,
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(name) = get(APP_NAME_ENV) {
            config.app_name = name;
        }
        if let Some(dir) = get(REPOS_DIR_ENV) {
            config.repos_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(LOG_JSON_ENV) {
            config.log_json = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(config)
    }

    pub fn log_resolved(&self) {
        info!(
            home = %self.home.display(),
            repos_dir = %self.repos_dir.display(),
            polling_interval = %humantime::format_duration(self.polling_interval),
            error_retry_count = self.error_retry_count,
            app_name = %self.app_name,
            "resolved daemon configuration",
        );
    }
}
