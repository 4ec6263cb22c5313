use std::path::{Path, PathBuf};

use mooring_core::paths::mooring_dir_at;

pub const DAEMON_SOCKET: &str = "mooring.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    mooring_dir_at(home).join(DAEMON_SOCKET)
}
