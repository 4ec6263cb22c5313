//! Reconciliation daemon: per-source loops, their supervisor and the control socket.

pub mod config;
mod error;
pub mod manager;
pub mod notify;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod supervisor;
pub mod worker;

pub use config::DaemonConfig;
pub use error::DaemonError;
pub use manager::Manager;
pub use notify::{FanoutNotifier, LogNotifier};
pub use protocol::{
    request_pause, request_remove_source, request_status, request_stop, request_sync,
    request_sync_repo, request_upsert_source, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{assemble, init_tracing, run, start_blocking};
pub use supervisor::Supervisor;
pub use worker::{LoopContext, LoopSettings, Signal};
