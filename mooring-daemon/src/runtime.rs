use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use mooring_core::paths::mooring_dir_at;
use mooring_core::ports::{ClusterApi, Notifier};
use mooring_core::registry::{SourceRegistry, TokenStore};
use mooring_core::store::{EventLog, StatusStore};
use mooring_core::types::{Source, SourceId};
use mooring_sync::{DirectoryWatcher, MemoryBackend, PlanningCluster, Reconciler};

use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::manager::Manager;
use crate::notify::{FanoutNotifier, LogNotifier};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::supervisor::Supervisor;
use crate::worker::{LoopContext, LoopSettings};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.log_json);
    config.log_resolved();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Wire the file-backed stores, the directory watcher and the in-memory
/// orchestrator backend into a manager.
///
/// The receiver yields loop faults the supervisor could not recover from.
pub fn assemble(config: &DaemonConfig) -> (Manager, mpsc::UnboundedReceiver<DaemonError>) {
    let home = config.home.as_path();
    let cluster: Arc<dyn ClusterApi> =
        Arc::new(PlanningCluster::new(Arc::new(MemoryBackend::new())));
    let targets: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    let notifier: Arc<dyn Notifier> = Arc::new(FanoutNotifier::new(targets));
    let reconciler = Arc::new(Reconciler::new(
        cluster,
        Arc::new(EventLog::new(home)),
        notifier.clone(),
    ));
    let ctx = LoopContext {
        watcher: Arc::new(DirectoryWatcher::new(&config.repos_dir)),
        tokens: Arc::new(TokenStore::new(home)),
        status: Arc::new(StatusStore::new(home)),
        notifier,
        settings: LoopSettings::from(config),
    };
    let (supervisor, faults) = Supervisor::new(ctx);
    let manager = Manager::new(supervisor, Arc::new(SourceRegistry::new(home)), reconciler);
    (manager, faults)
}

/// Run the daemon runtime.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config.home)?;

    let (manager, faults) = assemble(&config);
    let manager = Arc::new(manager);
    manager.start().await?;
    let started_at_unix = unix_seconds_now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = config.home.clone();
        let manager = manager.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                manager,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let fault_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { fault_task(faults, shutdown).await })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, fault_result, signal_result) =
        tokio::join!(socket_handle, fault_handle, signal_handle);

    manager.supervisor().stop_all().await?;

    handle_join("socket_server", socket_result)?;
    handle_join("fault_monitor", fault_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// A loop that could not be restarted takes the whole daemon down.
async fn fault_task(
    mut faults: mpsc::UnboundedReceiver<DaemonError>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        fault = faults.recv() => match fault {
            Some(err) => {
                tracing::error!(error = %err, "unrecoverable watch fault, shutting down");
                let _ = shutdown_tx.send(());
                Err(err)
            }
            None => Ok(()),
        },
    }
}

async fn socket_server_task(
    home: std::path::PathBuf,
    manager: Arc<Manager>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let manager = manager.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        manager,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: std::path::PathBuf,
    manager: Arc<Manager>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        if request.cmd == "stop" {
            let _ = shutdown_tx.send(());
            write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true }))).await?;
            break;
        }

        let response = match dispatch(&manager, &home, request, started_at_unix).await {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(err.to_string()),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Route one control request to the manager or the supervisor.
pub(crate) async fn dispatch(
    manager: &Manager,
    home: &Path,
    request: DaemonRequest,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let supervisor = manager.supervisor();
    let cmd = request.cmd.clone();
    match cmd.as_str() {
        "status" => build_status_payload(home, manager, started_at_unix),
        "sync" => {
            let id = required_id(&request)?;
            supervisor.request_sync(&id, request.restart).await?;
            Ok(json!({ "queued": [id.0] }))
        }
        "sync-repo" => {
            let repo = request
                .repo
                .as_deref()
                .ok_or_else(|| missing("repo"))?;
            let branch = request
                .branch
                .as_deref()
                .ok_or_else(|| missing("branch"))?;
            let count = supervisor
                .request_sync_by_repo_branch(repo, branch, request.restart)
                .await?;
            Ok(json!({ "queued": count }))
        }
        "pause" | "resume" => {
            let id = required_id(&request)?;
            let paused = cmd == "pause";
            supervisor.request_pause(&id, paused).await?;
            Ok(json!({ "id": id.0, "paused": paused }))
        }
        "add-source" => {
            let source = required_source(request)?;
            let id = source.id.clone();
            let started = manager.on_added_source(source)?;
            Ok(json!({ "id": id.0, "watching": true, "started": started }))
        }
        "update-source" => {
            let source = required_source(request)?;
            let id = source.id.clone();
            if supervisor.is_watching(&id)? {
                supervisor.update_source(&id, source).await?;
                Ok(json!({ "id": id.0, "updated": true }))
            } else {
                let started = manager.on_added_source(source)?;
                Ok(json!({ "id": id.0, "updated": false, "started": started }))
            }
        }
        "remove-source" => {
            let id = required_id(&request)?;
            let stopped = manager.on_deleted_source(&id).await?;
            Ok(json!({ "id": id.0, "stopped": stopped }))
        }
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    }
}

fn missing(field: &str) -> DaemonError {
    DaemonError::Protocol(format!("request is missing '{field}'"))
}

fn required_id(request: &DaemonRequest) -> Result<SourceId, DaemonError> {
    request
        .id
        .as_deref()
        .map(SourceId::from)
        .ok_or_else(|| missing("id"))
}

fn required_source(request: DaemonRequest) -> Result<Source, DaemonError> {
    request.source.ok_or_else(|| missing("source"))
}

fn build_status_payload(
    home: &Path,
    manager: &Manager,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let sources: Vec<Value> = manager
        .supervisor()
        .watched()?
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id.0,
                "url": s.url,
                "branch": s.branch,
                "path": s.path,
                "paused": s.paused,
            })
        })
        .collect();

    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "sources": sources,
        "socket": socket_path(home).display().to_string(),
    }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = mooring_dir_at(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
