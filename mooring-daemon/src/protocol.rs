use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mooring_core::types::Source;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Status of the running daemon. Retries briefly so it can follow a fresh start.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    call(home, DaemonRequest::new("stop")).map(|_| ())
}

pub fn request_sync(home: &Path, id: &str, restart: bool) -> Result<Value, DaemonError> {
    call(
        home,
        DaemonRequest {
            restart,
            ..DaemonRequest::new("sync").with_id(id)
        },
    )
}

pub fn request_sync_repo(
    home: &Path,
    repo: &str,
    branch: &str,
    restart: bool,
) -> Result<Value, DaemonError> {
    call(
        home,
        DaemonRequest {
            repo: Some(repo.to_owned()),
            branch: Some(branch.to_owned()),
            restart,
            ..DaemonRequest::new("sync-repo")
        },
    )
}

pub fn request_pause(home: &Path, id: &str, paused: bool) -> Result<Value, DaemonError> {
    let cmd = if paused { "pause" } else { "resume" };
    call(home, DaemonRequest::new(cmd).with_id(id))
}

/// Tell the daemon about a new or changed source record.
pub fn request_upsert_source(home: &Path, source: &Source, existing: bool) -> Result<Value, DaemonError> {
    let cmd = if existing { "update-source" } else { "add-source" };
    call(
        home,
        DaemonRequest {
            source: Some(source.clone()),
            ..DaemonRequest::new(cmd).with_id(&source.id.0)
        },
    )
}

pub fn request_remove_source(home: &Path, id: &str) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::new("remove-source").with_id(id))
}

fn call(home: &Path, request: DaemonRequest) -> Result<Value, DaemonError> {
    let response = send_request(home, &request)?;
    response_into_data(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn requests_omit_unset_fields() {
        let encoded = serde_json::to_string(&DaemonRequest::new("pause").with_id("web")).expect("encode");
        assert_eq!(encoded, r#"{"cmd":"pause","id":"web"}"#);

        let decoded: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"sync","id":"web","restart":true}"#).expect("decode");
        assert!(decoded.restart);
        assert!(decoded.source.is_none());
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().expect("home");
        let err = request_stop(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn error_responses_become_protocol_errors() {
        let err = response_into_data(DaemonResponse::error("source not watched: web")).unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: source not watched: web");
        let data = response_into_data(DaemonResponse::ok(Value::Bool(true))).expect("ok");
        assert_eq!(data, Value::Bool(true));
    }
}
