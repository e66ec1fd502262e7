use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// One line sent by a client.
///
/// `file` and `crops` are paths the daemon reads itself; clients send them
/// absolute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crops: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_wait: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_rebuild: bool,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }
}

/// The daemon's one-line answer.
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

    /// `data` of a successful response; an error response becomes
    /// [`DaemonError::Protocol`] carrying the daemon's message.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(message)) => Err(DaemonError::Protocol(message)),
            (false, None) => Err(DaemonError::Protocol("unknown daemon error".to_string())),
        }
    }
}

/// Delays between status attempts while a fresh daemon binds its socket.
const STATUS_RETRY_MS: [u64; 4] = [100, 100, 200, 400];

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    use std::io::ErrorKind;

    UnixStream::connect(socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, err),
    })
}

/// One request, one response line.
///
/// Blocks until the daemon answers; a `publish` can take as long as the
/// conflict-window cooldown plus the store writes.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }
    let mut stream = connect(&socket)?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    line.clear();
    let read = BufReader::new(&stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon hung up without a response".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Status, retried briefly so a daemon that is still binding its socket answers.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");
    let mut delays = STATUS_RETRY_MS.iter();
    loop {
        match send_request(home, &request) {
            Err(DaemonError::DaemonNotRunning { socket }) => match delays.next() {
                Some(ms) => sleep(Duration::from_millis(*ms)),
                None => return Err(DaemonError::DaemonNotRunning { socket }),
            },
            other => return other?.into_data(),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    send_request(home, &DaemonRequest::new("stop"))?.into_data()?;
    Ok(())
}

/// Stage an image file, under `name` or its file name.
pub fn request_stage(home: &Path, file: &Path, name: Option<&str>) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        file: Some(file.to_path_buf()),
        name: name.map(str::to_string),
        ..DaemonRequest::new("stage")
    };
    send_request(home, &request)?.into_data()
}

pub fn request_unstage(home: &Path, name: &str) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        name: Some(name.to_string()),
        ..DaemonRequest::new("unstage")
    };
    send_request(home, &request)?.into_data()
}

pub fn request_pending(home: &Path) -> Result<Value, DaemonError> {
    send_request(home, &DaemonRequest::new("pending"))?.into_data()
}

pub fn request_clear(home: &Path) -> Result<Value, DaemonError> {
    send_request(home, &DaemonRequest::new("clear"))?.into_data()
}

/// Publish `file` to `area` through the daemon's session, pending images first.
pub fn request_publish(
    home: &Path,
    area: &str,
    file: &Path,
    crops: Option<&Path>,
    no_wait: bool,
    no_rebuild: bool,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        area: Some(area.to_string()),
        file: Some(file.to_path_buf()),
        crops: crops.map(Path::to_path_buf),
        no_wait,
        no_rebuild,
        ..DaemonRequest::new("publish")
    };
    send_request(home, &request)?.into_data()
}
