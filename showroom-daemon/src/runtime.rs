use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use showroom_core::{config, CropMap, Credentials, PublishStep, SiteConfig};
use showroom_sync::{
    publish_session, PendingImages, PublishOptions, PublishRequest, Publisher,
    SessionPublishResult,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Everything one editing session shares: the publisher (and with it the
/// store token) plus the pending-image staging area.
#[derive(Clone)]
pub struct Session {
    config: Arc<SiteConfig>,
    publisher: Publisher,
    staging: Arc<Mutex<PendingImages>>,
}

impl Session {
    pub fn new(config: SiteConfig, publisher: Publisher) -> Self {
        Self {
            config: Arc::new(config),
            publisher,
            staging: Arc::new(Mutex::new(PendingImages::new())),
        }
    }

    /// Load the config under `home` and read the token from the environment
    /// when the store needs one.
    pub fn open(home: &Path) -> Result<Self, DaemonError> {
        let config = config::load_at(home)?;
        let credentials = if config.store.requires_token() {
            Some(Credentials::from_env()?)
        } else {
            None
        };
        let publisher = Publisher::from_config(&config, credentials.as_ref())?;
        Ok(Self::new(config, publisher))
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn staging(&self) -> &Arc<Mutex<PendingImages>> {
        &self.staging
    }
}

struct PublishJob {
    area: String,
    payload: Value,
    crops: CropMap,
    options: PublishOptions,
    respond_to: oneshot::Sender<Result<PublishSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishSummary {
    pub area: String,
    pub succeeded: bool,
    pub duration_ms: u128,
    #[serde(flatten)]
    pub result: SessionPublishResult,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime for the session configured under `home`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let session = Session::open(&home)?;
    run_with_session(home, session).await
}

/// Run the daemon runtime around an already-built session.
pub async fn run_with_session(home: PathBuf, session: Session) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let started_at_unix = unix_seconds_now();

    let (publish_tx, publish_rx) = mpsc::channel::<PublishJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let session = session.clone();
        tokio::spawn(async move {
            let result = publish_processor_task(session, publish_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                session,
                publish_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
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

    let (processor_result, socket_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, signal_handle);

    handle_join("publish_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Runs publishes one at a time, in arrival order.
async fn publish_processor_task(
    session: Session,
    mut publish_rx: mpsc::Receiver<PublishJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = publish_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = run_publish_job(&session, &job).await;
                let _ = job.respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

async fn run_publish_job(session: &Session, job: &PublishJob) -> Result<PublishSummary, String> {
    let started = Instant::now();
    let area = session
        .config
        .area(&job.area)
        .map_err(|err| err.to_string())?
        .clone();

    let request = PublishRequest {
        area,
        payload: job.payload.clone(),
        crops: job.crops.clone(),
        message: None,
    };
    let area_name = job.area.as_str();
    let mut progress = |step: &PublishStep| {
        tracing::info!(area = %area_name, step = %step, "publish progress");
    };
    let result = publish_session(
        &session.publisher,
        &session.staging,
        &session.config.images_dir,
        request,
        &job.options,
        &mut progress,
    )
    .await;

    let summary = PublishSummary {
        area: job.area.clone(),
        succeeded: result.succeeded(),
        duration_ms: started.elapsed().as_millis(),
        result,
    };
    if summary.succeeded {
        tracing::info!(area = %summary.area, duration_ms = summary.duration_ms, "publish completed");
    } else {
        tracing::warn!(area = %summary.area, "publish did not complete");
    }
    Ok(summary)
}

async fn socket_server_task(
    home: PathBuf,
    session: Session,
    publish_tx: mpsc::Sender<PublishJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = ClientContext {
                    home: home.clone(),
                    session: session.clone(),
                    publish_tx: publish_tx.clone(),
                    shutdown_tx: shutdown_tx.clone(),
                    started_at_unix,
                };
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
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

/// What a request handler can reach.
#[derive(Clone)]
struct ClientContext {
    home: PathBuf,
    session: Session,
    publish_tx: mpsc::Sender<PublishJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

async fn handle_socket_client(stream: UnixStream, context: ClientContext) -> Result<(), DaemonError> {
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

        let stop = request.cmd == "stop";
        let response = handle_request(&context, request).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn handle_request(context: &ClientContext, request: DaemonRequest) -> DaemonResponse {
    let session = &context.session;
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(context).await),
        "stage" => {
            let Some(file) = request.file else {
                return DaemonResponse::error("stage requires 'file'");
            };
            let name = match request.name.or_else(|| file_name(&file)) {
                Some(name) => name,
                None => return DaemonResponse::error(format!("cannot name image {}", file.display())),
            };
            let bytes = match tokio::fs::read(&file).await {
                Ok(bytes) => bytes,
                Err(err) => return DaemonResponse::error(format!("read {}: {err}", file.display())),
            };
            let size = bytes.len();
            let mut staging = session.staging.lock().await;
            match staging.add(&name, bytes) {
                Ok(()) => {
                    tracing::info!(image = %name, bytes = size, "image staged");
                    DaemonResponse::ok(json!({
                        "staged": name,
                        "bytes": size,
                        "pending": staging.len(),
                    }))
                }
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "unstage" => {
            let Some(name) = request.name else {
                return DaemonResponse::error("unstage requires 'name'");
            };
            let mut staging = session.staging.lock().await;
            let removed = staging.remove(&name);
            DaemonResponse::ok(json!({
                "name": name,
                "removed": removed,
                "pending": staging.len(),
            }))
        }
        "pending" => {
            let staging = session.staging.lock().await;
            let images: Vec<Value> = staging
                .list()
                .iter()
                .map(|image| json!({ "name": image.name, "bytes": image.size() }))
                .collect();
            DaemonResponse::ok(json!({ "images": images }))
        }
        "clear" => {
            let mut staging = session.staging.lock().await;
            let cleared = staging.len();
            staging.clear();
            DaemonResponse::ok(json!({ "cleared": cleared }))
        }
        "publish" => match build_publish_job(&request).await {
            Ok((area, payload, crops)) => {
                let options = PublishOptions {
                    wait_for_window: !request.no_wait,
                    trigger_rebuild: !request.no_rebuild,
                };
                match enqueue_publish(&context.publish_tx, area, payload, crops, options).await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            Err(message) => DaemonResponse::error(message),
        },
        "stop" => {
            let _ = context.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

async fn build_publish_job(request: &DaemonRequest) -> Result<(String, Value, CropMap), String> {
    let area = request
        .area
        .clone()
        .ok_or_else(|| "publish requires 'area'".to_string())?;
    let file = request
        .file
        .as_deref()
        .ok_or_else(|| "publish requires 'file'".to_string())?;
    let payload: Value = read_json(file).await?;
    let crops: CropMap = match request.crops.as_deref() {
        Some(path) => read_json(path).await?,
        None => CropMap::new(),
    };
    Ok((area, payload, crops))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| format!("read {}: {err}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|err| format!("parse {}: {err}", path.display()))
}

async fn build_status_payload(context: &ClientContext) -> Value {
    let pending: Vec<String> = {
        let staging = context.session.staging.lock().await;
        staging.list().into_iter().map(|image| image.name).collect()
    };
    let areas: Vec<&str> = context
        .session
        .config
        .areas
        .iter()
        .map(|area| area.name.as_str())
        .collect();

    json!({
        "running": true,
        "started_at_unix": context.started_at_unix,
        "pending_images": pending,
        "areas": areas,
        "author": context.session.publisher.author(),
        "socket": socket_path(&context.home).display().to_string(),
    })
}

async fn enqueue_publish(
    publish_tx: &mpsc::Sender<PublishJob>,
    area: String,
    payload: Value,
    crops: CropMap,
    options: PublishOptions,
) -> Result<PublishSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    publish_tx
        .send(PublishJob {
            area,
            payload,
            crops,
            options,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("publish queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("publish response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
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
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
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

/// Install the fmt subscriber. `log` records from the sync layer are bridged
/// in by tracing-subscriber's `tracing-log` feature.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
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
