use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use filetail_core::{ChannelSink, FileStreamer, StreamConfig};

use crate::error::{io_err, DaemonError};
use crate::paths::{config_path, filetail_root, socket_path, FRAME_BUFFER};
use crate::protocol::{DaemonRequest, DaemonResponse};

struct DaemonState {
    home: PathBuf,
    config: StreamConfig,
    started_at_unix: u64,
    active_sessions: AtomicUsize,
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

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = StreamConfig::load_or_default(&config_path(&home))?;
    tracing::info!(
        large_file_threshold = config.large_file_threshold,
        chunk_size = config.chunk_size,
        "daemon configuration loaded",
    );

    let state = Arc::new(DaemonState {
        home,
        config,
        started_at_unix: unix_seconds_now(),
        active_sessions: AtomicUsize::new(0),
    });
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
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

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
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
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
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

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state)),
            "tail" => {
                // The connection belongs to the session from here on.
                return serve_tail(request.path, writer, lines, state, shutdown_tx.subscribe())
                    .await;
            }
            "stop" => {
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                let _ = shutdown_tx.send(());
                break;
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn serve_tail(
    path: Option<String>,
    mut writer: OwnedWriteHalf,
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(path) = path.map(PathBuf::from) else {
        return write_response(&mut writer, &DaemonResponse::error("tail requires a path")).await;
    };

    let (sink, mut frames) = ChannelSink::channel(FRAME_BUFFER);
    let mut handle = match FileStreamer::new(state.config).start(&path, sink).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "tail request rejected");
            return write_response(&mut writer, &DaemonResponse::error(err.to_string())).await;
        }
    };

    write_response(
        &mut writer,
        &DaemonResponse::ok(json!({ "path": path.display().to_string() })),
    )
    .await?;
    state.active_sessions.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = write_frame(&mut writer, &frame).await {
                    tracing::debug!(path = %path.display(), error = %err, "tail client write failed");
                    break;
                }
            }
            line = lines.next_line() => {
                // Input after a tail request is ignored; EOF or error means the client left.
                if !matches!(line, Ok(Some(_))) {
                    break;
                }
            }
        }
    }

    handle.cancel();
    drop(frames);
    state.active_sessions.fetch_sub(1, Ordering::SeqCst);
    match handle.await {
        Ok(report) => tracing::info!(
            path = %path.display(),
            end = ?report.end,
            frames_sent = report.stats.frames_sent,
            "tail session closed",
        ),
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "tail session failed"),
    }
    Ok(())
}

fn build_status_payload(state: &DaemonState) -> Value {
    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "active_sessions": state.active_sessions.load(Ordering::SeqCst),
        "config": {
            "large_file_threshold": state.config.large_file_threshold,
            "chunk_size": state.config.chunk_size,
        },
        "socket": socket_path(&state.home).display().to_string(),
    })
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
    let root = filetail_root(home);
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

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
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

/// Install the stderr `fmt` subscriber. Stdout is reserved for streamed bytes.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
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
