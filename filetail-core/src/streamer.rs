//! Session driver: snapshot, then the delta loop.
//!
//! [`FileStreamer::start`] returns once the snapshot frame has been
//! delivered. The delta loop then runs on its own task and is observed
//! through the returned [`StreamHandle`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::error::{io_err, StreamError, WatchError};
use crate::session::{Delta, WatchSession};
use crate::sink::FrameSink;
use crate::snapshot::take_snapshot;
use crate::watch::{ChangeWatcher, NotifyWatcher, Subscription};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The watcher closed its event or error channel.
    WatchClosed,
    /// [`StreamHandle::cancel`] was called.
    Cancelled,
    /// A delta frame could not be delivered.
    ConnectionClosed,
}

/// Counters for one session. `frames_sent` and `bytes_sent` include the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Write-notifications whose read failed.
    pub events_dropped: u64,
    pub watcher_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub path: PathBuf,
    pub end: SessionEnd,
    pub stats: SessionStats,
    pub large_file_mode: bool,
    pub viewed_offset: u64,
}

/// Steady-state events published to an optional caller-supplied channel.
#[derive(Debug)]
pub enum SessionNotice {
    DeltaSent { path: PathBuf, bytes: usize },
    /// open/seek/read failed; the notification was dropped.
    TransientIo { path: PathBuf, error: io::Error },
    WatcherError { path: PathBuf, error: WatchError },
}

pub type NoticeSender = mpsc::UnboundedSender<SessionNotice>;

/// Builder for streaming sessions.
pub struct FileStreamer<W = NotifyWatcher> {
    config: StreamConfig,
    watcher: W,
    notices: Option<NoticeSender>,
}

impl FileStreamer<NotifyWatcher> {
    pub fn new(config: StreamConfig) -> Self {
        Self::with_watcher(config, NotifyWatcher)
    }
}

impl<W: ChangeWatcher> FileStreamer<W> {
    pub fn with_watcher(config: StreamConfig, watcher: W) -> Self {
        Self {
            config,
            watcher,
            notices: None,
        }
    }

    /// Publish transient errors and deliveries on `tx` in addition to logging them.
    pub fn notices(mut self, tx: NoticeSender) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Send the snapshot through `sink`, then spawn the delta loop.
    ///
    /// Errors here mean the session never started. Once this returns `Ok`,
    /// failures are reported only through logs, notices and the final
    /// [`SessionReport`].
    pub async fn start<S: FrameSink>(
        self,
        path: impl AsRef<Path>,
        mut sink: S,
    ) -> Result<StreamHandle, StreamError> {
        self.config.validate()?;
        let path = path.as_ref().to_path_buf();

        tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_err(&path, e))?;

        let subscription = self.watcher.subscribe(&path)?;

        let config = self.config;
        let snapshot_path = path.clone();
        let snapshot = tokio::task::spawn_blocking(move || take_snapshot(&snapshot_path, &config))
            .await
            .map_err(|err| StreamError::TaskJoin(format!("snapshot: {err}")))??;

        let session = WatchSession::new(&path, &snapshot, config);
        let initial_len = snapshot.payload.len();
        sink.send_frame(snapshot.payload)
            .await
            .map_err(StreamError::InitialSend)?;

        tracing::info!(
            path = %path.display(),
            size_at_open = session.size_at_open(),
            large_file_mode = session.large_file_mode(),
            initial_bytes = initial_len,
            "file stream started",
        );

        let stats = SessionStats {
            frames_sent: 1,
            bytes_sent: initial_len as u64,
            ..SessionStats::default()
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            session,
            sink,
            subscription,
            shutdown_rx,
            self.notices,
            stats,
        ));

        Ok(StreamHandle {
            path,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Start a session on `path` using the native watcher.
pub async fn stream_file<S: FrameSink>(
    path: impl AsRef<Path>,
    sink: S,
    config: StreamConfig,
) -> Result<StreamHandle, StreamError> {
    FileStreamer::new(config).start(path, sink).await
}

/// Handle to a running session. Awaiting it yields the [`SessionReport`].
///
/// Dropping the handle detaches the session; it keeps running until its
/// watch closes or its connection fails.
#[derive(Debug)]
pub struct StreamHandle {
    path: PathBuf,
    shutdown: Option<watch::Sender<bool>>,
    task: JoinHandle<SessionReport>,
}

impl StreamHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the session to stop. The in-flight delta, if any, completes first.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for StreamHandle {
    type Output = Result<SessionReport, StreamError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.map_err(|err| StreamError::TaskJoin(err.to_string())))
    }
}

enum Step {
    Continue,
    ConnectionLost,
}

async fn run_session<S: FrameSink>(
    mut session: WatchSession,
    mut sink: S,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
    notices: Option<NoticeSender>,
    mut stats: SessionStats,
) -> SessionReport {
    let end = loop {
        tokio::select! {
            Ok(()) = shutdown.changed() => break SessionEnd::Cancelled,
            event = subscription.events.recv() => {
                let Some(event) = event else { break SessionEnd::WatchClosed };
                if !event.is_write() {
                    continue;
                }
                match push_delta(&mut session, &mut sink, &mut stats, notices.as_ref()).await {
                    Step::Continue => {}
                    Step::ConnectionLost => break SessionEnd::ConnectionClosed,
                }
            }
            error = subscription.errors.recv() => {
                let Some(error) = error else { break SessionEnd::WatchClosed };
                stats.watcher_errors += 1;
                tracing::warn!(path = %session.path().display(), error = %error, "watcher error");
                publish(
                    notices.as_ref(),
                    SessionNotice::WatcherError {
                        path: session.path().to_path_buf(),
                        error,
                    },
                );
            }
        }
    };

    drop(subscription);
    tracing::info!(
        path = %session.path().display(),
        end = ?end,
        frames_sent = stats.frames_sent,
        bytes_sent = stats.bytes_sent,
        events_dropped = stats.events_dropped,
        "file stream ended",
    );

    SessionReport {
        path: session.path().to_path_buf(),
        end,
        stats,
        large_file_mode: session.large_file_mode(),
        viewed_offset: session.viewed_offset(),
    }
}

async fn push_delta<S: FrameSink>(
    session: &mut WatchSession,
    sink: &mut S,
    stats: &mut SessionStats,
    notices: Option<&NoticeSender>,
) -> Step {
    let probe = session.probe();
    let read = tokio::task::spawn_blocking(move || probe.read())
        .await
        .unwrap_or_else(|err| Err(io::Error::other(format!("delta read task failed: {err}"))));

    let delta = match read {
        Ok(delta) => delta,
        Err(error) => {
            stats.events_dropped += 1;
            tracing::warn!(path = %session.path().display(), error = %error, "delta read failed");
            publish(
                notices,
                SessionNotice::TransientIo {
                    path: session.path().to_path_buf(),
                    error,
                },
            );
            return Step::Continue;
        }
    };

    let (frame, appended) = match delta {
        Delta::Empty => return Step::Continue,
        Delta::Append(bytes) => {
            let n = bytes.len();
            (bytes, Some(n))
        }
        Delta::Window(bytes) => (bytes, None),
    };

    let len = frame.len();
    if let Err(err) = sink.send_frame(frame).await {
        tracing::warn!(path = %session.path().display(), error = %err, "delta send failed");
        return Step::ConnectionLost;
    }

    if let Some(n) = appended {
        session.advance(n);
    }
    stats.frames_sent += 1;
    stats.bytes_sent += len as u64;
    tracing::debug!(
        path = %session.path().display(),
        bytes = len,
        viewed_offset = session.viewed_offset(),
        "delta sent",
    );
    publish(
        notices,
        SessionNotice::DeltaSent {
            path: session.path().to_path_buf(),
            bytes: len,
        },
    );
    Step::Continue
}

fn publish(notices: Option<&NoticeSender>, notice: SessionNotice) {
    if let Some(tx) = notices {
        let _ = tx.send(notice);
    }
}
