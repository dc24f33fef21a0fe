//! Change-notification sources.
//!
//! A [`ChangeWatcher`] turns a path into a [`Subscription`]: one channel of
//! file events, one channel of watcher errors, and a guard that keeps the
//! underlying OS watch alive. Dropping the subscription releases the watch.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{StreamError, WatchError};

/// Coarse classification of a filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File content was written.
    Write,
    Create,
    Remove,
    Rename,
    /// Metadata, access and anything the backend could not classify.
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Remove(_) => ChangeKind::Remove,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::Other,
            EventKind::Modify(_) => ChangeKind::Write,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => ChangeKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileEvent {
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Write,
        }
    }

    pub fn is_write(&self) -> bool {
        self.kind == ChangeKind::Write
    }
}

/// Live event streams for one watched path.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<FileEvent>,
    pub errors: mpsc::UnboundedReceiver<WatchError>,
    _guard: Box<dyn Send>,
}

impl Subscription {
    /// `guard` is dropped together with the subscription.
    pub fn new(
        events: mpsc::UnboundedReceiver<FileEvent>,
        errors: mpsc::UnboundedReceiver<WatchError>,
        guard: impl Send + 'static,
    ) -> Self {
        Self {
            events,
            errors,
            _guard: Box::new(guard),
        }
    }
}

/// Source of change notifications for a single path.
pub trait ChangeWatcher: Send + 'static {
    fn subscribe(self, path: &Path) -> Result<Subscription, StreamError>;
}

/// Native OS watcher backed by `notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcher;

impl ChangeWatcher for NotifyWatcher {
    fn subscribe(self, path: &Path) -> Result<Subscription, StreamError> {
        let (event_tx, events) = mpsc::unbounded_channel::<FileEvent>();
        let (error_tx, errors) = mpsc::unbounded_channel::<WatchError>();
        let watched = path.to_path_buf();

        let mut watcher: RecommendedWatcher =
            recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let kind = ChangeKind::from(&event.kind);
                    if event.paths.is_empty() {
                        let _ = event_tx.send(FileEvent {
                            path: watched.clone(),
                            kind,
                        });
                    }
                    for path in event.paths {
                        let _ = event_tx.send(FileEvent { path, kind });
                    }
                }
                Err(err) => {
                    let _ = error_tx.send(WatchError::from(err));
                }
            })
            .map_err(|source| StreamError::Watch {
                path: path.to_path_buf(),
                source,
            })?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| StreamError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "watching file");

        Ok(Subscription::new(events, errors, watcher))
    }
}

/// Caller-driven watcher: events are pushed through a [`ChannelWatcherHandle`].
///
/// Useful when change detection lives elsewhere (polling, an external
/// notifier) and in tests.
pub struct ChannelWatcher {
    events: mpsc::UnboundedReceiver<FileEvent>,
    errors: mpsc::UnboundedReceiver<WatchError>,
}

/// Sending side of a [`ChannelWatcher`]. Dropping it closes both channels.
#[derive(Debug, Clone)]
pub struct ChannelWatcherHandle {
    events: Option<mpsc::UnboundedSender<FileEvent>>,
    errors: Option<mpsc::UnboundedSender<WatchError>>,
}

impl ChannelWatcher {
    pub fn new() -> (Self, ChannelWatcherHandle) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        (
            Self { events, errors },
            ChannelWatcherHandle {
                events: Some(event_tx),
                errors: Some(error_tx),
            },
        )
    }
}

impl ChangeWatcher for ChannelWatcher {
    fn subscribe(self, _path: &Path) -> Result<Subscription, StreamError> {
        Ok(Subscription::new(self.events, self.errors, ()))
    }
}

impl ChannelWatcherHandle {
    /// Returns `false` once the receiving session is gone.
    pub fn send_event(&self, event: FileEvent) -> bool {
        self.events
            .as_ref()
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    pub fn notify_write(&self, path: impl Into<PathBuf>) -> bool {
        self.send_event(FileEvent::write(path))
    }

    pub fn send_error(&self, error: WatchError) -> bool {
        self.errors
            .as_ref()
            .map(|tx| tx.send(error).is_ok())
            .unwrap_or(false)
    }

    pub fn close_events(&mut self) {
        self.events = None;
    }

    pub fn close_errors(&mut self) {
        self.errors = None;
    }
}
