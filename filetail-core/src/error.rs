//! Error types for filetail-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned while starting a stream or building its configuration.
///
/// Only setup failures surface here. Once the delta loop is running, I/O
/// problems are logged and published as [`crate::SessionNotice`]s instead.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The tailed file did not exist when the session started.
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    /// stat/open/read failure while taking the initial snapshot.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The change watcher could not be created or could not register the path.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The initial snapshot frame could not be delivered.
    #[error("error writing initial frame: {0}")]
    InitialSend(#[source] std::io::Error),

    /// Configuration failed to parse or validate.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// YAML parse error while loading a config file.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The session task panicked or was aborted.
    #[error("session task join error: {0}")]
    TaskJoin(String),
}

/// Error reported by a change watcher while a session is running.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

/// Convenience constructor for [`StreamError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StreamError {
    let path = path.into();
    if source.kind() == std::io::ErrorKind::NotFound {
        return StreamError::NotFound { path };
    }
    StreamError::Io { path, source }
}
