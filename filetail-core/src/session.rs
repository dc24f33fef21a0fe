//! Per-session streaming state and delta computation.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::StreamConfig;
use crate::snapshot::{read_chunk, read_window, Snapshot};

/// State of one (path, connection) pairing.
///
/// Owned by the session task; nothing else reads or advances the offset.
///
/// # Large-file window
///
/// In large-file mode every write-notification re-reads the same window,
/// `[size_at_open - threshold, size_at_open)`. The window is computed once
/// and never follows growth, so appends past `size_at_open` are not
/// delivered. If the file shrinks below `size_at_open` the read fails and
/// the notification is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSession {
    path: PathBuf,
    size_at_open: u64,
    viewed_offset: u64,
    large_file_mode: bool,
    config: StreamConfig,
}

/// Newly available bytes for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Bytes appended since the last delivered offset.
    Append(Vec<u8>),
    /// The fixed large-file window, re-read.
    Window(Vec<u8>),
    /// Nothing new (end of file).
    Empty,
}

/// A self-contained read request, safe to move onto a blocking thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaProbe {
    Append {
        path: PathBuf,
        offset: u64,
        max: usize,
    },
    Window {
        path: PathBuf,
        start: u64,
        len: u64,
    },
}

impl WatchSession {
    pub fn new(path: impl Into<PathBuf>, snapshot: &Snapshot, config: StreamConfig) -> Self {
        Self {
            path: path.into(),
            size_at_open: snapshot.size_at_open,
            viewed_offset: snapshot.viewed_offset,
            large_file_mode: snapshot.large_file_mode,
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_at_open(&self) -> u64 {
        self.size_at_open
    }

    pub fn viewed_offset(&self) -> u64 {
        self.viewed_offset
    }

    pub fn large_file_mode(&self) -> bool {
        self.large_file_mode
    }

    /// Start of the large-file window.
    pub fn window_start(&self) -> u64 {
        self.size_at_open
            .saturating_sub(self.config.large_file_threshold)
    }

    /// Describe the read the next notification should perform.
    pub fn probe(&self) -> DeltaProbe {
        if self.large_file_mode {
            DeltaProbe::Window {
                path: self.path.clone(),
                start: self.window_start(),
                len: self.config.large_file_threshold,
            }
        } else {
            DeltaProbe::Append {
                path: self.path.clone(),
                offset: self.viewed_offset,
                max: self.config.chunk_size,
            }
        }
    }

    /// Record that `sent` appended bytes reached the peer.
    pub(crate) fn advance(&mut self, sent: usize) {
        self.viewed_offset += sent as u64;
    }
}

impl DeltaProbe {
    /// Perform the read. Blocking.
    pub fn read(&self) -> io::Result<Delta> {
        match self {
            DeltaProbe::Append { path, offset, max } => {
                let bytes = read_chunk(path, *offset, *max)?;
                if bytes.is_empty() {
                    Ok(Delta::Empty)
                } else {
                    Ok(Delta::Append(bytes))
                }
            }
            DeltaProbe::Window { path, start, len } => {
                read_window(path, *start, *len).map(Delta::Window)
            }
        }
    }
}
