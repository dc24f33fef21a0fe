//! Initial snapshot: what a peer sees the moment a session starts.
//!
//! Small files are sent whole. Files above the threshold send only the last
//! `threshold` bytes, and the session switches to large-file mode.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::StreamConfig;
use crate::error::{io_err, StreamError};

/// Result of the snapshot phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Bytes to deliver as the first frame.
    pub payload: Vec<u8>,
    /// File size reported by `stat` before reading.
    pub size_at_open: u64,
    pub large_file_mode: bool,
    /// Bytes already delivered; only meaningful when `large_file_mode` is false.
    pub viewed_offset: u64,
}

/// Read the initial payload for `path`. Blocking; call from a blocking context.
pub fn take_snapshot(path: &Path, config: &StreamConfig) -> Result<Snapshot, StreamError> {
    let size_at_open = fs::metadata(path).map_err(|e| io_err(path, e))?.len();
    let threshold = config.large_file_threshold;

    if size_at_open > threshold {
        let payload =
            read_window(path, size_at_open - threshold, threshold).map_err(|e| io_err(path, e))?;
        return Ok(Snapshot {
            payload,
            size_at_open,
            large_file_mode: true,
            viewed_offset: 0,
        });
    }

    let payload = fs::read(path).map_err(|e| io_err(path, e))?;
    // The file may have grown between stat and read; the offset follows what was read.
    let viewed_offset = payload.len() as u64;
    Ok(Snapshot {
        payload,
        size_at_open,
        large_file_mode: false,
        viewed_offset,
    })
}

/// Read exactly `len` bytes starting at `start`. Fails with `UnexpectedEof`
/// if the file no longer reaches `start + len`.
pub(crate) fn read_window(path: &Path, start: u64, len: u64) -> io::Result<Vec<u8>> {
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "window exceeds address space"))?;
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Upper bound on the buffer reserved up front by [`read_chunk`].
const READ_CHUNK_PREALLOC: usize = 8 * 1024;

/// Read at most `max` bytes starting at `offset`. End of file yields an empty vec.
pub(crate) fn read_chunk(path: &Path, offset: u64, max: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    // `max` is only a cap; the buffer grows with what the file actually holds.
    let mut buf = Vec::with_capacity(max.min(READ_CHUNK_PREALLOC));
    file.take(max as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
