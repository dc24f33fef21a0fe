//! filetail core library: tail a file into a frame sink.
//!
//! - [`snapshot`]: initial payload (whole file or last `threshold` bytes)
//! - [`session`]: per-session cursor and delta reads
//! - [`watch`]: change-notification sources ([`NotifyWatcher`], [`ChannelWatcher`])
//! - [`sink`]: frame destinations ([`ChannelSink`], [`WriterSink`])
//! - [`streamer`]: [`FileStreamer`] / [`stream_file`] and the delta loop

pub mod config;
pub mod error;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod streamer;
pub mod watch;

pub use config::{StreamConfig, DEFAULT_CHUNK_SIZE, DEFAULT_LARGE_FILE_THRESHOLD};
pub use error::{StreamError, WatchError};
pub use session::{Delta, DeltaProbe, WatchSession};
pub use sink::{ChannelSink, FrameSink, WriterSink};
pub use snapshot::{take_snapshot, Snapshot};
pub use streamer::{
    stream_file, FileStreamer, NoticeSender, SessionEnd, SessionNotice, SessionReport,
    SessionStats, StreamHandle,
};
pub use watch::{
    ChangeKind, ChangeWatcher, ChannelWatcher, ChannelWatcherHandle, FileEvent, NotifyWatcher,
    Subscription,
};
