//! filetail daemon: serves tail sessions over a Unix socket, plus the
//! foreground runner used by `filetail watch`.

mod error;
pub mod local;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use local::watch_blocking;
pub use protocol::{
    open_tail, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking};
