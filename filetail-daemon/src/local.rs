//! Foreground session: tail one file to stdout without a daemon.

use std::path::Path;

use filetail_core::{stream_file, SessionReport, StreamConfig, WriterSink};

use crate::error::{io_err, DaemonError};

/// Stream `path` to stdout until the watch closes, stdout breaks, or ctrl-c.
pub fn watch_blocking(path: &Path, config: StreamConfig) -> Result<SessionReport, DaemonError> {
    crate::runtime::init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async {
        let sink = WriterSink::new(tokio::io::stdout());
        let mut handle = stream_file(path, sink, config).await?;

        let report = tokio::select! {
            report = &mut handle => report?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    tracing::warn!(error = %err, "ctrl-c handler failed");
                }
                handle.cancel();
                handle.await?
            }
        };
        Ok::<_, DaemonError>(report)
    })
}
