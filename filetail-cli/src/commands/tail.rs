//! `filetail tail`: stream a file through the daemon.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use filetail_daemon::{open_tail, DaemonError};

#[derive(Args, Debug)]
pub struct TailArgs {
    /// File to stream. Relative paths resolve against the current directory.
    pub path: PathBuf,
}

impl TailArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let path = std::path::absolute(&self.path)
            .with_context(|| format!("resolve {}", self.path.display()))?;

        let mut reader = match open_tail(&home, &path) {
            Ok(reader) => reader,
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                return Err(err).context("start it with `filetail daemon start`");
            }
            Err(err) => return Err(err).context("tail request failed"),
        };

        let mut stdout = io::stdout().lock();
        io::copy(&mut reader, &mut stdout).context("stream interrupted")?;
        stdout.flush().context("flush stdout")?;
        Ok(())
    }
}
