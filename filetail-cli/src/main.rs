//! filetail: stream a file's content and appended writes.
//!
//! # Usage
//!
//! ```text
//! filetail watch <path> [--config <file>] [--threshold <bytes>] [--chunk-size <bytes>]
//! filetail tail <path>
//! filetail daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, tail::TailArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "filetail",
    version,
    about = "Stream a file and its appended writes",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a file to stdout in the foreground.
    Watch(WatchArgs),

    /// Stream a file to stdout through the running daemon.
    Tail(TailArgs),

    /// Manage the filetail background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watch(args) => args.run(),
        Commands::Tail(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
