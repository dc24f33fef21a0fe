use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const CONFIG_FILE: &str = "config.yaml";

/// Frames buffered between a session and its socket writer.
pub const FRAME_BUFFER: usize = 64;

pub fn filetail_root(home: &Path) -> PathBuf {
    home.join(".filetail")
}

pub fn socket_path(home: &Path) -> PathBuf {
    filetail_root(home).join(DAEMON_SOCKET)
}

pub fn config_path(home: &Path) -> PathBuf {
    filetail_root(home).join(CONFIG_FILE)
}
