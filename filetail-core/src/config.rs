//! Streaming configuration.
//!
//! Both knobs default to the values the stream was originally tuned for:
//! a 5 MiB large-file threshold and 1 KiB delta reads. Files can be loaded
//! from YAML; every field is optional.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StreamError};

/// Files larger than this stream a fixed tail window instead of deltas (5 MiB).
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Maximum bytes read per write-notification in small-file mode.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Size in bytes above which a session runs in large-file mode.
    pub large_file_threshold: u64,
    /// Upper bound on a single small-file delta frame.
    pub chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl StreamConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        let raw = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: StreamConfig =
            serde_yaml::from_str(&raw).map_err(|source| StreamError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, StreamError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.large_file_threshold = threshold;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.large_file_threshold == 0 {
            return Err(StreamError::Config(
                "large_file_threshold must be greater than zero".to_string(),
            ));
        }
        if usize::try_from(self.large_file_threshold).is_err() {
            return Err(StreamError::Config(format!(
                "large_file_threshold {} does not fit in memory on this platform",
                self.large_file_threshold
            )));
        }
        if self.chunk_size == 0 {
            return Err(StreamError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
