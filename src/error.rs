use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that cross a component boundary.
///
/// Tool failures and malformed filter input are deliberately absent: they are
/// recorded as data (`ToolResult`, excluded lines) and never surface as `Err`.
#[derive(Debug, Error)]
pub enum ReconError {
    /// An artifact, progress snapshot or checkpoint could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("checkpoint {id} is corrupt: {reason}")]
    CheckpointCorrupt { id: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown scan type: {0}")]
    UnknownScanType(String),

    #[error("invalid rate limit {0:?} (expected \"<N>/minute\")")]
    InvalidRateLimit(String),
}

impl ReconError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
