use std::fs;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{ReconError, Result};

/// Directory layout shared by the binary and the orchestrator.
///
/// `home` holds configuration, checkpoints and logs, `hunt` holds one
/// `<target>/<scan>/` directory per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    home: PathBuf,
    hunt: PathBuf,
}

impl Workspace {
    pub fn new(home: impl Into<PathBuf>, hunt: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            hunt: hunt.into(),
        }
    }

    /// `~/.reconwalk` and `~/Hunt`, or `None` when no home directory is known.
    pub fn from_home_dir() -> Option<Self> {
        let base = dirs::home_dir()?;
        Some(Self::new(base.join(".reconwalk"), base.join("Hunt")))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn hunt_dir(&self) -> &Path {
        &self.hunt
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config").join("config.json")
    }

    pub fn progress_dir(&self) -> PathBuf {
        self.home.join("progress")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// Per-invocation log file, `logs/reconwalk-<YYYYmmdd-HHMMSS>.log`.
    pub fn log_file(&self, started: OffsetDateTime) -> PathBuf {
        let stamp = started
            .format(format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .unwrap_or_else(|_| started.unix_timestamp().to_string());
        self.logs_dir().join(format!("reconwalk-{stamp}.log"))
    }

    /// Create every directory the layout names.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.home.join("config"),
            self.progress_dir(),
            self.logs_dir(),
            self.hunt.clone(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| ReconError::persistence(&dir, e))?;
        }
        Ok(())
    }
}
