use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::artifacts::{sanitize_target, write_json_atomic};
use crate::error::{ReconError, Result};
use crate::types::{Checkpoint, ResultBundle};

/// Append-only directory of checkpoint files, one JSON object per file.
///
/// Files are named `<target>_<scan>_<YYYYmmdd-HHMMSS>.json` (UTC). A save that
/// lands in the same second as an existing file for the same target and scan
/// type gets a `-2`, `-3`, ... suffix instead of replacing it.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `bundle` as a new checkpoint stamped with the current time.
    pub fn save(&self, bundle: &ResultBundle, complete: bool) -> Result<Checkpoint> {
        self.save_at(bundle, complete, OffsetDateTime::now_utc())
    }

    pub fn save_at(
        &self,
        bundle: &ResultBundle,
        complete: bool,
        timestamp: OffsetDateTime,
    ) -> Result<Checkpoint> {
        self.persist(Checkpoint {
            id: String::new(),
            timestamp,
            target: bundle.target.clone(),
            scan_type: bundle.scan_type,
            results: bundle.clone(),
            complete,
            resumed_from: None,
        })
    }

    /// Re-persist a loaded checkpoint's bundle as a fresh, incomplete
    /// checkpoint that records where it came from.
    pub fn save_resume_seed(&self, source: &Checkpoint) -> Result<Checkpoint> {
        self.persist(Checkpoint {
            id: String::new(),
            timestamp: OffsetDateTime::now_utc(),
            target: source.target.clone(),
            scan_type: source.scan_type,
            results: source.results.clone(),
            complete: false,
            resumed_from: Some(source.id.clone()),
        })
    }

    fn persist(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        fs::create_dir_all(&self.dir).map_err(|e| ReconError::persistence(&self.dir, e))?;
        let path = self.free_path(&checkpoint);
        write_json_atomic(&path, &checkpoint)?;
        checkpoint.id = file_id(&path);
        info!(
            checkpoint = %checkpoint.id,
            complete = checkpoint.complete,
            "progress saved"
        );
        Ok(checkpoint)
    }

    fn free_path(&self, checkpoint: &Checkpoint) -> PathBuf {
        let stamp = checkpoint
            .timestamp
            .format(format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .unwrap_or_else(|_| checkpoint.timestamp.unix_timestamp().to_string());
        let stem = format!(
            "{}_{}_{stamp}",
            sanitize_target(&checkpoint.target),
            checkpoint.scan_type
        );
        let mut path = self.dir.join(format!("{stem}.json"));
        let mut n = 2u32;
        while path.exists() {
            path = self.dir.join(format!("{stem}-{n}.json"));
            n += 1;
        }
        path
    }

    /// Every readable checkpoint, newest first. Unparseable files are logged
    /// and skipped; a missing directory is an empty store.
    pub fn list(&self) -> Vec<Checkpoint> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "cannot read checkpoint directory");
                }
                return Vec::new();
            }
        };

        let mut points: Vec<Checkpoint> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_checkpoint_file(path))
            .filter_map(|path| match read_checkpoint(&path) {
                Ok(cp) => Some(cp),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping corrupt checkpoint");
                    None
                }
            })
            .collect();
        points.sort_by_key(|cp| Reverse((cp.timestamp, cp.id.clone())));
        points
    }

    /// Load the checkpoint whose file name is `id`.
    pub fn load(&self, id: &str) -> Result<Checkpoint> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(ReconError::CheckpointNotFound(id.to_string()));
        }
        let path = self.dir.join(id);
        if !path.is_file() {
            return Err(ReconError::CheckpointNotFound(id.to_string()));
        }
        read_checkpoint(&path)
    }
}

fn is_checkpoint_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    path.is_file() && !hidden && path.extension().is_some_and(|ext| ext == "json")
}

fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint> {
    let id = file_id(path);
    let content = fs::read_to_string(path).map_err(|e| ReconError::CheckpointCorrupt {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    let mut cp: Checkpoint =
        serde_json::from_str(&content).map_err(|e| ReconError::CheckpointCorrupt {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    cp.id = id;
    Ok(cp)
}
