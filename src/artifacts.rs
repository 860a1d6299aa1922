use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::{format_description::well_known, OffsetDateTime};
use tracing::{debug, warn};

use crate::error::{ReconError, Result};
use crate::types::{ResultBundle, ScanType};

pub const RAW_DOMAINS: &str = "all_domains_raw.txt";
pub const SUBDOMAINS: &str = "subdomains.txt";
pub const LIVE_HOSTS: &str = "live_hosts.txt";
pub const LIVE_HOSTS_TECH: &str = "live_hosts_tech.txt";
pub const TECH_FINGERPRINTS: &str = "nuclei_tech.txt";
pub const ENDPOINTS: &str = "endpoints.txt";
pub const PASSIVE_DNS: &str = "amass.txt";
pub const DNS_RECORDS: &str = "dns_records.txt";
pub const VULNERABILITIES: &str = "vulnerabilities.txt";

/// Findings of a technology follow-up, e.g. `vulnerabilities_wordpress.txt`.
pub fn follow_up_findings(marker: &str) -> String {
    format!("vulnerabilities_{marker}.txt")
}

/// Make a target usable as a single path component.
pub fn sanitize_target(target: &str) -> String {
    let cleaned: String = target
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}

/// Output directory of one run: `<hunt>/<target>/<scan>/`.
#[derive(Debug, Clone)]
pub struct ScanLayout {
    target_dir: PathBuf,
    scan_dir: PathBuf,
    scan_type: ScanType,
}

impl ScanLayout {
    pub fn new(hunt_dir: &Path, target: &str, scan_type: ScanType) -> Self {
        let target_dir = hunt_dir.join(sanitize_target(target));
        let scan_dir = target_dir.join(scan_type.as_str());
        Self {
            target_dir,
            scan_dir,
            scan_type,
        }
    }

    pub fn scan_dir(&self) -> &Path {
        &self.scan_dir
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.scan_dir.join(name)
    }

    /// Artifact produced by another scan type for the same target.
    pub fn sibling_artifact(&self, scan_type: ScanType, name: &str) -> PathBuf {
        self.target_dir.join(scan_type.as_str()).join(name)
    }

    pub fn results_file(&self) -> PathBuf {
        self.artifact(&format!("{}_results.json", self.scan_type))
    }

    pub fn error_file(&self) -> PathBuf {
        self.artifact(&format!("{}_error.json", self.scan_type))
    }

    pub fn progress_file(&self) -> PathBuf {
        self.artifact(&format!("{}_progress.json", self.scan_type))
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.scan_dir).map_err(|e| ReconError::persistence(&self.scan_dir, e))
    }

    /// Remove a partial snapshot left over from an earlier run.
    pub fn clear_progress(&self) -> Result<()> {
        remove_if_present(&self.progress_file())
    }

    /// Remove everything an earlier run of this scan type left behind: the
    /// outcome files, the progress snapshot and the named step artifacts.
    pub fn clear_run_artifacts<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        remove_if_present(&self.results_file())?;
        remove_if_present(&self.error_file())?;
        self.clear_progress()?;
        for name in names {
            remove_if_present(&self.artifact(name.as_ref()))?;
        }
        Ok(())
    }

    pub fn clear_results(&self) -> Result<()> {
        remove_if_present(&self.results_file())
    }

    pub fn clear_error(&self) -> Result<()> {
        remove_if_present(&self.error_file())
    }

    pub fn write_lines<I, S>(&self, name: &str, lines: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.artifact(name);
        write_lines(&path, lines)?;
        Ok(path)
    }

    pub fn save_progress(&self, bundle: &ResultBundle) -> Result<()> {
        write_json_atomic(&self.progress_file(), bundle)
    }

    /// Partial snapshot written by the last completed step, if any.
    pub fn load_progress(&self) -> Option<ResultBundle> {
        let path = self.progress_file();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read progress snapshot");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "progress snapshot is corrupt");
                None
            }
        }
    }

    pub fn write_results(&self, bundle: &ResultBundle) -> Result<PathBuf> {
        let path = self.results_file();
        write_json_atomic(&path, bundle)?;
        Ok(path)
    }

    pub fn write_error(&self, target: &str, message: &str) -> Result<PathBuf> {
        let path = self.error_file();
        let report = ErrorReport {
            status: "failed",
            error: message,
            scan_type: self.scan_type,
            target,
            timestamp: now_rfc3339(),
        };
        write_json_atomic(&path, &report)?;
        Ok(path)
    }
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    status: &'static str,
    error: &'a str,
    scan_type: ScanType,
    target: &'a str,
    timestamp: String,
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReconError::persistence(path, e)),
    }
}

/// Newline-terminated list, one entry per line.
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut body = String::new();
    for line in lines {
        body.push_str(line.as_ref());
        body.push('\n');
    }
    fs::write(path, body).map_err(|e| ReconError::persistence(path, e))
}

/// Pretty JSON written to a temporary sibling and renamed into place, so
/// readers never see a half-written file under the final name.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| ReconError::persistence(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    let tmp = temp_sibling(path);
    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ReconError::persistence(path, e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
