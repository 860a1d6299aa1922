use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ReconError;

/// The four pipelines a run can select.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScanType {
    #[serde(rename = "recon_fast")]
    FastRecon,
    #[serde(rename = "recon_deep")]
    DeepRecon,
    #[serde(rename = "dns_enum")]
    DnsEnum,
    #[serde(rename = "vuln_scan")]
    VulnScan,
}

impl ScanType {
    pub const ALL: [ScanType; 4] = [
        ScanType::FastRecon,
        ScanType::DeepRecon,
        ScanType::DnsEnum,
        ScanType::VulnScan,
    ];

    /// Stable name used for directories, artifact prefixes and checkpoint files.
    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::FastRecon => "recon_fast",
            ScanType::DeepRecon => "recon_deep",
            ScanType::DnsEnum => "dns_enum",
            ScanType::VulnScan => "vuln_scan",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "recon_fast" | "fast_recon" => Ok(ScanType::FastRecon),
            "recon_deep" | "deep_recon" => Ok(ScanType::DeepRecon),
            "dns_enum" | "dns" => Ok(ScanType::DnsEnum),
            "vuln_scan" | "vuln" => Ok(ScanType::VulnScan),
            _ => Err(ReconError::UnknownScanType(s.to_string())),
        }
    }
}

/// One external program call, built by a pipeline step and consumed by the tool adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub input: Option<String>,
}

impl ToolInvocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            input: None,
        }
    }

    /// Pipe `input` to the program's standard input.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// How a tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// The process ran to completion. A non-zero code is not a failure.
    Exited { code: Option<i32> },
    /// The program is not on the search path; nothing was spawned.
    Unavailable,
    /// Spawning or waiting failed at the OS level.
    Failed,
    /// The ceiling elapsed and the process was killed.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ToolStatus,
}

impl ToolResult {
    pub fn unavailable(program: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("{program}: not found on search path"),
            status: ToolStatus::Unavailable,
        }
    }

    pub fn failed(status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            status,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.status, ToolStatus::Exited { .. })
    }

    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        output_lines(&self.stdout)
    }
}

pub(crate) fn output_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn is_empty_set(set: &BTreeSet<String>) -> bool {
    set.is_empty()
}

/// Aggregated output of one run. Only categories relevant to the scan type are populated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultBundle {
    pub scan_type: ScanType,
    pub target: String,
    #[serde(default, skip_serializing_if = "is_empty_set")]
    pub subdomains: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "is_empty_set")]
    pub live_hosts: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "is_empty_set")]
    pub endpoints: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_records: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_set")]
    pub skipped_tools: BTreeSet<String>,
}

impl ResultBundle {
    pub fn new(scan_type: ScanType, target: &str) -> Self {
        Self {
            scan_type,
            target: target.to_string(),
            subdomains: BTreeSet::new(),
            live_hosts: BTreeSet::new(),
            endpoints: BTreeSet::new(),
            technologies: Vec::new(),
            dns_records: Vec::new(),
            vulnerabilities: Vec::new(),
            skipped_tools: BTreeSet::new(),
        }
    }

    /// True when no result category holds anything. Skipped tools are not results.
    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
            && self.live_hosts.is_empty()
            && self.endpoints.is_empty()
            && self.technologies.is_empty()
            && self.dns_records.is_empty()
            && self.vulnerabilities.is_empty()
    }
}

/// A durable snapshot of a run, one file per save.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// File name inside the checkpoint directory. Not stored in the file itself.
    #[serde(skip)]
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub target: String,
    pub scan_type: ScanType,
    pub results: ResultBundle,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
}
