use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::types::ScanType;

pub const MAX_THREADS: u32 = 50;
pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_RATE_PER_MINUTE: u32 = 300;

/// Request rate expressed per minute, e.g. `150/minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    per_minute: u32,
}

impl RateLimit {
    pub fn per_minute(per_minute: u32) -> Self {
        Self { per_minute }
    }

    pub fn requests_per_minute(self) -> u32 {
        self.per_minute
    }

    /// Rate handed to tools whose `-rate-limit` flag counts requests per second.
    pub fn per_second(self) -> u32 {
        self.per_minute.div_ceil(60).max(1)
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/minute", self.per_minute)
    }
}

impl FromStr for RateLimit {
    type Err = ReconError;

    /// Accepts `N/minute`, `N/min`, `N/m` or a bare `N`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = s.trim();
        let count = match raw.split_once('/') {
            Some((n, unit)) if matches!(unit.trim(), "minute" | "min" | "m") => n.trim(),
            Some(_) => return Err(ReconError::InvalidRateLimit(s.to_string())),
            None => raw,
        };
        count
            .parse::<u32>()
            .map(RateLimit::per_minute)
            .map_err(|_| ReconError::InvalidRateLimit(s.to_string()))
    }
}

/// On-disk JSON configuration. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub threads: u32,
    /// Seconds, passed to tools that take their own timeout flag.
    pub timeout: u64,
    pub rate_limit: String,
    pub output_format: String,
    pub default_command: String,
    /// Seconds a single tool process may run before it is killed.
    pub tool_timeout: u64,
    /// Request budget for active DNS enumeration.
    pub max_dns_queries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 10,
            timeout: 30,
            rate_limit: "150/minute".to_string(),
            output_format: "json".to_string(),
            default_command: "recon_fast".to_string(),
            tool_timeout: 3600,
            max_dns_queries: 500,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content)
                .map_err(|e| ReconError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ReconError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| ReconError::Config(e.to_string()))
    }

    /// Command-line timeout override. The process ceiling is raised with it
    /// so a long tool flag timeout is never cut short.
    pub fn override_timeout(&mut self, secs: u64) {
        self.timeout = secs;
        self.tool_timeout = self.tool_timeout.max(secs);
    }

    /// Validate and convert into the values the orchestrator runs with.
    pub fn settings(&self) -> Result<ScanSettings> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(ReconError::Config(format!(
                "threads must be between 1 and {MAX_THREADS}, got {}",
                self.threads
            )));
        }
        if self.timeout < MIN_TIMEOUT_SECS {
            return Err(ReconError::Config(format!(
                "timeout must be at least {MIN_TIMEOUT_SECS}s, got {}s",
                self.timeout
            )));
        }
        if self.tool_timeout < self.timeout {
            return Err(ReconError::Config(format!(
                "tool_timeout ({}s) must not be shorter than timeout ({}s); raise tool_timeout in the config file",
                self.tool_timeout, self.timeout
            )));
        }
        let rate_limit: RateLimit = self.rate_limit.parse()?;
        if rate_limit.requests_per_minute() == 0
            || rate_limit.requests_per_minute() > MAX_RATE_PER_MINUTE
        {
            return Err(ReconError::Config(format!(
                "rate_limit must be between 1/minute and {MAX_RATE_PER_MINUTE}/minute, got {rate_limit}"
            )));
        }
        if !self.output_format.eq_ignore_ascii_case("json") {
            return Err(ReconError::Config(format!(
                "unsupported output_format {:?} (only \"json\")",
                self.output_format
            )));
        }
        if self.max_dns_queries == 0 {
            return Err(ReconError::Config("max_dns_queries must be positive".into()));
        }
        let default_scan: ScanType = self.default_command.parse()?;

        Ok(ScanSettings {
            threads: self.threads,
            timeout: Duration::from_secs(self.timeout),
            rate_limit,
            tool_timeout: Duration::from_secs(self.tool_timeout),
            max_dns_queries: self.max_dns_queries,
            default_scan,
        })
    }
}

/// Validated run settings threaded into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub threads: u32,
    pub timeout: Duration,
    pub rate_limit: RateLimit,
    pub tool_timeout: Duration,
    pub max_dns_queries: u32,
    pub default_scan: ScanType,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            threads: 10,
            timeout: Duration::from_secs(30),
            rate_limit: RateLimit::per_minute(150),
            tool_timeout: Duration::from_secs(3600),
            max_dns_queries: 500,
            default_scan: ScanType::FastRecon,
        }
    }
}
