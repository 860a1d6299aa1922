//! Scan pipelines as data.
//!
//! Each [`ScanType`] maps to a fixed, ordered slice of [`Step`]s. The
//! orchestrator runs them one at a time and owns everything between steps
//! (cancellation checks, progress snapshots); a step only calls tools,
//! updates the bundle, and writes its own artifact.

use std::fs;
use std::io;

use tracing::{info, warn};

use crate::artifacts::{self, ScanLayout};
use crate::config::ScanSettings;
use crate::error::Result;
use crate::filter::filter_hosts;
use crate::tool::ToolExecutor;
use crate::types::{output_lines, ResultBundle, ScanType, ToolInvocation, ToolStatus};

/// Passive/active subdomain discovery sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    Subfinder,
    Findomain,
    Assetfinder,
    /// Active enumeration bounded by the DNS query budget.
    AmassActive,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Discover(Discovery),
    /// Noise-filter the candidate set; replaces `subdomains` with the filtered set.
    Filter,
    /// Liveness probe fed with the filtered set on stdin.
    Probe { tech_detect: bool },
    Fingerprint,
    HistoricalEndpoints,
    PassiveDns,
    ResolveRecords,
    VulnTemplates,
    /// Template follow-up gated on `marker` in the prior deep-recon fingerprints.
    TechFollowUp {
        marker: &'static str,
        templates: &'static str,
    },
}

const FAST_RECON: &[Step] = &[
    Step::Discover(Discovery::Subfinder),
    Step::Discover(Discovery::Findomain),
    Step::Discover(Discovery::Assetfinder),
    Step::Filter,
    Step::Probe { tech_detect: false },
];

const DEEP_RECON: &[Step] = &[
    Step::Discover(Discovery::AmassActive),
    Step::Fingerprint,
    Step::HistoricalEndpoints,
    Step::Filter,
    Step::Probe { tech_detect: true },
];

const DNS_ENUM: &[Step] = &[Step::PassiveDns, Step::ResolveRecords];

const VULN_SCAN: &[Step] = &[
    Step::VulnTemplates,
    Step::TechFollowUp {
        marker: "wordpress",
        templates: "wordpress",
    },
    Step::TechFollowUp {
        marker: "apache",
        templates: "apache",
    },
];

/// The step sequence for a scan type.
pub fn steps_for(scan_type: ScanType) -> &'static [Step] {
    match scan_type {
        ScanType::FastRecon => FAST_RECON,
        ScanType::DeepRecon => DEEP_RECON,
        ScanType::DnsEnum => DNS_ENUM,
        ScanType::VulnScan => VULN_SCAN,
    }
}

/// Every artifact file a scan type's steps may write.
pub fn artifacts_for(scan_type: ScanType) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for step in steps_for(scan_type) {
        for name in step.artifacts() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Everything a step needs besides the tools and the bundle.
pub struct StepContext<'a> {
    pub target: &'a str,
    pub settings: &'a ScanSettings,
    pub layout: &'a ScanLayout,
}

impl Step {
    pub fn name(&self) -> String {
        match self {
            Step::Discover(d) => format!("discover:{}", d.program()),
            Step::Filter => "filter".into(),
            Step::Probe { .. } => "probe".into(),
            Step::Fingerprint => "fingerprint".into(),
            Step::HistoricalEndpoints => "endpoints".into(),
            Step::PassiveDns => "passive-dns".into(),
            Step::ResolveRecords => "dns-records".into(),
            Step::VulnTemplates => "vuln-templates".into(),
            Step::TechFollowUp { marker, .. } => format!("follow-up:{marker}"),
        }
    }

    /// Files this step writes into the run directory.
    pub fn artifacts(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Step::Discover(_) => &[artifacts::RAW_DOMAINS],
            Step::Filter => &[artifacts::RAW_DOMAINS, artifacts::SUBDOMAINS],
            Step::Probe { tech_detect: true } => &[artifacts::LIVE_HOSTS_TECH],
            Step::Probe { tech_detect: false } => &[artifacts::LIVE_HOSTS],
            Step::Fingerprint => &[artifacts::TECH_FINGERPRINTS],
            Step::HistoricalEndpoints => &[artifacts::ENDPOINTS],
            Step::PassiveDns => &[artifacts::PASSIVE_DNS],
            Step::ResolveRecords => &[artifacts::DNS_RECORDS],
            Step::VulnTemplates => &[artifacts::VULNERABILITIES],
            Step::TechFollowUp { marker, .. } => {
                return vec![artifacts::follow_up_findings(marker)]
            }
        };
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Execute the step. Only persistence failures are returned as errors.
    pub async fn run<E: ToolExecutor>(
        &self,
        ctx: &StepContext<'_>,
        tools: &E,
        bundle: &mut ResultBundle,
    ) -> Result<()> {
        let s = ctx.settings;
        let target = ctx.target;
        let rate = s.rate_limit.per_second().to_string();
        let timeout = s.timeout.as_secs().to_string();

        match *self {
            Step::Discover(source) => {
                let Some(out) = call(tools, bundle, source.invocation(ctx)).await else {
                    return Ok(());
                };
                let before = bundle.subdomains.len();
                bundle.subdomains.extend(output_lines(&out).map(str::to_string));
                info!(
                    tool = source.program(),
                    new = bundle.subdomains.len() - before,
                    total = bundle.subdomains.len(),
                    "subdomains discovered"
                );
                if !bundle.subdomains.is_empty() {
                    ctx.layout.write_lines(artifacts::RAW_DOMAINS, &bundle.subdomains)?;
                }
            }
            Step::Filter => {
                if bundle.subdomains.is_empty() {
                    return Ok(());
                }
                ctx.layout.write_lines(artifacts::RAW_DOMAINS, &bundle.subdomains)?;
                let filtered = filter_hosts(&bundle.subdomains);
                info!(
                    candidates = bundle.subdomains.len(),
                    kept = filtered.len(),
                    "filtered subdomains"
                );
                ctx.layout.write_lines(artifacts::SUBDOMAINS, &filtered)?;
                bundle.subdomains = filtered;
            }
            Step::Probe { tech_detect } => {
                if bundle.subdomains.is_empty() {
                    return Ok(());
                }
                let input: String = bundle
                    .subdomains
                    .iter()
                    .map(|h| format!("{h}\n"))
                    .collect();
                let mut args = vec![
                    "-silent".to_string(),
                    "-threads".to_string(),
                    s.threads.to_string(),
                    "-rate-limit".to_string(),
                    rate,
                ];
                if tech_detect {
                    args.push("-tech-detect".into());
                }
                let inv = ToolInvocation::new("httpx", args).with_input(input);
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                bundle.live_hosts.extend(output_lines(&out).map(str::to_string));
                info!(live = bundle.live_hosts.len(), "live hosts probed");
                let name = if tech_detect {
                    artifacts::LIVE_HOSTS_TECH
                } else {
                    artifacts::LIVE_HOSTS
                };
                ctx.layout.write_lines(name, &bundle.live_hosts)?;
            }
            Step::Fingerprint => {
                let inv = ToolInvocation::new(
                    "nuclei",
                    [
                        "-t",
                        "technologies",
                        "-u",
                        target,
                        "-rate-limit",
                        rate.as_str(),
                        "-timeout",
                        timeout.as_str(),
                    ],
                );
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                bundle.technologies = output_lines(&out).map(str::to_string).collect();
                info!(technologies = bundle.technologies.len(), "fingerprinted target");
                ctx.layout
                    .write_lines(artifacts::TECH_FINGERPRINTS, &bundle.technologies)?;
            }
            Step::HistoricalEndpoints => {
                let inv = ToolInvocation::new("waybackurls", [target]);
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                bundle.endpoints.extend(output_lines(&out).map(str::to_string));
                info!(endpoints = bundle.endpoints.len(), "historical endpoints collected");
                ctx.layout.write_lines(artifacts::ENDPOINTS, &bundle.endpoints)?;
            }
            Step::PassiveDns => {
                let inv = ToolInvocation::new("amass", ["enum", "-passive", "-d", target]);
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                let names: Vec<&str> = output_lines(&out).collect();
                if !names.is_empty() {
                    bundle.subdomains.extend(names.iter().map(|n| n.to_string()));
                    ctx.layout.write_lines(artifacts::PASSIVE_DNS, &names)?;
                }
                info!(names = names.len(), "passive dns enumeration done");
            }
            Step::ResolveRecords => {
                let inv = ToolInvocation::new(
                    "dnsx",
                    ["-d", target, "-a", "-aaaa", "-cname", "-mx", "-ns", "-silent"],
                );
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                let records: Vec<String> = output_lines(&out).map(str::to_string).collect();
                if !records.is_empty() {
                    ctx.layout.write_lines(artifacts::DNS_RECORDS, &records)?;
                }
                info!(records = records.len(), "dns records resolved");
                bundle.dns_records.extend(records);
            }
            Step::VulnTemplates => {
                let inv = ToolInvocation::new(
                    "nuclei",
                    [
                        "-u",
                        target,
                        "-t",
                        "cves,vulnerabilities,misconfiguration",
                        "-rate-limit",
                        rate.as_str(),
                        "-timeout",
                        timeout.as_str(),
                        "-severity",
                        "critical,high,medium",
                        "-silent",
                    ],
                );
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                let found: Vec<String> = output_lines(&out).map(str::to_string).collect();
                if !found.is_empty() {
                    ctx.layout.write_lines(artifacts::VULNERABILITIES, &found)?;
                }
                info!(findings = found.len(), "vulnerability templates done");
                bundle.vulnerabilities.extend(found);
            }
            Step::TechFollowUp { marker, templates } => {
                if !prior_fingerprints_mention(ctx, marker) {
                    return Ok(());
                }
                info!(marker, "technology marker present, running follow-up templates");
                let inv = ToolInvocation::new(
                    "nuclei",
                    ["-u", target, "-t", templates, "-rate-limit", rate.as_str(), "-silent"],
                );
                let Some(out) = call(tools, bundle, inv).await else {
                    return Ok(());
                };
                let found: Vec<String> = output_lines(&out).map(str::to_string).collect();
                if !found.is_empty() {
                    ctx.layout
                        .write_lines(&artifacts::follow_up_findings(marker), &found)?;
                }
                info!(marker, findings = found.len(), "follow-up templates done");
                bundle.vulnerabilities.extend(found);
            }
        }
        Ok(())
    }
}

impl Discovery {
    pub fn program(self) -> &'static str {
        match self {
            Discovery::Subfinder => "subfinder",
            Discovery::Findomain => "findomain",
            Discovery::Assetfinder => "assetfinder",
            Discovery::AmassActive => "amass",
        }
    }

    fn invocation(self, ctx: &StepContext<'_>) -> ToolInvocation {
        let target = ctx.target;
        let threads = ctx.settings.threads.to_string();
        let timeout = ctx.settings.timeout.as_secs().to_string();
        let budget = ctx.settings.max_dns_queries.to_string();
        match self {
            Discovery::Subfinder => {
                ToolInvocation::new("subfinder", ["-d", target, "-t", threads.as_str()])
            }
            Discovery::Findomain => {
                ToolInvocation::new("findomain", ["--quiet", "-t", target])
            }
            Discovery::Assetfinder => {
                ToolInvocation::new("assetfinder", ["--subs-only", target])
            }
            Discovery::AmassActive => ToolInvocation::new(
                "amass",
                [
                    "enum",
                    "-active",
                    "-d",
                    target,
                    "-timeout",
                    timeout.as_str(),
                    "-max-dns-queries",
                    budget.as_str(),
                ],
            ),
        }
    }
}

/// Invoke a tool and return its stdout, or `None` when it is not installed.
///
/// Unavailable tools are recorded in the bundle; failures and timeouts are
/// logged and yield empty output so the pipeline keeps going.
async fn call<E: ToolExecutor>(
    tools: &E,
    bundle: &mut ResultBundle,
    invocation: ToolInvocation,
) -> Option<String> {
    let res = tools.invoke(&invocation).await;
    match res.status {
        ToolStatus::Exited { .. } => Some(res.stdout),
        ToolStatus::Unavailable => {
            warn!(tool = %invocation.program, "tool not found, skipping step");
            bundle.skipped_tools.insert(invocation.program);
            None
        }
        ToolStatus::Failed | ToolStatus::TimedOut => {
            warn!(
                tool = %invocation.program,
                status = ?res.status,
                stderr = %res.stderr.trim(),
                "tool failed, continuing"
            );
            Some(String::new())
        }
    }
}

/// Case-insensitive marker lookup in the deep-recon fingerprint artifact.
/// That artifact is an input here; a missing or unreadable file means no match.
fn prior_fingerprints_mention(ctx: &StepContext<'_>, marker: &str) -> bool {
    let path = ctx
        .layout
        .sibling_artifact(ScanType::DeepRecon, artifacts::TECH_FINGERPRINTS);
    match fs::read_to_string(&path) {
        Ok(text) => text.to_lowercase().contains(&marker.to_lowercase()),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot read prior fingerprints");
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scan_type_has_steps() {
        for st in ScanType::ALL {
            assert!(!steps_for(st).is_empty(), "{st} has no steps");
        }
    }

    #[test]
    fn filter_precedes_probe_wherever_both_appear() {
        for st in ScanType::ALL {
            let steps = steps_for(st);
            let filter = steps.iter().position(|s| *s == Step::Filter);
            let probe = steps.iter().position(|s| matches!(s, Step::Probe { .. }));
            if let (Some(f), Some(p)) = (filter, probe) {
                assert!(f < p, "{st}: probe runs before filter");
            }
        }
    }

    #[test]
    fn dns_enum_never_filters() {
        assert!(!steps_for(ScanType::DnsEnum).contains(&Step::Filter));
    }

    #[test]
    fn deep_recon_starts_with_active_enumeration() {
        assert_eq!(
            steps_for(ScanType::DeepRecon)[0],
            Step::Discover(Discovery::AmassActive)
        );
    }

    #[test]
    fn run_artifacts_cover_every_step_once() {
        assert_eq!(
            artifacts_for(ScanType::FastRecon),
            vec![
                artifacts::RAW_DOMAINS,
                artifacts::SUBDOMAINS,
                artifacts::LIVE_HOSTS
            ]
        );
        let vuln = artifacts_for(ScanType::VulnScan);
        assert!(vuln.contains(&"vulnerabilities_wordpress.txt".to_string()));
        assert!(vuln.contains(&"vulnerabilities_apache.txt".to_string()));
        // the deep-recon fingerprints a vuln scan reads are never its own
        assert!(!vuln.contains(&artifacts::TECH_FINGERPRINTS.to_string()));
    }

    #[test]
    fn step_names_are_readable() {
        assert_eq!(Step::Discover(Discovery::Findomain).name(), "discover:findomain");
        assert_eq!(
            Step::TechFollowUp { marker: "apache", templates: "apache" }.name(),
            "follow-up:apache"
        );
    }
}
