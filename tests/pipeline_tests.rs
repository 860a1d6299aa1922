mod common;

use std::fs;

use common::{lines, orchestrator, workspace, FakeTools};
use reconwalk::artifacts::{self, ScanLayout};
use reconwalk::types::ScanType;
use reconwalk::RunState;

#[tokio::test]
async fn no_tools_installed_still_completes() {
    for scan in ScanType::ALL {
        let (_tmp, ws) = workspace();
        let orch = orchestrator(&ws, FakeTools::new());
        let outcome = orch.run(scan, "example.com", false).await;

        assert_eq!(outcome.state, RunState::Completed, "{scan}");
        assert!(outcome.bundle.is_empty(), "{scan} produced results");
        assert!(!outcome.bundle.skipped_tools.is_empty(), "{scan} skipped nothing");
        assert!(outcome.error.is_none());

        let layout = ScanLayout::new(ws.hunt_dir(), "example.com", scan);
        assert!(layout.results_file().is_file());
        assert!(!layout.error_file().exists());
    }
}

#[tokio::test]
async fn fast_recon_unions_filters_and_probes() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new()
        .output(
            "subfinder",
            "api.example.com\nstaging.example.com\nwww.example.com\n",
        )
        .output("findomain", "www.example.com\ncdn.cloudfront.net\n")
        .output("httpx", "https://api.example.com\nhttps://www.example.com\n");
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::FastRecon, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(
        orch.tools().programs(),
        vec!["subfinder", "findomain", "assetfinder", "httpx"]
    );
    assert!(outcome.bundle.skipped_tools.contains("assetfinder"));

    let dir = &outcome.scan_dir;
    assert_eq!(
        lines(&fs::read_to_string(dir.join(artifacts::RAW_DOMAINS)).unwrap()),
        vec![
            "api.example.com",
            "cdn.cloudfront.net",
            "staging.example.com",
            "www.example.com"
        ]
    );
    assert_eq!(
        lines(&fs::read_to_string(dir.join(artifacts::SUBDOMAINS)).unwrap()),
        vec!["api.example.com", "www.example.com"]
    );
    assert_eq!(
        lines(&fs::read_to_string(dir.join(artifacts::LIVE_HOSTS)).unwrap()),
        vec!["https://api.example.com", "https://www.example.com"]
    );

    let calls = orch.tools().calls();
    let subfinder = &calls[0];
    assert_eq!(subfinder.args, vec!["-d", "example.com", "-t", "10"]);
    let httpx = &calls[3];
    assert_eq!(
        httpx.input.as_deref(),
        Some("api.example.com\nwww.example.com\n")
    );
    assert_eq!(httpx.args, vec!["-silent", "-threads", "10", "-rate-limit", "3"]);

    let bundle = &outcome.bundle;
    assert_eq!(
        bundle.subdomains.iter().collect::<Vec<_>>(),
        vec!["api.example.com", "www.example.com"]
    );
    assert_eq!(bundle.live_hosts.len(), 2);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("recon_fast_results.json")).unwrap())
            .unwrap();
    assert_eq!(written["scan_type"], "recon_fast");
    assert_eq!(written["target"], "example.com");
    assert_eq!(written["live_hosts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deep_recon_persists_each_sub_result() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new()
        .output("amass", "api.example.com\n10.example.com\nshop.example.com\n")
        .output("nuclei", "[nginx] [tech-detect] https://example.com\n")
        .output("waybackurls", "https://example.com/login\nhttps://example.com/login\n")
        .output("httpx", "https://api.example.com [nginx]\n");
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::DeepRecon, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(
        orch.tools().programs(),
        vec!["amass", "nuclei", "waybackurls", "httpx"]
    );

    let calls = orch.tools().calls();
    assert!(calls[0].args.contains(&"-active".to_string()));
    assert!(calls[0]
        .args
        .windows(2)
        .any(|w| w == ["-max-dns-queries", "500"]));
    assert!(calls[3].args.contains(&"-tech-detect".to_string()));

    let dir = &outcome.scan_dir;
    assert!(dir.join(artifacts::TECH_FINGERPRINTS).is_file());
    assert_eq!(
        lines(&fs::read_to_string(dir.join(artifacts::ENDPOINTS)).unwrap()),
        vec!["https://example.com/login"]
    );
    assert_eq!(
        lines(&fs::read_to_string(dir.join(artifacts::SUBDOMAINS)).unwrap()),
        vec!["api.example.com", "shop.example.com"]
    );
    assert!(dir.join(artifacts::LIVE_HOSTS_TECH).is_file());
    assert_eq!(outcome.bundle.technologies.len(), 1);
}

#[tokio::test]
async fn dns_enum_keeps_raw_records_unfiltered() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new()
        .output("amass", "dev.example.com\nmail.example.com\n")
        .output(
            "dnsx",
            "example.com [A] [93.184.216.34]\nexample.com [MX] [mail.example.com]\n",
        );
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::DnsEnum, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert!(orch.tools().calls()[0].args.contains(&"-passive".to_string()));
    // dev.* would be dropped by the noise filter; dns enumeration keeps it
    assert!(outcome.bundle.subdomains.contains("dev.example.com"));
    assert_eq!(outcome.bundle.dns_records.len(), 2);

    let dir = &outcome.scan_dir;
    assert!(dir.join(artifacts::PASSIVE_DNS).is_file());
    assert!(dir.join(artifacts::DNS_RECORDS).is_file());
    assert!(!dir.join(artifacts::SUBDOMAINS).exists());
}

#[tokio::test]
async fn vuln_scan_follow_ups_follow_prior_fingerprints() {
    let (_tmp, ws) = workspace();
    let prior = ScanLayout::new(ws.hunt_dir(), "example.com", ScanType::DeepRecon);
    prior.create().unwrap();
    fs::write(
        prior.artifact(artifacts::TECH_FINGERPRINTS),
        "[WordPress:6.2] [tech-detect] https://example.com\n",
    )
    .unwrap();

    let tools = FakeTools::new()
        .output_with_arg(
            "nuclei",
            "cves,vulnerabilities,misconfiguration",
            "[CVE-2021-41773] [high] https://example.com\n",
        )
        .output_with_arg(
            "nuclei",
            "wordpress",
            "[wordpress-xmlrpc] [medium] https://example.com/xmlrpc.php\n",
        );
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::VulnScan, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    let calls = orch.tools().calls();
    assert_eq!(calls.len(), 2, "apache follow-up must not run");
    assert!(calls[1].args.contains(&"wordpress".to_string()));
    assert_eq!(outcome.bundle.vulnerabilities.len(), 2);

    let dir = &outcome.scan_dir;
    assert!(dir.join(artifacts::VULNERABILITIES).is_file());
    assert!(dir.join("vulnerabilities_wordpress.txt").is_file());
    assert!(!dir.join("vulnerabilities_apache.txt").exists());
}

#[tokio::test]
async fn vuln_scan_without_prior_deep_recon_runs_broad_scan_only() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new().output("nuclei", "");
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::VulnScan, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(orch.tools().programs(), vec!["nuclei"]);
    assert!(outcome.bundle.vulnerabilities.is_empty());
    assert!(!outcome.scan_dir.join(artifacts::VULNERABILITIES).exists());
}

#[tokio::test]
async fn failing_tool_does_not_stop_the_pipeline() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new()
        .failing("subfinder")
        .output("findomain", "www.example.com\n")
        .output("assetfinder", "api.example.com\n")
        .output("httpx", "https://www.example.com\n");
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::FastRecon, "example.com", false).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.bundle.subdomains.len(), 2);
    assert!(outcome.bundle.skipped_tools.is_empty());
}

/// A directory squatting on the snapshot's temporary name makes the first
/// progress write of a run fail.
fn block_progress_snapshots(layout: &ScanLayout) {
    let tmp_name = format!(
        ".{}.tmp",
        layout.progress_file().file_name().unwrap().to_string_lossy()
    );
    fs::create_dir_all(layout.artifact(&tmp_name)).unwrap();
}

fn unblock_progress_snapshots(layout: &ScanLayout) {
    let tmp_name = format!(
        ".{}.tmp",
        layout.progress_file().file_name().unwrap().to_string_lossy()
    );
    fs::remove_dir(layout.artifact(&tmp_name)).unwrap();
}

#[tokio::test]
async fn write_failure_fails_the_run_with_error_artifact() {
    let (_tmp, ws) = workspace();
    let layout = ScanLayout::new(ws.hunt_dir(), "example.com", ScanType::FastRecon);
    block_progress_snapshots(&layout);

    let tools = FakeTools::new().output("subfinder", "api.example.com\n");
    let orch = orchestrator(&ws, tools);
    let outcome = orch.run(ScanType::FastRecon, "example.com", true).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("recon_fast_progress.json"));
    assert!(outcome.checkpoint.is_none());
    assert_eq!(orch.tools().programs(), vec!["subfinder"]);
    assert!(layout.error_file().is_file());
    assert!(!layout.results_file().exists());
    assert!(orch.checkpoints().list().is_empty());
}

#[tokio::test]
async fn failure_after_success_leaves_only_the_error_artifact() {
    let (_tmp, ws) = workspace();
    let tools = FakeTools::new()
        .output("subfinder", "api.example.com\n")
        .output("httpx", "https://api.example.com\n");
    let first = orchestrator(&ws, tools)
        .run(ScanType::FastRecon, "example.com", false)
        .await;
    assert!(first.is_completed());
    let layout = ScanLayout::new(ws.hunt_dir(), "example.com", ScanType::FastRecon);
    assert!(layout.results_file().is_file());
    assert!(layout.artifact(artifacts::LIVE_HOSTS).is_file());

    block_progress_snapshots(&layout);
    let tools = FakeTools::new().output("subfinder", "api.example.com\n");
    let second = orchestrator(&ws, tools)
        .run(ScanType::FastRecon, "example.com", false)
        .await;

    assert_eq!(second.state, RunState::Failed);
    assert!(layout.error_file().is_file());
    assert!(!layout.results_file().exists());
    // only the step that ran before the failure left output
    assert!(layout.artifact(artifacts::RAW_DOMAINS).is_file());
    assert!(!layout.artifact(artifacts::SUBDOMAINS).exists());
    assert!(!layout.artifact(artifacts::LIVE_HOSTS).exists());
}

#[tokio::test]
async fn success_after_failure_clears_stale_artifacts() {
    let (_tmp, ws) = workspace();
    let layout = ScanLayout::new(ws.hunt_dir(), "example.com", ScanType::FastRecon);
    block_progress_snapshots(&layout);
    let tools = FakeTools::new().output("subfinder", "api.example.com\n");
    let failed = orchestrator(&ws, tools)
        .run(ScanType::FastRecon, "example.com", false)
        .await;
    assert_eq!(failed.state, RunState::Failed);
    assert!(layout.error_file().is_file());
    assert!(layout.artifact(artifacts::RAW_DOMAINS).is_file());

    unblock_progress_snapshots(&layout);
    fs::write(layout.artifact(artifacts::SUBDOMAINS), "old.example.com\n").unwrap();
    let outcome = orchestrator(&ws, FakeTools::new())
        .run(ScanType::FastRecon, "example.com", false)
        .await;

    assert!(outcome.is_completed());
    assert!(layout.results_file().is_file());
    assert!(!layout.error_file().exists());
    // nothing was discovered, so no step wrote a host list this time
    assert!(!layout.artifact(artifacts::RAW_DOMAINS).exists());
    assert!(!layout.artifact(artifacts::SUBDOMAINS).exists());
}
