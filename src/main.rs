use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Parser;
use time::format_description::well_known;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reconwalk::checkpoint::CheckpointStore;
use reconwalk::config::Config;
use reconwalk::tool::SystemTools;
use reconwalk::types::{Checkpoint, ScanType};
use reconwalk::workspace::Workspace;
use reconwalk::{Orchestrator, RunOutcome, RunState};

/// reconwalk — orchestrates external recon tools, filters their noise and checkpoints progress.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reconwalk",
    version,
    about = "Orchestrates external recon tools against a domain, filters noise, and checkpoints scans.",
    long_about = None
)]
struct Cli {
    /// Target domain to scan.
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Quick reconnaissance: passive discovery, noise filter, liveness probe.
    #[arg(long = "recon-fast")]
    recon_fast: bool,

    /// Deep reconnaissance: active enumeration, fingerprinting, historical endpoints.
    #[arg(long = "recon-deep")]
    recon_deep: bool,

    /// DNS enumeration: passive names and A/AAAA/CNAME/MX/NS records.
    #[arg(short = 'D', long)]
    dns: bool,

    /// Vulnerability templates, plus follow-ups driven by earlier deep-recon fingerprints.
    #[arg(long)]
    vuln: bool,

    /// Threads handed to tools that take a concurrency flag (overrides config).
    #[arg(short = 'T', long)]
    threads: Option<u32>,

    /// Per-tool timeout in seconds passed to tools' own flags (overrides config).
    #[arg(short = 'O', long)]
    timeout: Option<u64>,

    /// Rate limit, e.g. "150/minute" (overrides config).
    #[arg(short = 'R', long)]
    rate: Option<String>,

    /// Save a checkpoint when a scan completes or is interrupted.
    #[arg(short = 's', long)]
    save: bool,

    /// List available checkpoints, newest first.
    #[arg(long = "list-progress")]
    list_progress: bool,

    /// Resume from a checkpoint: its number in --list-progress or its file name.
    #[arg(long, value_name = "N|ID")]
    resume: Option<String>,

    /// Path to the JSON config file (default: <home>/config/config.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// State directory holding config and checkpoints (default: ~/.reconwalk).
    #[arg(long)]
    home: Option<PathBuf>,

    /// Directory receiving per-target scan output (default: ~/Hunt).
    #[arg(long = "hunt-dir")]
    hunt_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error).
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn selected_scans(&self) -> Vec<ScanType> {
        [
            (self.recon_fast, ScanType::FastRecon),
            (self.recon_deep, ScanType::DeepRecon),
            (self.dns, ScanType::DnsEnum),
            (self.vuln, ScanType::VulnScan),
        ]
        .into_iter()
        .filter_map(|(on, st)| on.then_some(st))
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace = resolve_workspace(&cli)?;
    workspace
        .ensure()
        .context("failed to create working directories")?;
    let log_file = workspace.log_file(OffsetDateTime::now_utc());
    init_tracing(&cli.log_level, &log_file)?;
    info!(log = %log_file.display(), "logging initialized");

    let config_path = cli.config.clone().unwrap_or_else(|| workspace.config_file());
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.override_timeout(timeout);
    }
    if let Some(rate) = &cli.rate {
        config.rate_limit = rate.clone();
    }
    let settings = config.settings().context("invalid settings")?;

    // Ctrl-C is only observed between pipeline steps.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current tool before stopping");
            cancel_ctrlc.cancel();
        }
    });

    let tools = SystemTools::new(settings.tool_timeout);
    let orchestrator =
        Orchestrator::new(settings.clone(), &workspace, tools).with_cancellation(cancel);

    if cli.list_progress {
        print_checkpoints(&orchestrator.checkpoints().list());
        return Ok(());
    }

    if let Some(selector) = cli.resume.as_deref() {
        let checkpoint = select_checkpoint(orchestrator.checkpoints(), selector)?;
        let outcome = orchestrator.resume(&checkpoint).await;
        return finish(&outcome);
    }

    let Some(target) = cli.target.as_deref() else {
        bail!("no target given (use --target, --list-progress or --resume)");
    };
    let mut scans = cli.selected_scans();
    if scans.is_empty() {
        warn!(default = %settings.default_scan, "no scan type selected, using default");
        scans.push(settings.default_scan);
    }

    println!("reconwalk configuration:");
    println!("  target       : {}", target);
    println!(
        "  scans        : {}",
        scans.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("  threads      : {}", settings.threads);
    println!("  timeout      : {}s", settings.timeout.as_secs());
    println!("  rate_limit   : {}", settings.rate_limit);
    println!("  tool_timeout : {}s", settings.tool_timeout.as_secs());
    println!("  output       : {}", workspace.hunt_dir().display());
    println!("  save         : {}", cli.save);

    for scan in scans {
        let outcome = orchestrator.run(scan, target, cli.save).await;
        finish(&outcome)?;
    }
    info!("all operations completed");
    Ok(())
}

/// Log to stdout and to a plain-text file under `<home>/logs/`.
fn init_tracing(level: &str, log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let file = File::create(log_file)
        .with_context(|| format!("failed to create log file {}", log_file.display()))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

fn resolve_workspace(cli: &Cli) -> Result<Workspace> {
    let default = Workspace::from_home_dir();
    let home = match (&cli.home, &default) {
        (Some(h), _) => h.clone(),
        (None, Some(ws)) => ws.home().to_path_buf(),
        (None, None) => bail!("cannot determine home directory; pass --home"),
    };
    let hunt = match (&cli.hunt_dir, &default) {
        (Some(h), _) => h.clone(),
        (None, Some(ws)) => ws.hunt_dir().to_path_buf(),
        (None, None) => bail!("cannot determine home directory; pass --hunt-dir"),
    };
    Ok(Workspace::new(home, hunt))
}

/// Accept either a 1-based index into the newest-first listing or a checkpoint id.
fn select_checkpoint(store: &CheckpointStore, selector: &str) -> Result<Checkpoint> {
    if let Ok(n) = selector.parse::<usize>() {
        let points = store.list();
        if points.is_empty() {
            bail!("no progress recovery points found in {}", store.dir().display());
        }
        return match n.checked_sub(1).and_then(|i| points.get(i)) {
            Some(cp) => Ok(cp.clone()),
            None => bail!("choose a recovery point between 1 and {}", points.len()),
        };
    }
    store
        .load(selector)
        .with_context(|| format!("cannot resume from {selector}"))
}

fn finish(outcome: &RunOutcome) -> Result<()> {
    println!(
        "{} on {}: {} (output in {})",
        outcome.scan_type,
        outcome.target,
        outcome.state,
        outcome.scan_dir.display()
    );
    if let Some(cp) = &outcome.checkpoint {
        println!("  checkpoint: {}", cp.id);
    }
    match outcome.state {
        RunState::Completed => Ok(()),
        RunState::InterruptedSaved => bail!("{} interrupted", outcome.scan_type),
        _ => bail!(
            "{} failed: {}",
            outcome.scan_type,
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_checkpoints(points: &[Checkpoint]) {
    if points.is_empty() {
        println!("No progress recovery points found");
        return;
    }
    let rows: Vec<(String, String)> = points
        .iter()
        .map(|cp| {
            let ts = cp
                .timestamp
                .format(&well_known::Rfc3339)
                .unwrap_or_else(|_| cp.timestamp.unix_timestamp().to_string());
            (ts, cp.target.clone())
        })
        .collect();
    let idx_w = points.len().to_string().len().max(1);
    let ts_w = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max("timestamp".len());
    let target_w = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max("target".len());
    let scan_w = "recon_deep".len().max("scan".len());

    println!("\nAvailable recovery points:");
    println!(
        "{:>idx_w$}  {:<ts_w$}  {:<scan_w$}  {:<target_w$}  {:<8}  id",
        "#", "timestamp", "scan", "target", "status",
    );
    for (i, (cp, (ts, target))) in points.iter().zip(&rows).enumerate() {
        let status = if cp.complete { "complete" } else { "partial" };
        println!(
            "{:>idx_w$}  {:<ts_w$}  {:<scan_w$}  {:<target_w$}  {:<8}  {}",
            i + 1,
            ts,
            cp.scan_type.as_str(),
            target,
            status,
            cp.id,
        );
    }
}
