use std::fmt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifacts::ScanLayout;
use crate::checkpoint::CheckpointStore;
use crate::config::ScanSettings;
use crate::error::Result;
use crate::pipeline::{artifacts_for, steps_for, StepContext};
use crate::tool::ToolExecutor;
use crate::types::{Checkpoint, ResultBundle, ScanType};
use crate::workspace::Workspace;

/// Lifecycle of a single scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    InterruptedSaved,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::InterruptedSaved => "interrupted",
        };
        f.write_str(s)
    }
}

/// What a run ended with.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub scan_type: ScanType,
    pub target: String,
    /// Bundle as it stood when the run stopped.
    pub bundle: ResultBundle,
    /// Checkpoint written on completion or interrupt, if any.
    pub checkpoint: Option<Checkpoint>,
    pub error: Option<String>,
    pub scan_dir: PathBuf,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

enum Progress {
    Finished,
    Interrupted,
}

/// Drives pipelines for one target at a time and owns the recovery protocol.
pub struct Orchestrator<E> {
    settings: ScanSettings,
    hunt_dir: PathBuf,
    store: CheckpointStore,
    tools: E,
    cancel: CancellationToken,
}

impl<E: ToolExecutor> Orchestrator<E> {
    pub fn new(settings: ScanSettings, workspace: &Workspace, tools: E) -> Self {
        Self {
            settings,
            hunt_dir: workspace.hunt_dir().to_path_buf(),
            store: CheckpointStore::new(workspace.progress_dir()),
            tools,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one cancelled by a Ctrl-C listener.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn tools(&self) -> &E {
        &self.tools
    }

    /// Run one pipeline against `target` from the first step.
    pub async fn run(&self, scan_type: ScanType, target: &str, save_progress: bool) -> RunOutcome {
        self.execute(scan_type, target, save_progress).await
    }

    /// Restart the checkpoint's pipeline from its first step.
    ///
    /// The checkpoint's bundle is re-saved as a seed checkpoint first, then
    /// the full pipeline runs with progress saving on. Individual tools are
    /// not resumable, so nothing is skipped.
    pub async fn resume(&self, checkpoint: &Checkpoint) -> RunOutcome {
        info!(
            checkpoint = %checkpoint.id,
            scan_type = %checkpoint.scan_type,
            target = %checkpoint.target,
            "resuming from checkpoint"
        );
        let layout = ScanLayout::new(&self.hunt_dir, &checkpoint.target, checkpoint.scan_type);
        if let Err(e) = self.store.save_resume_seed(checkpoint) {
            let bundle = ResultBundle::new(checkpoint.scan_type, &checkpoint.target);
            return self.fail(&layout, bundle, &e.to_string());
        }
        self.execute(checkpoint.scan_type, &checkpoint.target, true)
            .await
    }

    async fn execute(&self, scan_type: ScanType, target: &str, save_progress: bool) -> RunOutcome {
        let layout = ScanLayout::new(&self.hunt_dir, target, scan_type);
        info!(
            %scan_type,
            target = %target,
            from = %RunState::Idle,
            to = %RunState::Running,
            "scan started"
        );

        let mut bundle = ResultBundle::new(scan_type, target);
        let driven = self.drive(&layout, &mut bundle).await;
        match driven {
            Ok(Progress::Finished) => self.complete(&layout, bundle, save_progress),
            Ok(Progress::Interrupted) => self.interrupt(&layout, bundle, save_progress),
            Err(e) => self.fail(&layout, bundle, &e.to_string()),
        }
    }

    /// Run every step in order, checking for cancellation between steps and
    /// snapshotting the bundle after each one.
    async fn drive(&self, layout: &ScanLayout, bundle: &mut ResultBundle) -> Result<Progress> {
        layout.create()?;
        layout.clear_run_artifacts(artifacts_for(bundle.scan_type))?;

        let target = bundle.target.clone();
        let ctx = StepContext {
            target: &target,
            settings: &self.settings,
            layout,
        };
        for step in steps_for(bundle.scan_type) {
            if self.cancel.is_cancelled() {
                warn!(step = %step.name(), "interrupt received, stopping before step");
                return Ok(Progress::Interrupted);
            }
            info!(step = %step.name(), "running step");
            step.run(&ctx, &self.tools, bundle).await?;
            layout.save_progress(bundle)?;
        }
        Ok(Progress::Finished)
    }

    fn complete(&self, layout: &ScanLayout, bundle: ResultBundle, save_progress: bool) -> RunOutcome {
        if let Err(e) = layout.clear_error() {
            return self.fail(layout, bundle, &e.to_string());
        }
        let results = match layout.write_results(&bundle) {
            Ok(path) => path,
            Err(e) => return self.fail(layout, bundle, &e.to_string()),
        };
        let checkpoint = if save_progress {
            match self.store.save(&bundle, true) {
                Ok(cp) => Some(cp),
                Err(e) => return self.fail(layout, bundle, &e.to_string()),
            }
        } else {
            None
        };
        info!(
            scan_type = %bundle.scan_type,
            target = %bundle.target,
            subdomains = bundle.subdomains.len(),
            live_hosts = bundle.live_hosts.len(),
            endpoints = bundle.endpoints.len(),
            technologies = bundle.technologies.len(),
            dns_records = bundle.dns_records.len(),
            vulnerabilities = bundle.vulnerabilities.len(),
            results = %results.display(),
            to = %RunState::Completed,
            "scan finished"
        );
        self.outcome(RunState::Completed, layout, bundle, checkpoint, None)
    }

    /// Persist whatever the last completed step left on disk.
    fn interrupt(&self, layout: &ScanLayout, bundle: ResultBundle, save_progress: bool) -> RunOutcome {
        let mut checkpoint = None;
        if save_progress {
            match layout.load_progress() {
                Some(partial) => match self.store.save(&partial, false) {
                    Ok(cp) => checkpoint = Some(cp),
                    Err(e) => return self.fail(layout, bundle, &e.to_string()),
                },
                None => warn!("interrupted before any step finished, nothing to save"),
            }
        }
        info!(
            scan_type = %bundle.scan_type,
            target = %bundle.target,
            saved = checkpoint.is_some(),
            to = %RunState::InterruptedSaved,
            "scan interrupted"
        );
        self.outcome(RunState::InterruptedSaved, layout, bundle, checkpoint, None)
    }

    fn fail(&self, layout: &ScanLayout, bundle: ResultBundle, message: &str) -> RunOutcome {
        error!(
            scan_type = %bundle.scan_type,
            target = %bundle.target,
            error = message,
            to = %RunState::Failed,
            "scan failed"
        );
        // the run may fail before its directory exists
        let written = layout
            .create()
            .and_then(|()| layout.clear_results())
            .and_then(|()| layout.write_error(&bundle.target, message));
        if let Err(e) = written {
            error!(error = %e, "could not write error artifact");
        }
        self.outcome(RunState::Failed, layout, bundle, None, Some(message.to_string()))
    }

    fn outcome(
        &self,
        state: RunState,
        layout: &ScanLayout,
        bundle: ResultBundle,
        checkpoint: Option<Checkpoint>,
        error: Option<String>,
    ) -> RunOutcome {
        RunOutcome {
            state,
            scan_type: bundle.scan_type,
            target: bundle.target.clone(),
            bundle,
            checkpoint,
            error,
            scan_dir: layout.scan_dir().to_path_buf(),
        }
    }
}
