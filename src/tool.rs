use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::types::{ToolInvocation, ToolResult, ToolStatus};

/// Boundary to external recon programs.
///
/// Implementations never fail across this boundary: absence, spawn errors and
/// timeouts are all reported through the returned [`ToolResult`].
pub trait ToolExecutor: Send + Sync {
    fn invoke(&self, invocation: &ToolInvocation) -> impl Future<Output = ToolResult> + Send;
}

/// Runs programs found on the host's executable search path.
#[derive(Debug, Clone)]
pub struct SystemTools {
    search_path: Option<OsString>,
    timeout: Duration,
}

impl SystemTools {
    /// Resolve programs on the process `PATH`; each call is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            search_path: None,
            timeout,
        }
    }

    /// Resolve programs on `paths` (same syntax as `PATH`) instead of the process `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(program, Some(paths), cwd).ok()
            }
            None => which::which(program).ok(),
        }
    }

    pub fn is_available(&self, program: &str) -> bool {
        self.locate(program).is_some()
    }
}

impl ToolExecutor for SystemTools {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        let Some(path) = self.locate(&invocation.program) else {
            return ToolResult::unavailable(&invocation.program);
        };
        debug!(tool = %invocation.program, args = ?invocation.args, "spawning");

        let mut cmd = Command::new(&path);
        cmd.args(&invocation.args)
            .stdin(if invocation.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ToolResult::failed(
                    ToolStatus::Failed,
                    format!("failed to spawn {}: {e}", invocation.program),
                )
            }
        };

        // Feed stdin from its own task so a child that fills its stdout pipe
        // before draining input cannot deadlock us.
        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), invocation.input.clone()) {
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ToolResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                status: ToolStatus::Exited {
                    code: output.status.code(),
                },
            },
            Ok(Err(e)) => ToolResult::failed(
                ToolStatus::Failed,
                format!("failed waiting for {}: {e}", invocation.program),
            ),
            // the dropped future owns the child; kill_on_drop reaps it
            Err(_) => ToolResult::failed(
                ToolStatus::TimedOut,
                format!(
                    "{} exceeded {}s and was killed",
                    invocation.program,
                    self.timeout.as_secs_f64()
                ),
            ),
        }
    }
}
