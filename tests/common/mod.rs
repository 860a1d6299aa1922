#![allow(dead_code)]

use std::sync::Mutex;

use reconwalk::config::ScanSettings;
use reconwalk::tool::ToolExecutor;
use reconwalk::types::{ToolInvocation, ToolResult, ToolStatus};
use reconwalk::workspace::Workspace;
use reconwalk::Orchestrator;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Canned {
    program: String,
    arg: Option<String>,
    stdout: String,
}

/// Scripted stand-in for the host's recon tools.
///
/// Programs without a canned output are reported as not installed.
#[derive(Default)]
pub struct FakeTools {
    outputs: Vec<Canned>,
    failing: Vec<String>,
    cancel_on: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, program: &str, stdout: &str) -> Self {
        self.outputs.push(Canned {
            program: program.into(),
            arg: None,
            stdout: stdout.into(),
        });
        self
    }

    /// Output used only when the invocation carries `arg`.
    pub fn output_with_arg(mut self, program: &str, arg: &str, stdout: &str) -> Self {
        self.outputs.push(Canned {
            program: program.into(),
            arg: Some(arg.into()),
            stdout: stdout.into(),
        });
        self
    }

    pub fn failing(mut self, program: &str) -> Self {
        self.failing.push(program.into());
        self
    }

    /// Cancel `token` while `program` is running, as a Ctrl-C would.
    pub fn cancel_when(mut self, program: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((program.into(), token));
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }
}

impl ToolExecutor for FakeTools {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        self.calls.lock().unwrap().push(invocation.clone());
        if let Some((program, token)) = &self.cancel_on {
            if *program == invocation.program {
                token.cancel();
            }
        }
        if self.failing.contains(&invocation.program) {
            return ToolResult::failed(ToolStatus::Failed, "spawn failed");
        }
        let canned = self.outputs.iter().find(|c| {
            c.program == invocation.program
                && c.arg.as_ref().map_or(true, |a| invocation.args.contains(a))
        });
        match canned {
            Some(c) => ToolResult {
                stdout: c.stdout.clone(),
                stderr: String::new(),
                status: ToolStatus::Exited { code: Some(0) },
            },
            None => ToolResult::unavailable(&invocation.program),
        }
    }
}

pub fn workspace() -> (TempDir, Workspace) {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::new(tmp.path().join("home"), tmp.path().join("hunt"));
    ws.ensure().unwrap();
    (tmp, ws)
}

pub fn orchestrator(ws: &Workspace, tools: FakeTools) -> Orchestrator<FakeTools> {
    Orchestrator::new(ScanSettings::default(), ws, tools)
}

pub fn lines(s: &str) -> Vec<String> {
    s.lines().map(str::to_string).collect()
}
