//! Local-subprocess Sandbox Session: a real `python3` child process speaking
//! the framed line protocol over its stdio pipes.
//!
//! Grounded on `mcp/transports/stdio.rs`'s `StdioTransport` (`tokio::process`
//! piped stdio, graceful-then-forced shutdown, a `Drop` impl that best-effort
//! kills the child).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::rlm::error::RlmError;
use crate::rlm::helper::HelperDispatch;

use super::protocol::{
    read_child_frame, write_request, ChildFrame, ExecutionResult, HostMessage,
};

/// The embedded interpreter loop run by every local-subprocess sandbox.
/// Stdlib-only; requires nothing beyond a `python3` on `PATH`.
const BOOTSTRAP_SRC: &str = include_str!("bootstrap.py");

/// A Python interpreter running as a local child process.
pub struct LocalSubprocessSandbox {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: Option<BufReader<ChildStdout>>,
    next_correlator: u32,
    script_path: Option<std::path::PathBuf>,
}

impl LocalSubprocessSandbox {
    pub fn new() -> Self {
        Self {
            child: None,
            stdin: None,
            stdout: None,
            next_correlator: 1,
            script_path: None,
        }
    }

    fn next_correlator(&mut self) -> u32 {
        let c = self.next_correlator;
        self.next_correlator = self.next_correlator.wrapping_add(1);
        c
    }

    async fn start(&mut self) -> Result<(), RlmError> {
        let script_path =
            std::env::temp_dir().join(format!("rlm-bootstrap-{}.py", uuid::Uuid::new_v4()));
        std::fs::write(&script_path, BOOTSTRAP_SRC).map_err(|e| RlmError::SandboxStartup {
            message: format!("failed to stage interpreter script: {e}"),
        })?;

        let mut child = Command::new("python3")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RlmError::SandboxStartup {
                message: format!("failed to spawn python3: {e}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| RlmError::SandboxStartup {
            message: "child stdin not piped".to_string(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RlmError::SandboxStartup {
                message: "child stdout not piped".to_string(),
            })?;

        self.script_path = Some(script_path);
        self.child = Some(child);
        self.stdin = Some(BufWriter::new(stdin));
        self.stdout = Some(BufReader::new(stdout));

        match self.read_frame().await? {
            ChildFrame::Ready => Ok(()),
            _ => Err(RlmError::SandboxStartup {
                message: "expected ready marker as first message".to_string(),
            }),
        }
    }

    async fn read_frame(&mut self) -> Result<ChildFrame, RlmError> {
        let stdout = self.stdout.as_mut().ok_or_else(channel_gone)?;
        read_child_frame(stdout).await
    }

    async fn send(&mut self, correlator: u32, opcode: HostMessage, body: &[u8]) -> Result<(), RlmError> {
        let stdin = self.stdin.as_mut().ok_or_else(channel_gone)?;
        write_request(stdin, correlator, opcode, body).await
    }

    /// Run one request/response round-trip, answering any helper requests
    /// the child issues in between via `helpers`.
    async fn round_trip(
        &mut self,
        opcode: HostMessage,
        body: &[u8],
        helpers: &dyn HelperDispatch,
    ) -> Result<ExecutionResult, RlmError> {
        let correlator = self.next_correlator();
        self.send(correlator, opcode, body).await?;

        loop {
            match self.read_frame().await? {
                ChildFrame::Response {
                    correlator: got,
                    result,
                } if got == correlator => return Ok(result),
                ChildFrame::Response { .. } => {
                    // Stale response from an earlier, abandoned round-trip; ignore.
                    continue;
                }
                ChildFrame::HelperRequest {
                    correlator: helper_correlator,
                    body,
                } => {
                    let texts = helpers.dispatch_raw(&body).await?;
                    self.send(helper_correlator, HostMessage::HelperResponse, &texts)
                        .await?;
                }
                ChildFrame::Ready => continue,
            }
        }
    }
}

impl Default for LocalSubprocessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_gone() -> RlmError {
    RlmError::SandboxUnavailable {
        message: "sandbox channel is not open".to_string(),
    }
}

#[async_trait]
impl super::SandboxSession for LocalSubprocessSandbox {
    async fn bootstrap(
        &mut self,
        payload_binding: &str,
        payload_json: &[u8],
        setup_code: Option<&str>,
    ) -> Result<(), RlmError> {
        self.start().await?;

        let payload_literal =
            serde_json::to_string(&String::from_utf8_lossy(payload_json).into_owned())
                .map_err(|e| RlmError::SandboxStartup {
                    message: format!("failed to embed payload literal: {e}"),
                })?;

        let mut code = format!(
            "import json as __rlm_json\n{payload_binding} = __rlm_json.loads({payload_literal})\n"
        );
        if let Some(setup) = setup_code {
            code.push_str(setup);
            code.push('\n');
        }

        let correlator = self.next_correlator();
        self.send(correlator, HostMessage::Execute, code.as_bytes())
            .await?;
        match self.read_frame().await? {
            ChildFrame::Response { result, .. } if result.completed_cleanly => Ok(()),
            ChildFrame::Response { result, .. } => Err(RlmError::SandboxStartup {
                message: format!("bootstrap snippet raised: {}", result.stderr),
            }),
            _ => Err(RlmError::SandboxStartup {
                message: "unexpected frame during bootstrap".to_string(),
            }),
        }
    }

    async fn execute(
        &mut self,
        code: &str,
        helpers: &dyn HelperDispatch,
    ) -> Result<ExecutionResult, RlmError> {
        self.round_trip(HostMessage::Execute, code.as_bytes(), helpers)
            .await
    }

    async fn evaluate_identifier(&mut self, identifier: &str) -> Result<ExecutionResult, RlmError> {
        // No helper traffic can occur during a bare identifier lookup; an
        // empty dispatcher is sufficient and keeps the call sites uniform.
        self.round_trip(
            HostMessage::EvalIdentifier,
            identifier.as_bytes(),
            &crate::rlm::helper::NullHelperDispatch,
        )
        .await
    }

    async fn terminate(&mut self) {
        if self.stdin.is_some() {
            let correlator = self.next_correlator();
            let _ = self.send(correlator, HostMessage::Terminate, b"").await;
        }
        self.stdin = None;
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        if let Some(path) = self.script_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for LocalSubprocessSandbox {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        if let Some(path) = self.script_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
