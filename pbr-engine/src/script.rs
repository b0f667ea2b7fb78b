//! Script rule execution protocol.
//!
//! A script rule runs an external executable. The material summary is
//! written to its stdin as one JSON object, then stdin is closed. The process
//! must print `{"issues": [{"rule_id", "severity", "message"}, ...]}` and exit
//! with code 0.
//!
//! This is a trust boundary: the script is arbitrary code. It receives only
//! the serialized summary, never handles to the material's files. Failures
//! are turned into synthetic issues and never abort validation:
//!
//! - non-zero exit, spawn failure, timeout or cancellation: one Critical
//!   `script_execution_failed` issue (stdout is ignored);
//! - unparseable stdout: one Major `script_output_invalid` issue.
//!
//! The timeout covers the whole exchange, including reading output that a
//! backgrounded child may keep open. On unix the script runs in its own
//! process group and the whole group is killed on timeout or cancellation.
//! Runs are never retried.

use crate::cancel::CancellationToken;
use crate::material::{MaterialSummary, TextureSet};
use crate::validation::{Issue, Severity};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Timeout applied when neither the rule nor the configuration sets one.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Rule id of the issue emitted when a script cannot complete successfully.
pub const SCRIPT_EXECUTION_FAILED: &str = "script_execution_failed";

/// Rule id of the issue emitted when a script prints something unparseable.
pub const SCRIPT_OUTPUT_INVALID: &str = "script_output_invalid";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Response printed by a script on stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub issues: Vec<ScriptIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptIssue {
    /// Falls back to the plugin rule id when empty
    #[serde(default)]
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

/// Why a script run did not produce a usable response
#[derive(Debug, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("failed to serialize script request: {0}")]
    Request(#[source] serde_json::Error),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for script: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?} and was killed")]
    Timeout(Duration),

    #[error("cancelled and was killed")]
    Cancelled,

    #[error("exited with code {0}")]
    NonZeroExit(i32),

    #[error("terminated by signal")]
    Signaled,

    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl RuleEvaluationError {
    /// Synthetic issue reported in place of the script's own issues.
    pub fn to_issue(&self, rule_id: &str) -> Issue {
        match self {
            RuleEvaluationError::InvalidOutput(_) => Issue::new(
                SCRIPT_OUTPUT_INVALID,
                Severity::Major,
                format!("Script rule '{}' produced {}", rule_id, self),
            ),
            _ => Issue::new(
                SCRIPT_EXECUTION_FAILED,
                Severity::Critical,
                format!("Script rule '{}' {}", rule_id, self),
            ),
        }
    }
}

/// Runs script rules with a bounded wait.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_TIMEOUT)
    }
}

impl ScriptRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluate a script rule against a material. Never fails: errors become
    /// a single synthetic issue.
    pub fn run(
        &self,
        command: &str,
        args: &[String],
        set: &TextureSet,
        rule_id: &str,
    ) -> Vec<Issue> {
        match self.execute(command, args, &set.summary()) {
            Ok(response) => response
                .issues
                .into_iter()
                .map(|si| {
                    let id = if si.rule_id.trim().is_empty() {
                        rule_id.to_string()
                    } else {
                        si.rule_id
                    };
                    Issue::new(id, si.severity, si.message)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(rule_id, command, error = %e, "Script rule failed");
                vec![e.to_issue(rule_id)]
            }
        }
    }

    /// One request/response exchange with the script.
    pub fn execute(
        &self,
        command: &str,
        args: &[String],
        request: &MaterialSummary,
    ) -> Result<ScriptResponse, RuleEvaluationError> {
        let payload = serde_json::to_vec(request).map_err(RuleEvaluationError::Request)?;
        let deadline = Instant::now().checked_add(self.timeout);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(|source| RuleEvaluationError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let group = child.id();

        // Feed stdin and drain both output pipes on helper threads so a
        // chatty script cannot fill a pipe and stall while we wait on it.
        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    tracing::debug!(error = %e, "Script did not consume its input");
                }
            });
        }
        let (tx, rx) = mpsc::channel();
        let mut pending = 0;
        if let Some(pipe) = child.stdout.take() {
            drain(pipe, Stream::Stdout, tx.clone());
            pending += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            drain(pipe, Stream::Stderr, tx.clone());
            pending += 1;
        }
        drop(tx);

        let status = self.wait(&mut child, deadline)?;
        let (out, err) = match self.collect(&rx, pending, deadline) {
            Ok(output) => output,
            Err(e) => {
                // The script exited but something it started still holds the pipes
                kill_group(group);
                return Err(e);
            }
        };

        if !err.is_empty() {
            tracing::debug!(command, stderr = %String::from_utf8_lossy(&err), "Script stderr");
        }
        if !status.success() {
            return Err(match status.code() {
                Some(code) => RuleEvaluationError::NonZeroExit(code),
                None => RuleEvaluationError::Signaled,
            });
        }

        serde_json::from_slice(&out).map_err(|e| RuleEvaluationError::InvalidOutput(e.to_string()))
    }

    /// Poll the child until it exits, the deadline passes or the run is
    /// cancelled. The child is killed in the last two cases.
    fn wait(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
    ) -> Result<ExitStatus, RuleEvaluationError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Err(e) = self.check(deadline) {
                kill(child);
                return Err(e);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for `pending` drained pipes, bounded by the same deadline.
    fn collect(
        &self,
        rx: &Receiver<(Stream, Vec<u8>)>,
        mut pending: usize,
        deadline: Option<Instant>,
    ) -> Result<(Vec<u8>, Vec<u8>), RuleEvaluationError> {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        while pending > 0 {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((Stream::Stdout, buf)) => {
                    out = buf;
                    pending -= 1;
                }
                Ok((Stream::Stderr, buf)) => {
                    err = buf;
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => self.check(deadline)?,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok((out, err))
    }

    fn check(&self, deadline: Option<Instant>) -> Result<(), RuleEvaluationError> {
        if self.cancel.is_cancelled() {
            return Err(RuleEvaluationError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RuleEvaluationError::Timeout(self.timeout));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn kill(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// Kill everything in the script's process group.
#[cfg(unix)]
fn kill_group(group: u32) {
    let Ok(pgid) = libc::pid_t::try_from(group) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    // created for this script by `process_group(0)`.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_group: u32) {}

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}
