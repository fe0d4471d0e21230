// Session Domain Model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::{DomainError, Result};
use super::output::{OutputBuffer, OutputChunk};

/// Session ID (UUID v4)
pub type SessionId = String;

/// Session State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    Exited,
    Terminated,
    TimedOut,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::Exited => write!(f, "EXITED"),
            SessionState::Terminated => write!(f, "TERMINATED"),
            SessionState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// How the child process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitOutcome {
    /// The process exited on its own
    Exited,
    /// The process was stopped by a terminate request
    Terminated,
    /// The process was stopped because its timeout elapsed
    TimedOut,
}

/// Final status of a child process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    pub outcome: ExitOutcome,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal number (unix only)
    pub signal: Option<i32>,
    pub duration_ms: i64,
}

impl ExitReport {
    /// True only for a process that exited by itself with code 0
    pub fn success(&self) -> bool {
        self.outcome == ExitOutcome::Exited && self.code == Some(0)
    }
}

impl std::fmt::Display for ExitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.outcome, self.code, self.signal) {
            (ExitOutcome::Exited, Some(code), _) => write!(f, "exited with code {}", code),
            (ExitOutcome::Exited, None, Some(sig)) => write!(f, "killed by signal {}", sig),
            (ExitOutcome::Exited, None, None) => write!(f, "exited"),
            (ExitOutcome::Terminated, _, _) => write!(f, "terminated"),
            (ExitOutcome::TimedOut, _, _) => write!(f, "timed out"),
        }
    }
}

/// Session Entity - one run of a target script and its I/O state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub target: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,

    pub state: SessionState,
    pub pid: Option<u32>,

    pub started_at: i64, // epoch ms
    pub finished_at: Option<i64>,

    pub output: OutputBuffer,
    pub exit: Option<ExitReport>,
}

impl Session {
    /// Create a session for a process that has just been spawned
    ///
    /// # Arguments
    ///
    /// * `id` - Unique session ID (injected, not generated)
    /// * `started_at` - Spawn timestamp in epoch ms (injected, not system time)
    /// * `target` - Script or executable that was launched
    /// * `args` - Arguments passed through unmodified
    pub fn new(
        id: impl Into<String>,
        started_at: i64,
        target: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            args,
            working_dir: None,
            state: SessionState::Running,
            pid: None,
            started_at,
            finished_at: None,
            output: OutputBuffer::new(),
            exit: None,
        }
    }

    /// Exit code, once the process has finished
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.as_ref().and_then(|e| e.code)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Record output delivered by the bridge
    pub fn record_output(&mut self, chunk: OutputChunk) {
        self.output.push(chunk);
    }

    /// Transition out of Running with explicit timestamp
    pub fn finish(&mut self, report: ExitReport, now_millis: i64) -> Result<()> {
        let next = match report.outcome {
            ExitOutcome::Exited => SessionState::Exited,
            ExitOutcome::Terminated => SessionState::Terminated,
            ExitOutcome::TimedOut => SessionState::TimedOut,
        };

        if self.state != SessionState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        self.state = next;
        self.exit = Some(report);
        self.finished_at = Some(now_millis);
        Ok(())
    }
}
