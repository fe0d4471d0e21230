// Process Bridge - mediates between the presentation layer and a child process

mod handle;
mod output_stream;


pub use handle::{SessionHandle, TerminateOutcome};
pub use output_stream::{OutputStream, PollOutcome};

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::constants::DEFAULT_CAPTURE_TIMEOUT;
use crate::domain::{ExitReport, Invocation, OutputBuffer, Session};
use crate::error::Result;
use crate::port::{IdProvider, InvocationError, ProcessLauncher, TimeProvider};

/// Outcome of a run-to-completion invocation
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub report: ExitReport,
    pub output: OutputBuffer,
}

impl CapturedRun {
    pub fn success(&self) -> bool {
        self.report.success()
    }

    /// Combined stdout and stderr, trimmed
    pub fn text(&self) -> String {
        self.output.text().trim().to_string()
    }
}

/// Process Bridge service
///
/// Stateless apart from its ports: every `start` creates an independent
/// session. Use `SessionController` to enforce a single active session.
pub struct ProcessBridge {
    launcher: Arc<dyn ProcessLauncher>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProcessBridge {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            launcher,
            id_provider,
            time_provider,
        }
    }

    /// Launch `path` with `args` passed through unmodified
    ///
    /// # Errors
    /// - BridgeError::Invocation if the path does not exist or is not
    ///   executable; no process is spawned in that case
    pub async fn start(&self, path: impl Into<PathBuf>, args: Vec<String>) -> Result<SessionHandle> {
        self.start_invocation(Invocation::new(path).args(args)).await
    }

    /// Launch a fully described invocation
    pub async fn start_invocation(&self, invocation: Invocation) -> Result<SessionHandle> {
        invocation
            .validate()
            .map_err(|e| InvocationError::Invalid(e.to_string()))?;

        let process = self.launcher.launch(&invocation).await.map_err(|e| {
            warn!(
                target_path = %invocation.target.display(),
                error = %e,
                "Refusing to start session"
            );
            e
        })?;

        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();

        let mut session = Session::new(id, now, invocation.target.clone(), invocation.args.clone());
        session.working_dir = invocation.working_dir.clone();
        session.pid = process.pid;

        info!(
            session_id = %session.id,
            target_path = %invocation.target.display(),
            args = ?invocation.args,
            pid = ?process.pid,
            "Session started"
        );

        Ok(SessionHandle::new(
            session,
            process,
            Arc::clone(&self.time_provider),
        ))
    }

    /// Forward text to the child's standard input, unmodified
    ///
    /// # Errors
    /// - BridgeError::NotRunning if the process has already terminated
    /// - BridgeError::InputClosed after `close_input`
    pub async fn write_input(&self, session: &SessionHandle, text: &str) -> Result<()> {
        session.write(text.as_bytes()).await.map_err(|e| {
            if e.is_benign() {
                warn!(session_id = %session.id(), error = %e, "Input not delivered");
            }
            e
        })
    }

    /// Forward one line of user input, appending a newline
    pub async fn write_line(&self, session: &SessionHandle, line: &str) -> Result<()> {
        let mut text = String::with_capacity(line.len() + 1);
        text.push_str(line);
        text.push('\n');
        self.write_input(session, &text).await
    }

    /// Close the child's standard input so it reads EOF
    pub async fn close_input(&self, session: &SessionHandle) {
        session.close_input().await;
        info!(session_id = %session.id(), "Standard input closed");
    }

    /// Take the session's output stream
    ///
    /// # Errors
    /// - BridgeError::OutputTaken on every call after the first
    pub fn poll_output(&self, session: &SessionHandle) -> Result<OutputStream> {
        session.take_output()
    }

    /// Request termination; calling it again is a no-op
    ///
    /// Delivery depends on the OS, so the process may keep running briefly.
    pub fn terminate(&self, session: &SessionHandle) -> TerminateOutcome {
        let outcome = session.request_terminate();
        match outcome {
            TerminateOutcome::Requested => {
                info!(session_id = %session.id(), "Termination requested")
            }
            TerminateOutcome::AlreadyRequested | TerminateOutcome::AlreadyExited => {
                info!(session_id = %session.id(), outcome = ?outcome, "Terminate ignored")
            }
        }
        outcome
    }

    /// Wait for the session's process to finish
    pub async fn wait(&self, session: &SessionHandle) -> Result<ExitReport> {
        let report = session.wait().await?;
        info!(
            session_id = %session.id(),
            outcome = ?report.outcome,
            exit_code = ?report.code,
            duration_ms = report.duration_ms,
            "Session finished"
        );
        Ok(report)
    }

    /// Run an invocation to completion and collect all of its output
    ///
    /// The child's stdin is closed right away. Without an explicit timeout,
    /// `DEFAULT_CAPTURE_TIMEOUT` applies.
    pub async fn run_captured(&self, mut invocation: Invocation) -> Result<CapturedRun> {
        if invocation.timeout.is_none() {
            invocation.timeout = Some(DEFAULT_CAPTURE_TIMEOUT);
        }

        let session = self.start_invocation(invocation).await?;
        // Nothing is forwarded in this mode; a child reading stdin sees EOF
        self.close_input(&session).await;
        let mut output = self.poll_output(&session)?;
        while output.next().await.is_some() {}

        let report = self.wait(&session).await?;
        let snapshot = session.snapshot();

        Ok(CapturedRun {
            report,
            output: snapshot.output,
        })
    }
}

impl std::fmt::Debug for ProcessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBridge").finish_non_exhaustive()
    }
}
