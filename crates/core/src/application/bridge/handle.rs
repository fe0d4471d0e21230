// Session Handle - shared state of one running (or finished) session

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::domain::{ExitReport, OutputFragment, Session, SessionId};
use crate::error::{BridgeError, Result};
use crate::port::{InputSink, ProcessHandle, TerminateSender, TimeProvider};

use super::output_stream::OutputStream;

/// Result of a terminate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Termination was requested now
    Requested,
    /// A previous call already requested it; nothing was done
    AlreadyRequested,
    /// The process had already exited; nothing was done
    AlreadyExited,
}

pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) session: Mutex<Session>,
    input: tokio::sync::Mutex<Box<dyn InputSink>>,
    output: Mutex<Option<mpsc::Receiver<OutputFragment>>>,
    exit: watch::Receiver<Option<ExitReport>>,
    terminate: TerminateSender,
    time_provider: Arc<dyn TimeProvider>,
}

impl SessionShared {
    /// Move the session out of Running once the exit report is known
    pub(crate) fn settle(&self) -> Option<ExitReport> {
        let report = self.exit.borrow().clone()?;
        let mut session = self.session.lock();
        if session.is_running() {
            let now = self.time_provider.now_millis();
            if let Err(e) = session.finish(report.clone(), now) {
                debug!(session_id = %self.id, error = %e, "Session already settled");
            }
        }
        Some(report)
    }
}

/// Cloneable handle to one session
///
/// All clones observe the same process. Dropping the last clone stops the
/// process if it is still running.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(
        session: Session,
        process: ProcessHandle,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                id: session.id.clone(),
                session: Mutex::new(session),
                input: tokio::sync::Mutex::new(process.input),
                output: Mutex::new(Some(process.output)),
                exit: process.exit,
                terminate: process.terminate,
                time_provider,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.session.lock().pid
    }

    /// True until the launcher has published an exit report
    pub fn is_running(&self) -> bool {
        self.shared.exit.borrow().is_none()
    }

    /// Exit report, once the process has finished
    pub fn exit_report(&self) -> Option<ExitReport> {
        self.shared.settle()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_report().and_then(|r| r.code)
    }

    /// Copy of the session, including output delivered so far
    pub fn snapshot(&self) -> Session {
        self.shared.settle();
        self.shared.session.lock().clone()
    }

    /// Forget output captured so far (the log view was cleared)
    pub fn clear_output(&self) {
        self.shared.session.lock().output.clear();
    }

    /// Wait for the process to finish
    pub async fn wait(&self) -> Result<ExitReport> {
        let mut exit = self.shared.exit.clone();
        exit.wait_for(|report| report.is_some())
            .await
            .map_err(|_| {
                BridgeError::Internal(format!(
                    "launcher for session {} dropped its exit status",
                    self.shared.id
                ))
            })?;

        self.shared
            .settle()
            .ok_or_else(|| BridgeError::Internal("exit report vanished".to_string()))
    }

    pub(crate) async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(BridgeError::NotRunning(self.shared.id.clone()));
        }

        let mut input = self.shared.input.lock().await;
        if input.is_closed() {
            return Err(BridgeError::InputClosed(self.shared.id.clone()));
        }

        match input.write(data).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                if self.is_running() {
                    Err(BridgeError::InputClosed(self.shared.id.clone()))
                } else {
                    Err(BridgeError::NotRunning(self.shared.id.clone()))
                }
            }
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    pub(crate) async fn close_input(&self) {
        self.shared.input.lock().await.close().await;
    }

    pub(crate) fn take_output(&self) -> Result<OutputStream> {
        let rx = self
            .shared
            .output
            .lock()
            .take()
            .ok_or_else(|| BridgeError::OutputTaken(self.shared.id.clone()))?;
        Ok(OutputStream::new(Arc::clone(&self.shared), rx))
    }

    pub(crate) fn request_terminate(&self) -> TerminateOutcome {
        if !self.is_running() {
            return TerminateOutcome::AlreadyExited;
        }
        if self.shared.terminate.request() {
            TerminateOutcome::Requested
        } else {
            TerminateOutcome::AlreadyRequested
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .finish()
    }
}
