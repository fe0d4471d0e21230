// Process Launcher Port
// Abstraction for spawning a child process and wiring up its pipes

use crate::domain::{ExitReport, Invocation, OutputFragment};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::terminate::TerminateSender;

/// Reasons a target cannot be launched
///
/// Returned before any process exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Target not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Target is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Target is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("Working directory not found: {}", .0.display())]
    WorkingDirNotFound(PathBuf),

    #[error("Spawn failed for {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Invalid invocation: {0}")]
    Invalid(String),
}

/// Writable end of the child's standard input
#[async_trait]
pub trait InputSink: Send {
    /// Write all bytes and flush
    ///
    /// # Errors
    /// - `BrokenPipe` once the child has closed its stdin or exited
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Close stdin so the child reads EOF
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Everything the bridge needs to drive one launched process
///
/// Contract for implementations:
/// - `output` yields fragments per stream in the order the child wrote them
/// - `exit` is set to `Some` exactly once, before `output` closes
/// - a request on `terminate` (or dropping it) stops the process
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub input: Box<dyn InputSink>,
    pub output: mpsc::Receiver<OutputFragment>,
    pub exit: watch::Receiver<Option<ExitReport>>,
    pub terminate: TerminateSender,
}

/// Process Launcher trait
///
/// Implementations:
/// - SubprocessLauncher: spawns a real OS process
/// - mocks::ScriptedLauncher: replays canned output (tests)
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Check that the invocation's target can be launched, without spawning
    ///
    /// # Errors
    /// - InvocationError::NotFound if the target path does not exist
    /// - InvocationError::NotExecutable if it cannot be executed directly
    fn check_target(&self, invocation: &Invocation) -> Result<(), InvocationError>;

    /// Spawn the process with all pipes captured
    ///
    /// Implementations call `check_target` first, so a failed check never
    /// spawns anything.
    async fn launch(&self, invocation: &Invocation) -> Result<ProcessHandle, InvocationError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ExitOutcome;
    use crate::port::terminate::terminate_channel;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Mock launcher behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Emit fragments, then exit with the code
        Exit {
            fragments: Vec<OutputFragment>,
            code: i32,
        },
        /// Emit fragments, then run until terminated
        RunUntilTerminated { fragments: Vec<OutputFragment> },
        /// Echo every input write back on stdout until input is closed, then exit 0
        Echo,
        /// Refuse to launch
        Reject(InvocationError),
    }

    /// Input sink recording writes; optionally forwards them to an echo task
    pub struct RecordingInput {
        written: Arc<Mutex<Vec<String>>>,
        echo: Option<mpsc::UnboundedSender<String>>,
        exited: watch::Receiver<Option<ExitReport>>,
        closed: bool,
    }

    #[async_trait]
    impl InputSink for RecordingInput {
        async fn write(&mut self, data: &[u8]) -> io::Result<()> {
            if self.closed || self.exited.borrow().is_some() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
            }
            let text = String::from_utf8_lossy(data).into_owned();
            self.written.lock().unwrap().push(text.clone());
            if let Some(echo) = &self.echo {
                let _ = echo.send(text);
            }
            Ok(())
        }

        async fn close(&mut self) {
            self.closed = true;
            self.echo = None;
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    /// Scripted launcher for bridge tests
    pub struct ScriptedLauncher {
        behavior: MockBehavior,
        launch_count: Arc<Mutex<usize>>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedLauncher {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                launch_count: Arc::new(Mutex::new(0)),
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn exiting(fragments: Vec<OutputFragment>, code: i32) -> Self {
            Self::new(MockBehavior::Exit { fragments, code })
        }

        pub fn long_running(fragments: Vec<OutputFragment>) -> Self {
            Self::new(MockBehavior::RunUntilTerminated { fragments })
        }

        pub fn echo() -> Self {
            Self::new(MockBehavior::Echo)
        }

        pub fn rejecting(error: InvocationError) -> Self {
            Self::new(MockBehavior::Reject(error))
        }

        pub fn launch_count(&self) -> usize {
            *self.launch_count.lock().unwrap()
        }

        /// Everything written to any launched process's stdin
        pub fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    fn report(outcome: ExitOutcome, code: Option<i32>) -> Option<ExitReport> {
        Some(ExitReport {
            outcome,
            code,
            signal: None,
            duration_ms: 1,
        })
    }

    #[async_trait]
    impl ProcessLauncher for ScriptedLauncher {
        fn check_target(&self, _invocation: &Invocation) -> Result<(), InvocationError> {
            match &self.behavior {
                MockBehavior::Reject(err) => Err(err.clone()),
                _ => Ok(()),
            }
        }

        async fn launch(&self, invocation: &Invocation) -> Result<ProcessHandle, InvocationError> {
            self.check_target(invocation)?;
            *self.launch_count.lock().unwrap() += 1;

            let (out_tx, out_rx) = mpsc::channel(64);
            let (exit_tx, exit_rx) = watch::channel(None);
            let (terminate, mut token) = terminate_channel();
            let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<String>();

            let behavior = self.behavior.clone();
            let echo = matches!(behavior, MockBehavior::Echo).then_some(echo_tx);

            tokio::spawn(async move {
                match behavior {
                    MockBehavior::Exit { fragments, code } => {
                        for fragment in fragments {
                            let _ = out_tx.send(fragment).await;
                        }
                        let _ = exit_tx.send(report(ExitOutcome::Exited, Some(code)));
                    }
                    MockBehavior::RunUntilTerminated { fragments } => {
                        for fragment in fragments {
                            let _ = out_tx.send(fragment).await;
                        }
                        token.wait().await;
                        let _ = exit_tx.send(report(ExitOutcome::Terminated, None));
                    }
                    MockBehavior::Echo => loop {
                        tokio::select! {
                            line = echo_rx.recv() => match line {
                                Some(line) => {
                                    let _ = out_tx.send(OutputFragment::stdout(line)).await;
                                }
                                None => {
                                    let _ = exit_tx.send(report(ExitOutcome::Exited, Some(0)));
                                    break;
                                }
                            },
                            _ = token.wait() => {
                                let _ = exit_tx.send(report(ExitOutcome::Terminated, None));
                                break;
                            }
                        }
                    },
                    MockBehavior::Reject(_) => unreachable!("rejected before spawn"),
                }
                // Output closes only after the exit report is published
                drop(out_tx);
            });

            Ok(ProcessHandle {
                pid: Some(4242),
                input: Box::new(RecordingInput {
                    written: Arc::clone(&self.written),
                    echo,
                    exited: exit_rx.clone(),
                    closed: false,
                }),
                output: out_rx,
                exit: exit_rx,
                terminate,
            })
        }
    }
}
