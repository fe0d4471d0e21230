// Subprocess launcher implementation
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use procbridge_core::application::constants::{
    GRACEFUL_SHUTDOWN_TIMEOUT, OUTPUT_CHANNEL_CAPACITY, READER_DRAIN_TIMEOUT, READ_BUFFER_SIZE,
};
use procbridge_core::domain::{
    ExitOutcome, ExitReport, Invocation, OutputFragment, StreamKind, Utf8Decoder,
};
use procbridge_core::port::{
    terminate_channel, InputSink, InvocationError, ProcessHandle, ProcessLauncher, TerminateToken,
    TimeProvider,
};

use crate::target::{resolve_target, ResolvedCommand};

/// Which environment variables a child inherits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Everything from the parent process
    #[default]
    Inherit,
    /// Only the listed variables from the parent process
    Allowlist(Vec<String>),
}

/// Subprocess launcher
/// Spawns the target with all three pipes captured and supervises it on background tasks
pub struct SubprocessLauncher {
    time_provider: Arc<dyn TimeProvider>,
    env_policy: EnvPolicy,
    grace_period: Duration,
}

impl SubprocessLauncher {
    /// Create a new subprocess launcher
    ///
    /// # Example
    /// ```ignore
    /// let launcher = SubprocessLauncher::new(Arc::new(SystemTimeProvider))
    ///     .with_env_policy(EnvPolicy::Allowlist(vec!["PATH".into(), "HOME".into()]));
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            env_policy: EnvPolicy::Inherit,
            grace_period: GRACEFUL_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_env_policy(mut self, env_policy: EnvPolicy) -> Self {
        self.env_policy = env_policy;
        self
    }

    /// Time between SIGTERM and SIGKILL when stopping a process
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Filter parent environment variables to allowlist only
    ///
    /// Works on raw OS strings: a parent variable that is not valid UTF-8
    /// is filtered like any other instead of aborting the launch.
    fn filter_env<I>(&self, env: I) -> Vec<(OsString, OsString)>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        match &self.env_policy {
            EnvPolicy::Inherit => env.into_iter().collect(),
            EnvPolicy::Allowlist(allowed) => env
                .into_iter()
                .filter(|(k, _)| allowed.iter().any(|a| OsStr::new(a) == k.as_os_str()))
                .collect(),
        }
    }

    fn build_command(&self, resolved: &ResolvedCommand, invocation: &Invocation) -> Command {
        let mut command = Command::new(&resolved.program);
        command
            .args(&resolved.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &resolved.working_dir {
            command.current_dir(dir);
        }

        if let EnvPolicy::Allowlist(_) = self.env_policy {
            command.env_clear().envs(self.filter_env(std::env::vars_os()));
        }
        command.envs(&invocation.env);

        // Own process group, so termination reaches grandchildren too
        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    fn check_target(&self, invocation: &Invocation) -> Result<(), InvocationError> {
        resolve_target(invocation).map(|_| ())
    }

    async fn launch(&self, invocation: &Invocation) -> Result<ProcessHandle, InvocationError> {
        let resolved = resolve_target(invocation)?;

        info!(
            program = %resolved.program,
            args = ?resolved.args,
            working_dir = ?resolved.working_dir,
            timeout = ?invocation.timeout,
            "Spawning subprocess"
        );

        let mut child = self
            .build_command(&resolved, invocation)
            .spawn()
            .map_err(|e| InvocationError::SpawnFailed {
                program: resolved.program.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (out_tx, out_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (terminate, token) = terminate_channel();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(pump(stdout, StreamKind::Stdout, out_tx.clone())));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(pump(stderr, StreamKind::Stderr, out_tx.clone())));
        }

        let supervisor = Supervisor {
            child,
            pid,
            token,
            timeout: invocation.timeout,
            grace_period: self.grace_period,
            time_provider: Arc::clone(&self.time_provider),
            started_at: self.time_provider.now_millis(),
        };
        tokio::spawn(supervisor.run(readers, exit_tx, out_tx));

        Ok(ProcessHandle {
            pid,
            input: Box::new(PipeInput { stdin }),
            output: out_rx,
            exit: exit_rx,
            terminate,
        })
    }
}

/// Read one pipe until EOF, forwarding decoded text in order
async fn pump<R>(mut reader: R, stream: StreamKind, tx: mpsc::Sender<OutputFragment>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if tx.send(OutputFragment { stream, text }).await.is_err() {
                    // Nobody is listening any more; keep draining so the child never blocks
                    debug!(stream = %stream, "Output receiver dropped");
                }
            }
            Err(e) => {
                warn!(stream = %stream, error = %e, "Pipe read failed");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(OutputFragment { stream, text: tail }).await;
    }
}

/// Owns the child until it exits and publishes its exit report
struct Supervisor {
    child: Child,
    pid: Option<u32>,
    token: TerminateToken,
    timeout: Option<Duration>,
    grace_period: Duration,
    time_provider: Arc<dyn TimeProvider>,
    started_at: i64,
}

impl Supervisor {
    async fn run(
        mut self,
        readers: Vec<JoinHandle<()>>,
        exit_tx: watch::Sender<Option<ExitReport>>,
        // Held until the readers are drained; the report is published first
        out_tx: mpsc::Sender<OutputFragment>,
    ) {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let (status, outcome) = tokio::select! {
            status = self.child.wait() => (status, ExitOutcome::Exited),
            _ = self.token.wait() => {
                info!(pid = ?self.pid, "Terminating subprocess on request");
                (self.stop().await, ExitOutcome::Terminated)
            }
            _ = deadline => {
                warn!(pid = ?self.pid, timeout = ?timeout, "Subprocess timed out");
                (self.stop().await, ExitOutcome::TimedOut)
            }
        };

        let duration_ms = self.time_provider.now_millis() - self.started_at;
        let report = match status {
            Ok(status) => build_report(status, outcome, duration_ms),
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "Failed to collect exit status");
                ExitReport {
                    outcome,
                    code: None,
                    signal: None,
                    duration_ms,
                }
            }
        };

        info!(
            pid = ?self.pid,
            outcome = ?report.outcome,
            exit_code = ?report.code,
            signal = ?report.signal,
            duration_ms = %duration_ms,
            "Subprocess finished"
        );

        // The child is reaped: writes fail with NotRunning from here on,
        // while output stays open until the readers are done
        let _ = exit_tx.send(Some(report));

        for reader in readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                warn!(pid = ?self.pid, "Pipe still open after exit, abandoning reader");
                abort.abort();
            }
        }

        drop(out_tx);
    }

    /// Kill process group with SIGTERM first, then SIGKILL if needed
    async fn stop(&mut self) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                let group = Pid::from_raw(pid as i32);

                // Step 1: Send SIGTERM for graceful shutdown
                debug!(pid = %pid, "Sending SIGTERM to process group");
                if let Err(e) = killpg(group, Signal::SIGTERM) {
                    debug!(pid = %pid, error = %e, "SIGTERM failed, process likely gone");
                }

                // Step 2: Wait for exit, then force kill
                match tokio::time::timeout(self.grace_period, self.child.wait()).await {
                    Ok(status) => return status,
                    Err(_) => {
                        warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
                        let _ = killpg(group, Signal::SIGKILL);
                    }
                }
            }
        }

        // Windows, or a unix child whose pid is already gone
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Kill failed, process likely gone");
        }
        self.child.wait().await
    }
}

fn build_report(status: ExitStatus, outcome: ExitOutcome, duration_ms: i64) -> ExitReport {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitReport {
        outcome,
        code: status.code(),
        signal,
        duration_ms,
    }
}

/// Child stdin behind the InputSink port
struct PipeInput {
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl InputSink for PipeInput {
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => {
                stdin.write_all(data).await?;
                stdin.flush().await
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin closed",
            )),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
    }

    fn is_closed(&self) -> bool {
        self.stdin.is_none()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use procbridge_core::port::time_provider::SystemTimeProvider;
    use std::time::Instant;

    fn launcher() -> SubprocessLauncher {
        SubprocessLauncher::new(Arc::new(SystemTimeProvider))
    }

    async fn drain(handle: &mut ProcessHandle) -> String {
        let mut text = String::new();
        while let Some(fragment) = handle.output.recv().await {
            text.push_str(&fragment.text);
        }
        text
    }

    #[tokio::test]
    async fn test_launch_echo() {
        let mut handle = launcher()
            .launch(&Invocation::new("echo").arg("hello"))
            .await
            .unwrap();

        assert_eq!(drain(&mut handle).await, "hello\n");
        let report = handle.exit.borrow().clone().unwrap();
        assert_eq!(report.code, Some(0));
        assert_eq!(report.outcome, ExitOutcome::Exited);
    }

    #[tokio::test]
    async fn test_timeout_stops_process() {
        let started = Instant::now();
        let mut handle = launcher()
            .launch(
                &Invocation::new("sleep")
                    .arg("10")
                    .timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        drain(&mut handle).await;
        let report = handle.exit.borrow().clone().unwrap();

        assert_eq!(report.outcome, ExitOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sigkill_after_grace_period() {
        let launcher = launcher().with_grace_period(Duration::from_millis(200));
        let mut handle = launcher
            .launch(&Invocation::new("sh").args(["-c", "trap '' TERM; echo ready; sleep 10"]))
            .await
            .unwrap();

        let first = handle.output.recv().await.unwrap();
        assert_eq!(first.text, "ready\n");

        assert!(handle.terminate.request());
        drain(&mut handle).await;
        let report = handle.exit.borrow().clone().unwrap();

        assert_eq!(report.outcome, ExitOutcome::Terminated);
        assert_eq!(report.signal, Some(9));
    }

    #[test]
    fn test_env_filtering() {
        let launcher = launcher()
            .with_env_policy(EnvPolicy::Allowlist(vec!["ALLOWED_VAR".to_string()]));

        let env = vec![
            (OsString::from("ALLOWED_VAR"), OsString::from("value1")),
            (OsString::from("BLOCKED_VAR"), OsString::from("value2")),
        ];

        let filtered = launcher.filter_env(env);

        assert_eq!(
            filtered,
            vec![(OsString::from("ALLOWED_VAR"), OsString::from("value1"))]
        );
    }

    #[test]
    fn test_env_filtering_tolerates_non_utf8() {
        use std::os::unix::ffi::OsStringExt;

        let launcher = launcher().with_env_policy(EnvPolicy::Allowlist(vec!["PATH".into()]));
        let env = vec![
            (OsString::from("PATH"), OsString::from("/bin")),
            (OsString::from("RAW_BYTES"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xfd]), OsString::from("x")),
        ];

        let filtered = launcher.filter_env(env);

        assert_eq!(filtered, vec![(OsString::from("PATH"), OsString::from("/bin"))]);
    }

    #[tokio::test]
    async fn test_allowlist_launch_with_non_utf8_parent_env() {
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var(
            "PROCBRIDGE_TEST_RAW_BYTES",
            OsStr::from_bytes(&[0xff, 0xfe]),
        );
        let launcher = launcher().with_env_policy(EnvPolicy::Allowlist(vec!["PATH".into()]));

        let mut handle = tokio_test::assert_ok!(
            launcher.launch(&Invocation::new("sh").args(["-c", "echo ok"])).await
        );

        assert_eq!(drain(&mut handle).await, "ok\n");
        std::env::remove_var("PROCBRIDGE_TEST_RAW_BYTES");
    }

    #[tokio::test]
    async fn test_allowlist_applies_to_child() {
        std::env::set_var("PROCBRIDGE_TEST_BLOCKED", "secret");
        let launcher = launcher().with_env_policy(EnvPolicy::Allowlist(vec!["PATH".into()]));

        let mut handle = launcher
            .launch(
                &Invocation::new("sh")
                    .args(["-c", "echo \"[$PROCBRIDGE_TEST_BLOCKED][$EXTRA]\""])
                    .env("EXTRA", "given"),
            )
            .await
            .unwrap();

        assert_eq!(drain(&mut handle).await, "[][given]\n");
    }
}
