//! Interactive run loop: child output to the terminal, terminal lines to the child

use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use procbridge_core::application::{CapturedRun, SessionController, SessionHandle, TerminateOutcome};
use procbridge_core::domain::{ExitOutcome, ExitReport, OutputChunk, StreamKind};

fn print_chunk(chunk: &OutputChunk) -> std::io::Result<()> {
    match chunk.stream {
        StreamKind::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(chunk.text.as_bytes())?;
            out.flush()
        }
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(chunk.text.as_bytes())?;
            err.flush()
        }
    }
}

/// Status line printed once the child is gone
pub fn print_status(report: &ExitReport) {
    let line = format!("[procbridge] {}", report);
    let line = match report.outcome {
        ExitOutcome::Exited if report.success() => line.green(),
        ExitOutcome::Exited => line.yellow(),
        ExitOutcome::Terminated | ExitOutcome::TimedOut => line.red(),
    };
    eprintln!("{}", line.bold());
}

/// Exit code for the front-end itself
pub fn exit_code(report: &ExitReport) -> i32 {
    report.code.unwrap_or(1)
}

/// Drive a started session until its output is drained
///
/// Stdin lines are forwarded as they are typed; EOF on stdin closes the
/// child's stdin. Ctrl+C requests termination; repeated presses are no-ops.
pub async fn drive(controller: &SessionController, session: &SessionHandle) -> Result<ExitReport> {
    let bridge = controller.bridge();
    let mut output = bridge
        .poll_output(session)
        .context("Failed to attach to session output")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            chunk = output.next() => match chunk {
                Some(chunk) => print_chunk(&chunk).context("Failed to write to terminal")?,
                None => break,
            },

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = bridge.write_line(session, &line).await {
                        if !e.is_benign() {
                            return Err(e).context("Failed to forward input");
                        }
                        eprintln!("{}", format!("[procbridge] input dropped: {}", e).yellow());
                        stdin_open = false;
                    }
                }
                Ok(None) => {
                    debug!(session_id = %session.id(), "Terminal stdin reached EOF");
                    bridge.close_input(session).await;
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Reading terminal input failed");
                    bridge.close_input(session).await;
                    stdin_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => match controller.terminate_current() {
                Some(TerminateOutcome::Requested) => {
                    eprintln!("{}", "[procbridge] terminating...".yellow());
                }
                Some(outcome) => debug!(outcome = ?outcome, "Interrupt ignored"),
                None => {}
            },
        }
    }

    let report = bridge.wait(session).await?;
    Ok(report)
}

/// Print the collected output of a captured run
pub fn print_captured(run: &CapturedRun) -> Result<()> {
    for chunk in run.output.chunks() {
        print_chunk(chunk).context("Failed to write to terminal")?;
    }
    Ok(())
}
