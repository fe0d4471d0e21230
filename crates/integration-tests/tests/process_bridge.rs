//! Process Bridge against real child processes
//!
//! Every test spawns `/bin/sh` scripts written into a scratch directory.

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{bridge, collect, joined, script, script_with_mode};
use procbridge_core::application::{PollOutcome, TerminateOutcome};
use procbridge_core::domain::{ExitOutcome, Invocation, SessionState, StreamKind};
use procbridge_core::port::InvocationError;
use procbridge_core::BridgeError;

#[tokio::test]
async fn test_echo_hello() {
    let dir = tempfile::tempdir().unwrap();
    let echo = script(dir.path(), "echo.sh", r#"echo "$1""#);
    let bridge = bridge();

    let session = bridge.start(&echo, vec!["hello".into()]).await.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;
    let report = bridge.wait(&session).await.unwrap();

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["hello\n"]);
    assert_eq!(report.code, Some(0));
    assert!(report.success());
    assert_eq!(session.exit_code(), Some(0));
}

#[tokio::test]
async fn test_missing_path_is_invocation_error() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge();

    let err = bridge
        .start(dir.path().join("nope.sh"), vec![])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Invocation(InvocationError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_non_executable_path_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let target = script_with_mode(
        dir.path(),
        "plain.sh",
        &format!("touch '{}'", marker.display()),
        0o644,
    );
    let bridge = bridge();

    let err = bridge.start(&target, vec![]).await.unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Invocation(InvocationError::NotExecutable(_))
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_output_order_matches_child() {
    let dir = tempfile::tempdir().unwrap();
    let counter = script(
        dir.path(),
        "count.sh",
        r#"i=0
while [ $i -lt 200 ]; do
  echo "line $i"
  i=$((i+1))
done"#,
    );
    let bridge = bridge();

    let session = bridge.start(&counter, vec![]).await.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;

    let expected: String = (0..200).map(|i| format!("line {}\n", i)).collect();
    assert_eq!(joined(&chunks), expected);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.seq, i as u64);
    }

    // Yielded chunks also land in the session buffer
    assert_eq!(session.snapshot().output.text(), expected);
}

#[tokio::test]
async fn test_terminate_twice_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let sleeper = script(dir.path(), "sleep.sh", "echo started\nsleep 30");
    let bridge = bridge();

    let session = bridge.start(&sleeper, vec![]).await.unwrap();
    let mut output = bridge.poll_output(&session).unwrap();
    assert!(matches!(
        futures::StreamExt::next(&mut output).await,
        Some(chunk) if chunk.text == "started\n"
    ));

    assert_eq!(bridge.terminate(&session), TerminateOutcome::Requested);
    assert_eq!(bridge.terminate(&session), TerminateOutcome::AlreadyRequested);

    collect(output).await;
    let report = bridge.wait(&session).await.unwrap();

    assert_eq!(report.outcome, ExitOutcome::Terminated);
    assert!(report.duration_ms < 10_000);
    assert_eq!(session.snapshot().state, SessionState::Terminated);
    assert_eq!(bridge.terminate(&session), TerminateOutcome::AlreadyExited);
}

#[tokio::test]
async fn test_input_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let reader = script(
        dir.path(),
        "read.sh",
        r#"read line
echo "got $line"
read rest
echo "then $rest""#,
    );
    let bridge = bridge();

    let session = bridge.start(&reader, vec![]).await.unwrap();
    bridge.write_line(&session, "abc").await.unwrap();
    bridge.write_input(&session, "raw text\n").await.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;

    assert_eq!(joined(&chunks), "got abc\nthen raw text\n");
    assert_eq!(bridge.wait(&session).await.unwrap().code, Some(0));
}

#[tokio::test]
async fn test_close_input_delivers_eof() {
    let dir = tempfile::tempdir().unwrap();
    let cat = script(dir.path(), "cat.sh", "cat\necho done");
    let bridge = bridge();

    let session = bridge.start(&cat, vec![]).await.unwrap();
    bridge.write_input(&session, "one\n").await.unwrap();
    bridge.close_input(&session).await;

    let err = bridge.write_input(&session, "two\n").await.unwrap_err();
    assert!(err.is_benign());

    let chunks = collect(bridge.poll_output(&session).unwrap()).await;
    assert_eq!(joined(&chunks), "one\ndone\n");
}

#[tokio::test]
async fn test_write_after_exit_is_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let echo = script(dir.path(), "echo.sh", "echo bye");
    let bridge = bridge();

    let session = bridge.start(&echo, vec![]).await.unwrap();
    collect(bridge.poll_output(&session).unwrap()).await;

    let err = bridge.write_input(&session, "late\n").await.unwrap_err();
    assert!(matches!(err, BridgeError::NotRunning(ref id) if id == session.id()));
}

#[tokio::test]
async fn test_non_zero_exit_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let failing = script(dir.path(), "fail.sh", "echo oops >&2\nexit 3");
    let bridge = bridge();

    let session = bridge.start(&failing, vec![]).await.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;
    let report = bridge.wait(&session).await.unwrap();

    assert_eq!(report.outcome, ExitOutcome::Exited);
    assert_eq!(report.code, Some(3));
    assert!(!report.success());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].stream, StreamKind::Stderr);
    assert_eq!(chunks[0].text, "oops\n");
}

#[tokio::test]
async fn test_streams_are_tagged() {
    let dir = tempfile::tempdir().unwrap();
    let both = script(dir.path(), "both.sh", "echo out\necho err >&2");
    let bridge = bridge();

    let session = bridge.start(&both, vec![]).await.unwrap();
    collect(bridge.poll_output(&session).unwrap()).await;
    let output = session.snapshot().output;

    assert_eq!(output.stream_text(StreamKind::Stdout), "out\n");
    assert_eq!(output.stream_text(StreamKind::Stderr), "err\n");
}

#[tokio::test]
async fn test_timeout_stops_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let sleeper = script(dir.path(), "sleep.sh", "sleep 30");
    let bridge = bridge();

    let session = bridge
        .start_invocation(Invocation::new(&sleeper).timeout(Duration::from_millis(300)))
        .await
        .unwrap();
    let report = tokio::time::timeout(Duration::from_secs(10), bridge.wait(&session))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.outcome, ExitOutcome::TimedOut);
    assert_eq!(session.snapshot().state, SessionState::TimedOut);
}

#[tokio::test]
async fn test_output_can_be_taken_once() {
    let dir = tempfile::tempdir().unwrap();
    let echo = script(dir.path(), "echo.sh", "echo once");
    let bridge = bridge();

    let session = bridge.start(&echo, vec![]).await.unwrap();
    let first = bridge.poll_output(&session).unwrap();

    let err = bridge.poll_output(&session).unwrap_err();
    assert!(matches!(err, BridgeError::OutputTaken(_)));
    assert_eq!(joined(&collect(first).await), "once\n");
}

#[tokio::test]
async fn test_try_next_polling() {
    let dir = tempfile::tempdir().unwrap();
    let echo = script(dir.path(), "echo.sh", "echo polled");
    let bridge = bridge();

    let session = bridge.start(&echo, vec![]).await.unwrap();
    let mut output = bridge.poll_output(&session).unwrap();

    let mut text = String::new();
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match output.try_next() {
                PollOutcome::Chunk(chunk) => text.push_str(&chunk.text),
                PollOutcome::Pending => tokio::time::sleep(Duration::from_millis(10)).await,
                PollOutcome::Finished => break,
            }
        }
    })
    .await;

    assert!(finished.is_ok());
    assert_eq!(text, "polled\n");
    assert!(session.exit_report().is_some());
}

#[tokio::test]
async fn test_interpreter_runs_non_executable_script() {
    let dir = tempfile::tempdir().unwrap();
    let plain = script_with_mode(dir.path(), "plain.sh", r#"echo "via $0 $1""#, 0o644);
    let bridge = bridge();

    let captured = bridge
        .run_captured(Invocation::new(&plain).arg("x").interpreter("sh"))
        .await
        .unwrap();

    assert!(captured.success());
    assert_eq!(captured.text(), format!("via {} x", plain.display()));
}

#[tokio::test]
async fn test_working_dir_and_env() {
    let dir = tempfile::tempdir().unwrap();
    script(dir.path(), "where.sh", r#"pwd; echo "$PROCBRIDGE_TEST_VALUE""#);
    let bridge = bridge();

    let captured = bridge
        .run_captured(
            Invocation::new("where.sh")
                .working_dir(dir.path())
                .env("PROCBRIDGE_TEST_VALUE", "42"),
        )
        .await
        .unwrap();

    let canonical = dir.path().canonicalize().unwrap();
    let lines: Vec<String> = captured.text().lines().map(String::from).collect();
    assert_eq!(
        std::path::Path::new(&lines[0]).canonicalize().unwrap(),
        canonical
    );
    assert_eq!(lines[1], "42");
}

#[tokio::test]
async fn test_echo_hello_from_script_directory() {
    let dir = tempfile::tempdir().unwrap();
    script(dir.path(), "echo.sh", r#"echo "$1""#);
    let bridge = bridge();

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let started = bridge.start("echo.sh", vec!["hello".into()]).await;
    std::env::set_current_dir(previous).unwrap();

    let session = started.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

    assert_eq!(texts, vec!["hello\n"]);
    assert_eq!(bridge.wait(&session).await.unwrap().code, Some(0));
}

#[tokio::test]
async fn test_captured_run_gives_stdin_eof() {
    let bridge = bridge();

    let captured = bridge
        .run_captured(Invocation::new("cat").timeout(Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(captured.report.outcome, ExitOutcome::Exited);
    assert!(captured.success());
    assert!(captured.report.duration_ms < 5_000);
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_process() {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let dir = tempfile::tempdir().unwrap();
    let sleeper = script(dir.path(), "sleep.sh", "exec sleep 30");
    let bridge = bridge();

    let session = bridge.start(&sleeper, vec![]).await.unwrap();
    let pid = Pid::from_raw(session.pid().unwrap() as i32);
    assert!(kill(pid, None).is_ok());

    drop(session);

    let gone = tokio::time::timeout(Duration::from_secs(10), async {
        while kill(pid, None) != Err(Errno::ESRCH) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "process {} survived its session", pid);
}

#[tokio::test]
async fn test_grandchild_holding_pipe_does_not_stall_output() {
    let dir = tempfile::tempdir().unwrap();
    let forker = script(dir.path(), "fork.sh", "sleep 10 &\necho hi");
    let bridge = bridge();

    let started = std::time::Instant::now();
    let session = bridge.start(&forker, vec![]).await.unwrap();
    let chunks = collect(bridge.poll_output(&session).unwrap()).await;

    assert_eq!(joined(&chunks), "hi\n");
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(bridge.wait(&session).await.unwrap().code, Some(0));
}

#[tokio::test]
async fn test_exit_known_while_output_still_draining() {
    let dir = tempfile::tempdir().unwrap();
    let forker = script(dir.path(), "fork.sh", "sleep 10 &\necho hi");
    let bridge = bridge();

    let session = bridge.start(&forker, vec![]).await.unwrap();
    let output = bridge.poll_output(&session).unwrap();

    // The readers are still waiting on the grandchild here
    let report = tokio::time::timeout(Duration::from_millis(1_500), bridge.wait(&session))
        .await
        .expect("exit status waited for the output drain")
        .unwrap();
    assert_eq!(report.code, Some(0));

    let err = bridge.write_input(&session, "late\n").await.unwrap_err();
    assert!(matches!(err, BridgeError::NotRunning(_)));

    assert_eq!(joined(&collect(output).await), "hi\n");
}
