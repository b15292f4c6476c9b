//! Integration tests for the cell executor
//!
//! These run real interpreter subprocesses through a /bin/sh profile so they
//! work on any unix host, covering the full session lifecycle: completion,
//! failure, input waits, resume, timeout, cancellation, and events.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use runcell::executor::{
    CellExecutor, ExecutorConfig, InstallerConfig, InterpreterProfile, SessionEvent, SessionState,
    StreamKind,
};

fn sh_config(timeout: Duration, workdir: &Path) -> ExecutorConfig {
    ExecutorConfig {
        profile: InterpreterProfile::sh(),
        exec_timeout: timeout,
        workdir: workdir.to_path_buf(),
        env: Vec::new(),
        installer: InstallerConfig::default(),
    }
}

fn sh_executor(timeout: Duration) -> (Arc<CellExecutor>, TempDir) {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(CellExecutor::new(sh_config(timeout, dir.path())));
    (executor, dir)
}

/// Poll until the registry holds `count` sessions or the deadline passes
async fn wait_for_session_count(executor: &CellExecutor, count: usize, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if executor.sessions().await.len() == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// Completion and Failure
// ============================================================================

#[tokio::test]
async fn test_execute_hello() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let result = executor.execute("c1", "echo hello").await;

    assert!(result.success, "echo should succeed: {}", result.output);
    assert_eq!(result.output, "hello\n");
    assert!(!result.waiting_for_input);
    assert!(result.input_prompt.is_none());
    assert!(
        executor.sessions().await.is_empty(),
        "registry should be empty once execute returns"
    );
}

#[tokio::test]
async fn test_execute_nonzero_exit_carries_stderr() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let result = executor.execute("c1", "echo oops >&2; exit 3").await;

    assert!(!result.success);
    assert!(
        result.output.contains("oops"),
        "failed result should carry stderr, got: {}",
        result.output
    );
}

#[tokio::test]
async fn test_execute_syntax_error_fails_with_interpreter_text() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let result = executor.execute("c1", "fi").await;

    assert!(!result.success);
    assert!(
        result.output.to_lowercase().contains("syntax"),
        "expected interpreter error text, got: {}",
        result.output
    );
}

#[tokio::test]
async fn test_execute_spawn_failure_is_failed_result() {
    let dir = TempDir::new().unwrap();
    let mut config = sh_config(Duration::from_secs(5), dir.path());
    config.profile.command = "definitely-not-a-real-binary".to_string();
    let executor = CellExecutor::new(config);

    let result = executor.execute("c1", "echo hi").await;

    assert!(!result.success);
    assert!(
        result.output.contains("failed to start interpreter"),
        "got: {}",
        result.output
    );
    assert!(executor.sessions().await.is_empty());
}

#[tokio::test]
async fn test_execute_runs_in_workdir() {
    let (executor, dir) = sh_executor(Duration::from_secs(5));

    let result = executor.execute("c1", "pwd").await;

    assert!(result.success);
    let reported = result.output.trim();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        Path::new(reported).canonicalize().unwrap(),
        expected,
        "session should run in the configured working directory"
    );
}

// ============================================================================
// Input Waits and Resume
// ============================================================================

#[tokio::test]
async fn test_interactive_pause_and_resume() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let paused = executor
        .execute("c1", "printf 'Enter name: '; read name; echo \"hello $name\"")
        .await;

    assert!(paused.success);
    assert!(paused.waiting_for_input, "session should pause on read");
    assert_eq!(paused.input_prompt.as_deref(), Some("Enter name:"));
    assert_eq!(paused.output, "Enter name: ");

    let snapshots = executor.sessions().await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state, SessionState::WaitingForInput);
    assert_eq!(snapshots[0].pending_prompt.as_deref(), Some("Enter name:"));

    let done = executor.resume("c1", "world").await;

    assert!(done.success, "resume should complete: {}", done.output);
    assert!(!done.waiting_for_input);
    assert!(
        done.output.contains("hello world"),
        "forwarded input should reach the program, got: {}",
        done.output
    );
    assert!(executor.sessions().await.is_empty());
}

#[tokio::test]
async fn test_question_mark_prompt_forwards_value() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let paused = executor
        .execute("c1", "printf 'Value? '; read v; echo \"got $v\"")
        .await;

    assert!(paused.waiting_for_input);
    assert_eq!(paused.input_prompt.as_deref(), Some("Value?"));

    let done = executor.resume("c1", "42").await;
    assert!(done.success);
    assert!(
        done.output.contains("42"),
        "output should contain the forwarded value, got: {}",
        done.output
    );
}

#[tokio::test]
async fn test_multiple_pauses_in_one_session() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let first = executor
        .execute(
            "c1",
            "printf 'First: '; read a; printf 'Second: '; read b; echo \"$a-$b\"",
        )
        .await;
    assert!(first.waiting_for_input);

    let second = executor.resume("c1", "1").await;
    assert!(second.waiting_for_input, "second read should pause again");
    assert!(
        second
            .input_prompt
            .as_deref()
            .unwrap_or_default()
            .contains("Second:"),
        "got prompt: {:?}",
        second.input_prompt
    );

    let done = executor.resume("c1", "2").await;
    assert!(done.success);
    assert!(done.output.contains("1-2"), "got: {}", done.output);
}

#[tokio::test]
async fn test_resume_while_running_is_rejected() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let exec = Arc::clone(&executor);
    let task = tokio::spawn(async move { exec.execute("c1", "sleep 2").await });
    assert!(
        wait_for_session_count(&executor, 1, Duration::from_secs(2)).await,
        "session never registered"
    );

    let rejected = executor.resume("c1", "zap").await;
    assert!(!rejected.success);
    assert!(
        rejected.output.contains("no active input wait"),
        "got: {}",
        rejected.output
    );

    let result = task.await.unwrap();
    assert!(result.success, "sleep should still complete normally");
}

#[tokio::test]
async fn test_concurrent_resumes_deliver_exactly_once() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let paused = executor
        .execute("c1", "printf 'Enter value: '; read v; echo \"got $v\"")
        .await;
    assert!(paused.waiting_for_input);

    let exec_a = Arc::clone(&executor);
    let first = tokio::spawn(async move { exec_a.resume("c1", "one").await });
    let exec_b = Arc::clone(&executor);
    let second = tokio::spawn(async move { exec_b.resume("c1", "two").await });

    let a = first.await.unwrap();
    let b = second.await.unwrap();

    let rejected = [&a, &b]
        .iter()
        .filter(|r| !r.success && r.output.contains("no active input wait"))
        .count();
    assert_eq!(
        rejected, 1,
        "one pause accepts exactly one forward, got a: {:?} b: {:?}",
        a.output, b.output
    );

    let winner = if a.success { &a } else { &b };
    assert!(
        winner.output.contains("got one") || winner.output.contains("got two"),
        "the delivered resume should reach the program, got: {}",
        winner.output
    );
}

#[tokio::test]
async fn test_resume_unknown_session() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));

    let result = executor.resume("ghost", "42").await;

    assert!(!result.success);
    assert!(result.output.contains("no session"), "got: {}", result.output);
}

// ============================================================================
// Timeout
// ============================================================================

#[tokio::test]
async fn test_timeout_resolves_as_success() {
    let (executor, _dir) = sh_executor(Duration::from_secs(1));

    let result = executor.execute("c1", "echo started; sleep 30").await;

    assert!(result.success, "timeout resolves as success by policy");
    assert!(!result.waiting_for_input);
    assert!(result.output.contains("started"));
    assert!(result.elapsed_ms >= 900, "elapsed was {}", result.elapsed_ms);
    assert!(executor.sessions().await.is_empty());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_live_session() {
    let (executor, _dir) = sh_executor(Duration::from_secs(30));
    let mut rx = executor.subscribe();

    let exec = Arc::clone(&executor);
    let task = tokio::spawn(async move { exec.execute("c1", "echo working; sleep 30").await });

    // Wait for the first output so the cancel provably lands mid-run
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no output before deadline")
            .unwrap();
        if matches!(event, SessionEvent::Output { .. }) {
            break;
        }
    }

    assert!(executor.cancel("c1").await, "cancel should find the session");

    let result = task.await.unwrap();
    assert!(result.success, "cancellation resolves with accumulated output");
    assert!(result.output.contains("working"));
    assert!(
        wait_for_session_count(&executor, 0, Duration::from_secs(2)).await,
        "registry should empty after cancel"
    );
}

#[tokio::test]
async fn test_cancel_unknown_session_returns_false() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));
    assert!(!executor.cancel("nope").await);
}

#[tokio::test]
async fn test_cancel_all_empties_registry() {
    let (executor, _dir) = sh_executor(Duration::from_secs(30));

    let mut tasks = Vec::new();
    for i in 0..3 {
        let exec = Arc::clone(&executor);
        tasks.push(tokio::spawn(async move {
            exec.execute(&format!("c{i}"), "sleep 30").await
        }));
    }
    assert!(
        wait_for_session_count(&executor, 3, Duration::from_secs(2)).await,
        "all three sessions should register"
    );

    executor.cancel_all().await;

    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.success);
    }
    assert!(
        wait_for_session_count(&executor, 0, Duration::from_secs(2)).await,
        "registry should be empty after cancel_all"
    );
}

#[tokio::test]
async fn test_cancel_all_with_no_sessions() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));
    executor.cancel_all().await;
    assert!(executor.sessions().await.is_empty());
}

#[tokio::test]
async fn test_reexecute_replaces_live_session() {
    let (executor, _dir) = sh_executor(Duration::from_secs(30));

    let exec = Arc::clone(&executor);
    let old = tokio::spawn(async move { exec.execute("dup", "sleep 30").await });
    assert!(wait_for_session_count(&executor, 1, Duration::from_secs(2)).await);

    let result = executor.execute("dup", "echo second").await;
    assert!(result.success);
    assert_eq!(result.output, "second\n");

    let old_result = old.await.unwrap();
    assert!(old_result.success, "replaced session resolves like a cancel");
    assert!(
        wait_for_session_count(&executor, 0, Duration::from_secs(2)).await,
        "both sessions should be gone"
    );
}

#[tokio::test]
async fn test_racing_executes_same_id_leave_one_survivor() {
    let (executor, _dir) = sh_executor(Duration::from_secs(30));

    let exec_a = Arc::clone(&executor);
    let a = tokio::spawn(async move { exec_a.execute("dup", "sleep 1; echo done-a").await });
    let exec_b = Arc::clone(&executor);
    let b = tokio::spawn(async move { exec_b.execute("dup", "sleep 1; echo done-b").await });

    let ra = a.await.unwrap();
    let rb = b.await.unwrap();

    // The displaced session resolves like a cancel, the survivor normally
    assert!(ra.success && rb.success, "a: {:?} b: {:?}", ra.output, rb.output);
    let finished = [ra.output.contains("done-a"), rb.output.contains("done-b")];
    assert_eq!(
        finished.iter().filter(|done| **done).count(),
        1,
        "one cell id must keep one process, got a: {:?} b: {:?}",
        ra.output,
        rb.output
    );
    assert!(
        wait_for_session_count(&executor, 0, Duration::from_secs(2)).await,
        "registry should be empty once both resolve"
    );
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_cover_session_lifecycle() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));
    let mut rx = executor.subscribe();

    let result = executor.execute("c1", "echo hi").await;
    assert!(result.success);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(
        matches!(&events[0], SessionEvent::Started { cell_id } if cell_id == "c1"),
        "first event should be Started, got {:?}",
        events.first()
    );
    assert!(
        events.iter().any(|e| matches!(
            e,
            SessionEvent::Output { stream: StreamKind::Stdout, chunk, .. } if chunk.contains("hi")
        )),
        "expected a stdout Output event, got {events:?}"
    );
    assert!(
        matches!(
            events.last(),
            Some(SessionEvent::Finished {
                state: SessionState::Completed,
                exit_code: Some(0),
                ..
            })
        ),
        "last event should be Finished(Completed), got {:?}",
        events.last()
    );
}

#[tokio::test]
async fn test_input_requested_event_carries_prompt() {
    let (executor, _dir) = sh_executor(Duration::from_secs(5));
    let mut rx = executor.subscribe();

    let paused = executor.execute("c1", "printf 'Name: '; read n").await;
    assert!(paused.waiting_for_input);

    let mut saw_request = false;
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::InputRequested { cell_id, prompt } = event {
            assert_eq!(cell_id, "c1");
            assert_eq!(prompt, "Name:");
            saw_request = true;
        }
    }
    assert!(saw_request, "expected an InputRequested event");

    executor.cancel("c1").await;
}

// ============================================================================
// Requirements Install
// ============================================================================

#[tokio::test]
async fn test_install_requirements_writes_manifest_and_runs_installer() {
    let dir = TempDir::new().unwrap();
    let mut config = sh_config(Duration::from_secs(5), dir.path());
    // cat-as-installer echoes the manifest back, proving both the write
    // and the subprocess ran in the right directory
    config.installer = InstallerConfig {
        command: "cat".to_string(),
        args: Vec::new(),
    };
    let executor = CellExecutor::new(config);

    let result = executor.install_requirements("requests==2.31.0\n").await;

    assert!(result.success, "got: {}", result.output);
    assert_eq!(result.output, "requests==2.31.0\n");

    let manifest = std::fs::read_to_string(dir.path().join("requirements.txt")).unwrap();
    assert_eq!(manifest, "requests==2.31.0\n");
}

#[tokio::test]
async fn test_install_requirements_failure() {
    let dir = TempDir::new().unwrap();
    let mut config = sh_config(Duration::from_secs(5), dir.path());
    config.installer = InstallerConfig {
        command: "false".to_string(),
        args: Vec::new(),
    };
    let executor = CellExecutor::new(config);

    let result = executor.install_requirements("anything\n").await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_install_requirements_missing_installer() {
    let dir = TempDir::new().unwrap();
    let mut config = sh_config(Duration::from_secs(5), dir.path());
    config.installer = InstallerConfig {
        command: "definitely-not-a-real-installer".to_string(),
        args: Vec::new(),
    };
    let executor = CellExecutor::new(config);

    let result = executor.install_requirements("anything\n").await;
    assert!(!result.success);
    assert!(
        result.output.contains("failed to start installer"),
        "got: {}",
        result.output
    );
}
