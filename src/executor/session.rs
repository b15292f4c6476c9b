//! Execution session state machine
//!
//! One session binds one interpreter process, its transcripts, and the
//! input-wait detector for the lifetime of one submitted cell. Every
//! execute/resume call races process exit, input-wait detection, and a
//! timeout; whichever fires first resolves that call's waiter, exactly once.
//! Later stream events still land in the transcripts but never resolve a
//! finished waiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdin;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::detect::InputWaitDetector;
use super::process::{self, ProcessHandle};
use super::registry::SessionRegistry;
use super::transcript::Transcript;
use super::types::{ExecutionResult, SessionEvent, SessionSnapshot, SessionState, StreamKind};
use crate::error::RuncellError;

/// Grace period for readers to drain once the process has exited
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How the process left the Running state
enum ExitOutcome {
    /// Natural exit with a code
    Exited(i32),
    /// Killed through the session's kill token (cancel or timeout)
    Killed,
    /// The wait itself failed
    WaitFailed(String),
}

/// State guarded by the session gate
///
/// Input forwarding, detection, and exit handling all contend for the
/// transition out of the current state; one lock keeps them mutually
/// exclusive, so a second resume is rejected before the first is applied.
struct Gate {
    state: SessionState,
    stdin: Option<ChildStdin>,
    waiter: Option<oneshot::Sender<ExecutionResult>>,
    pending_prompt: Option<String>,
    timer: Option<CancellationToken>,
}

impl Gate {
    /// Install a fresh waiter and timer for one execute/resume call
    fn arm(&mut self) -> (oneshot::Receiver<ExecutionResult>, CancellationToken) {
        let (tx, rx) = oneshot::channel();
        let timer = CancellationToken::new();
        self.state = SessionState::Running;
        self.waiter = Some(tx);
        if let Some(old) = self.timer.replace(timer.clone()) {
            old.cancel();
        }
        (rx, timer)
    }
}

/// One live execution session for one cell
pub struct ExecutionSession {
    cell_id: String,
    gate: Mutex<Gate>,
    stdout: Mutex<Transcript>,
    stderr: Mutex<Transcript>,
    detector: Arc<dyn InputWaitDetector>,
    events: broadcast::Sender<SessionEvent>,
    /// Signals the supervisor to kill the process
    kill: CancellationToken,
    /// Set by the timer before it fires the kill token
    timed_out: AtomicBool,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl ExecutionSession {
    pub fn new(
        cell_id: &str,
        stdin: Option<ChildStdin>,
        detector: Arc<dyn InputWaitDetector>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            cell_id: cell_id.to_string(),
            gate: Mutex::new(Gate {
                state: SessionState::Spawning,
                stdin,
                waiter: None,
                pending_prompt: None,
                timer: None,
            }),
            stdout: Mutex::new(Transcript::new()),
            stderr: Mutex::new(Transcript::new()),
            detector,
            events,
            kill: CancellationToken::new(),
            timed_out: AtomicBool::new(false),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub async fn state(&self) -> SessionState {
        self.gate.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let gate = self.gate.lock().await;
        SessionSnapshot {
            cell_id: self.cell_id.clone(),
            state: gate.state,
            started_at: self.started_at,
            elapsed_ms: self.elapsed_ms(),
            pending_prompt: gate.pending_prompt.clone(),
        }
    }

    /// Signal the process to die; cleanup happens in the supervisor
    pub fn request_termination(&self) {
        self.kill.cancel();
    }

    /// Install the completion waiter for the initial execute call and arm
    /// the timeout
    pub async fn begin_wait(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> oneshot::Receiver<ExecutionResult> {
        let (rx, timer) = self.gate.lock().await.arm();
        self.spawn_timer(timer, timeout);
        rx
    }

    /// Forward one line of input to a paused session and wait for the next
    /// resolution
    ///
    /// The whole check-write-rearm sequence holds the gate, so of two racing
    /// forwards exactly one delivers; the other observes Running and is
    /// rejected.
    pub async fn forward_input(self: &Arc<Self>, input: &str, timeout: Duration) -> ExecutionResult {
        let mut gate = self.gate.lock().await;
        if gate.state != SessionState::WaitingForInput {
            return ExecutionResult::failed(
                RuncellError::NotWaitingForInput(self.cell_id.clone()).to_string(),
                self.elapsed_ms(),
            );
        }
        gate.pending_prompt = None;

        let Some(stdin) = gate.stdin.as_mut() else {
            self.kill.cancel();
            return ExecutionResult::failed(
                RuncellError::StdinUnavailable(self.cell_id.clone()).to_string(),
                self.elapsed_ms(),
            );
        };
        if let Err(e) = process::write_line(stdin, input).await {
            // Process died between detection and delivery
            warn!(cell_id = %self.cell_id, error = %e, "Failed to deliver input, killing process");
            self.kill.cancel();
            return ExecutionResult::failed(
                format!("failed to deliver input: {e}"),
                self.elapsed_ms(),
            );
        }
        debug!(cell_id = %self.cell_id, "Forwarded input to session");

        let (rx, timer) = gate.arm();
        drop(gate);
        self.spawn_timer(timer, timeout);

        match rx.await {
            Ok(result) => result,
            Err(_) => ExecutionResult::failed(
                "session closed before resolving",
                self.elapsed_ms(),
            ),
        }
    }

    /// Arm a cancelable timer that kills the process when the wait budget
    /// runs out. Canceled whenever the session leaves Running by any other
    /// path.
    fn spawn_timer(self: &Arc<Self>, timer: CancellationToken, timeout: Duration) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    debug!(
                        cell_id = %session.cell_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Execution timed out, killing process"
                    );
                    session.timed_out.store(true, Ordering::SeqCst);
                    session.kill.cancel();
                }
            }
        });
    }

    /// Move Running -> WaitingForInput after a positive detection
    ///
    /// Resolves the in-flight waiter with a paused result carrying the
    /// prompt. Ignored when no request is in flight or the session has
    /// already left Running.
    async fn enter_input_wait(&self, prompt: String) {
        let mut gate = self.gate.lock().await;
        if gate.state != SessionState::Running {
            return;
        }
        let Some(waiter) = gate.waiter.take() else {
            return;
        };
        gate.state = SessionState::WaitingForInput;
        gate.pending_prompt = Some(prompt.clone());
        if let Some(timer) = gate.timer.take() {
            timer.cancel();
        }

        let output = self.stdout.lock().await.text().to_string();
        debug!(cell_id = %self.cell_id, prompt = %prompt, "Session waiting for input");
        let _ = self.events.send(SessionEvent::InputRequested {
            cell_id: self.cell_id.clone(),
            prompt: prompt.clone(),
        });
        let _ = waiter.send(ExecutionResult::waiting(output, prompt, self.elapsed_ms()));
    }

    /// Resolve the session at process exit, natural or killed
    ///
    /// The single terminal transition: the timeout and cancel paths only
    /// signal the kill token and let this run. A session already terminal
    /// is left untouched.
    async fn finish(&self, outcome: ExitOutcome) {
        let mut gate = self.gate.lock().await;
        if gate.state.is_terminal() {
            return;
        }

        let elapsed = self.elapsed_ms();
        let stdout = self.stdout.lock().await.text().to_string();
        let stderr = self.stderr.lock().await.text().to_string();

        let (state, exit_code, result) = match outcome {
            ExitOutcome::Exited(0) => (
                SessionState::Completed,
                Some(0),
                ExecutionResult::completed(stdout, elapsed),
            ),
            ExitOutcome::Exited(code) => {
                let output = if stderr.is_empty() { stdout } else { stderr };
                (
                    SessionState::Failed,
                    Some(code),
                    ExecutionResult::failed(output, elapsed),
                )
            }
            ExitOutcome::Killed if self.timed_out.load(Ordering::SeqCst) => (
                SessionState::Completed,
                None,
                // Timeout counts as success: forward progress with whatever
                // output accumulated beats surfacing a hung-process error.
                ExecutionResult::completed(stdout, elapsed),
            ),
            ExitOutcome::Killed => (
                SessionState::Terminated,
                None,
                ExecutionResult::completed(stdout, elapsed),
            ),
            ExitOutcome::WaitFailed(message) => (
                SessionState::Failed,
                None,
                ExecutionResult::failed(message, elapsed),
            ),
        };

        gate.state = state;
        gate.pending_prompt = None;
        gate.stdin = None;
        if let Some(timer) = gate.timer.take() {
            timer.cancel();
        }

        if state == SessionState::Failed {
            warn!(cell_id = %self.cell_id, exit_code = ?exit_code, "Session failed");
        } else {
            debug!(cell_id = %self.cell_id, state = state.as_str(), exit_code = ?exit_code, "Session finished");
        }

        let _ = self.events.send(SessionEvent::Finished {
            cell_id: self.cell_id.clone(),
            state,
            exit_code,
        });
        if let Some(waiter) = gate.waiter.take() {
            let _ = waiter.send(result);
        }
    }
}

// ============================================================================
// Session Tasks
// ============================================================================

/// Pump one output stream into its transcript, running input-wait detection
/// on stdout chunks
pub(crate) fn spawn_reader<R>(
    session: Arc<ExecutionSession>,
    kind: StreamKind,
    stream: R,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = stream;
        let mut buf = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };

            let transcript_lock = match kind {
                StreamKind::Stdout => &session.stdout,
                StreamKind::Stderr => &session.stderr,
            };
            let (text, chunk) = {
                let mut transcript = transcript_lock.lock().await;
                transcript.push_bytes(&buf[..n]);
                (
                    transcript.text().to_string(),
                    transcript.last_chunk().to_string(),
                )
            };
            if chunk.is_empty() {
                // All bytes held back mid-sequence
                continue;
            }

            let _ = session.events.send(SessionEvent::Output {
                cell_id: session.cell_id.clone(),
                stream: kind,
                chunk: chunk.clone(),
            });

            if kind == StreamKind::Stdout {
                if let Some(prompt) = session.detector.detect(&text, &chunk) {
                    session.enter_input_wait(prompt).await;
                }
            }
        }

        let transcript_lock = match kind {
            StreamKind::Stdout => &session.stdout,
            StreamKind::Stderr => &session.stderr,
        };
        transcript_lock.lock().await.finish();
        debug!(cell_id = %session.cell_id, stream = ?kind, "Stream reader finished");
    })
}

/// Drive one session to its end: wait for exit or the kill signal, drain the
/// readers, resolve the session, and drop the registry entry.
///
/// The temporary script file, when present, lives exactly as long as this
/// task.
pub(crate) fn spawn_supervisor(
    session: Arc<ExecutionSession>,
    registry: Arc<SessionRegistry>,
    mut handle: ProcessHandle,
    script: Option<NamedTempFile>,
    readers: Vec<JoinHandle<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            status = handle.wait() => match status {
                Ok(status) => ExitOutcome::Exited(status.code().unwrap_or(-1)),
                Err(e) => ExitOutcome::WaitFailed(format!("failed to wait on process: {e}")),
            },
            _ = session.kill.cancelled() => {
                handle.terminate();
                let _ = handle.wait().await;
                ExitOutcome::Killed
            }
        };

        // Bytes already in transit may still arrive after a kill; give the
        // readers a bounded window. A reader can stay blocked forever when
        // the child's own descendants hold the pipe open.
        for mut reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        registry.remove_if_same(session.cell_id(), &session).await;
        session.finish(outcome).await;
        drop(script);
    })
}
