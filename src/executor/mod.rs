//! Cell Executor
//!
//! Runs submitted code cells as interpreter subprocesses and manages their
//! full lifecycle:
//! - execute() - Spawn one session per cell and wait for its first resolution
//! - resume() - Forward input to a session paused on an input wait
//! - cancel() / cancel_all() - Kill live sessions
//! - subscribe() - Follow session events as they happen
//! - install_requirements() - Run the package installer over a manifest
//!
//! Every execute/resume call resolves with an [`ExecutionResult`], never an
//! error: spawn failures, non-zero exits, and delivery problems all come back
//! as structured failed results.
//!
//! ```rust,ignore
//! let executor = CellExecutor::new(ExecutorConfig::default());
//!
//! let result = executor.execute("cell_1", "name = input('Name: ')").await;
//! if result.waiting_for_input {
//!     let result = executor.resume("cell_1", "Ada").await;
//! }
//! ```

mod detect;
mod install;
mod process;
mod registry;
mod session;
mod transcript;
pub mod types;

pub use detect::{HeuristicDetector, InputWaitDetector};
pub use install::REQUIREMENTS_MANIFEST;
pub use registry::SessionRegistry;
pub use session::ExecutionSession;
pub use types::*;

use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use process::{ProcessHandle, SpawnSpec};
use session::{spawn_reader, spawn_supervisor};

/// Buffered session events per subscriber before lagging
const EVENT_CAPACITY: usize = 256;

/// Cell executor - spawns and tracks one interpreter session per cell
pub struct CellExecutor {
    config: ExecutorConfig,
    registry: Arc<SessionRegistry>,
    detector: Arc<dyn InputWaitDetector>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CellExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let detector = Arc::new(HeuristicDetector::from_profile(&config.profile));
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            interpreter = %config.profile.command,
            timeout_ms = config.exec_timeout.as_millis() as u64,
            "CellExecutor initialized"
        );
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            detector,
            event_tx,
        }
    }

    /// Swap in a custom input-wait detector
    pub fn with_detector(mut self, detector: Arc<dyn InputWaitDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Subscribe to session events (started, output, input requests, finish)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute a code cell, waiting until it completes, fails, pauses on an
    /// input wait, or times out
    ///
    /// Re-executing a live cell id terminates whichever session the registry
    /// insert displaces; the insert is the single replacement point, so two
    /// racing executes for one id leave exactly one survivor. Successful
    /// completions carry the stdout transcript; failures carry stderr,
    /// falling back to stdout when it is empty. Code that reads from stdin
    /// is passed to the interpreter inline so the pipe stays reserved for
    /// forwarded input; everything else runs from a temporary script file.
    pub async fn execute(&self, cell_id: &str, code: &str) -> ExecutionResult {
        let interactive = self.config.profile.requests_input(code);
        let script = if interactive {
            None
        } else {
            match self.write_script(code).await {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(cell_id = %cell_id, error = %e, "Failed to stage cell script");
                    return ExecutionResult::failed(format!("failed to stage cell script: {e}"), 0);
                }
            }
        };
        let spec = match &script {
            Some(file) => SpawnSpec::script(
                &self.config.profile,
                file.path(),
                &self.config.workdir,
                &self.config.env,
            ),
            None => SpawnSpec::inline(
                &self.config.profile,
                code,
                &self.config.workdir,
                &self.config.env,
            ),
        };

        let mut handle = match ProcessHandle::spawn(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(cell_id = %cell_id, command = %spec.command, error = %e, "Failed to spawn interpreter");
                return ExecutionResult::failed(format!("failed to start interpreter: {e}"), 0);
            }
        };
        debug!(cell_id = %cell_id, pid = ?handle.id(), interactive, "Session spawned");

        let stdin = handle.take_stdin();
        let stdout = handle.take_stdout();
        let stderr = handle.take_stderr();

        let session = Arc::new(ExecutionSession::new(
            cell_id,
            stdin,
            Arc::clone(&self.detector),
            self.event_tx.clone(),
        ));
        if let Some(prior) = self.registry.register(Arc::clone(&session)).await {
            debug!(cell_id = %cell_id, "Terminating displaced session for re-executed cell");
            prior.request_termination();
        }
        let _ = self.event_tx.send(SessionEvent::Started {
            cell_id: cell_id.to_string(),
        });

        // Arm the waiter before any stream task runs so an instant exit or
        // an immediate prompt cannot resolve into the void
        let rx = session.begin_wait(self.config.exec_timeout).await;

        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            readers.push(spawn_reader(Arc::clone(&session), StreamKind::Stdout, stdout));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_reader(Arc::clone(&session), StreamKind::Stderr, stderr));
        }
        spawn_supervisor(
            Arc::clone(&session),
            Arc::clone(&self.registry),
            handle,
            script,
            readers,
        );

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                ExecutionResult::failed("session closed before resolving", session.elapsed_ms())
            }
        }
    }

    /// Stage cell code as a temporary script for the interpreter
    async fn write_script(&self, code: &str) -> std::io::Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("cell_")
            .suffix(&format!(".{}", self.config.profile.script_extension))
            .tempfile()?;
        tokio::fs::write(file.path(), code).await?;
        Ok(file)
    }

    // ========================================================================
    // Input Forwarding
    // ========================================================================

    /// Forward one line of input to a session paused on an input wait
    ///
    /// Resolves like execute(): with completion, failure, another input
    /// wait, or timeout.
    pub async fn resume(&self, cell_id: &str, input: &str) -> ExecutionResult {
        let Some(session) = self.registry.lookup(cell_id).await else {
            return ExecutionResult::failed(
                crate::error::RuncellError::SessionNotFound(cell_id.to_string()).to_string(),
                0,
            );
        };
        session.forward_input(input, self.config.exec_timeout).await
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Request termination of one session. Returns false when no live
    /// session exists for the id.
    pub async fn cancel(&self, cell_id: &str) -> bool {
        self.registry.terminate_one(cell_id).await
    }

    /// Request termination of every live session, without waiting for the
    /// kills to land
    pub async fn cancel_all(&self) {
        self.registry.terminate_all().await;
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Point-in-time snapshots of every live session
    pub async fn sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshots().await
    }

    // ========================================================================
    // Requirements
    // ========================================================================

    /// Write a requirements manifest into the working directory and run the
    /// configured installer over it
    pub async fn install_requirements(&self, requirements: &str) -> ExecutionResult {
        install::install_requirements(&self.config, requirements).await
    }
}
