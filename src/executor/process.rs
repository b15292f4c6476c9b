//! Process handles for interpreter sessions
//!
//! Spawning, stdin delivery, and termination for one interpreter process.
//! The session that owns a handle takes its streams at wiring time; the
//! handle guarantees the OS process is reclaimed even if its owner is
//! dropped mid-flight.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::types::InterpreterProfile;

// ============================================================================
// Spawn Specification
// ============================================================================

/// Fully resolved command line for one spawn
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    /// Run a temporary script file through the interpreter
    pub fn script(
        profile: &InterpreterProfile,
        path: &Path,
        workdir: &Path,
        env: &[(String, String)],
    ) -> Self {
        let mut args = profile.file_args.clone();
        args.push(path.to_string_lossy().into_owned());
        Self {
            command: profile.command.clone(),
            args,
            workdir: workdir.to_path_buf(),
            env: env.to_vec(),
        }
    }

    /// Pass code inline, leaving stdin free for interactive reads
    pub fn inline(
        profile: &InterpreterProfile,
        code: &str,
        workdir: &Path,
        env: &[(String, String)],
    ) -> Self {
        let mut args = profile.inline_args.clone();
        args.push(code.to_string());
        Self {
            command: profile.command.clone(),
            args,
            workdir: workdir.to_path_buf(),
            env: env.to_vec(),
        }
    }
}

// ============================================================================
// Process Handle
// ============================================================================

/// One spawned interpreter process and its standard streams
pub struct ProcessHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    /// Spawn the process with fully piped stdio
    pub fn spawn(spec: &SpawnSpec) -> io::Result<Self> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        debug!(command = %spec.command, pid = ?child.id(), "Spawned interpreter process");
        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
        })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Close the stdin pipe so the process sees end-of-input
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Request termination; safe to call on an already-exited process
    pub fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }

    /// OS process id while the process is running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Write one newline-terminated line to a raw stdin pipe
pub async fn write_line(stdin: &mut ChildStdin, text: &str) -> io::Result<()> {
    stdin.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        stdin.write_all(b"\n").await?;
    }
    stdin.flush().await
}
