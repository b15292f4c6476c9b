//! Requirements installation
//!
//! Writes the submitted manifest into the working directory and runs the
//! configured installer over it as a plain subprocess. Install runs are not
//! sessions: no input-wait detection, no timeout, no registry entry. The
//! installer's stdin is closed at spawn so it can never block on a prompt.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use super::process::{ProcessHandle, SpawnSpec};
use super::transcript::Transcript;
use super::types::{ExecutionResult, ExecutorConfig};

/// Manifest file name the installer is pointed at
pub const REQUIREMENTS_MANIFEST: &str = "requirements.txt";

/// Install the given requirements manifest into the configured environment
pub async fn install_requirements(config: &ExecutorConfig, requirements: &str) -> ExecutionResult {
    let started = Instant::now();

    let manifest_path = config.workdir.join(REQUIREMENTS_MANIFEST);
    if let Err(e) = tokio::fs::write(&manifest_path, requirements).await {
        warn!(path = %manifest_path.display(), error = %e, "Failed to write requirements manifest");
        return ExecutionResult::failed(
            format!("failed to write requirements manifest: {e}"),
            elapsed_ms(started),
        );
    }

    let mut args = config.installer.args.clone();
    args.push(REQUIREMENTS_MANIFEST.to_string());
    let spec = SpawnSpec {
        command: config.installer.command.clone(),
        args,
        workdir: config.workdir.clone(),
        env: config.env.clone(),
    };

    debug!(command = %spec.command, "Running requirements installer");
    let mut handle = match ProcessHandle::spawn(&spec) {
        Ok(handle) => handle,
        Err(e) => {
            return ExecutionResult::failed(
                format!("failed to start installer: {e}"),
                elapsed_ms(started),
            );
        }
    };

    handle.close_stdin();
    let stdout_stream = handle.take_stdout();
    let stderr_stream = handle.take_stderr();
    let (stdout, stderr) = tokio::join!(drain(stdout_stream), drain(stderr_stream));

    match handle.wait().await {
        Ok(status) if status.success() => {
            debug!("Requirements installed");
            ExecutionResult::completed(stdout, elapsed_ms(started))
        }
        Ok(status) => {
            let output = if stderr.is_empty() { stdout } else { stderr };
            warn!(exit_code = ?status.code(), "Requirements install failed");
            ExecutionResult::failed(output, elapsed_ms(started))
        }
        Err(e) => ExecutionResult::failed(
            format!("failed to wait on installer: {e}"),
            elapsed_ms(started),
        ),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Read a stream to EOF, decoding through a transcript
async fn drain<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut transcript = Transcript::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                transcript.push_bytes(&buf[..n]);
            }
        }
    }
    transcript.finish();
    transcript.into_text()
}
