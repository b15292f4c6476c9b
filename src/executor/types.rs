//! Types for execution sessions
//!
//! Core data structures for managing interpreter processes spawned per cell.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle state of an execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Interpreter process is being created
    Spawning,
    /// Process is alive and its streams are being captured
    Running,
    /// Process is blocked on an interactive read from stdin
    WaitingForInput,
    /// Process exited with code zero, or was stopped by the timeout policy
    Completed,
    /// Process exited non-zero or could not be spawned
    Failed,
    /// Process was killed by an explicit cancel
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::WaitingForInput => "waiting_for_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spawning" => Some(Self::Spawning),
            "running" => Some(Self::Running),
            "waiting_for_input" => Some(Self::WaitingForInput),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Terminated)
    }
}

// ============================================================================
// Execution Results
// ============================================================================

/// Outcome of one execute or resume call
///
/// A single cell may produce several results: one per input pause plus the
/// final one when the process exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured output text (stdout on success, stderr on failure)
    pub output: String,
    /// Whether the call counts as successful
    pub success: bool,
    /// Milliseconds since the session started
    pub elapsed_ms: u64,
    /// Process is paused awaiting interactive input
    #[serde(default)]
    pub waiting_for_input: bool,
    /// Prompt text extracted from the output tail, when paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_prompt: Option<String>,
}

impl ExecutionResult {
    pub fn completed(output: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            output: output.into(),
            success: true,
            elapsed_ms,
            waiting_for_input: false,
            input_prompt: None,
        }
    }

    pub fn failed(output: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            output: output.into(),
            success: false,
            elapsed_ms,
            waiting_for_input: false,
            input_prompt: None,
        }
    }

    pub fn waiting(output: impl Into<String>, prompt: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            output: output.into(),
            success: true,
            elapsed_ms,
            waiting_for_input: true,
            input_prompt: Some(prompt.into()),
        }
    }
}

// ============================================================================
// Interpreter Profiles
// ============================================================================

/// How to drive one kind of interpreter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterProfile {
    /// Interpreter binary
    pub command: String,
    /// Arguments when executing a temporary script file (path appended last)
    pub file_args: Vec<String>,
    /// Arguments when passing code inline, leaving stdin free for interactive
    /// reads (code appended last)
    pub inline_args: Vec<String>,
    /// Extension for temporary script files
    pub script_extension: String,
    /// Source constructs that read interactive input (pre-spawn scan)
    pub input_constructs: Vec<String>,
    /// Strings the interpreter prints to stdout when idle at a prompt
    pub prompt_markers: Vec<String>,
    /// Line prefixes that mean "statement continues", not "awaiting input"
    pub continuation_markers: Vec<String>,
}

impl InterpreterProfile {
    pub fn python() -> Self {
        Self {
            command: "python3".to_string(),
            file_args: vec!["-u".to_string()],
            inline_args: vec!["-u".to_string(), "-c".to_string()],
            script_extension: "py".to_string(),
            input_constructs: vec!["input(".to_string()],
            prompt_markers: vec![">>>".to_string()],
            continuation_markers: vec!["...".to_string()],
        }
    }

    pub fn sh() -> Self {
        Self {
            command: "sh".to_string(),
            file_args: Vec::new(),
            inline_args: vec!["-c".to_string()],
            script_extension: "sh".to_string(),
            input_constructs: vec!["read ".to_string()],
            prompt_markers: Vec::new(),
            continuation_markers: vec!["> ".to_string()],
        }
    }

    /// Best-fit profile for an interpreter binary name
    pub fn for_command(command: &str) -> Self {
        let base = command.rsplit('/').next().unwrap_or(command);
        if base.starts_with("python") {
            Self::python().with_command(command)
        } else {
            Self::sh().with_command(command)
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Pre-spawn scan: does this code ask for interactive input?
    pub fn requests_input(&self, code: &str) -> bool {
        self.input_constructs.iter().any(|c| code.contains(c.as_str()))
    }
}

// ============================================================================
// Executor Configuration
// ============================================================================

/// How to invoke the package installer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Installer binary
    pub command: String,
    /// Arguments before the manifest file name
    pub args: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            command: "pip3".to_string(),
            args: vec!["install".to_string(), "-r".to_string()],
        }
    }
}

/// Runtime configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interpreter driven for submitted cells
    pub profile: InterpreterProfile,
    /// Wall-clock budget for each execute/resume wait
    pub exec_timeout: Duration,
    /// Working directory for spawned processes
    pub workdir: PathBuf,
    /// Extra environment for spawned processes
    pub env: Vec<(String, String)>,
    /// Package installer invocation
    pub installer: InstallerConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            profile: InterpreterProfile::python(),
            exec_timeout: Duration::from_secs(10),
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: Vec::new(),
            installer: InstallerConfig::default(),
        }
    }
}

// ============================================================================
// Session Events (for push subscribers)
// ============================================================================

/// Which physical stream a chunk arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Events broadcast to observers about session activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Process spawned for a cell
    Started { cell_id: String },

    /// Output chunk captured from the process
    Output {
        cell_id: String,
        stream: StreamKind,
        chunk: String,
    },

    /// Session paused awaiting interactive input
    InputRequested { cell_id: String, prompt: String },

    /// Session reached a terminal state
    Finished {
        cell_id: String,
        state: SessionState,
        exit_code: Option<i32>,
    },
}

// ============================================================================
// Session Inspection
// ============================================================================

/// Point-in-time view of a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub cell_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Prompt the session is paused on, when waiting for input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_roundtrip() {
        for state in [
            SessionState::Spawning,
            SessionState::Running,
            SessionState::WaitingForInput,
            SessionState::Completed,
            SessionState::Failed,
            SessionState::Terminated,
        ] {
            let s = state.as_str();
            let parsed = SessionState::from_str(s);
            assert_eq!(parsed, Some(state));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Terminated.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::WaitingForInput.is_terminal());
        assert!(!SessionState::Spawning.is_terminal());
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let result = ExecutionResult::waiting("Name: ", "Name:", 120);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert!(parsed.waiting_for_input);
        assert_eq!(parsed.input_prompt.as_deref(), Some("Name:"));
        assert_eq!(parsed.elapsed_ms, 120);
    }

    #[test]
    fn test_result_waiting_flag_defaults_false() {
        let json = r#"{"output":"hi","success":true,"elapsed_ms":5}"#;
        let parsed: ExecutionResult = serde_json::from_str(json).unwrap();
        assert!(!parsed.waiting_for_input);
        assert!(parsed.input_prompt.is_none());
    }

    #[test]
    fn test_requests_input_scan() {
        let python = InterpreterProfile::python();
        assert!(python.requests_input("x = input(\"Name: \")"));
        assert!(!python.requests_input("print(1 + 2)"));

        let sh = InterpreterProfile::sh();
        assert!(sh.requests_input("read name\necho $name"));
        assert!(!sh.requests_input("echo hello"));
    }

    #[test]
    fn test_profile_for_command() {
        assert_eq!(InterpreterProfile::for_command("python3.12").command, "python3.12");
        assert_eq!(
            InterpreterProfile::for_command("/usr/bin/python3").script_extension,
            "py"
        );
        assert_eq!(InterpreterProfile::for_command("bash").script_extension, "sh");
    }

    #[test]
    fn test_event_serde_tag() {
        let event = SessionEvent::InputRequested {
            cell_id: "c1".to_string(),
            prompt: "Name:".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"input_requested\""));
        assert!(json.contains("\"prompt\":\"Name:\""));
    }
}
