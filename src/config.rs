// src/config.rs
// File-based configuration from ~/.runcell/config.toml with RUNCELL_* overrides

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::executor::{ExecutorConfig, InterpreterProfile};

/// Top-level config structure
#[derive(Debug, Deserialize, Default)]
pub struct RuncellConfig {
    #[serde(default)]
    pub interpreter: InterpreterSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub installer: InstallerSection,
}

/// Interpreter configuration section
#[derive(Debug, Deserialize, Default)]
pub struct InterpreterSection {
    /// Interpreter binary, e.g. "python3"
    pub command: Option<String>,
}

/// Execution configuration section
#[derive(Debug, Deserialize, Default)]
pub struct ExecutionSection {
    /// Wait budget per execute/resume call, in seconds
    pub timeout_secs: Option<u64>,
    /// Working directory for spawned sessions
    pub workdir: Option<PathBuf>,
}

/// Package installer configuration section
#[derive(Debug, Deserialize, Default)]
pub struct InstallerSection {
    /// Installer binary, e.g. "pip3"
    pub command: Option<String>,
    /// Arguments placed before the manifest name
    pub args: Option<Vec<String>>,
}

impl RuncellConfig {
    /// Load config from ~/.runcell/config.toml, then apply RUNCELL_*
    /// environment overrides
    pub fn load() -> Self {
        let path = Self::config_path();

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Get the config file path
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".runcell")
            .join("config.toml")
    }

    /// Environment variables win over file values
    fn apply_env(&mut self) {
        if let Ok(command) = std::env::var("RUNCELL_INTERPRETER") {
            if !command.is_empty() {
                self.interpreter.command = Some(command);
            }
        }
        if let Some(secs) = std::env::var("RUNCELL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.execution.timeout_secs = Some(secs);
        }
        if let Ok(workdir) = std::env::var("RUNCELL_WORKDIR") {
            if !workdir.is_empty() {
                self.execution.workdir = Some(PathBuf::from(workdir));
            }
        }
        if let Ok(command) = std::env::var("RUNCELL_INSTALLER") {
            if !command.is_empty() {
                self.installer.command = Some(command);
            }
        }
    }

    /// Build the runtime executor configuration
    pub fn to_executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::default();
        if let Some(command) = &self.interpreter.command {
            config.profile = InterpreterProfile::for_command(command);
        }
        if let Some(secs) = self.execution.timeout_secs {
            config.exec_timeout = Duration::from_secs(secs);
        }
        if let Some(workdir) = &self.execution.workdir {
            config.workdir = workdir.clone();
        }
        if let Some(command) = &self.installer.command {
            config.installer.command = command.clone();
        }
        if let Some(args) = &self.installer.args {
            config.installer.args = args.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[interpreter]
command = "python3.12"

[execution]
timeout_secs = 30

[installer]
command = "uv"
args = ["pip", "install", "-r"]
"#;
        let config: RuncellConfig = toml::from_str(toml).unwrap();
        let exec = config.to_executor_config();
        assert_eq!(exec.profile.command, "python3.12");
        assert_eq!(exec.exec_timeout, Duration::from_secs(30));
        assert_eq!(exec.installer.command, "uv");
        assert_eq!(exec.installer.args, vec!["pip", "install", "-r"]);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: RuncellConfig = toml::from_str("").unwrap();
        let exec = config.to_executor_config();
        assert_eq!(exec.profile.command, "python3");
        assert_eq!(exec.exec_timeout, Duration::from_secs(10));
        assert_eq!(exec.installer.command, "pip3");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: RuncellConfig = toml::from_str("[execution]\ntimeout_secs = 5\n").unwrap();
        let exec = config.to_executor_config();
        assert_eq!(exec.exec_timeout, Duration::from_secs(5));
        assert_eq!(exec.profile.command, "python3");
    }

    #[test]
    fn test_interpreter_command_picks_profile() {
        let config: RuncellConfig = toml::from_str("[interpreter]\ncommand = \"sh\"\n").unwrap();
        let exec = config.to_executor_config();
        assert_eq!(exec.profile.script_extension, "sh");
    }
}
