//! External command execution with a per-call timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::template::{render, TemplateVars};

/// How to invoke an external program. Arguments may contain `{placeholder}`
/// tokens that are filled in per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Zero disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Errors that prevent a command from producing an exit status.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command has an empty program name")]
    EmptyProgram,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {seconds} seconds")]
    TimedOut { program: String, seconds: u64 },

    #[error("failed to collect output of {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// Result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; -1 when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl CommandOutput {
    /// Last `lines` lines of stderr, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Run `spec` in `workdir` with placeholders replaced from `vars`.
///
/// The child is killed if the timeout elapses.
pub async fn run_command(
    spec: &CommandSpec,
    vars: &TemplateVars,
    workdir: &Path,
) -> Result<CommandOutput, CommandError> {
    if spec.program.trim().is_empty() {
        return Err(CommandError::EmptyProgram);
    }
    let start = Instant::now();
    let args: Vec<String> = spec.args.iter().map(|a| render(a, vars)).collect();
    tracing::debug!(program = %spec.program, args = ?args, workdir = %workdir.display(), "spawning command");

    let child = Command::new(&spec.program)
        .args(&args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    let waited = if spec.timeout_secs > 0 {
        tokio::time::timeout(
            Duration::from_secs(spec.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CommandError::TimedOut {
            program: spec.program.clone(),
            seconds: spec.timeout_secs,
        })?
    } else {
        child.wait_with_output().await
    };
    let output = waited.map_err(|source| CommandError::Wait {
        program: spec.program.clone(),
        source,
    })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    })
}
