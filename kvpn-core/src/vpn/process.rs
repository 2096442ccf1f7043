//! External command execution
//!
//! Every process the monitor and codec start goes through [`CommandRunner`],
//! which applies the configured timeout and prefixes `sudo` for privileged
//! commands when the current user is not root.

use crate::error::ProbeError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands with a timeout and optional privilege escalation
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    use_sudo: bool,
}

impl CommandRunner {
    /// Create a runner
    ///
    /// `use_sudo` is ignored when the effective user is already root.
    pub fn new(timeout: Duration, use_sudo: bool) -> Self {
        Self {
            timeout,
            use_sudo: use_sudo && !is_root(),
        }
    }

    /// Run an unprivileged command and capture its output
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.execute(cmd, describe(program, args), None).await
    }

    /// Run a command that needs root
    pub async fn run_privileged(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ProbeError> {
        if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(program).args(args);
            self.execute(cmd, format!("sudo {}", describe(program, args)), None)
                .await
        } else {
            self.run(program, args).await
        }
    }

    /// Run an unprivileged command feeding `input` on stdin
    pub async fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
    ) -> Result<CommandOutput, ProbeError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.execute(cmd, describe(program, args), Some(input)).await
    }

    async fn execute(
        &self,
        mut cmd: Command,
        description: String,
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, ProbeError> {
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(command = %description, "Running external command");

        let mut child = cmd.spawn().map_err(|e| ProbeError::Spawn {
            command: description.clone(),
            reason: e.to_string(),
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input)
                    .await
                    .map_err(|e| ProbeError::Spawn {
                        command: description.clone(),
                        reason: format!("failed to write stdin: {}", e),
                    })?;
                // stdin is dropped here so the child sees EOF
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout {
                command: description.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ProbeError::Spawn {
                command: description.clone(),
                reason: e.to_string(),
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(command = %description, code = ?result.code, "External command finished");
        Ok(result)
    }
}

/// Whether the effective user is root
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Names of required tools that cannot be found on `PATH`
pub fn missing_tools(tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| which::which(tool).is_err())
        .map(|tool| tool.to_string())
        .collect()
}

fn describe(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
