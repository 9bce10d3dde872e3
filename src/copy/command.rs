//! External command execution for copy strategies

use crate::error::{ReplicatorError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

const MASK: &str = "***";

/// A command line to run, with secret arguments tracked for masking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    secrets: Vec<String>,
    /// Whether the command changes registry or local image state
    pub mutating: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
            mutating: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument that contains a secret somewhere inside it
    pub fn secret_arg(mut self, arg: impl Into<String>, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret.to_string());
        }
        self.args.push(arg.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.mutating = false;
        self
    }

    /// Command line with every secret replaced by `***`
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            let mut shown = arg.clone();
            for secret in &self.secrets {
                shown = shown.replace(secret.as_str(), MASK);
            }
            line.push(' ');
            line.push_str(&shown);
        }
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stderr, or the exit status when stderr is empty
    pub fn failure_message(&self, program: &str) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.status {
            Some(code) => format!("{} exited with status {}", program, code),
            None => format!("{} was terminated by a signal", program),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; `Err` only when the process could not be started
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ReplicatorError::Copy(format!("failed to launch {}: {}", command.program, e))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secrets() {
        let spec = CommandSpec::new("skopeo")
            .arg("copy")
            .arg("--src-creds")
            .secret_arg("robot:s3cr3t", "s3cr3t")
            .arg("docker://docker.io/library/nginx:latest");
        assert_eq!(
            spec.display(),
            "skopeo copy --src-creds robot:*** docker://docker.io/library/nginx:latest"
        );
        assert_eq!(spec.args[2], "robot:s3cr3t");
    }

    #[test]
    fn failure_message_prefers_stderr() {
        assert_eq!(
            CommandOutput::failed(1, "  manifest unknown\n").failure_message("oras"),
            "manifest unknown"
        );
        assert_eq!(
            CommandOutput::failed(125, "").failure_message("docker"),
            "docker exited with status 125"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_copy_error() {
        let err = TokioCommandRunner
            .run(&CommandSpec::new("definitely-not-an-installed-tool-3f9a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicatorError::Copy(_)));
    }
}
