//! External tool execution
//!
//! Language toolchains (`npm`, `mvn`, `dotnet`, `python`), hooks and extensions all run
//! through [`CommandRunner`] so tests can script their output.

use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A command line to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// `KEY=VALUE` pairs added to the inherited environment
    pub env: Vec<String>,
}

impl RunArgs {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `program arg1 arg2 ...`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; a non-zero exit is an error
    async fn run(&self, args: &RunArgs, cancel: &CancellationToken) -> Result<RunResult>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &RunArgs, cancel: &CancellationToken) -> Result<RunResult> {
        let mut cmd = Command::new(&args.program);
        cmd.args(&args.args);
        if let Some(cwd) = &args.cwd {
            cmd.current_dir(cwd);
        }
        for pair in &args.env {
            if let Some((key, value)) = pair.split_once('=') {
                cmd.env(key, value);
            }
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let rendered = args.command_line();
        tracing::debug!(command = %rendered, "Running command");

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProjectError::ToolNotFound(args.program.clone()),
            _ => ProjectError::Io(e),
        })?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ProjectError::Cancelled),
            output = child.wait_with_output() => output?,
        };

        let result = RunResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(ProjectError::CommandFailed {
                command: rendered,
                code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}
