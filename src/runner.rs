//! Execution boundary for package build steps.
//!
//! The installer only observes a step's exit status; its output goes
//! straight to the terminal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// A build step with every placeholder already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStep {
    pub name: String,
    pub command: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    /// Non-zero exit code, or `None` when killed by a signal
    Failed(Option<i32>),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "succeeded"),
            StepStatus::Failed(Some(code)) => write!(f, "exited with status {}", code),
            StepStatus::Failed(None) => write!(f, "was terminated by a signal"),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run one step to completion. `Err` means the step could not be started.
    async fn run(&self, step: &PreparedStep) -> Result<StepStatus>;
}

/// Runs steps with `sh -c`, inheriting stdout and stderr.
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl BuildRunner for ShellRunner {
    #[tracing::instrument(skip(self, step), fields(step = %step.name))]
    async fn run(&self, step: &PreparedStep) -> Result<StepStatus> {
        debug!("Running in {:?}: {}", step.cwd, step.command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&step.command)
            .current_dir(&step.cwd)
            .envs(&step.env)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to start step '{}'", step.name))?;

        if status.success() {
            Ok(StepStatus::Success)
        } else {
            Ok(StepStatus::Failed(status.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn step(command: &str, cwd: PathBuf) -> PreparedStep {
        PreparedStep {
            name: "compile".into(),
            command: command.into(),
            cwd,
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_shell_runner_success_in_cwd_with_env() {
        let dir = tempdir().unwrap();
        let mut s = step("echo \"$GREETING\" > out.txt", dir.path().to_path_buf());
        s.env.insert("GREETING".into(), "hello".into());

        assert_eq!(ShellRunner.run(&s).await.unwrap(), StepStatus::Success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hello\n"
        );
    }

    #[tokio::test]
    async fn test_shell_runner_reports_exit_code() {
        let dir = tempdir().unwrap();
        let status = ShellRunner
            .run(&step("exit 7", dir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(status, StepStatus::Failed(Some(7)));
        assert_eq!(status.to_string(), "exited with status 7");
    }

    #[tokio::test]
    async fn test_shell_runner_missing_cwd_is_error() {
        let dir = tempdir().unwrap();
        let result = ShellRunner
            .run(&step("true", dir.path().join("missing")))
            .await;
        assert!(result.is_err());
    }
}
