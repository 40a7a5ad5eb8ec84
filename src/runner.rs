//! Running external commands for the deploy pipeline

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use crate::error::StepError;

/// Maximum size for captured command output before truncation (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// One external command of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Prefix of the failure message, e.g. `git pull error: `
    pub failure_label: String,
}

impl PipelineStep {
    pub fn new(
        program: &str,
        args: &[&str],
        working_dir: impl Into<PathBuf>,
        failure_label: &str,
    ) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: working_dir.into(),
            failure_label: failure_label.to_string(),
        }
    }

    /// `git <args>` in `working_dir`
    pub fn git(args: &[&str], working_dir: impl Into<PathBuf>, failure_label: &str) -> Self {
        Self::new("git", args, working_dir, failure_label)
    }

    /// Program and arguments joined by spaces, for logs
    pub fn command_line(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            cmd.push(' ');
            cmd.push_str(arg);
        }
        cmd
    }
}

/// Executes a single pipeline step and returns its captured output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, step: &PipelineStep) -> Result<String, StepError>;
}

/// Runs steps as child processes.
///
/// stdout and stderr are captured into one string (stdout first). There is no
/// timeout: a command that never exits blocks its pipeline forever.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, step: &PipelineStep) -> Result<String, StepError> {
        info!(
            "Running (cwd = '{}'): {}",
            step.working_dir.display(),
            step.command_line()
        );

        let output = Command::new(&step.program)
            .current_dir(&step.working_dir)
            .args(&step.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                error!("{} failed to start: {}", step.program, e);
                StepError {
                    label: step.failure_label.clone(),
                    output: String::new(),
                    reason: e.to_string(),
                }
            })?;

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        let captured = truncate_output(captured);

        if output.status.success() {
            info!("{} output:\n{}", step.command_line(), captured);
            Ok(captured)
        } else {
            let reason = match output.status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            error!("{}{}\n{}", step.failure_label, reason, captured);
            Err(StepError {
                label: step.failure_label.clone(),
                output: captured,
                reason,
            })
        }
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() > MAX_OUTPUT_SIZE {
        let mut cut = MAX_OUTPUT_SIZE;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n... (output truncated)");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &std::path::Path) -> PipelineStep {
        PipelineStep::new("/bin/sh", &["-c", script], dir, "test step error: ")
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = ProcessRunner
            .run(&sh("echo out; echo err >&2", dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "out\nerr\n");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let out = ProcessRunner
            .run(&sh("cat marker.txt", dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "here");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_label_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProcessRunner
            .run(&sh("echo partial; exit 3", dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.label, "test step error: ");
        assert_eq!(err.reason, "exit status 3");
        assert_eq!(err.output, "partial\n");
    }

    #[tokio::test]
    async fn spawn_failure_is_step_error() {
        let dir = tempfile::tempdir().unwrap();
        let step = PipelineStep::new(
            "/definitely/not/a/program",
            &[],
            dir.path(),
            "missing error: ",
        );
        let err = ProcessRunner.run(&step).await.unwrap_err();
        assert_eq!(err.label, "missing error: ");
        assert!(err.output.is_empty());
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn command_line_joins_arguments() {
        let step = PipelineStep::git(&["describe", "--long", "--match", "live*"], "/srv", "x");
        assert_eq!(step.command_line(), "git describe --long --match live*");
    }

    #[test]
    fn truncates_large_output() {
        let big = "a".repeat(MAX_OUTPUT_SIZE + 10);
        let out = truncate_output(big);
        assert!(out.ends_with("... (output truncated)"));
        assert!(out.len() < MAX_OUTPUT_SIZE + 30);
        assert_eq!(truncate_output("short".into()), "short");
    }
}
