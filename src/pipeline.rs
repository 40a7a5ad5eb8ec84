//! The deploy pipeline: sync the checkout, then tag, push and restart when live is behind.
//!
//! Steps run strictly in order and the first failure ends the run. Nothing is
//! rolled back, so a failed run can leave the checkout or the tags half-updated;
//! the failure message says so.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::DeployTarget;
use crate::error::StepError;
use crate::runner::{CommandRunner, PipelineStep};

/// Prefix shared by every tag this service creates
pub const LIVE_TAG_PREFIX: &str = "live";
pub const ALREADY_AT_HEAD: &str = "Live is already at HEAD";

const RESET_LABEL: &str = "git reset error: ";
const CLEAN_LABEL: &str = "git clean error: ";
const PULL_LABEL: &str = "git pull error: ";
const DESCRIBE_LABEL: &str = "git describe error: ";
const TAG_LABEL: &str = "git tag error: ";
const PUSH_TAGS_LABEL: &str = "git push tags error: ";
const RESTART_LABEL: &str = "restart servers error: ";

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub succeeded: bool,
    pub message: String,
    /// Failure label of the step that stopped the run
    pub failed_step: Option<String>,
}

impl PipelineOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            failed_step: None,
        }
    }

    /// `applied` is the number of steps that completed before `err`.
    pub fn failure(err: &StepError, applied: usize) -> Self {
        let mut message = err.to_string();
        let output = err.output.trim();
        if !output.is_empty() {
            message.push('\n');
            message.push_str(output);
        }
        if applied > 0 {
            message.push_str(&format!(
                "\nDeploy stopped after {} completed step(s); they were not rolled back and the checkout may be partially updated.",
                applied
            ));
        }
        Self {
            succeeded: false,
            message,
            failed_step: Some(err.label.clone()),
        }
    }

    /// The run ended without a step result, e.g. the deploy task panicked.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: format!(
                "Deploy aborted: {}\nThe checkout may be partially updated.",
                reason.into()
            ),
            failed_step: None,
        }
    }
}

/// Parsed `git describe --long` output for a checkout that is ahead of its last live tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeSummary {
    pub commits_behind: String,
    pub last_live: String,
}

impl DescribeSummary {
    /// Returns None when the checkout is exactly at the last live tag (or the output
    /// has no commit count).
    pub fn parse(output: &str) -> Option<Self> {
        let fields: Vec<&str> = output.trim().split('-').collect();
        if fields.len() >= 2 && fields[1] != "0" {
            Some(Self {
                commits_behind: fields[1].to_string(),
                last_live: fields[0].to_string(),
            })
        } else {
            None
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("{} commits behind", self.commits_behind),
            format!("Last pushed to live: {}", self.last_live),
        ]
    }
}

/// `live_YYYYMMDDHHMMSS`
pub fn live_tag_name(now: NaiveDateTime) -> String {
    format!("{}_{}", LIVE_TAG_PREFIX, now.format("%Y%m%d%H%M%S"))
}

fn pushed_line(now: NaiveDateTime) -> String {
    format!("Pushed to Live on {}", now.format("%B %d, %Y at %H:%M:%S"))
}

/// Ordered deploy steps for one target
pub struct DeployPipeline {
    runner: Arc<dyn CommandRunner>,
    target: DeployTarget,
}

impl DeployPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>, target: DeployTarget) -> Self {
        Self { runner, target }
    }

    /// reset, clean, checkout, pull
    pub fn sync_steps(&self) -> Vec<PipelineStep> {
        let dir = &self.target.repo_path;
        let checkout_label = format!("git checkout {} error: ", self.target.branch);
        vec![
            PipelineStep::git(&["reset", "--hard"], dir, RESET_LABEL),
            PipelineStep::git(&["clean", "-df"], dir, CLEAN_LABEL),
            PipelineStep::git(&["checkout", self.target.branch.as_str()], dir, &checkout_label),
            PipelineStep::git(&["pull"], dir, PULL_LABEL),
        ]
    }

    fn describe_step(&self) -> PipelineStep {
        let pattern = format!("{}*", LIVE_TAG_PREFIX);
        PipelineStep::git(
            &["describe", "--long", "--match", pattern.as_str()],
            &self.target.repo_path,
            DESCRIBE_LABEL,
        )
    }

    fn tag_step(&self, tag: &str, message: &str) -> PipelineStep {
        PipelineStep::git(
            &["tag", "-a", tag, "-m", message],
            &self.target.repo_path,
            TAG_LABEL,
        )
    }

    fn push_tags_step(&self) -> PipelineStep {
        PipelineStep::git(
            &["push", self.target.remote.as_str(), "--tags"],
            &self.target.repo_path,
            PUSH_TAGS_LABEL,
        )
    }

    fn restart_step(&self) -> Result<PipelineStep, StepError> {
        match self.target.restart_command.as_deref() {
            Some(cmd) if !cmd.is_empty() => Ok(PipelineStep::new(
                "/bin/sh",
                &["-c", cmd],
                self.target.restart_dir(),
                RESTART_LABEL,
            )),
            _ => Err(StepError {
                label: RESTART_LABEL.to_string(),
                output: String::new(),
                reason: "no restart_command configured".to_string(),
            }),
        }
    }

    async fn step(
        &self,
        step: &PipelineStep,
        applied: &mut usize,
    ) -> Result<String, PipelineOutcome> {
        match self.runner.run(step).await {
            Ok(output) => {
                *applied += 1;
                Ok(output)
            }
            Err(e) => {
                error!(
                    "Pipeline for '{}' failed at '{}': {}",
                    self.target.name,
                    step.command_line(),
                    e
                );
                Err(PipelineOutcome::failure(&e, *applied))
            }
        }
    }

    async fn sync_inner(&self, applied: &mut usize) -> Result<(), PipelineOutcome> {
        for step in self.sync_steps() {
            self.step(&step, applied).await?;
        }
        Ok(())
    }

    /// Bring the checkout up to date with the deployment branch.
    pub async fn sync(&self) -> PipelineOutcome {
        info!(
            "Syncing '{}' ({}) to branch '{}'",
            self.target.name,
            self.target.repo_path.display(),
            self.target.branch
        );
        let mut applied = 0;
        match self.sync_inner(&mut applied).await {
            Ok(()) => PipelineOutcome::success(format!(
                "Synced {} to {}",
                self.target.name, self.target.branch
            )),
            Err(outcome) => outcome,
        }
    }

    /// Sync, then tag, push tags and restart if live is behind, using the local clock.
    pub async fn release(&self, tag_message: &str) -> PipelineOutcome {
        self.release_at(Local::now().naive_local(), tag_message).await
    }

    pub async fn release_at(&self, now: NaiveDateTime, tag_message: &str) -> PipelineOutcome {
        info!(
            "Releasing '{}' ({}) from branch '{}'",
            self.target.name,
            self.target.repo_path.display(),
            self.target.branch
        );
        let mut applied = 0;
        match self.release_inner(now, tag_message, &mut applied).await {
            Ok(message) => PipelineOutcome::success(message),
            Err(outcome) => outcome,
        }
    }

    async fn release_inner(
        &self,
        now: NaiveDateTime,
        tag_message: &str,
        applied: &mut usize,
    ) -> Result<String, PipelineOutcome> {
        self.sync_inner(applied).await?;

        let described = self.step(&self.describe_step(), applied).await?;
        let Some(summary) = DescribeSummary::parse(&described) else {
            info!("'{}': {}", self.target.name, ALREADY_AT_HEAD);
            return Ok(ALREADY_AT_HEAD.to_string());
        };

        let mut lines = summary.lines();

        let tag = live_tag_name(now);
        self.step(&self.tag_step(&tag, tag_message), applied).await?;
        self.step(&self.push_tags_step(), applied).await?;
        lines.push(pushed_line(now));

        lines.push(format!("Restarting {}", self.target.name));
        let restart = self
            .restart_step()
            .map_err(|e| PipelineOutcome::failure(&e, *applied))?;
        self.step(&restart, applied).await?;
        lines.push(format!("Restarted {}", self.target.name));

        info!("'{}' released as {}", self.target.name, tag);
        Ok(lines.join("\n"))
    }
}
