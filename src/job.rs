use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::pipeline::PipelineOutcome;

/// Number of finished and running jobs kept in memory
pub const DEFAULT_MAX_JOBS: usize = 24;

/// Represents the status of a deploy job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

/// What started a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Push,
    Command,
}

/// One pipeline run against a deploy target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub target: String,
    pub trigger: Trigger,
    pub requested_by: String,
    pub delivery_id: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub failed_step: Option<String>,
}

impl Job {
    /// Create a new job in Running status
    pub fn new(target: &str, trigger: Trigger, requested_by: &str) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            target: target.to_string(),
            trigger,
            requested_by: requested_by.to_string(),
            delivery_id: None,
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            message: None,
            failed_step: None,
        }
    }

    pub fn with_delivery(mut self, delivery_id: &str) -> Self {
        self.delivery_id = Some(delivery_id.to_string());
        self
    }

    /// Mark job as finished with the pipeline outcome
    pub fn finish(&mut self, outcome: &PipelineOutcome) {
        self.status = if outcome.succeeded {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        self.completed_at = Some(Utc::now());
        self.message = Some(outcome.message.clone());
        self.failed_step = outcome.failed_step.clone();
    }
}

/// Bounded in-memory history of recent jobs, oldest evicted first.
///
/// Lost on restart.
#[derive(Debug)]
pub struct JobStore {
    jobs: VecDeque<Job>,
    max_jobs: usize,
}

impl JobStore {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(max_jobs),
            max_jobs: max_jobs.max(1),
        }
    }

    /// Add a job and return its id
    pub fn add_job(&mut self, job: Job) -> String {
        while self.jobs.len() >= self.max_jobs {
            self.jobs.pop_front();
        }
        let id = job.id.clone();
        self.jobs.push_back(job);
        id
    }

    /// Record the outcome of a job; false if it was already evicted
    pub fn finish_job(&mut self, id: &str, outcome: &PipelineOutcome) -> bool {
        match self.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.finish(outcome);
                true
            }
            None => false,
        }
    }

    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Most recent first
    pub fn get_recent_jobs(&self, limit: usize) -> Vec<Job> {
        self.jobs.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_running_jobs(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_JOBS)
    }
}
