pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod signature;
pub mod token;
pub mod webhook;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub use config::{DeployConfig, DeployTarget, PushAction};
use job::JobStore;
use notify::Notifier;
use runner::CommandRunner;
use token::TokenVerifier;

/// Everything handlers share. Configuration is fixed at startup.
///
/// Pipeline runs are not serialized: two triggers for the same target run
/// concurrently against the same checkout.
pub struct AppState {
    pub config: DeployConfig,
    pub token_verifier: Option<TokenVerifier>,
    pub runner: Arc<dyn CommandRunner>,
    pub notifier: Arc<dyn Notifier>,
    pub job_store: Mutex<JobStore>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: DeployConfig,
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            token_verifier: config.token_verifier(),
            config,
            runner,
            notifier,
            job_store: Mutex::new(JobStore::default()),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
