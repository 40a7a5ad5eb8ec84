//! HTTP layer: routing plus the GitHub, Slack and status handlers

pub mod command;
pub mod status;
pub mod webhook;

use axum::{Router, routing};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::SharedState;
use crate::pipeline::PipelineOutcome;

pub use command::{handle_command, spawn_release};
pub use status::{get_job, root, status};
pub use webhook::handle_webhook;

/// Build the application router; hook paths come from the server configuration.
pub fn router(state: SharedState) -> Router {
    let webhook_path = state.config.server.webhook_path.clone();
    let command_path = state.config.server.command_path.clone();

    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route("/job/{id}", routing::get(get_job))
        .route(&webhook_path, routing::post(handle_webhook))
        .route(&command_path, routing::post(handle_command))
        .with_state(state)
}

/// Run a deploy on a detached task and record its outcome on `job_id`.
///
/// Dropping the returned handle does not stop the run. A panic inside `run`
/// finishes the job with an aborted outcome.
pub(crate) fn spawn_pipeline<F>(
    state: SharedState,
    job_id: String,
    run: F,
) -> JoinHandle<PipelineOutcome>
where
    F: Future<Output = PipelineOutcome> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match tokio::spawn(run).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Job {} deploy task did not finish: {}", job_id, e);
                PipelineOutcome::aborted(e.to_string())
            }
        };

        if outcome.succeeded {
            info!("Job {} completed successfully.", job_id);
        } else {
            error!("Job {} failed: {}", job_id, outcome.message);
        }
        state.job_store.lock().await.finish_job(&job_id, &outcome);
        outcome
    })
}

/// Map a failed join on a deploy task to an aborted outcome.
pub(crate) fn joined(result: Result<PipelineOutcome, JoinError>) -> PipelineOutcome {
    result.unwrap_or_else(|e| {
        error!("Deploy task did not finish: {}", e);
        PipelineOutcome::aborted(e.to_string())
    })
}
