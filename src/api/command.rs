//! Slack slash-command handler
//!
//! Replies "Deploying to Live..." at once and releases on a detached task; the
//! outcome goes to the command's `response_url`.

use axum::{
    Form, Json,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{joined, spawn_pipeline};
use crate::SharedState;
use crate::config::DeployTarget;
use crate::job::{Job, Trigger};
use crate::notify::{DEPLOYING_TEXT, SlackResponse, deliver};
use crate::pipeline::{DeployPipeline, PipelineOutcome};
use crate::token::{CommandContext, CommandForm};

pub(crate) const REJECTED_TEXT: &str = "Request rejected";
pub(crate) const NO_TARGET_TEXT: &str = "No deploy target for this channel";

/// Handles the Slack slash-command POST request.
pub async fn handle_command(
    AxumState(state): AxumState<SharedState>,
    Form(form): Form<CommandForm>,
) -> Response {
    let Some(verifier) = &state.token_verifier else {
        error!("Slash command received, but no Slack token is configured.");
        return rejected();
    };

    let ctx = match verifier.verify(form) {
        Ok(ctx) => ctx,
        Err(e) if e.is_validation() => {
            info!("Malformed slash command request ({})", e);
            return rejected();
        }
        Err(e) => {
            warn!("Failed processing command! ({})", e);
            return rejected();
        }
    };

    let Some(target) = state.config.find_by_channel(&ctx.channel_id).cloned() else {
        warn!(
            "No deploy target for channel '{}' (requested by {})",
            ctx.channel_id, ctx.user_name
        );
        return Json(SlackResponse::fail(NO_TARGET_TEXT)).into_response();
    };

    info!(
        "{} from {} in {}: deploying '{}'",
        ctx.command,
        ctx.user_name,
        ctx.origin(),
        target.name
    );
    spawn_release(state.clone(), target, ctx);

    Json(SlackResponse::success(DEPLOYING_TEXT)).into_response()
}

fn rejected() -> Response {
    (StatusCode::UNAUTHORIZED, Json(SlackResponse::fail(REJECTED_TEXT))).into_response()
}

/// Release `target` in the background and POST the outcome to the command's callback.
///
/// The pipeline runs in its own task so that a panic still yields a failure
/// outcome and the callback is always attempted.
pub fn spawn_release(
    state: SharedState,
    target: DeployTarget,
    ctx: CommandContext,
) -> JoinHandle<PipelineOutcome> {
    tokio::spawn(async move {
        let job = Job::new(&target.name, Trigger::Command, &ctx.user_name);
        let job_id = state.job_store.lock().await.add_job(job);

        let pipeline = DeployPipeline::new(state.runner.clone(), target);
        let tag_message = format!("{} by {}", ctx.command, ctx.user_name);
        let run = spawn_pipeline(state.clone(), job_id, async move {
            pipeline.release(&tag_message).await
        });
        let outcome = joined(run.await);

        deliver(state.notifier.as_ref(), &ctx.response_url, &outcome).await;
        outcome
    })
}
