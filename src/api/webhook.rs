//! Webhook handler for GitHub push events
//!
//! The pipeline runs inline and its outcome becomes the HTTP response.

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::{joined, spawn_pipeline};
use crate::SharedState;
use crate::config::PushAction;
use crate::job::{Job, Trigger};
use crate::notify::WebhookReply;
use crate::pipeline::DeployPipeline;
use crate::webhook::WebhookContext;

pub(crate) const UNAUTHORIZED_BODY: &str = "unauthorized";

/// Handles the GitHub webhook POST request.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = match WebhookContext::from_request(&headers, body) {
        Ok(ctx) => ctx,
        Err(e) => {
            if e.is_validation() {
                info!("Malformed hook delivery ({})", e);
            } else {
                warn!("Failed processing hook! ({})", e);
            }
            return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
        }
    };

    let Some(secret) = state.config.github.secret.as_deref().filter(|s| !s.is_empty()) else {
        error!(
            "Delivery {} received, but no GitHub webhook secret is configured.",
            ctx.delivery_id
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if let Err(e) = ctx.verify(secret.as_bytes()) {
        warn!("Failed processing hook {}! ({})", ctx.delivery_id, e);
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
    }

    if !ctx.is_push() {
        info!("Not push event; Received {:?} event", ctx.event);
        return StatusCode::NO_CONTENT.into_response();
    }

    let push = match ctx.push_event() {
        Ok(push) => push,
        Err(e) => {
            info!("Could not parse push payload {}: {}", ctx.delivery_id, e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let repo_name = push.repository.full_name.as_str();
    let Some(target) = state.config.find_by_repository(repo_name).cloned() else {
        warn!("No matching target for repository '{}', skipping.", repo_name);
        return StatusCode::NO_CONTENT.into_response();
    };

    let pusher = push.pusher_name().to_string();
    let job = Job::new(&target.name, Trigger::Push, &pusher).with_delivery(&ctx.delivery_id);
    let job_id = state.job_store.lock().await.add_job(job);
    info!(
        "Job {} - push {} to '{}' by {} ({:?})",
        job_id,
        push.after.as_deref().unwrap_or("?"),
        repo_name,
        pusher,
        push.git_ref
    );

    let on_push = target.on_push;
    let pipeline = DeployPipeline::new(state.runner.clone(), target);
    let tag_message = format!("push {} by {}", ctx.delivery_id, pusher);
    let run = spawn_pipeline(state.clone(), job_id, async move {
        match on_push {
            PushAction::Sync => pipeline.sync().await,
            PushAction::Release => pipeline.release(&tag_message).await,
        }
    });

    WebhookReply(joined(run.await)).into_response()
}
