//! Reporting deploy outcomes back to Slack
//!
//! The slash command is acknowledged synchronously; the final outcome is
//! POSTed later to the `response_url` Slack supplied. Delivery is attempted once
//! and a failure is only logged, since the original request has already been
//! answered.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::NotifyError;
use crate::pipeline::PipelineOutcome;

pub const DEPLOYING_TEXT: &str = "Deploying to Live...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub text: String,
}

/// Slack message body used both for the immediate reply and the delayed callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackResponse {
    pub response_type: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl SlackResponse {
    fn in_channel(status: &str, text: impl Into<String>) -> Self {
        Self {
            response_type: "in_channel".to_string(),
            text: status.to_string(),
            attachments: vec![Attachment { text: text.into() }],
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::in_channel("success", text)
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self::in_channel("fail", text)
    }

    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        if outcome.succeeded {
            Self::success(outcome.message.clone())
        } else {
            Self::fail(outcome.message.clone())
        }
    }
}

/// Outcome of an inline (GitHub) deploy written straight into the HTTP response
#[derive(Debug, Clone)]
pub struct WebhookReply(pub PipelineOutcome);

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        let status = if self.0.succeeded {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.0.message).into_response()
    }
}

/// Sends a Slack message to a callback URL
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, response: &SlackResponse) -> Result<(), NotifyError>;
}

/// POSTs JSON to the callback URL with `reqwest`
#[derive(Debug, Clone, Default)]
pub struct CallbackNotifier {
    client: reqwest::Client,
}

impl CallbackNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for CallbackNotifier {
    async fn notify(&self, url: &str, response: &SlackResponse) -> Result<(), NotifyError> {
        let resp = self.client.post(url).json(response).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        let body = resp.text().await.unwrap_or_default();
        info!("Callback delivered ({}): {}", status, body);
        Ok(())
    }
}

/// Deliver an outcome, logging (and otherwise ignoring) any failure.
pub async fn deliver(notifier: &dyn Notifier, url: &str, outcome: &PipelineOutcome) -> bool {
    match notifier
        .notify(url, &SlackResponse::from_outcome(outcome))
        .await
    {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to deliver deploy outcome to callback: {}", e);
            false
        }
    }
}
