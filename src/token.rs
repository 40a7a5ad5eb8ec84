//! Slack slash-command authentication

use serde::Deserialize;
use std::collections::HashSet;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// Raw form fields posted by Slack for a slash command.
///
/// Every field is optional here; [`TokenVerifier::verify`] decides what is required.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CommandForm {
    pub token: Option<String>,
    pub team_domain: Option<String>,
    pub channel_id: Option<String>,
    pub user_name: Option<String>,
    pub command: Option<String>,
    pub response_url: Option<String>,
    pub text: Option<String>,
}

/// A slash command that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub token: String,
    pub team_domain: String,
    pub channel_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
    pub response_url: String,
}

impl CommandContext {
    /// `team_domain` immediately followed by `channel_id`
    pub fn origin(&self) -> String {
        format!("{}{}", self.team_domain, self.channel_id)
    }
}

/// Checks the shared token and the allowed (origin, command) pairs.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    token: String,
    command: String,
    origins: HashSet<String>,
}

impl TokenVerifier {
    pub fn new(
        token: impl Into<String>,
        command: impl Into<String>,
        origins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            token: token.into(),
            command: command.into(),
            origins: origins.into_iter().collect(),
        }
    }

    pub fn verify(&self, form: CommandForm) -> Result<CommandContext, AuthError> {
        let token = required(form.token, "token")?;
        let team_domain = required(form.team_domain, "team_domain")?;
        let channel_id = required(form.channel_id, "channel_id")?;
        let user_name = required(form.user_name, "user_name")?;
        let command = required(form.command, "command")?;
        let response_url = required(form.response_url, "response_url")?;

        if !bool::from(token.as_bytes().ct_eq(self.token.as_bytes())) {
            return Err(AuthError::InvalidToken);
        }

        if command != self.command {
            return Err(AuthError::UnsupportedCommand(command));
        }

        let ctx = CommandContext {
            token,
            team_domain,
            channel_id,
            user_name,
            command,
            text: form.text.unwrap_or_default(),
            response_url,
        };

        let origin = ctx.origin();
        if !self.origins.contains(&origin) {
            return Err(AuthError::UnauthorizedOrigin(origin));
        }

        Ok(ctx)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::MissingField(name)),
    }
}
