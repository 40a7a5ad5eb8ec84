//! Service configuration loaded from TOML, with secrets overridable from the environment

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Push2LiveError, Result};
use crate::token::TokenVerifier;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:49162";
pub const DEFAULT_CONFIG_PATH: &str = "push2live.toml";

pub const ENV_CONFIG_PATH: &str = "PUSH2LIVE_CONFIG";
pub const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";
pub const ENV_GITHUB_SECRET: &str = "GITHUB_WEBHOOK_SECRET";
pub const ENV_SLACK_TOKEN: &str = "SLACK_COMMAND_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeployConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<DeployTarget>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default = "default_command_path")]
    pub command_path: String,
    /// Directory for daily rolling log files; console only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            webhook_path: default_webhook_path(),
            command_path: default_command_path(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GithubConfig {
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    pub token: Option<String>,
    #[serde(default = "default_slash_command")]
    pub command: String,
    /// Accepted `team_domain + channel_id` concatenations
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            command: default_slash_command(),
            allowed_origins: Vec::new(),
        }
    }
}

/// What a matching GitHub push does to the target
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    /// Bring the checkout up to date with the deployment branch
    #[default]
    Sync,
    /// Sync, then tag, push tags and restart like the slash command
    Release,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub name: String,
    pub repo_path: PathBuf,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// GitHub `repository.full_name` that triggers this target
    pub repository: Option<String>,
    /// Slack channel id that triggers this target
    pub channel_id: Option<String>,
    #[serde(default)]
    pub on_push: PushAction,
    /// Run through `/bin/sh -c`
    pub restart_command: Option<String>,
    /// Defaults to `repo_path`
    pub restart_dir: Option<PathBuf>,
}

impl DeployTarget {
    /// Returns true if this target can be tagged and restarted.
    pub fn can_release(&self) -> bool {
        self.channel_id.is_some() || self.on_push == PushAction::Release
    }

    pub fn restart_dir(&self) -> &Path {
        self.restart_dir.as_deref().unwrap_or(&self.repo_path)
    }
}

impl DeployConfig {
    /// Replace configured values with the ones present in the environment.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secret) = lookup(ENV_GITHUB_SECRET) {
            self.github.secret = Some(secret);
        }
        if let Some(token) = lookup(ENV_SLACK_TOKEN) {
            self.slack.token = Some(token);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDRESS) {
            self.server.bind_address = addr;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for path in [&self.server.webhook_path, &self.server.command_path] {
            if !path.starts_with('/') {
                return Err(config_error(format!(
                    "route '{}' must start with '/'",
                    path
                )));
            }
        }
        if self.server.webhook_path == self.server.command_path {
            return Err(config_error(
                "server.webhook_path and server.command_path must differ".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(config_error("target name must not be empty".to_string()));
            }
            if !names.insert(target.name.as_str()) {
                return Err(config_error(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            if target.repository.is_some() && !non_empty(&self.github.secret) {
                return Err(config_error(format!(
                    "target '{}' is triggered by GitHub but no webhook secret is set (github.secret or {})",
                    target.name, ENV_GITHUB_SECRET
                )));
            }
            if target.channel_id.is_some() {
                if !non_empty(&self.slack.token) {
                    return Err(config_error(format!(
                        "target '{}' is triggered by Slack but no token is set (slack.token or {})",
                        target.name, ENV_SLACK_TOKEN
                    )));
                }
                if self.slack.allowed_origins.is_empty() {
                    return Err(config_error(format!(
                        "target '{}' is triggered by Slack but slack.allowed_origins is empty",
                        target.name
                    )));
                }
            }
            if target.can_release() && !non_empty(&target.restart_command) {
                return Err(config_error(format!(
                    "target '{}' can release but has no restart_command",
                    target.name
                )));
            }
        }
        Ok(())
    }

    pub fn find_by_repository(&self, full_name: &str) -> Option<&DeployTarget> {
        self.targets
            .iter()
            .find(|t| t.repository.as_deref() == Some(full_name))
    }

    pub fn find_by_channel(&self, channel_id: &str) -> Option<&DeployTarget> {
        self.targets
            .iter()
            .find(|t| t.channel_id.as_deref() == Some(channel_id))
    }

    /// Verifier for slash commands, if a Slack token is configured
    pub fn token_verifier(&self) -> Option<TokenVerifier> {
        let token = self.slack.token.as_ref().filter(|t| !t.is_empty())?;
        Some(TokenVerifier::new(
            token.clone(),
            self.slack.command.clone(),
            self.slack.allowed_origins.iter().cloned(),
        ))
    }
}

/// Load, apply environment overrides and validate the configuration file
pub fn load_config(path: &Path) -> Result<DeployConfig> {
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        config_error(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let config = parse_config(&config_str)?.with_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<DeployConfig> {
    Ok(toml::from_str(config_str)?)
}

fn config_error(message: String) -> Push2LiveError {
    Push2LiveError::ConfigError(message)
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_webhook_path() -> String {
    "/payload".to_string()
}

fn default_command_path() -> String {
    "/slack/push2live".to_string()
}

fn default_slash_command() -> String {
    "/push2live".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
bind_address = "127.0.0.1:9000"

[github]
secret = "from-file"

[slack]
token = "xoxb-file"
allowed_origins = ["acmeC024BE91L"]

[[target]]
name = "site"
repo_path = "/srv/site"
repository = "acme/site"
channel_id = "C024BE91L"
restart_command = "sudo ./restart.sh"
restart_dir = "/srv/compose"

[[target]]
name = "docs"
repo_path = "/srv/docs"
branch = "main"
repository = "acme/docs"
"#;

    #[test]
    fn parses_targets_with_defaults() {
        let config = parse_config(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.server.webhook_path, "/payload");
        assert_eq!(config.slack.command, "/push2live");
        assert_eq!(config.targets.len(), 2);

        let site = config.find_by_channel("C024BE91L").unwrap();
        assert_eq!(site.name, "site");
        assert_eq!(site.branch, "master");
        assert_eq!(site.remote, "origin");
        assert_eq!(site.on_push, PushAction::Sync);
        assert_eq!(site.restart_dir(), Path::new("/srv/compose"));

        let docs = config.find_by_repository("acme/docs").unwrap();
        assert_eq!(docs.branch, "main");
        assert_eq!(docs.restart_dir(), Path::new("/srv/docs"));
        assert!(!docs.can_release());

        assert!(config.find_by_repository("acme/other").is_none());
        assert!(config.find_by_channel("C000").is_none());
    }

    #[test]
    fn environment_overrides_secrets() {
        let env: HashMap<&str, &str> = [
            (ENV_GITHUB_SECRET, "from-env"),
            (ENV_SLACK_TOKEN, "xoxb-env"),
            (ENV_BIND_ADDRESS, "0.0.0.0:1"),
        ]
        .into_iter()
        .collect();
        let config = parse_config(SAMPLE)
            .unwrap()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.github.secret.as_deref(), Some("from-env"));
        assert_eq!(config.slack.token.as_deref(), Some("xoxb-env"));
        assert_eq!(config.server.bind_address, "0.0.0.0:1");
    }

    #[test]
    fn github_target_requires_secret() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.github.secret = None;
        assert!(matches!(
            config.validate(),
            Err(Push2LiveError::ConfigError(_))
        ));
    }

    #[test]
    fn slack_target_requires_token_and_origins() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.slack.token = Some(String::new());
        assert!(config.validate().is_err());
        assert!(config.token_verifier().is_none());

        let mut config = parse_config(SAMPLE).unwrap();
        config.slack.allowed_origins.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn releasing_target_requires_restart_command() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.targets[1].on_push = PushAction::Release;
        assert!(config.validate().is_err());

        config.targets[1].restart_command = Some("systemctl restart docs".into());
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_routes() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.server.command_path = "slack".into();
        assert!(config.validate().is_err());

        config.server.command_path = config.server.webhook_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.targets[1].name = "site".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_push_action() {
        let bad = SAMPLE.replace(
            "branch = \"main\"",
            "branch = \"main\"\non_push = \"rebuild\"",
        );
        assert!(matches!(
            parse_config(&bad),
            Err(Push2LiveError::TomlParseError(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/push2live.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
