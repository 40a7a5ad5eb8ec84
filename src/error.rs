use std::io;

/// Startup errors for push2live
#[derive(Debug, thiserror::Error)]
pub enum Push2LiveError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Helper type for Results that use Push2LiveError
pub type Result<T> = std::result::Result<T, Push2LiveError>;

/// Why an inbound request was refused before any pipeline ran.
///
/// The detail is for server logs only; callers get a generic rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No {0} header")]
    MissingHeader(&'static str),

    #[error("Empty request body")]
    MissingBody,

    #[error("No {0} field")]
    MissingField(&'static str),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unsupported command '{0}'")]
    UnsupportedCommand(String),

    #[error("Unauthorized origin '{0}'")]
    UnauthorizedOrigin(String),
}

impl AuthError {
    /// True for malformed requests (missing data) as opposed to failed credentials.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::MissingHeader(_) | AuthError::MissingBody | AuthError::MissingField(_)
        )
    }
}

/// A pipeline step that failed to spawn or exited non-zero.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{label}{reason}")]
pub struct StepError {
    pub label: String,
    pub output: String,
    pub reason: String,
}

/// Delivery of a deploy outcome to a callback URL failed.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("callback returned status {0}")]
    Status(u16),
}
