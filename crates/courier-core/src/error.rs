//! Error types for Courier

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("agent already exists: {0}")]
    DuplicateId(String),

    #[error("unknown agent type: {0}")]
    UnknownType(String),

    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("invalid agent id: {0:?}")]
    InvalidId(String),

    #[error("authentication required for agent {agent_id}")]
    AuthRequired {
        agent_id: String,
        auth_url: Option<String>,
    },

    #[error("provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("credential error: {0}")]
    Credential(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_required(agent_id: impl Into<String>, auth_url: Option<String>) -> Self {
        Self::AuthRequired {
            agent_id: agent_id.into(),
            auth_url,
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    /// Ids double as file stems, so they must be a single plain path segment.
    pub fn check_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
        if valid {
            Ok(())
        } else {
            Err(Self::InvalidId(id.to_string()))
        }
    }

    /// Registry usage errors surface to callers; everything else is expected
    /// to be absorbed at the agent boundary.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId(_)
                | Self::UnknownType(_)
                | Self::NotFound(_)
                | Self::InvalidId(_)
                | Self::InvalidCommand(_)
        )
    }
}
