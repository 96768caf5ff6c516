//! Mail provider trait and the data it speaks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type MailResult<T> = Result<T, MailError>;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The access token was rejected or a token grant was refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MailError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized(body),
            404 => Self::NotFound(body),
            _ => Self::RequestFailed(format!("{}: {}", status, body)),
        }
    }
}

/// OAuth client registration: who is asking for access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}

/// Tokens granted by the authorization server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub email_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: String,
    pub snippet: String,
    pub headers: Vec<(String, String)>,
    /// Decoded plain-text body, when the message has one.
    pub body: Option<String>,
}

impl MessageDetail {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    /// `system` or `user`
    pub kind: String,
    pub messages_total: Option<u64>,
    pub messages_unread: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    pub max_results: u32,
}

impl ListQuery {
    pub fn recent(max_results: u32) -> Self {
        Self {
            max_results,
            ..Default::default()
        }
    }

    pub fn search(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: Some(query.into()),
            max_results,
            ..Default::default()
        }
    }

    pub fn label(label_id: impl Into<String>, max_results: u32) -> Self {
        Self {
            label_ids: vec![label_id.into()],
            max_results,
            ..Default::default()
        }
    }
}

/// Capabilities the mail agent needs from a mailbox backend.
///
/// Calls are stateless: the caller owns the tokens and passes the access
/// token on every request.
#[async_trait]
pub trait MailProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Consent URL for offline access with the mailbox scopes.
    fn auth_url(&self, client: &OAuthClient, state: &str) -> MailResult<String>;

    async fn exchange_code(&self, client: &OAuthClient, code: &str) -> MailResult<TokenSet>;

    async fn refresh_token(&self, client: &OAuthClient, refresh_token: &str) -> MailResult<TokenSet>;

    async fn profile(&self, access_token: &str) -> MailResult<Profile>;

    async fn list_messages(&self, access_token: &str, query: &ListQuery) -> MailResult<Vec<MessageRef>>;

    async fn get_message(&self, access_token: &str, id: &str) -> MailResult<MessageDetail>;

    /// Send a base64url-encoded RFC 822 message; returns the new message id.
    async fn send_message(&self, access_token: &str, raw: &str) -> MailResult<String>;

    async fn list_labels(&self, access_token: &str) -> MailResult<Vec<Label>>;
}
