//! MockMailbox: in-memory mailbox for testing the mail agent

use crate::provider::{
    Label, ListQuery, MailError, MailProvider, MailResult, MessageDetail, MessageRef, OAuthClient, Profile, TokenSet,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Mailbox contents plus scripted auth behavior.
///
/// Only tokens registered with [`MockMailbox::accept_token`] (or granted by
/// a scripted refresh/exchange) pass the profile probe.
pub struct MockMailbox {
    email: String,
    messages: Vec<(MessageDetail, Vec<String>)>,
    labels: Vec<Label>,
    broken_ids: HashSet<String>,
    refresh_grant: Option<TokenSet>,
    code_grants: HashMap<String, TokenSet>,
    outage: Option<String>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    accepted: HashSet<String>,
    sent: Vec<String>,
    refresh_calls: usize,
    profile_calls: usize,
    detail_calls: usize,
}

impl MockMailbox {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            messages: Vec::new(),
            labels: Vec::new(),
            broken_ids: HashSet::new(),
            refresh_grant: None,
            code_grants: HashMap::new(),
            outage: None,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn accept_token(mut self, token: impl Into<String>) -> Self {
        self.state.get_mut().accepted.insert(token.into());
        self
    }

    /// Refreshes succeed with `tokens`; without this every refresh is refused.
    pub fn with_refresh(mut self, tokens: TokenSet) -> Self {
        self.refresh_grant = Some(tokens);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>, tokens: TokenSet) -> Self {
        self.code_grants.insert(code.into(), tokens);
        self
    }

    /// Add a message, newest last in insertion order but listed first.
    pub fn with_message(mut self, detail: MessageDetail, label_ids: &[&str]) -> Self {
        self.messages
            .push((detail, label_ids.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// `get_message` fails for this id.
    pub fn with_broken_message(mut self, id: impl Into<String>) -> Self {
        self.broken_ids.insert(id.into());
        self
    }

    /// Every data call fails with a non-auth error.
    pub fn with_outage(mut self, message: impl Into<String>) -> Self {
        self.outage = Some(message.into());
        self
    }

    pub async fn sent(&self) -> Vec<String> {
        self.state.lock().await.sent.clone()
    }

    pub async fn refresh_calls(&self) -> usize {
        self.state.lock().await.refresh_calls
    }

    pub async fn profile_calls(&self) -> usize {
        self.state.lock().await.profile_calls
    }

    pub async fn detail_calls(&self) -> usize {
        self.state.lock().await.detail_calls
    }

    async fn authorize(&self, access_token: &str) -> MailResult<()> {
        if let Some(msg) = &self.outage {
            return Err(MailError::RequestFailed(msg.clone()));
        }
        if self.state.lock().await.accepted.contains(access_token) {
            Ok(())
        } else {
            Err(MailError::Unauthorized("invalid access token".into()))
        }
    }

    async fn grant(&self, tokens: &TokenSet) -> TokenSet {
        self.state.lock().await.accepted.insert(tokens.access_token.clone());
        tokens.clone()
    }
}

#[async_trait]
impl MailProvider for MockMailbox {
    fn name(&self) -> &str {
        "mock"
    }

    fn auth_url(&self, client: &OAuthClient, state: &str) -> MailResult<String> {
        Ok(format!(
            "https://auth.example/authorize?client_id={}&state={}&access_type=offline",
            client.client_id, state
        ))
    }

    async fn exchange_code(&self, _client: &OAuthClient, code: &str) -> MailResult<TokenSet> {
        match self.code_grants.get(code) {
            Some(tokens) => Ok(self.grant(tokens).await),
            None => Err(MailError::Unauthorized("invalid_grant".into())),
        }
    }

    async fn refresh_token(&self, _client: &OAuthClient, _refresh_token: &str) -> MailResult<TokenSet> {
        self.state.lock().await.refresh_calls += 1;
        match &self.refresh_grant {
            Some(tokens) => Ok(self.grant(tokens).await),
            None => Err(MailError::Unauthorized("invalid_grant".into())),
        }
    }

    async fn profile(&self, access_token: &str) -> MailResult<Profile> {
        self.state.lock().await.profile_calls += 1;
        self.authorize(access_token).await?;
        Ok(Profile {
            email_address: self.email.clone(),
        })
    }

    async fn list_messages(&self, access_token: &str, query: &ListQuery) -> MailResult<Vec<MessageRef>> {
        self.authorize(access_token).await?;
        let needle = query.query.as_deref().map(str::to_lowercase);
        Ok(self
            .messages
            .iter()
            .rev()
            .filter(|(detail, labels)| {
                let label_ok = query.label_ids.iter().all(|l| labels.contains(l));
                let query_ok = needle.as_deref().map_or(true, |n| {
                    let hay = format!(
                        "{} {} {}",
                        detail.header("from").unwrap_or_default(),
                        detail.header("subject").unwrap_or_default(),
                        detail.snippet
                    )
                    .to_lowercase();
                    hay.contains(n)
                });
                label_ok && query_ok
            })
            .take(query.max_results as usize)
            .map(|(detail, _)| MessageRef { id: detail.id.clone() })
            .collect())
    }

    async fn get_message(&self, access_token: &str, id: &str) -> MailResult<MessageDetail> {
        self.authorize(access_token).await?;
        self.state.lock().await.detail_calls += 1;
        if self.broken_ids.contains(id) {
            return Err(MailError::RequestFailed(format!("failed to fetch {}", id)));
        }
        self.messages
            .iter()
            .find(|(detail, _)| detail.id == id)
            .map(|(detail, _)| detail.clone())
            .ok_or_else(|| MailError::NotFound(id.to_string()))
    }

    async fn send_message(&self, access_token: &str, raw: &str) -> MailResult<String> {
        self.authorize(access_token).await?;
        let mut state = self.state.lock().await;
        state.sent.push(raw.to_string());
        Ok(format!("sent-{}", state.sent.len()))
    }

    async fn list_labels(&self, access_token: &str) -> MailResult<Vec<Label>> {
        self.authorize(access_token).await?;
        Ok(self.labels.clone())
    }
}

/// Message with the usual headers, handy for fixtures.
pub fn message(id: &str, from: &str, subject: &str, snippet: &str) -> MessageDetail {
    MessageDetail {
        id: id.to_string(),
        snippet: snippet.to_string(),
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), "me@example.com".to_string()),
            ("Subject".to_string(), subject.to_string()),
            ("Date".to_string(), "Mon, 1 Jan 2024 09:00:00 +0000".to_string()),
        ],
        body: Some(format!("{}\n", snippet)),
    }
}
