//! Mail assistant: OAuth-backed mailbox access driven by intent classification

pub mod auth;
pub mod intent;

pub use auth::{AuthState, MailCredentials};
pub use intent::MailIntent;

use crate::agent::{AgentContext, CredentialInfo, APOLOGY};
use crate::credentials::CredentialBlob;
use crate::memory::Memory;
use courier_core::{Command, CommandResult, Error, Result};
use courier_llm::LlmRequest;
use courier_mail::{
    encode_raw, find_label, format_digest, format_labels, format_message, ListQuery, MailError, MailProvider,
    MailResult, MessageRef, MessageSummary, OutgoingMessage, TokenSet, DIGEST_LIMIT,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

pub const SYSTEM_PROMPT: &str = "You are an email assistant that can help with email management tasks.
You can help the user read, send, and search emails.
Always be helpful, concise, and respectful of the user's privacy.";

const TOKEN_LIFETIME_MS: i64 = 3_600_000;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct MailAgent {
    credentials: MailCredentials,
    state: AuthState,
    /// Credential markers from a loaded snapshot, reported until the real
    /// blob is read back from the store on start.
    restored_info: Option<CredentialInfo>,
    /// Set once `start` has merged the stored blob; only then may `stop` write it back.
    loaded: bool,
}

impl MailAgent {
    pub fn new(initial: Option<CredentialBlob>) -> Result<Self> {
        let credentials = match initial {
            Some(blob) => MailCredentials::from_blob(blob)?,
            None => MailCredentials::default(),
        };
        Ok(Self {
            credentials,
            state: AuthState::Unauthenticated,
            restored_info: None,
            loaded: false,
        })
    }

    pub fn credentials(&self) -> &MailCredentials {
        &self.credentials
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn start(&mut self, id: &str, ctx: &AgentContext) -> Result<()> {
        if let Some(saved) = ctx.credentials.load(id)? {
            self.credentials.merge(saved)?;
            info!("Loaded saved credentials for mail agent {}", id);
        }
        self.restored_info = None;
        self.loaded = true;
        if self.credentials.redirect_uri.is_none() {
            self.credentials.redirect_uri = ctx.settings.redirect_uri.clone();
        }

        if self.credentials.oauth_client().is_none() {
            warn!("Mail agent {}: OAuth client credentials missing, running with limited functionality", id);
            self.state = AuthState::Unauthenticated;
            return Ok(());
        }
        if !self.credentials.has_access_token() {
            info!("Mail agent {}: client credentials present but no access token, authentication required", id);
            self.state = AuthState::Unauthenticated;
            return Ok(());
        }

        self.probe(id, ctx).await;
        Ok(())
    }

    /// Flush held credentials to the store. An agent that never started holds
    /// only snapshot markers and leaves the store untouched.
    pub fn stop(&self, id: &str, ctx: &AgentContext) -> Result<()> {
        if !self.loaded || self.credentials.is_empty() {
            return Ok(());
        }
        ctx.credentials.save(id, &self.credentials.to_blob())
    }

    /// Check the access token against the mailbox. Authorization failures
    /// go through a refresh attempt; other failures leave tokens alone.
    async fn probe(&mut self, id: &str, ctx: &AgentContext) {
        let (Some(mail), Some(token)) = (ctx.mail.as_deref(), self.credentials.access_token.clone()) else {
            warn!("Mail agent {}: no mail provider configured", id);
            self.state = AuthState::Unauthenticated;
            return;
        };
        match mail.profile(&token).await {
            Ok(profile) => {
                info!("Mail agent {} connected as {}", id, profile.email_address);
                self.state = AuthState::Authenticated {
                    email: Some(profile.email_address),
                };
            }
            Err(e) if e.is_auth() => {
                warn!("Mail agent {}: access token rejected ({}), attempting refresh", id, e);
                self.state = AuthState::ExpiredPendingRefresh;
                self.refresh(id, ctx, mail).await;
            }
            Err(e) => {
                error!("Mail agent {}: connectivity check failed: {}", id, e);
                self.state = AuthState::Unauthenticated;
            }
        }
    }

    async fn refresh(&mut self, id: &str, ctx: &AgentContext, mail: &dyn MailProvider) {
        match self.try_refresh(mail).await {
            Ok(email) => {
                info!("Mail agent {} connected after token refresh as {}", id, email);
                self.state = AuthState::Authenticated { email: Some(email) };
                if let Err(e) = ctx.credentials.save(id, &self.credentials.to_blob()) {
                    error!("Mail agent {}: failed to save refreshed tokens: {}", id, e);
                }
            }
            Err(e) => {
                error!("Mail agent {}: token refresh failed: {}", id, e);
                self.credentials.clear_tokens();
                self.state = AuthState::Unauthenticated;
                match ctx.credentials.save(id, &self.credentials.to_blob()) {
                    Ok(()) => info!("Cleared invalid tokens for mail agent {}", id),
                    Err(e) => error!("Mail agent {}: failed to save cleared tokens: {}", id, e),
                }
            }
        }
    }

    async fn try_refresh(&mut self, mail: &dyn MailProvider) -> MailResult<String> {
        let client = self
            .credentials
            .oauth_client()
            .ok_or_else(|| MailError::Unauthorized("no OAuth client credentials".into()))?;
        let refresh_token = self
            .credentials
            .refresh_token
            .clone()
            .ok_or_else(|| MailError::Unauthorized("no refresh token".into()))?;
        let tokens = mail.refresh_token(&client, &refresh_token).await?;
        self.credentials.apply_tokens(tokens);
        let token = self.credentials.access_token.clone().unwrap_or_default();
        Ok(mail.profile(&token).await?.email_address)
    }

    /// Access token for a data call, refreshing first when it has lapsed.
    async fn require_token(&mut self, id: &str, ctx: &AgentContext) -> Result<String> {
        let lapsed = self.state == AuthState::ExpiredPendingRefresh
            || (self.is_connected() && self.credentials.is_expired(now_ms()));
        if lapsed {
            if let Some(mail) = ctx.mail.as_deref() {
                self.state = AuthState::ExpiredPendingRefresh;
                self.refresh(id, ctx, mail).await;
            }
        }
        match (&self.state, &self.credentials.access_token) {
            (AuthState::Authenticated { .. }, Some(token)) => Ok(token.clone()),
            _ => Err(Error::auth_required(id, self.auth_url(id, ctx).ok())),
        }
    }

    pub fn auth_url(&self, id: &str, ctx: &AgentContext) -> Result<String> {
        let client = self
            .credentials
            .oauth_client()
            .ok_or_else(|| Error::credential("OAuth client credentials are not configured"))?;
        let mail = ctx
            .mail
            .as_deref()
            .ok_or_else(|| Error::Config("no mail provider configured".into()))?;
        mail.auth_url(&client, id)
            .map_err(|e| Error::provider(mail.name(), e.to_string()))
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn reply(&mut self, id: &str, message: &str, memory: &Memory, ctx: &AgentContext) -> String {
        let token = match self.require_token(id, ctx).await {
            Ok(token) => token,
            Err(e) => return self.user_message(e),
        };
        let (Some(llm), Some(mail)) = (ctx.llm.clone(), ctx.mail.clone()) else {
            return "I can't interpret email requests without a language model configured. Set ANTHROPIC_API_KEY or OPENAI_API_KEY and try again.".into();
        };

        let request = LlmRequest::single(&ctx.settings.classifier_model, intent::INTENT_PROMPT, message)
            .with_max_tokens(200)
            .with_temperature(0.3);
        let intent = match llm.complete(request).await {
            Ok(reply) => MailIntent::parse(&reply),
            Err(e) => {
                error!("Mail agent {}: intent classification failed: {}", id, e);
                return APOLOGY.into();
            }
        };
        debug!("Mail agent {} intent: {:?}", id, intent);

        if intent == MailIntent::Other {
            let request = LlmRequest {
                model: ctx.settings.model.clone(),
                system: Some(SYSTEM_PROMPT.into()),
                messages: memory.context(),
                max_tokens: Some(ctx.settings.max_tokens),
                temperature: Some(ctx.settings.temperature),
            };
            return match llm.complete(request).await {
                Ok(text) => text,
                Err(e) => {
                    error!("Mail agent {}: completion failed: {}", id, e);
                    APOLOGY.into()
                }
            };
        }

        match self.handle(&intent, mail.as_ref(), &token, ctx).await {
            Ok(text) => text,
            Err(e) => {
                if e.is_auth() {
                    self.state = AuthState::ExpiredPendingRefresh;
                }
                error!("Mail agent {}: {:?} failed: {}", id, intent, e);
                intent.failure_message().into()
            }
        }
    }

    fn user_message(&self, err: Error) -> String {
        match err {
            Error::AuthRequired { auth_url: Some(url), .. } => format!(
                "I need access to your email account to help with email tasks. Please authenticate by visiting this URL: {}",
                url
            ),
            Error::AuthRequired { auth_url: None, .. } => "I need access to your email account to help with email tasks, but no OAuth client is configured for me yet. Provide a client id and secret with the save_credentials flow, then ask me for an authentication link.".into(),
            other => {
                error!("Mail agent error: {}", other);
                APOLOGY.into()
            }
        }
    }

    async fn handle(&self, intent: &MailIntent, mail: &dyn MailProvider, token: &str, ctx: &AgentContext) -> MailResult<String> {
        match intent {
            MailIntent::GetLatestEmails { count } => {
                let refs = mail.list_messages(token, &ListQuery::recent(*count)).await?;
                if refs.is_empty() {
                    return Ok("You don't have any emails in your inbox.".into());
                }
                let entries = fetch_summaries(mail, token, &refs).await;
                Ok(format_digest(
                    &format!("Here are your {} most recent emails:", entries.len()),
                    &entries,
                ))
            }
            MailIntent::SearchEmails { query, count } => {
                let refs = mail.list_messages(token, &ListQuery::search(query.clone(), *count)).await?;
                if refs.is_empty() {
                    return Ok(format!("No emails found matching \"{}\".", query));
                }
                let entries = fetch_summaries(mail, token, &refs).await;
                Ok(format_digest(
                    &format!("Here are {} emails matching \"{}\":", entries.len(), query),
                    &entries,
                ))
            }
            MailIntent::ReadEmail { id } => {
                let Some(id) = id else {
                    return Ok("I need an email ID to read a specific email. You can find email IDs in the list of emails I provide.".into());
                };
                match mail.get_message(token, id).await {
                    Ok(detail) => Ok(format_message(&detail)),
                    Err(MailError::NotFound(_)) => Ok(format!("I couldn't find an email with ID {}.", id)),
                    Err(e) => Err(e),
                }
            }
            MailIntent::SendEmail { to, subject, body } => {
                let Some(to) = to else {
                    return Ok("I need a recipient email address to send an email.".into());
                };
                let Some(subject) = subject else {
                    return Ok("Please provide a subject for the email.".into());
                };
                let Some(body) = body else {
                    return Ok("Please provide the content for the email.".into());
                };
                let raw = encode_raw(&OutgoingMessage {
                    from: ctx.settings.sender.clone(),
                    to: to.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                });
                mail.send_message(token, &raw).await?;
                Ok(format!("Email sent successfully to {}!", to))
            }
            MailIntent::ListLabels => {
                let labels = mail.list_labels(token).await?;
                if labels.is_empty() {
                    return Ok("You don't have any labels in your mailbox.".into());
                }
                Ok(format_labels(&labels))
            }
            MailIntent::GetLabelEmails { label, count } => {
                let Some(wanted) = label else {
                    return Ok("I need a label name or ID to get emails from a specific label.".into());
                };
                let labels = mail.list_labels(token).await?;
                if labels.is_empty() {
                    return Ok("You don't have any labels in your mailbox.".into());
                }
                let Some(label) = find_label(&labels, wanted) else {
                    return Ok(format!(
                        "I couldn't find a label named \"{}\". Please check the label name and try again.",
                        wanted
                    ));
                };
                let refs = mail.list_messages(token, &ListQuery::label(label.id.clone(), *count)).await?;
                if refs.is_empty() {
                    return Ok(format!("You don't have any emails in the \"{}\" label.", label.name));
                }
                let entries = fetch_summaries(mail, token, &refs).await;
                Ok(format_digest(
                    &format!("Here are {} emails from the \"{}\" label:", entries.len(), label.name),
                    &entries,
                ))
            }
            MailIntent::Other => Ok(String::new()),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub async fn command(&mut self, id: &str, cmd: &Command, ctx: &AgentContext) -> Option<CommandResult> {
        let result = match cmd.name.as_str() {
            "get_auth_url" => match self.auth_url(id, ctx) {
                Ok(url) => CommandResult::ok_with("Authentication URL generated", json!({ "authUrl": url })),
                Err(e) => CommandResult::fail(format!("Error generating auth URL: {}", e)),
            },
            "save_credentials" => self.save_credentials(id, ctx),
            "set_auth_code" => self.set_auth_code(id, cmd, ctx).await,
            "set_tokens" | "set_tokens_json" => self.set_tokens(id, cmd, ctx).await,
            _ => return None,
        };
        Some(result)
    }

    fn save_credentials(&self, id: &str, ctx: &AgentContext) -> CommandResult {
        if self.credentials.client_id.is_none() {
            return CommandResult::fail("No credentials to save");
        }
        match ctx.credentials.save(id, &self.credentials.to_blob()) {
            Ok(()) => CommandResult::ok_with(
                "Credentials saved successfully",
                json!({ "agentId": id, "hasAccessToken": self.credentials.has_access_token() }),
            ),
            Err(e) => CommandResult::fail(format!("Error saving credentials: {}", e)),
        }
    }

    async fn set_auth_code(&mut self, id: &str, cmd: &Command, ctx: &AgentContext) -> CommandResult {
        let Some(code) = cmd.payload_str("code").filter(|c| !c.trim().is_empty()) else {
            return CommandResult::fail("Authorization code is required as {code: \"your_code\"}");
        };
        let (Some(client), Some(mail)) = (self.credentials.oauth_client(), ctx.mail.clone()) else {
            return CommandResult::fail("Error setting auth code: OAuth client credentials are not configured");
        };
        debug!("Exchanging authorization code for mail agent {}", id);

        let tokens = match mail.exchange_code(&client, code.trim()).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Mail agent {}: code exchange failed: {}", id, e);
                return CommandResult::fail(format!("Error setting auth code: {}", e));
            }
        };
        self.credentials.apply_tokens(tokens);
        if let Err(e) = ctx.credentials.save(id, &self.credentials.to_blob()) {
            return CommandResult::fail(format!("Error setting auth code: {}", e));
        }
        info!("Saved new credentials for mail agent {}", id);

        let token = self.credentials.access_token.clone().unwrap_or_default();
        let email = match mail.profile(&token).await {
            Ok(profile) => Some(profile.email_address),
            Err(e) => {
                warn!("Mail agent {}: connection test after code exchange failed: {}", id, e);
                None
            }
        };
        self.state = AuthState::Authenticated { email: email.clone() };

        CommandResult::ok_with(
            "Authorization code exchanged successfully",
            json!({
                "agentId": id,
                "email": email,
                "hasAccessToken": true,
                "hasRefreshToken": self.credentials.refresh_token.is_some(),
                "expiryDate": self.credentials.expiry_date,
            }),
        )
    }

    async fn set_tokens(&mut self, id: &str, cmd: &Command, ctx: &AgentContext) -> CommandResult {
        let tokens = match parse_tokens(cmd) {
            Ok(tokens) => tokens,
            Err(msg) => return CommandResult::fail(msg),
        };
        self.credentials.apply_tokens(TokenSet {
            expiry_date: Some(tokens.expiry_date.unwrap_or_else(|| now_ms() + TOKEN_LIFETIME_MS)),
            ..tokens
        });
        if let Err(e) = ctx.credentials.save(id, &self.credentials.to_blob()) {
            return CommandResult::fail(format!("Error setting tokens from JSON: {}", e));
        }

        let Some(mail) = ctx.mail.clone() else {
            self.state = AuthState::Unauthenticated;
            return CommandResult::fail("Error setting tokens from JSON: no mail provider configured");
        };
        let token = self.credentials.access_token.clone().unwrap_or_default();
        match mail.profile(&token).await {
            Ok(profile) => {
                info!("Mail agent {} connected as {}", id, profile.email_address);
                self.state = AuthState::Authenticated {
                    email: Some(profile.email_address.clone()),
                };
                CommandResult::ok_with(
                    "Tokens set successfully",
                    json!({ "agentId": id, "email": profile.email_address, "hasAccessToken": true }),
                )
            }
            Err(e) => {
                error!("Mail agent {}: connection test after setting tokens failed: {}", id, e);
                self.state = AuthState::Unauthenticated;
                CommandResult::fail("Error setting tokens from JSON: Invalid tokens: Could not connect to the mail API")
            }
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn status(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("hasCredentials".into(), json!(self.credential_info().has_credentials));
        data.insert("hasAccessToken".into(), json!(self.credentials.has_access_token()));
        data.insert("isConnected".into(), json!(self.is_connected()));
        data.insert("authState".into(), json!(self.state.as_str()));
        if let AuthState::Authenticated { email: Some(email) } = &self.state {
            data.insert("email".into(), json!(email));
        }
        data
    }

    pub fn credential_info(&self) -> CredentialInfo {
        if let Some(info) = &self.restored_info {
            return info.clone();
        }
        CredentialInfo {
            has_credentials: self.credentials.client_id.is_some(),
            has_access_token: self.credentials.has_access_token(),
            client_id: self.credentials.client_id.clone(),
            redirect_uri: self.credentials.redirect_uri.clone(),
        }
    }

    /// Restore the non-secret markers. Secrets come back from the store on start.
    pub fn restore(&mut self, info: Option<CredentialInfo>) {
        self.credentials = MailCredentials::default();
        self.state = AuthState::Unauthenticated;
        self.loaded = false;
        if let Some(info) = info {
            self.credentials.client_id = info.client_id.clone();
            self.credentials.redirect_uri = info.redirect_uri.clone();
            self.restored_info = Some(info);
        }
    }
}

/// Fetch details for at most [`DIGEST_LIMIT`] messages; failed fetches are skipped.
async fn fetch_summaries(mail: &dyn MailProvider, token: &str, refs: &[MessageRef]) -> Vec<MessageSummary> {
    let mut entries = Vec::new();
    for r in refs.iter().take(DIGEST_LIMIT) {
        match mail.get_message(token, &r.id).await {
            Ok(detail) => entries.push(MessageSummary::from(&detail)),
            Err(e) => error!("Error fetching email details for {}: {}", r.id, e),
        }
    }
    entries
}

/// Tokens from a `set_tokens` payload: `{tokens: {...}}`, `{tokens: "<json>"}`,
/// or the token fields inline.
fn parse_tokens(cmd: &Command) -> std::result::Result<TokenSet, String> {
    let raw = match cmd.payload_field("tokens") {
        Some(v) => v.clone(),
        None if cmd.payload_field("access_token").is_some() => cmd.payload.clone().unwrap_or_default(),
        None => return Err("Tokens JSON is required as {tokens: \"your_tokens_json\"}".into()),
    };
    let value = match raw {
        Value::String(s) => serde_json::from_str::<Value>(&s)
            .map_err(|e| format!("Error setting tokens from JSON: {}", e))?,
        other => other,
    };
    let tokens: TokenSet = serde_json::from_value(value)
        .map_err(|e| format!("Error setting tokens from JSON: {}", e))?;
    if tokens.access_token.trim().is_empty() {
        return Err("Error setting tokens from JSON: Access token is required".into());
    }
    Ok(tokens)
}
