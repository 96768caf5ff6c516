//! Gmail REST client and Google OAuth token endpoint

use crate::mime::{extract_plain_text, Payload};
use crate::provider::{
    Label, ListQuery, MailError, MailProvider, MailResult, MessageDetail, MessageRef, OAuthClient, Profile, TokenSet,
};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const DEFAULT_AUTH_BASE: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

pub struct GmailClient {
    client: Client,
    api_base: String,
    auth_base: String,
    token_url: String,
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_AUTH_BASE, DEFAULT_TOKEN_URL)
    }
}

impl GmailClient {
    pub fn new(api_base: impl Into<String>, auth_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth_base: auth_base.into(),
            token_url: token_url.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, access_token: &str, path: &str, query: &[(&str, String)]) -> MailResult<T> {
        let url = format!("{}/{}", self.api_base, path);
        debug!("Gmail GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> MailResult<TokenSet> {
        let response = self.client.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token endpoint error {}: {}", status, body);
            return Err(match status.as_u16() {
                400 | 401 => MailError::Unauthorized(body),
                other => MailError::from_status(other, body),
            });
        }
        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()))?;
        Ok(grant.into_token_set(chrono::Utc::now().timestamp_millis()))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> MailResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Gmail error {}: {}", status, body);
        return Err(MailError::from_status(status.as_u16(), body));
    }
    response
        .json()
        .await
        .map_err(|e| MailError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl MailProvider for GmailClient {
    fn name(&self) -> &str {
        "gmail"
    }

    fn auth_url(&self, client: &OAuthClient, state: &str) -> MailResult<String> {
        let scope = SCOPES.join(" ");
        let mut params = vec![
            ("access_type", "offline"),
            ("scope", scope.as_str()),
            ("prompt", "consent"),
            ("state", state),
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
        ];
        if let Some(redirect) = client.redirect_uri.as_deref() {
            params.push(("redirect_uri", redirect));
        }
        let url = Url::parse_with_params(&self.auth_base, &params)
            .map_err(|e| MailError::InvalidResponse(format!("bad auth base url: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, client: &OAuthClient, code: &str) -> MailResult<TokenSet> {
        let redirect = client.redirect_uri.clone().unwrap_or_default();
        self.token_request(&[
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", redirect.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh_token(&self, client: &OAuthClient, refresh_token: &str) -> MailResult<TokenSet> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn profile(&self, access_token: &str) -> MailResult<Profile> {
        let raw: RawProfile = self.get_json(access_token, "profile", &[]).await?;
        Ok(Profile {
            email_address: raw.email_address,
        })
    }

    async fn list_messages(&self, access_token: &str, query: &ListQuery) -> MailResult<Vec<MessageRef>> {
        let mut params = vec![("maxResults", query.max_results.to_string())];
        if let Some(q) = &query.query {
            params.push(("q", q.clone()));
        }
        for label in &query.label_ids {
            params.push(("labelIds", label.clone()));
        }
        let raw: RawMessageList = self.get_json(access_token, "messages", &params).await?;
        Ok(raw
            .messages
            .into_iter()
            .map(|m| MessageRef { id: m.id })
            .collect())
    }

    async fn get_message(&self, access_token: &str, id: &str) -> MailResult<MessageDetail> {
        let raw: RawMessage = self
            .get_json(access_token, &format!("messages/{}", id), &[("format", "full".to_string())])
            .await?;
        let payload = raw.payload.unwrap_or_default();
        Ok(MessageDetail {
            id: raw.id,
            snippet: raw.snippet,
            body: extract_plain_text(&payload),
            headers: payload.headers.into_iter().map(|h| (h.name, h.value)).collect(),
        })
    }

    async fn send_message(&self, access_token: &str, raw: &str) -> MailResult<String> {
        let url = format!("{}/messages/send", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        let sent: RawMessageId = decode(response).await?;
        Ok(sent.id)
    }

    async fn list_labels(&self, access_token: &str) -> MailResult<Vec<Label>> {
        let raw: RawLabelList = self.get_json(access_token, "labels", &[]).await?;
        Ok(raw
            .labels
            .into_iter()
            .map(|l| Label {
                id: l.id,
                name: l.name,
                kind: l.kind.unwrap_or_else(|| "user".into()),
                messages_total: l.messages_total,
                messages_unread: l.messages_unread,
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenGrant {
    fn into_token_set(self, now_ms: i64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    email_address: String,
}

#[derive(Deserialize)]
struct RawMessageList {
    #[serde(default)]
    messages: Vec<RawMessageId>,
}

#[derive(Deserialize)]
struct RawMessageId {
    id: String,
}

#[derive(Deserialize)]
struct RawMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct RawLabelList {
    #[serde(default)]
    labels: Vec<RawLabel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLabel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    messages_total: Option<u64>,
    messages_unread: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> OAuthClient {
        OAuthClient {
            client_id: "cid.apps.example".into(),
            client_secret: "secret".into(),
            redirect_uri: Some("http://localhost:3000/callback".into()),
        }
    }

    #[test]
    fn auth_url_carries_offline_consent_and_state() {
        let url = GmailClient::default().auth_url(&oauth(), "mail-1").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["state"], "mail-1");
        assert_eq!(pairs["client_id"], "cid.apps.example");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/callback");
        assert!(pairs["scope"].contains("gmail.send"));
        assert!(url.starts_with(DEFAULT_AUTH_BASE));
    }

    #[test]
    fn token_grant_expiry_is_absolute_millis() {
        let grant: TokenGrant = serde_json::from_str(r#"{"access_token":"a","expires_in":3600,"token_type":"Bearer"}"#).unwrap();
        let tokens = grant.into_token_set(1_000);
        assert_eq!(tokens.expiry_date, Some(3_601_000));
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn raw_message_payload_decodes() {
        let raw: RawMessage = serde_json::from_value(serde_json::json!({
            "id": "18c",
            "snippet": "hey",
            "payload": {
                "mimeType": "text/plain",
                "headers": [{"name": "Subject", "value": "Yo"}],
                "body": {"data": "aGV5"}
            }
        }))
        .unwrap();
        assert_eq!(raw.id, "18c");
        assert_eq!(raw.payload.unwrap().headers[0].value, "Yo");
    }

    #[test]
    fn status_mapping() {
        assert!(MailError::from_status(401, "x".into()).is_auth());
        assert!(matches!(MailError::from_status(404, "x".into()), MailError::NotFound(_)));
        assert!(!MailError::from_status(500, "x".into()).is_auth());
    }
}
