//! Mail credentials and the connection state machine
//!
//! ```text
//!  Unauthenticated --probe ok--> Authenticated
//!  Authenticated --auth failure / expiry--> ExpiredPendingRefresh
//!  ExpiredPendingRefresh --refresh + probe ok--> Authenticated   (tokens persisted)
//!  ExpiredPendingRefresh --refresh fails--> Unauthenticated      (tokens cleared)
//! ```

use crate::credentials::CredentialBlob;
use courier_core::{Error, Result};
use courier_mail::{OAuthClient, TokenSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view over a mail credential blob. Unknown fields ride along in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MailCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(flatten)]
    pub extra: CredentialBlob,
}

impl MailCredentials {
    pub fn from_blob(blob: CredentialBlob) -> Result<Self> {
        serde_json::from_value(Value::Object(blob))
            .map_err(|e| Error::credential(format!("malformed mail credentials: {}", e)))
    }

    pub fn to_blob(&self) -> CredentialBlob {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => CredentialBlob::new(),
        }
    }

    /// Fields present in `other` win.
    pub fn merge(&mut self, other: CredentialBlob) -> Result<()> {
        let mut blob = self.to_blob();
        blob.extend(other);
        *self = Self::from_blob(blob)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.to_blob().is_empty()
    }

    pub fn oauth_client(&self) -> Option<OAuthClient> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(OAuthClient {
                client_id: id.clone(),
                client_secret: secret.clone(),
                redirect_uri: self.redirect_uri.clone(),
            }),
            _ => None,
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Install freshly granted tokens. A grant without a refresh token keeps the old one.
    pub fn apply_tokens(&mut self, tokens: TokenSet) {
        self.access_token = Some(tokens.access_token);
        if tokens.refresh_token.is_some() {
            self.refresh_token = tokens.refresh_token;
        }
        self.expiry_date = tokens.expiry_date;
    }

    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.expiry_date = None;
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_date.is_some_and(|exp| exp <= now_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { email: Option<String> },
    ExpiredPendingRefresh,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated { .. } => "authenticated",
            AuthState::ExpiredPendingRefresh => "expired_pending_refresh",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creds(v: Value) -> MailCredentials {
        MailCredentials::from_blob(v.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let c = creds(json!({"client_id": "a", "scope": "x y", "token_type": "Bearer"}));
        let blob = c.to_blob();
        assert_eq!(blob["scope"], "x y");
        assert_eq!(blob["client_id"], "a");
        assert!(blob.get("access_token").is_none());
    }

    #[test]
    fn merge_prefers_incoming_fields() {
        let mut c = creds(json!({"client_id": "ctor", "client_secret": "s"}));
        c.merge(json!({"client_id": "saved", "access_token": "t"}).as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(c.client_id.as_deref(), Some("saved"));
        assert_eq!(c.client_secret.as_deref(), Some("s"));
        assert!(c.has_access_token());
    }

    #[test]
    fn malformed_blob_is_credential_error() {
        let err = MailCredentials::from_blob(json!({"expiry_date": "soon"}).as_object().cloned().unwrap());
        assert!(matches!(err, Err(Error::Credential(_))));
    }

    #[test]
    fn apply_tokens_keeps_refresh_token() {
        let mut c = creds(json!({"refresh_token": "r0"}));
        c.apply_tokens(TokenSet {
            access_token: "a1".into(),
            refresh_token: None,
            expiry_date: Some(5),
        });
        assert_eq!(c.refresh_token.as_deref(), Some("r0"));
        assert!(c.is_expired(5));
        assert!(!c.is_expired(4));
        c.clear_tokens();
        assert!(!c.has_access_token() && c.refresh_token.is_none() && c.expiry_date.is_none());
    }

    #[test]
    fn oauth_client_requires_id_and_secret() {
        assert!(creds(json!({"client_id": "a"})).oauth_client().is_none());
        let client = creds(json!({"client_id": "a", "client_secret": "b"})).oauth_client().unwrap();
        assert_eq!(client.client_id, "a");
    }
}
