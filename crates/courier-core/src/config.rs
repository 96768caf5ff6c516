//! Courier configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. Environment variables override file values; secrets (API keys,
//! OAuth tokens) never live here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub mail: MailConfig,
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory. Agent state lives in `<data_dir>/agents`,
    /// credential blobs in `<data_dir>/credentials`.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Anthropic,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    /// Model used for conversational replies.
    pub model: String,
    /// Model used for routing and intent classification.
    pub router_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Override the provider endpoint (proxies, local gateways).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_base: String,
    pub auth_base: String,
    pub token_url: String,
    /// Fallback OAuth redirect when the agent's credentials carry none.
    pub redirect_uri: Option<String>,
    /// `From:` header for outgoing mail.
    pub sender: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    #[default]
    File,
    Env,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub backend: CredentialBackendKind,
}

// ============================================================
// Defaults
// ============================================================

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("courier"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Anthropic,
            model: "claude-haiku-4-5-20251001".into(),
            router_model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 500,
            temperature: 0.7,
            base_url: None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_base: "https://gmail.googleapis.com/gmail/v1/users/me".into(),
            auth_base: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            redirect_uri: None,
            sender: "me".into(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl CourierConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply `COURIER_*`, `GMAIL_REDIRECT_URI` and `EMAIL_FROM` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("COURIER_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("COURIER_CREDENTIALS") {
            match backend.to_ascii_lowercase().as_str() {
                "env" => self.credentials.backend = CredentialBackendKind::Env,
                "file" => self.credentials.backend = CredentialBackendKind::File,
                other => tracing::warn!("Ignoring unknown COURIER_CREDENTIALS value: {}", other),
            }
        }
        if let Some(model) = lookup("COURIER_MODEL") {
            self.llm.model = model;
        }
        if let Some(uri) = lookup("GMAIL_REDIRECT_URI") {
            self.mail.redirect_uri = Some(uri);
        }
        if let Some(sender) = lookup("EMAIL_FROM") {
            self.mail.sender = sender;
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.storage.data_dir.join("agents")
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.storage.data_dir.join("credentials")
    }
}
