//! Spreadsheet assistant placeholder

use crate::agent::AgentContext;
use crate::credentials::CredentialBlob;
use courier_core::Result;
use serde_json::Value;
use tracing::{info, warn};

pub struct SpreadsheetAgent {
    credentials: CredentialBlob,
}

impl SpreadsheetAgent {
    pub fn new(credentials: Option<CredentialBlob>) -> Self {
        Self {
            credentials: credentials.unwrap_or_default(),
        }
    }

    /// `api_key`, or `apiKey` as older records spell it.
    pub fn api_key(&self) -> Option<&str> {
        ["api_key", "apiKey"]
            .iter()
            .find_map(|k| self.credentials.get(*k).and_then(Value::as_str))
            .filter(|k| !k.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn start(&mut self, id: &str, ctx: &AgentContext) -> Result<()> {
        if let Some(saved) = ctx.credentials.load(id)? {
            self.credentials.extend(saved);
            info!("Loaded saved credentials for spreadsheet agent {}", id);
        }
        if !self.has_api_key() {
            warn!("Spreadsheet agent {}: API key not found in credentials, using limited functionality", id);
        }
        Ok(())
    }

    pub fn stop(&self, id: &str, ctx: &AgentContext) -> Result<()> {
        if self.credentials.is_empty() {
            return Ok(());
        }
        ctx.credentials.save(id, &self.credentials)
    }

    pub fn reply(&self, message: &str) -> String {
        format!(
            "Spreadsheet Agent: This is a placeholder response. The spreadsheet agent is not fully implemented yet. Your message was: \"{}\"",
            message
        )
    }
}
