//! Agent: identity, memory and lifecycle around a closed set of variants

use crate::credentials::{CredentialBlob, CredentialStore};
use crate::default::DefaultAgent;
use crate::mail::MailAgent;
use crate::memory::Memory;
use crate::spreadsheet::SpreadsheetAgent;
use chrono::{DateTime, Utc};
use courier_core::{AgentKind, AgentStatus, AgentSummary, Command, CommandResult, CourierConfig, Result, Role};
use courier_llm::LlmProvider;
use courier_mail::MailProvider;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Generic reply when a completion or provider call fails.
pub const APOLOGY: &str = "I'm sorry, I encountered an error while processing your request. Please try again later.";

/// Model knobs and mail defaults shared by every agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub classifier_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// `From:` header for outgoing mail.
    pub sender: String,
    pub redirect_uri: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&CourierConfig::default())
    }
}

impl From<&CourierConfig> for AgentSettings {
    fn from(config: &CourierConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            classifier_model: config.llm.router_model.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            sender: config.mail.sender.clone(),
            redirect_uri: config.mail.redirect_uri.clone(),
        }
    }
}

/// Capabilities handed to every agent.
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub mail: Option<Arc<dyn MailProvider>>,
    pub credentials: CredentialStore,
    pub settings: AgentSettings,
}

impl AgentContext {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            llm: None,
            mail: None,
            credentials,
            settings: AgentSettings::default(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_mail(mut self, mail: Arc<dyn MailProvider>) -> Self {
        self.mail = Some(mail);
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Non-secret credential markers written into mail snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    pub has_credentials: bool,
    pub has_access_token: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// On-disk form of an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub memory: Memory,
    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_info: Option<CredentialInfo>,
}

pub(crate) enum Variant {
    Default(DefaultAgent),
    Mail(MailAgent),
    Spreadsheet(SpreadsheetAgent),
}

pub struct Agent {
    id: String,
    name: String,
    active: bool,
    memory: Memory,
    last_activity: DateTime<Utc>,
    variant: Variant,
    ctx: AgentContext,
}

impl Agent {
    /// Build an inactive agent. `credentials` seeds the variant's credential blob.
    pub fn new(
        kind: AgentKind,
        id: impl Into<String>,
        name: Option<String>,
        credentials: Option<CredentialBlob>,
        ctx: AgentContext,
    ) -> Result<Self> {
        let variant = match kind {
            AgentKind::Default => Variant::Default(DefaultAgent),
            AgentKind::Mail => Variant::Mail(MailAgent::new(credentials)?),
            AgentKind::Spreadsheet => Variant::Spreadsheet(SpreadsheetAgent::new(credentials)),
        };
        Ok(Self {
            id: id.into(),
            name: name.unwrap_or_else(|| kind.display_name().to_string()),
            active: false,
            memory: Memory::new(),
            last_activity: Utc::now(),
            variant,
            ctx,
        })
    }

    /// Rebuild an agent from its snapshot. The agent comes back inactive; the
    /// caller decides whether to start it.
    pub fn from_snapshot(snapshot: AgentSnapshot, ctx: AgentContext) -> Result<Self> {
        let mut agent = Self::new(snapshot.kind, snapshot.id.clone(), Some(snapshot.name.clone()), None, ctx)?;
        agent.load_snapshot(snapshot);
        agent.active = false;
        Ok(agent)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AgentKind {
        match self.variant {
            Variant::Default(_) => AgentKind::Default,
            Variant::Mail(_) => AgentKind::Mail,
            Variant::Spreadsheet(_) => AgentKind::Spreadsheet,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Only mail agents can be connected.
    pub fn is_connected(&self) -> bool {
        matches!(&self.variant, Variant::Mail(mail) if mail.is_connected())
    }

    pub fn mail(&self) -> Option<&MailAgent> {
        match &self.variant {
            Variant::Mail(mail) => Some(mail),
            _ => None,
        }
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind(),
            status: AgentStatus::from(self.active),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn start(&mut self) -> Result<()> {
        match &mut self.variant {
            Variant::Default(_) => {}
            Variant::Mail(mail) => mail.start(&self.id, &self.ctx).await?,
            Variant::Spreadsheet(sheet) => sheet.start(&self.id, &self.ctx)?,
        }
        self.active = true;
        self.touch();
        info!("Agent {} ({}) started", self.id, self.kind());
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.active = false;
        match &self.variant {
            Variant::Default(_) => {}
            Variant::Mail(mail) => mail.stop(&self.id, &self.ctx)?,
            Variant::Spreadsheet(sheet) => sheet.stop(&self.id, &self.ctx)?,
        }
        info!("Agent {} ({}) stopped", self.id, self.kind());
        Ok(())
    }

    async fn ensure_started(&mut self) {
        if self.active {
            return;
        }
        debug!("Agent {} inactive, starting on demand", self.id);
        if let Err(e) = self.start().await {
            error!("Agent {} failed to start: {}", self.id, e);
        }
    }

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------

    pub async fn process(&mut self, message: &str) -> String {
        self.ensure_started().await;
        self.touch();
        self.memory.push(Role::User, message);

        let reply = match &mut self.variant {
            Variant::Default(agent) => agent.reply(&self.id, message, &self.memory, &self.ctx).await,
            Variant::Mail(agent) => agent.reply(&self.id, message, &self.memory, &self.ctx).await,
            Variant::Spreadsheet(agent) => agent.reply(message),
        };

        self.memory.push(Role::Assistant, reply.clone());
        reply
    }

    pub async fn execute_command(&mut self, command: &Command) -> CommandResult {
        self.ensure_started().await;
        self.touch();
        debug!("Agent {} executing command {}", self.id, command);

        match command.name.as_str() {
            "clear_memory" => {
                self.memory.clear();
                return CommandResult::ok("Memory cleared successfully.");
            }
            "get_status" => {
                let message = format!("{} agent status", capitalize(self.kind().as_str()));
                return CommandResult::ok_with(message, self.status());
            }
            _ => {}
        }

        let handled = match &mut self.variant {
            Variant::Mail(mail) => mail.command(&self.id, command, &self.ctx).await,
            Variant::Default(_) | Variant::Spreadsheet(_) => None,
        };
        handled.unwrap_or_else(|| CommandResult::unknown(command))
    }

    fn status(&self) -> Value {
        let mut data = json!({
            "active": self.active,
            "memorySize": self.memory.len(),
            "lastActivity": self.last_activity,
            "hasCredentials": false,
        });
        if let Some(map) = data.as_object_mut() {
            match &self.variant {
                Variant::Default(_) => {}
                Variant::Mail(mail) => map.extend(mail.status()),
                Variant::Spreadsheet(sheet) => {
                    map.insert("hasCredentials".into(), json!(sheet.has_api_key()));
                }
            }
        }
        data
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            kind: self.kind(),
            name: self.name.clone(),
            active: self.active,
            memory: self.memory.clone(),
            last_activity: self.last_activity,
            credential_info: self.mail().map(MailAgent::credential_info),
        }
    }

    /// Restore snapshot state. The id and variant stay as constructed.
    pub fn load_snapshot(&mut self, snapshot: AgentSnapshot) {
        self.name = snapshot.name;
        self.active = snapshot.active;
        self.memory = snapshot.memory;
        self.last_activity = snapshot.last_activity;
        if let Variant::Mail(mail) = &mut self.variant {
            mail.restore(snapshot.credential_info);
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
