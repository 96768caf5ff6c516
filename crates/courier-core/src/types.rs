//! Core types for Courier

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Reserved id of the general-purpose agent. Dispatching to it creates it on demand.
pub const DEFAULT_AGENT_ID: &str = "default";

/// The closed set of agent variants.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Default,
    #[serde(alias = "gmail", alias = "email")]
    Mail,
    #[serde(alias = "airtable")]
    Spreadsheet,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Mail, AgentKind::Spreadsheet, AgentKind::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Default => "default",
            AgentKind::Mail => "mail",
            AgentKind::Spreadsheet => "spreadsheet",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Default => "Default Assistant",
            AgentKind::Mail => "Mail Assistant",
            AgentKind::Spreadsheet => "Spreadsheet Assistant",
        }
    }

    /// Static description used in the routing prompt and the type catalogue.
    pub fn description(&self) -> &'static str {
        match self {
            AgentKind::Default => "General purpose assistant for all other tasks",
            AgentKind::Mail => {
                "Handles email-related tasks like reading, sending, and searching emails"
            }
            AgentKind::Spreadsheet => "Manages database and spreadsheet operations",
        }
    }

    pub fn info(&self) -> AgentTypeInfo {
        AgentTypeInfo {
            id: *self,
            name: self.display_name().to_string(),
            description: self.description().to_string(),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(AgentKind::Default),
            "mail" | "gmail" | "email" => Ok(AgentKind::Mail),
            "spreadsheet" | "airtable" => Ok(AgentKind::Spreadsheet),
            other => Err(Error::UnknownType(other.to_string())),
        }
    }
}

/// Catalogue entry for an agent type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentTypeInfo {
    pub id: AgentKind,
    pub name: String,
    pub description: String,
}

/// Speaker of a memory entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl From<bool> for AgentStatus {
    fn from(active: bool) -> Self {
        if active {
            AgentStatus::Active
        } else {
            AgentStatus::Inactive
        }
    }
}

/// Read-only listing row for a registered agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub status: AgentStatus,
}

impl AgentSummary {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// An out-of-band command addressed to an agent.
///
/// Accepts either a bare name (`"clear_memory"`) or an object
/// (`{"name": "set_auth_code", "payload": {"code": "..."}}`). Objects without a
/// `payload` field use their remaining fields as the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub name: String,
    pub payload: Option<Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(name) if !name.trim().is_empty() => Ok(Self::new(name.trim())),
            Value::Object(mut map) => {
                let name = map
                    .remove("name")
                    .or_else(|| map.remove("command"))
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| Error::InvalidCommand("missing command name".into()))?;
                let payload = match map.remove("payload") {
                    Some(p) => Some(p),
                    None if map.is_empty() => None,
                    None => Some(Value::Object(map)),
                };
                Ok(Self { name, payload })
            }
            other => Err(Error::InvalidCommand(format!(
                "expected a command name or object, got {}",
                other
            ))),
        }
    }

    /// Parse typed input: a JSON command (object or string), or a name
    /// optionally followed by a JSON payload.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.starts_with('{') || input.starts_with('"') {
            let value = serde_json::from_str(input)
                .map_err(|e| Error::InvalidCommand(format!("command is not valid JSON: {}", e)))?;
            return Self::from_value(value);
        }
        let (name, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        let mut command = Self::from_value(Value::String(name.to_string()))?;
        let rest = rest.trim();
        if !rest.is_empty() {
            let payload = serde_json::from_str(rest)
                .map_err(|e| Error::InvalidCommand(format!("payload is not JSON: {}", e)))?;
            command.payload = Some(payload);
        }
        Ok(command)
    }

    /// Look up a string field in the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }

    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref()?.get(key)
    }
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Result of an executed command.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn unknown(command: &Command) -> Self {
        Self::fail(format!("Unknown command: {}", command.name))
    }
}

/// Reply produced by routed dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutedReply {
    pub agent_id: String,
    pub response: String,
}
