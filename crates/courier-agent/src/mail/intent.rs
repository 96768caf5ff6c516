//! Mail intent classification

use serde_json::Value;
use tracing::debug;

pub const DEFAULT_COUNT: u32 = 5;

pub const INTENT_PROMPT: &str = "You are an intent analyzer for an email assistant.
Analyze the user's message and determine their intent.
Return ONLY a JSON object with the intent and any relevant parameters.
Possible intents: get_latest_emails, search_emails, read_email, send_email, list_labels, get_label_emails, other.
For get_latest_emails, include a count parameter.
For search_emails, include query and count parameters.
For read_email, include an id parameter if provided, otherwise set it to null.
For send_email, include to, subject, and body parameters.
For list_labels, no additional parameters are needed.
For get_label_emails, include a label parameter (the label name or ID) and an optional count parameter.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailIntent {
    GetLatestEmails { count: u32 },
    SearchEmails { query: String, count: u32 },
    ReadEmail { id: Option<String> },
    SendEmail { to: Option<String>, subject: Option<String>, body: Option<String> },
    ListLabels,
    GetLabelEmails { label: Option<String>, count: u32 },
    Other,
}

impl MailIntent {
    /// Parse the classifier's reply. Anything unreadable is `Other`.
    pub fn parse(reply: &str) -> Self {
        let Some(value) = extract_json_object(reply) else {
            debug!("No JSON object in intent reply: {:?}", reply);
            return MailIntent::Other;
        };
        let intent = value
            .get("intent")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let count = count_field(&value);

        match intent.as_str() {
            "get_latest_emails" => MailIntent::GetLatestEmails { count },
            "search_emails" => MailIntent::SearchEmails {
                query: text_field(&value, "query").unwrap_or_default(),
                count,
            },
            "read_email" => MailIntent::ReadEmail {
                id: text_field(&value, "id"),
            },
            "send_email" => MailIntent::SendEmail {
                to: text_field(&value, "to"),
                subject: text_field(&value, "subject"),
                body: text_field(&value, "body"),
            },
            "list_labels" => MailIntent::ListLabels,
            "get_label_emails" => MailIntent::GetLabelEmails {
                label: text_field(&value, "label"),
                count,
            },
            _ => MailIntent::Other,
        }
    }

    /// Apology returned when the handler's provider call fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            MailIntent::GetLatestEmails { .. } => {
                "I'm sorry, I encountered an error while retrieving your emails. Please try again later."
            }
            MailIntent::SearchEmails { .. } => {
                "I'm sorry, I encountered an error while searching your emails. Please try again later."
            }
            MailIntent::ReadEmail { .. } => {
                "I'm sorry, I encountered an error while reading the email. Please try again later."
            }
            MailIntent::SendEmail { .. } => {
                "I'm sorry, I encountered an error while sending the email. Please try again later."
            }
            MailIntent::ListLabels => {
                "I'm sorry, I encountered an error while retrieving your labels. Please try again later."
            }
            MailIntent::GetLabelEmails { .. } => {
                "I'm sorry, I encountered an error while retrieving emails from the label. Please try again later."
            }
            MailIntent::Other => {
                "I'm sorry, I encountered an error while processing your request. Please try again later."
            }
        }
    }
}

/// Slice from the first `{` to the last `}` and parse it.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(value: &Value) -> u32 {
    let parsed = match value.get("count") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => DEFAULT_COUNT,
    }
}
