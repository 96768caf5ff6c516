//! RFC 822 message building and Gmail payload decoding

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// RFC 2047 encoded-word for a UTF-8 subject line.
pub fn encode_subject(subject: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(subject.as_bytes()))
}

/// Plain-text message rendered to RFC 822 text.
pub fn render_message(message: &OutgoingMessage) -> String {
    [
        format!("From: {}", message.from),
        format!("To: {}", message.to),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        "MIME-Version: 1.0".to_string(),
        format!("Subject: {}", encode_subject(&message.subject)),
        String::new(),
        message.body.clone(),
    ]
    .join("\n")
}

/// The `raw` field Gmail expects: base64url without padding.
pub fn encode_raw(message: &OutgoingMessage) -> String {
    URL_SAFE_NO_PAD.encode(render_message(message).as_bytes())
}

/// Decode Gmail body data. Accepts url-safe or standard alphabets, padded or not.
pub fn decode_body_data(data: &str) -> Option<String> {
    let normalized: String = data
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<PayloadHeader>,
    #[serde(default)]
    pub body: Option<PayloadBody>,
    #[serde(default)]
    pub parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
pub struct PayloadHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayloadBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl Payload {
    fn data(&self) -> Option<&str> {
        self.body.as_ref()?.data.as_deref().filter(|d| !d.is_empty())
    }
}

/// Plain-text body of a message payload.
///
/// A body on the top-level payload wins; otherwise the first part is
/// searched depth-first for `text/plain` leaves.
pub fn extract_plain_text(payload: &Payload) -> Option<String> {
    if let Some(data) = payload.data() {
        return decode_body_data(data);
    }
    let text = payload.parts.first().map(collect_plain_text)?;
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collect_plain_text(part: &Payload) -> String {
    if part.mime_type == "text/plain" {
        if let Some(data) = part.data() {
            return decode_body_data(data).unwrap_or_default();
        }
    }
    part.parts
        .iter()
        .map(collect_plain_text)
        .collect::<Vec<_>>()
        .join("\n")
}
