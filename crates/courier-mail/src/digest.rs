//! Human-readable renderings of mailbox data

use crate::provider::{Label, MessageDetail};
use std::fmt::Write;

/// Most message details fetched for one digest.
pub const DIGEST_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub snippet: String,
}

impl From<&MessageDetail> for MessageSummary {
    fn from(detail: &MessageDetail) -> Self {
        Self {
            id: detail.id.clone(),
            from: detail.header("from").unwrap_or("(Unknown sender)").to_string(),
            subject: detail.header("subject").unwrap_or("(No subject)").to_string(),
            date: detail.header("date").unwrap_or("(Unknown date)").to_string(),
            snippet: detail.snippet.clone(),
        }
    }
}

/// Numbered list under `heading`, one block per message.
pub fn format_digest(heading: &str, entries: &[MessageSummary]) -> String {
    let mut out = format!("{}\n\n", heading);
    for (i, e) in entries.iter().enumerate() {
        let _ = write!(
            out,
            "{}. From: {}\n   Subject: {}\n   Date: {}\n   Preview: {}\n   ID: {}\n\n",
            i + 1,
            e.from,
            e.subject,
            e.date,
            e.snippet,
            e.id
        );
    }
    out
}

/// Headers and plain-text body of a single message.
pub fn format_message(detail: &MessageDetail) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}",
        detail.header("from").unwrap_or("Unknown"),
        detail.header("to").unwrap_or("Unknown"),
        detail.header("subject").unwrap_or("(No subject)"),
        detail.header("date").unwrap_or("Unknown"),
        detail
            .body
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or("No content available")
    )
}

pub fn format_labels(labels: &[Label]) -> String {
    let mut out = String::from("Here are your mail labels/folders:\n\n");
    for (i, label) in labels.iter().enumerate() {
        let _ = writeln!(out, "{}. {} ({})", i + 1, label.name, label.kind);
        if let Some(total) = label.messages_total {
            let _ = writeln!(
                out,
                "   Messages: {} ({} unread)",
                total,
                label.messages_unread.unwrap_or(0)
            );
        }
        let _ = write!(out, "   ID: {}\n\n", label.id);
    }
    out
}

/// Match a label by case-insensitive name or exact id.
pub fn find_label<'a>(labels: &'a [Label], wanted: &str) -> Option<&'a Label> {
    labels
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(wanted) || l.id == wanted)
}
