//! Courier Mail - mailbox capability trait, Gmail client, and message formatting

pub mod digest;
pub mod gmail;
pub mod mime;
pub mod mock;
pub mod provider;

pub use digest::{find_label, format_digest, format_labels, format_message, MessageSummary, DIGEST_LIMIT};
pub use gmail::GmailClient;
pub use mime::{encode_raw, OutgoingMessage};
pub use mock::MockMailbox;
pub use provider::*;
