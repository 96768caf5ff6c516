//! Tests for courier-mail: provider contract via the in-memory mailbox, MIME, digests

use courier_mail::mock::message;
use courier_mail::*;
use std::sync::Arc;

fn oauth() -> OAuthClient {
    OAuthClient {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        redirect_uri: None,
    }
}

fn label(id: &str, name: &str) -> Label {
    Label {
        id: id.into(),
        name: name.into(),
        kind: "user".into(),
        messages_total: None,
        messages_unread: None,
    }
}

fn mailbox() -> MockMailbox {
    MockMailbox::new("me@example.com")
        .accept_token("good")
        .with_label(label("INBOX", "INBOX"))
        .with_label(label("Label_1", "Receipts"))
        .with_message(message("m1", "alice@example.com", "Lunch", "noon?"), &["INBOX"])
        .with_message(message("m2", "shop@example.com", "Your receipt", "thanks for buying"), &["INBOX", "Label_1"])
        .with_message(message("m3", "bob@example.com", "Lunch follow-up", "sushi"), &["INBOX"])
}

// ===========================================================================
// MockMailbox through the trait object
// ===========================================================================

#[tokio::test]
async fn profile_requires_accepted_token() {
    let provider: Arc<dyn MailProvider> = Arc::new(mailbox());
    assert_eq!(provider.profile("good").await.unwrap().email_address, "me@example.com");
    let err = provider.profile("stale").await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn list_is_newest_first_and_capped() {
    let mb = mailbox();
    let ids: Vec<String> = mb
        .list_messages("good", &ListQuery::recent(2))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["m3", "m2"]);
}

#[tokio::test]
async fn search_and_label_filters() {
    let mb = mailbox();
    let hits = mb.list_messages("good", &ListQuery::search("lunch", 10)).await.unwrap();
    assert_eq!(hits.len(), 2);
    let labelled = mb.list_messages("good", &ListQuery::label("Label_1", 10)).await.unwrap();
    assert_eq!(labelled, vec![MessageRef { id: "m2".into() }]);
}

#[tokio::test]
async fn refresh_grants_a_usable_token() {
    let mb = mailbox().with_refresh(TokenSet {
        access_token: "fresh".into(),
        refresh_token: None,
        expiry_date: Some(1),
    });
    assert!(mb.profile("fresh").await.is_err());
    let tokens = mb.refresh_token(&oauth(), "r").await.unwrap();
    assert_eq!(tokens.access_token, "fresh");
    assert!(mb.profile("fresh").await.is_ok());
    assert_eq!(mb.refresh_calls().await, 1);
}

#[tokio::test]
async fn refresh_without_grant_is_unauthorized() {
    let err = mailbox().refresh_token(&oauth(), "r").await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn code_exchange() {
    let mb = mailbox().with_code(
        "4/abc",
        TokenSet {
            access_token: "from-code".into(),
            refresh_token: Some("r1".into()),
            expiry_date: None,
        },
    );
    assert_eq!(mb.exchange_code(&oauth(), "4/abc").await.unwrap().refresh_token.as_deref(), Some("r1"));
    assert!(mb.exchange_code(&oauth(), "wrong").await.is_err());
}

#[tokio::test]
async fn outage_is_not_an_auth_error() {
    let mb = mailbox().with_outage("503 backend");
    let err = mb.list_labels("good").await.unwrap_err();
    assert!(!err.is_auth());
}

#[tokio::test]
async fn send_records_raw_message() {
    let mb = mailbox();
    let raw = encode_raw(&OutgoingMessage {
        from: "me".into(),
        to: "bob@example.com".into(),
        subject: "Hi".into(),
        body: "there".into(),
    });
    let id = mb.send_message("good", &raw).await.unwrap();
    assert_eq!(id, "sent-1");
    assert_eq!(mb.sent().await, vec![raw]);
}

// ===========================================================================
// Digest helpers over fetched details
// ===========================================================================

#[tokio::test]
async fn digest_from_fetched_details() {
    let mb = mailbox();
    let refs = mb.list_messages("good", &ListQuery::recent(5)).await.unwrap();
    let mut entries = Vec::new();
    for r in refs.iter().take(DIGEST_LIMIT) {
        entries.push(MessageSummary::from(&mb.get_message("good", &r.id).await.unwrap()));
    }
    let text = format_digest(&format!("Here are your {} most recent emails:", entries.len()), &entries);
    assert!(text.starts_with("Here are your 3 most recent emails:\n\n1. From: bob@example.com\n"));
    assert!(text.contains("   ID: m1\n\n"));
}

// ===========================================================================
// GmailClient
// ===========================================================================

#[test]
fn gmail_auth_url_uses_configured_base() {
    let client = GmailClient::new("http://127.0.0.1:9/gmail", "https://login.example/auth", "http://127.0.0.1:9/token");
    let url = client.auth_url(&oauth(), "mail-7").unwrap();
    assert!(url.starts_with("https://login.example/auth?"));
    assert!(url.contains("state=mail-7"));
}

#[tokio::test]
async fn gmail_unreachable_is_network_error() {
    let client = GmailClient::new("http://127.0.0.1:9/gmail", "https://login.example/auth", "http://127.0.0.1:9/token");
    let err = client.profile("tok").await.unwrap_err();
    assert!(matches!(err, MailError::Network(_)));
    assert!(!err.is_auth());
}
