//! Tests for courier-agent: agent lifecycle, memory, commands, snapshots and the mail agent

use courier_agent::*;
use courier_core::{AgentKind, Command, Error, Result};
use courier_llm::{LlmProvider, MockBehavior, MockProvider};
use courier_mail::mock::message;
use courier_mail::{Label, MailProvider, MockMailbox, TokenSet};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const FAR_FUTURE_MS: i64 = 4_102_444_800_000;

fn blob(v: Value) -> CredentialBlob {
    v.as_object().cloned().unwrap()
}

fn client_blob() -> CredentialBlob {
    blob(json!({"client_id": "cid", "client_secret": "sec-BBB", "redirect_uri": "http://localhost/cb"}))
}

fn connected_blob(token: &str) -> CredentialBlob {
    let mut b = client_blob();
    b.insert("access_token".into(), json!(token));
    b.insert("refresh_token".into(), json!("refresh-CCC"));
    b.insert("expiry_date".into(), json!(FAR_FUTURE_MS));
    b
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
        .accept_token("tok-AAA")
        .with_label(label("INBOX", "INBOX"))
        .with_label(label("Label_9", "Receipts"))
        .with_message(message("m1", "alice@example.com", "Lunch", "noon?"), &["INBOX"])
        .with_message(message("m2", "shop@example.com", "Your receipt", "thanks"), &["INBOX", "Label_9"])
        .with_message(message("m3", "bob@example.com", "Lunch follow-up", "sushi"), &["INBOX"])
}

struct Fixture {
    tmp: TempDir,
    llm: Arc<MockProvider>,
    mail: Arc<MockMailbox>,
}

impl Fixture {
    fn new(llm: MockProvider, mail: MockMailbox) -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
            llm: Arc::new(llm),
            mail: Arc::new(mail),
        }
    }

    fn store(&self) -> CredentialStore {
        CredentialStore::file(self.tmp.path().join("credentials"))
    }

    fn ctx(&self) -> AgentContext {
        AgentContext::new(self.store())
            .with_llm(self.llm.clone() as Arc<dyn LlmProvider>)
            .with_mail(self.mail.clone() as Arc<dyn MailProvider>)
    }

    async fn mail_agent(&self, credentials: CredentialBlob) -> Agent {
        let mut agent = Agent::new(AgentKind::Mail, "mail-1", None, Some(credentials), self.ctx()).unwrap();
        agent.start().await.unwrap();
        agent
    }
}

fn intent(v: Value) -> MockBehavior {
    MockBehavior::Text(v.to_string())
}

/// Backend whose writes always fail.
struct FailingBackend;

impl CredentialBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn save(&self, _agent_id: &str, _blob: &CredentialBlob) -> Result<()> {
        Err(Error::credential("disk full"))
    }

    fn load(&self, _agent_id: &str) -> Result<Option<CredentialBlob>> {
        Ok(None)
    }

    fn delete(&self, _agent_id: &str) -> Result<bool> {
        Ok(false)
    }
}

// ===========================================================================
// Lifecycle and memory
// ===========================================================================

#[tokio::test]
async fn process_auto_starts_and_records_both_turns() {
    let tmp = TempDir::new().unwrap();
    let mut agent = Agent::new(AgentKind::Default, "default", None, None, AgentContext::new(CredentialStore::file(tmp.path()))).unwrap();
    assert!(!agent.is_active());

    let reply = agent.process("hello there").await;
    assert!(agent.is_active());
    assert!(reply.contains("without a language model configured"));
    assert!(reply.ends_with("\"hello there\""));

    let roles: Vec<_> = agent.memory().iter().map(|e| e.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}

#[tokio::test]
async fn default_agent_sends_recent_context() {
    let fx = Fixture::new(MockProvider::text("sure"), mailbox());
    let mut agent = Agent::new(AgentKind::Default, "default", None, None, fx.ctx()).unwrap();
    for i in 0..8 {
        agent.process(&format!("q{}", i)).await;
    }
    let last = fx.llm.last_request().await.unwrap();
    assert_eq!(last.messages.len(), CONTEXT_WINDOW - 1);
    assert_eq!(last.messages[0].role, "user");
    assert_eq!(last.messages.last().unwrap().content, "q7");
    assert_eq!(last.max_tokens, Some(500));
    assert!(last.system.unwrap().contains("helpful assistant"));
}

#[tokio::test]
async fn default_agent_apologises_on_llm_failure() {
    let fx = Fixture::new(MockProvider::constant(MockBehavior::Error("boom".into())), mailbox());
    let mut agent = Agent::new(AgentKind::Default, "default", None, None, fx.ctx()).unwrap();
    assert_eq!(agent.process("hi").await, APOLOGY);
    assert_eq!(agent.memory().len(), 2);
}

#[tokio::test]
async fn memory_is_capped_fifo() {
    let tmp = TempDir::new().unwrap();
    let mut agent = Agent::new(AgentKind::Spreadsheet, "sheet", None, None, AgentContext::new(CredentialStore::file(tmp.path()))).unwrap();
    for i in 0..60 {
        agent.process(&format!("msg {}", i)).await;
    }
    assert_eq!(agent.memory().len(), MEMORY_CAP);
    // 120 entries written, the first 20 (msg 0..9 and replies) evicted
    assert_eq!(agent.memory().iter().next().unwrap().content, "msg 10");
}

#[tokio::test]
async fn clear_memory_always_succeeds() {
    let tmp = TempDir::new().unwrap();
    let mut agent = Agent::new(AgentKind::Default, "default", None, None, AgentContext::new(CredentialStore::file(tmp.path()))).unwrap();
    let empty = agent.execute_command(&Command::new("clear_memory")).await;
    assert!(empty.success);

    agent.process("one").await;
    let result = agent.execute_command(&Command::new("clear_memory")).await;
    assert!(result.success);
    assert_eq!(result.message, "Memory cleared successfully.");
    assert!(agent.memory().is_empty());
}

#[tokio::test]
async fn unknown_command_fails_softly() {
    let tmp = TempDir::new().unwrap();
    let mut agent = Agent::new(AgentKind::Default, "default", None, None, AgentContext::new(CredentialStore::file(tmp.path()))).unwrap();
    let result = agent.execute_command(&Command::new("frobnicate")).await;
    assert!(!result.success);
    assert_eq!(result.message, "Unknown command: frobnicate");
    assert!(agent.is_active());
}

#[tokio::test]
async fn get_status_reports_basics() {
    let tmp = TempDir::new().unwrap();
    let ctx = AgentContext::new(CredentialStore::file(tmp.path()));
    let mut sheet = Agent::new(AgentKind::Spreadsheet, "sheet", None, Some(blob(json!({"apiKey": "k"}))), ctx).unwrap();
    sheet.process("hi").await;
    let status = sheet.execute_command(&Command::new("get_status")).await;
    assert!(status.success);
    assert_eq!(status.message, "Spreadsheet agent status");
    let data = status.data.unwrap();
    assert_eq!(data["active"], true);
    assert_eq!(data["memorySize"], 2);
    assert_eq!(data["hasCredentials"], true);
    assert!(data.get("authState").is_none());
}

#[tokio::test]
async fn spreadsheet_placeholder_quotes_message() {
    let tmp = TempDir::new().unwrap();
    let mut sheet = Agent::new(AgentKind::Spreadsheet, "sheet", None, None, AgentContext::new(CredentialStore::file(tmp.path()))).unwrap();
    let reply = sheet.process("sum column B").await;
    assert!(reply.starts_with("Spreadsheet Agent: This is a placeholder response."));
    assert!(reply.ends_with("Your message was: \"sum column B\""));
}

#[tokio::test]
async fn spreadsheet_stop_flushes_credentials() {
    let tmp = TempDir::new().unwrap();
    let store = CredentialStore::file(tmp.path());
    let mut sheet = Agent::new(AgentKind::Spreadsheet, "sheet", None, Some(blob(json!({"api_key": "k"}))), AgentContext::new(store.clone())).unwrap();
    sheet.start().await.unwrap();
    sheet.stop().unwrap();
    assert!(!sheet.is_active());
    assert_eq!(store.load("sheet").unwrap().unwrap()["api_key"], "k");
}

// ===========================================================================
// Snapshots
// ===========================================================================

#[tokio::test]
async fn snapshot_roundtrip_is_exact() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    agent.execute_command(&Command::new("get_status")).await;
    agent.process("hello").await;
    let first = agent.snapshot();

    let mut copy = Agent::new(AgentKind::Mail, "mail-1", None, None, fx.ctx()).unwrap();
    copy.load_snapshot(first.clone());
    assert_eq!(copy.snapshot(), first);

    let json = serde_json::to_string(&first).unwrap();
    let parsed: AgentSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, first);
}

#[tokio::test]
async fn mail_snapshot_never_contains_secrets() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    let json = serde_json::to_string_pretty(&agent.snapshot()).unwrap();
    for secret in ["tok-AAA", "sec-BBB", "refresh-CCC", "access_token", "client_secret"] {
        assert!(!json.contains(secret), "snapshot leaked {}", secret);
    }
    let info = agent.snapshot().credential_info.unwrap();
    assert!(info.has_credentials && info.has_access_token);
    assert_eq!(info.client_id.as_deref(), Some("cid"));
    assert_eq!(info.redirect_uri.as_deref(), Some("http://localhost/cb"));
}

#[tokio::test]
async fn restored_mail_agent_recovers_secrets_from_store() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    agent.stop().unwrap();
    let snapshot = agent.snapshot();

    let mut restored = Agent::from_snapshot(snapshot, fx.ctx()).unwrap();
    assert!(!restored.is_active());
    assert!(!restored.mail().unwrap().credentials().has_access_token());
    restored.start().await.unwrap();
    assert!(restored.is_connected());
    assert_eq!(restored.mail().unwrap().credentials().client_secret.as_deref(), Some("sec-BBB"));
}

#[tokio::test]
async fn stopping_a_never_started_mail_agent_keeps_stored_secrets() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    agent.stop().unwrap();

    let mut restored = Agent::from_snapshot(agent.snapshot(), fx.ctx()).unwrap();
    restored.stop().unwrap();

    let saved = fx.store().load("mail-1").unwrap().unwrap();
    assert_eq!(saved["client_secret"], "sec-BBB");
    assert_eq!(saved["access_token"], "tok-AAA");
    assert_eq!(saved["refresh_token"], "refresh-CCC");
}

// ===========================================================================
// Mail agent: authentication state machine
// ===========================================================================

#[tokio::test]
async fn mail_without_client_credentials_is_degraded() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(CredentialBlob::new()).await;
    assert!(agent.is_active());
    assert_eq!(agent.mail().unwrap().auth_state(), &AuthState::Unauthenticated);

    let reply = agent.process("show my inbox").await;
    assert!(reply.contains("no OAuth client is configured"));
    assert_eq!(fx.llm.call_count().await, 0);
}

#[tokio::test]
async fn mail_without_token_replies_with_auth_link() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(client_blob()).await;
    let reply = agent.process("show my inbox").await;
    assert!(reply.starts_with("I need access to your email account"));
    assert!(reply.contains("client_id=cid&state=mail-1"));
    assert_eq!(fx.mail.profile_calls().await, 0);
}

#[tokio::test]
async fn mail_start_with_valid_token_connects() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    assert!(agent.is_connected());

    let status = agent.execute_command(&Command::new("get_status")).await.data.unwrap();
    assert_eq!(status["authState"], "authenticated");
    assert_eq!(status["isConnected"], true);
    assert_eq!(status["hasAccessToken"], true);
    assert_eq!(status["hasCredentials"], true);
    assert_eq!(status["email"], "me@example.com");
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_persisted() {
    let grant = TokenSet {
        access_token: "tok-NEW".into(),
        refresh_token: None,
        expiry_date: Some(FAR_FUTURE_MS),
    };
    let fx = Fixture::new(MockProvider::text("ok"), mailbox().with_refresh(grant));
    let agent = fx.mail_agent(connected_blob("tok-STALE")).await;

    assert!(agent.is_connected());
    assert_eq!(fx.mail.refresh_calls().await, 1);
    let stored = fx.store().load("mail-1").unwrap().unwrap();
    assert_eq!(stored["access_token"], "tok-NEW");
    assert_eq!(stored["refresh_token"], "refresh-CCC");
}

#[tokio::test]
async fn failed_refresh_clears_tokens() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let agent = fx.mail_agent(connected_blob("tok-STALE")).await;

    assert_eq!(agent.mail().unwrap().auth_state(), &AuthState::Unauthenticated);
    let stored = fx.store().load("mail-1").unwrap().unwrap();
    assert_eq!(stored["client_id"], "cid");
    assert!(stored.get("access_token").is_none());
    assert!(stored.get("refresh_token").is_none());
    assert!(stored.get("expiry_date").is_none());
}

#[tokio::test]
async fn non_auth_probe_failure_keeps_tokens() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox().with_outage("503"));
    let agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    assert!(!agent.is_connected());
    assert_eq!(fx.mail.refresh_calls().await, 0);
    assert!(agent.mail().unwrap().credentials().has_access_token());
}

#[tokio::test]
async fn expired_token_is_refreshed_before_use() {
    let grant = TokenSet {
        access_token: "tok-NEW".into(),
        refresh_token: Some("refresh-DDD".into()),
        expiry_date: Some(FAR_FUTURE_MS),
    };
    let llm = MockProvider::sequence(vec![intent(json!({"intent": "list_labels"}))]);
    let fx = Fixture::new(llm, mailbox().with_refresh(grant));
    let mut expired = connected_blob("tok-AAA");
    expired.insert("expiry_date".into(), json!(1));
    let mut agent = fx.mail_agent(expired).await;
    assert!(agent.is_connected());

    let reply = agent.process("what folders do I have").await;
    assert!(reply.contains("Receipts"));
    assert_eq!(fx.mail.refresh_calls().await, 1);
    assert_eq!(agent.mail().unwrap().credentials().refresh_token.as_deref(), Some("refresh-DDD"));
}

#[tokio::test]
async fn corrupt_stored_credentials_fail_start() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let dir = fx.tmp.path().join("credentials");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("mail-1.json"), "{not json").unwrap();

    let mut agent = Agent::new(AgentKind::Mail, "mail-1", None, None, fx.ctx()).unwrap();
    assert!(matches!(agent.start().await, Err(Error::Credential(_))));
    assert!(!agent.is_active());
}

#[tokio::test]
async fn stop_surfaces_store_failure() {
    let ctx = AgentContext::new(CredentialStore::new(Arc::new(FailingBackend)));
    let mut agent = Agent::new(AgentKind::Mail, "mail-1", None, Some(client_blob()), ctx).unwrap();
    agent.start().await.unwrap();
    assert!(agent.stop().is_err());
    assert!(!agent.is_active());
}

// ===========================================================================
// Mail agent: intents
// ===========================================================================

#[tokio::test]
async fn latest_emails_digest_newest_first() {
    let llm = MockProvider::sequence(vec![intent(json!({"intent": "get_latest_emails", "count": 5}))]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    let reply = agent.process("what's new?").await;
    assert!(reply.starts_with("Here are your 3 most recent emails:\n\n"));
    assert!(reply.contains("1. From: bob@example.com"));
    assert!(reply.contains("3. From: alice@example.com"));
    assert!(reply.contains("   ID: m2"));

    let classify = fx.llm.requests().await.remove(0);
    assert_eq!(classify.max_tokens, Some(200));
    assert_eq!(classify.temperature, Some(0.3));
    assert_eq!(classify.messages[0].content, "what's new?");
}

#[tokio::test]
async fn digest_skips_broken_messages() {
    let llm = MockProvider::sequence(vec![intent(json!({"intent": "get_latest_emails"}))]);
    let fx = Fixture::new(llm, mailbox().with_broken_message("m2"));
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    let reply = agent.process("inbox").await;
    assert!(reply.starts_with("Here are your 2 most recent emails:"));
    assert!(!reply.contains("ID: m2"));
}

#[tokio::test]
async fn digest_fetches_at_most_five_details() {
    let mut mail = mailbox();
    for i in 0..8 {
        mail = mail.with_message(message(&format!("x{}", i), "a@b.c", "s", "p"), &["INBOX"]);
    }
    let llm = MockProvider::sequence(vec![intent(json!({"intent": "get_latest_emails", "count": 10}))]);
    let fx = Fixture::new(llm, mail);
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    agent.process("inbox").await;
    assert_eq!(fx.mail.detail_calls().await, 5);
}

#[tokio::test]
async fn search_with_no_hits() {
    let llm = MockProvider::sequence(vec![intent(json!({"intent": "search_emails", "query": "invoice"}))]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    assert_eq!(agent.process("find invoices").await, "No emails found matching \"invoice\".");
}

#[tokio::test]
async fn read_email_by_id() {
    let llm = MockProvider::sequence(vec![
        intent(json!({"intent": "read_email", "id": "m1"})),
        intent(json!({"intent": "read_email", "id": "nope"})),
        intent(json!({"intent": "read_email", "id": null})),
    ]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    let reply = agent.process("open m1").await;
    assert!(reply.starts_with("From: alice@example.com\n"));
    assert!(reply.contains("noon?"));
    assert_eq!(agent.process("open nope").await, "I couldn't find an email with ID nope.");
    assert!(agent.process("open it").await.starts_with("I need an email ID"));
}

#[tokio::test]
async fn send_email_asks_for_missing_fields_then_sends() {
    let llm = MockProvider::sequence(vec![
        intent(json!({"intent": "send_email", "to": "bob@example.com", "body": "hi"})),
        intent(json!({"intent": "send_email", "to": "bob@example.com", "subject": "Hey", "body": "hi"})),
    ]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    assert_eq!(agent.process("mail bob").await, "Please provide a subject for the email.");
    assert!(fx.mail.sent().await.is_empty());
    assert_eq!(agent.process("mail bob, subject Hey").await, "Email sent successfully to bob@example.com!");
    assert_eq!(fx.mail.sent().await.len(), 1);
}

#[tokio::test]
async fn label_emails_resolve_by_name() {
    let llm = MockProvider::sequence(vec![
        intent(json!({"intent": "get_label_emails", "label": "receipts"})),
        intent(json!({"intent": "get_label_emails", "label": "Travel"})),
    ]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    let reply = agent.process("receipts please").await;
    assert!(reply.starts_with("Here are 1 emails from the \"Receipts\" label:"));
    assert!(reply.contains("ID: m2"));
    assert_eq!(
        agent.process("travel please").await,
        "I couldn't find a label named \"Travel\". Please check the label name and try again."
    );
}

#[tokio::test]
async fn other_intent_falls_back_to_conversation() {
    let llm = MockProvider::sequence(vec![
        intent(json!({"intent": "other"})),
        MockBehavior::Text("Happy to help with your mail.".into()),
    ]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;

    assert_eq!(agent.process("thanks!").await, "Happy to help with your mail.");
    let last = fx.llm.last_request().await.unwrap();
    assert!(last.system.unwrap().starts_with("You are an email assistant"));
    assert_eq!(last.messages.last().unwrap().content, "thanks!");
}

#[tokio::test]
async fn provider_failures_become_apologies() {
    let llm = MockProvider::sequence(vec![
        MockBehavior::Error("llm down".into()),
        intent(json!({"intent": "list_labels"})),
    ]);
    let fx = Fixture::new(llm, mailbox());
    let mut agent = fx.mail_agent(connected_blob("tok-AAA")).await;
    assert_eq!(agent.process("labels?").await, APOLOGY);

    // mailbox rejects the token and there is no refresh grant
    let fx2 = Fixture::new(MockProvider::sequence(vec![intent(json!({"intent": "list_labels"}))]), MockMailbox::new("me@example.com"));
    let mut agent2 = Agent::new(AgentKind::Mail, "mail-1", None, Some(connected_blob("tok-AAA")), fx2.ctx()).unwrap();
    agent2.start().await.unwrap();
    assert!(agent2.process("labels?").await.starts_with("I need access to your email account"));
}

// ===========================================================================
// Mail agent: commands
// ===========================================================================

#[tokio::test]
async fn get_auth_url_uses_agent_id_as_state() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(client_blob()).await;
    let result = agent.execute_command(&Command::new("get_auth_url")).await;
    assert!(result.success);
    assert!(result.data.unwrap()["authUrl"].as_str().unwrap().contains("state=mail-1"));

    let mut bare = fx.mail_agent(CredentialBlob::new()).await;
    let result = bare.execute_command(&Command::new("get_auth_url")).await;
    assert!(!result.success);
    assert!(result.message.starts_with("Error generating auth URL"));
}

#[tokio::test]
async fn save_credentials_requires_client_id() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut bare = fx.mail_agent(CredentialBlob::new()).await;
    let result = bare.execute_command(&Command::new("save_credentials")).await;
    assert_eq!(result.message, "No credentials to save");

    let mut agent = fx.mail_agent(client_blob()).await;
    let result = agent.execute_command(&Command::new("save_credentials")).await;
    assert!(result.success);
    assert_eq!(result.data.unwrap()["hasAccessToken"], false);
    assert_eq!(fx.store().load("mail-1").unwrap().unwrap()["client_secret"], "sec-BBB");
}

#[tokio::test]
async fn set_auth_code_exchanges_and_connects() {
    let grant = TokenSet {
        access_token: "tok-XYZ".into(),
        refresh_token: Some("refresh-XYZ".into()),
        expiry_date: Some(FAR_FUTURE_MS),
    };
    let fx = Fixture::new(MockProvider::text("ok"), mailbox().with_code("c0de", grant));
    let mut agent = fx.mail_agent(client_blob()).await;

    let missing = agent.execute_command(&Command::new("set_auth_code")).await;
    assert_eq!(missing.message, "Authorization code is required as {code: \"your_code\"}");

    let result = agent
        .execute_command(&Command::with_payload("set_auth_code", json!({"code": "c0de"})))
        .await;
    assert!(result.success, "{}", result.message);
    let rendered = serde_json::to_string(&result).unwrap();
    assert!(!rendered.contains("tok-XYZ") && !rendered.contains("refresh-XYZ"));
    assert_eq!(result.data.unwrap()["email"], "me@example.com");
    assert!(agent.is_connected());
    assert_eq!(fx.store().load("mail-1").unwrap().unwrap()["access_token"], "tok-XYZ");

    let bad = agent
        .execute_command(&Command::with_payload("set_auth_code", json!({"code": "wrong"})))
        .await;
    assert!(!bad.success);
}

#[tokio::test]
async fn set_tokens_validates_by_probing() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(client_blob()).await;

    let bad = agent
        .execute_command(&Command::with_payload("set_tokens", json!({"tokens": {"access_token": "bogus"}})))
        .await;
    assert!(!bad.success);
    assert_eq!(bad.message, "Error setting tokens from JSON: Invalid tokens: Could not connect to the mail API");

    let tokens = json!({"access_token": "tok-AAA"}).to_string();
    let good = agent
        .execute_command(&Command::with_payload("set_tokens_json", json!({ "tokens": tokens })))
        .await;
    assert!(good.success, "{}", good.message);
    assert_eq!(good.message, "Tokens set successfully");
    assert!(agent.is_connected());
    let stored = fx.store().load("mail-1").unwrap().unwrap();
    assert!(stored["expiry_date"].as_i64().unwrap() > chrono::Utc::now().timestamp_millis());
}

#[tokio::test]
async fn mail_unknown_command() {
    let fx = Fixture::new(MockProvider::text("ok"), mailbox());
    let mut agent = fx.mail_agent(client_blob()).await;
    let result = agent.execute_command(&Command::new("frobnicate")).await;
    assert_eq!(result.message, "Unknown command: frobnicate");
}
