//! Tests for courier-llm: request types, provider trait, mock and real API integration

use courier_llm::*;
use futures::StreamExt;

// ===========================================================================
// LlmRequest / LlmMessage
// ===========================================================================

#[test]
fn llm_request_default() {
    let req = LlmRequest::default();
    assert!(req.model.contains("claude"));
    assert!(req.messages.is_empty());
    assert_eq!(req.max_tokens, Some(500));
    assert!(req.temperature.is_none());
    assert!(req.system.is_none());
}

#[test]
fn llm_request_single_turn_builder() {
    let req = LlmRequest::single("claude-haiku-4-5", "You route messages.", "check my inbox")
        .with_max_tokens(10)
        .with_temperature(0.0);
    assert_eq!(req.model, "claude-haiku-4-5");
    assert_eq!(req.system.as_deref(), Some("You route messages."));
    assert_eq!(req.messages, vec![LlmMessage::user("check my inbox")]);
    assert_eq!(req.max_tokens, Some(10));
    assert_eq!(req.temperature, Some(0.0));
}

#[test]
fn llm_request_serde_skips_unset_fields() {
    let req = LlmRequest {
        max_tokens: None,
        ..Default::default()
    };
    let json = serde_json::to_value(&req).unwrap();
    assert!(json.get("max_tokens").is_none());
    assert!(json.get("system").is_none());
    assert!(json.get("temperature").is_none());
}

#[test]
fn llm_message_roles() {
    assert_eq!(LlmMessage::user("a").role, "user");
    assert_eq!(LlmMessage::assistant("b").role, "assistant");
    let json = serde_json::to_string(&LlmMessage::user("hi")).unwrap();
    assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
}

#[test]
fn usage_default() {
    let u = Usage::default();
    assert_eq!(u.input_tokens, 0);
    assert_eq!(u.output_tokens, 0);
}

// ===========================================================================
// collect_text
// ===========================================================================

fn stream_of(items: Vec<LlmResult<StreamDelta>>) -> LlmStream {
    Box::pin(futures::stream::iter(items))
}

#[tokio::test]
async fn collect_text_concatenates_until_done() {
    let stream = stream_of(vec![
        Ok(StreamDelta::Text("Hel".into())),
        Ok(StreamDelta::Text("lo".into())),
        Ok(StreamDelta::Done { stop_reason: None, usage: None }),
        Ok(StreamDelta::Text("ignored".into())),
    ]);
    assert_eq!(collect_text(stream).await.unwrap(), "Hello");
}

#[tokio::test]
async fn collect_text_error_delta_fails() {
    let stream = stream_of(vec![
        Ok(StreamDelta::Text("partial".into())),
        Ok(StreamDelta::Error("overloaded".into())),
    ]);
    assert!(matches!(collect_text(stream).await, Err(LlmError::StreamError(m)) if m == "overloaded"));
}

#[tokio::test]
async fn collect_text_blank_is_invalid_response() {
    let stream = stream_of(vec![
        Ok(StreamDelta::Text("  ".into())),
        Ok(StreamDelta::Done { stop_reason: None, usage: None }),
    ]);
    assert!(matches!(collect_text(stream).await, Err(LlmError::InvalidResponse(_))));
}

// ===========================================================================
// MockProvider through the trait object
// ===========================================================================

#[tokio::test]
async fn mock_provider_as_dyn_provider() {
    let provider: std::sync::Arc<dyn LlmProvider> = std::sync::Arc::new(MockProvider::text("mail"));
    assert_eq!(provider.name(), "mock");
    assert_eq!(provider.complete(LlmRequest::default()).await.unwrap(), "mail");
}

#[tokio::test]
async fn mock_provider_stream_ends_with_done() {
    let mock = MockProvider::text("pong");
    let mut stream = mock.complete_stream(LlmRequest::default()).await.unwrap();
    let mut got_done = false;
    while let Some(delta) = stream.next().await {
        if let StreamDelta::Done { .. } = delta.unwrap() {
            got_done = true;
        }
    }
    assert!(got_done);
}

// ===========================================================================
// Providers: model support and real API integration
// ===========================================================================

#[test]
fn anthropic_provider_supports_model() {
    let provider = AnthropicProvider::new("fake");
    assert!(provider.supports_model("claude-haiku-4-5-20251001"));
    assert!(!provider.supports_model("gpt-4"));
}

#[test]
fn openai_provider_supports_model() {
    let provider = OpenAiProvider::new("fake");
    assert_eq!(provider.name(), "openai");
    assert!(provider.supports_model("gpt-4o-mini"));
    assert!(!provider.supports_model("claude-haiku-4-5"));
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    let provider = AnthropicProvider::new("sk-bad").with_base_url("http://127.0.0.1:9/v1/messages");
    let result = provider.complete(LlmRequest::single("claude-haiku-4-5", "s", "hello")).await;
    assert!(result.is_err());

    let provider = OpenAiProvider::new("sk-bad").with_base_url("http://127.0.0.1:9/v1/chat/completions");
    let result = provider.complete(LlmRequest::single("gpt-4o", "s", "hello")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn anthropic_provider_simple_text_response() {
    let api_key = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(k) if !k.is_empty() => k,
        _ => {
            eprintln!("SKIP: no ANTHROPIC_API_KEY");
            return;
        }
    };

    let provider = AnthropicProvider::new(&api_key);
    let request = LlmRequest::single(
        "claude-haiku-4-5-20251001",
        "You are a test fixture.",
        "Reply with exactly the word 'pong' and nothing else.",
    )
    .with_max_tokens(32);

    let text = provider.complete(request).await.expect("API call failed");
    assert!(text.to_lowercase().contains("pong"), "Expected 'pong' in response, got: {}", text);
}
