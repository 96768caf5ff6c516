//! MockProvider: deterministic LLM responses for testing

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta};
use async_stream::stream;
use tokio::sync::Mutex;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Return a text-only response
    Text(String),
    /// Fail the request before any stream is produced
    Error(String),
    /// Produce some text then fail mid-stream
    StreamError { partial: String, message: String },
}

/// A sequence of behaviors; each call to complete_stream pops the next one.
/// If the sequence is exhausted, the default behavior is used.
pub struct MockProvider {
    behaviors: Mutex<Vec<MockBehavior>>,
    default_behavior: MockBehavior,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(Vec::new()),
            default_behavior: behavior,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a mock that always answers with `text`
    pub fn text(text: impl Into<String>) -> Self {
        Self::constant(MockBehavior::Text(text.into()))
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors),
            default_behavior: MockBehavior::Text("(mock: sequence exhausted)".into()),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn call_count(&self) -> usize {
        *self.call_count.lock().await
    }

    /// Every request seen so far, oldest first.
    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().await.last().cloned()
    }

    async fn next_behavior(&self, request: LlmRequest) -> MockBehavior {
        *self.call_count.lock().await += 1;
        self.requests.lock().await.push(request);

        let mut behaviors = self.behaviors.lock().await;
        if behaviors.is_empty() {
            self.default_behavior.clone()
        } else {
            behaviors.remove(0)
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> &[&str] {
        &["mock"]
    }

    fn supports_model(&self, _model: &str) -> bool {
        true
    }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let behavior = self.next_behavior(request).await;

        if let MockBehavior::Error(msg) = behavior {
            return Err(LlmError::RequestFailed(msg));
        }

        Ok(Box::pin(stream! {
            match behavior {
                MockBehavior::Text(text) => {
                    // Stream text in chunks like a real LLM
                    let chars: Vec<char> = text.chars().collect();
                    for chunk in chars.chunks(20) {
                        yield Ok(StreamDelta::Text(chunk.iter().collect()));
                    }
                    yield Ok(StreamDelta::Done { stop_reason: Some("end_turn".into()), usage: None });
                }
                MockBehavior::StreamError { partial, message } => {
                    yield Ok(StreamDelta::Text(partial));
                    yield Err(LlmError::StreamError(message));
                }
                MockBehavior::Error(_) => {}
            }
        }))
    }
}
