//! Anthropic Messages API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> &[&str] {
        &["claude-haiku-4-5", "claude-sonnet-4", "claude-opus-4"]
    }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens.unwrap_or(1024),
            stream: true,
            system: request.system.clone(),
            temperature: request.temperature,
        };

        debug!("Anthropic request: model={}", body.model);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);
            return Err(status_error(status.as_u16(), error_text));
        }

        let stream = parse_sse_stream(response.bytes_stream());
        Ok(Box::pin(stream))
    }
}

pub(crate) fn status_error(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthFailed(body),
        429 => LlmError::RateLimited { retry_after_ms: 60000 },
        _ => LlmError::RequestFailed(format!("{}: {}", status, body)),
    }
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    continue;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_str = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                for item in parse_sse_event(&event_str) {
                    yield item;
                }
            }
        }
    }
}

/// Decode one `event:`/`data:` block into zero or more deltas.
pub(crate) fn parse_sse_event(event_str: &str) -> Vec<LlmResult<StreamDelta>> {
    let mut event_type = "";
    let mut event_data = "";

    for line in event_str.lines() {
        if let Some(rest) = line.strip_prefix("event: ") {
            event_type = rest;
        } else if let Some(rest) = line.strip_prefix("data: ") {
            event_data = rest;
        }
    }

    if event_data.is_empty() {
        return Vec::new();
    }

    match event_type {
        "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(event_data) {
            Ok(ContentBlockDelta { delta: DeltaType::TextDelta { text } }) => {
                vec![Ok(StreamDelta::Text(text))]
            }
            _ => Vec::new(),
        },
        "message_delta" => {
            if let Ok(data) = serde_json::from_str::<MessageDelta>(event_data) {
                if let Some(stop_reason) = data.delta.stop_reason {
                    debug!("Message complete: stop_reason={}", stop_reason);
                }
            }
            Vec::new()
        }
        "message_stop" => vec![Ok(StreamDelta::Done {
            stop_reason: Some("end_turn".to_string()),
            usage: None,
        })],
        "error" => match serde_json::from_str::<ErrorEvent>(event_data) {
            Ok(data) => vec![Err(LlmError::StreamError(data.error.message))],
            Err(_) => vec![Err(LlmError::StreamError(event_data.to_string()))],
        },
        _ => Vec::new(),
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    #[allow(dead_code)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
