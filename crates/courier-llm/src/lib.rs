//! Courier LLM - completion providers behind a streaming trait

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use mock::{MockBehavior, MockProvider};
pub use openai::OpenAiProvider;
pub use provider::{collect_text, LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;
