//! General-purpose assistant backed by the configured language model

use crate::agent::{AgentContext, APOLOGY};
use crate::memory::Memory;
use courier_llm::LlmRequest;
use tracing::error;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that can help with general queries and coordinate with other specialized agents.
You can help the user manage their tasks, answer questions, and provide information.
If the user asks about specific services like email or spreadsheets, suggest they connect those services for more specialized help.";

pub struct DefaultAgent;

impl DefaultAgent {
    /// Complete over the recent conversation. `memory` already holds `message`.
    pub async fn reply(&self, id: &str, message: &str, memory: &Memory, ctx: &AgentContext) -> String {
        let Some(llm) = ctx.llm.as_deref() else {
            return format!(
                "I'm a default assistant without a language model configured. To use my full capabilities, set ANTHROPIC_API_KEY or OPENAI_API_KEY. For now, I can only echo your message: \"{}\"",
                message
            );
        };

        let request = LlmRequest {
            model: ctx.settings.model.clone(),
            system: Some(SYSTEM_PROMPT.into()),
            messages: memory.context(),
            max_tokens: Some(ctx.settings.max_tokens),
            temperature: Some(ctx.settings.temperature),
        };
        match llm.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                error!("Agent {}: {} completion failed: {}", id, llm.name(), e);
                APOLOGY.into()
            }
        }
    }
}
