//! Message routing: pick which active agent answers a free-text message

use async_trait::async_trait;
use courier_core::{AgentKind, Error, Result, DEFAULT_AGENT_ID};
use courier_llm::{LlmProvider, LlmRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// An active agent the router may pick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteCandidate {
    pub id: String,
    pub kind: AgentKind,
    pub name: String,
    /// Mail agents with a working mailbox connection.
    pub connected: bool,
}

/// Names the agent type that should handle a message.
#[async_trait]
pub trait AgentClassifier: Send + Sync {
    /// Returns a raw type token such as `"mail"`.
    async fn classify(&self, message: &str, candidates: &[RouteCandidate]) -> Result<String>;
}

/// Classifier that asks a language model.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub fn prompt(candidates: &[RouteCandidate]) -> String {
        let agents: Vec<String> = candidates
            .iter()
            .map(|c| format!("- {} ({}): {}", c.kind, c.name, c.kind.description()))
            .collect();
        format!(
            "You are an agent router that determines which specialized agent should handle a user's request.\n\
             Available agents:\n{}\n\n\
             Return ONLY the agent type that should handle the request. If unsure, return \"default\".",
            agents.join("\n")
        )
    }
}

#[async_trait]
impl AgentClassifier for LlmClassifier {
    async fn classify(&self, message: &str, candidates: &[RouteCandidate]) -> Result<String> {
        let request = LlmRequest::single(&self.model, Self::prompt(candidates), message)
            .with_max_tokens(50)
            .with_temperature(0.3);
        self.llm
            .complete(request)
            .await
            .map_err(|e| Error::provider(self.llm.name(), e.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct Router {
    classifier: Option<Arc<dyn AgentClassifier>>,
}

impl Router {
    pub fn new(classifier: Arc<dyn AgentClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// A router that always answers `default`.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Pick the id of the agent that should answer. Never fails; anything
    /// unexpected routes to `default`.
    pub async fn select_agent(&self, message: &str, candidates: &[RouteCandidate]) -> String {
        if candidates.len() <= 1 {
            return DEFAULT_AGENT_ID.to_string();
        }
        let Some(classifier) = &self.classifier else {
            return DEFAULT_AGENT_ID.to_string();
        };

        let token = match classifier.classify(message, candidates).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Agent classification failed, routing to default: {}", e);
                return DEFAULT_AGENT_ID.to_string();
            }
        };
        let Some(kind) = parse_kind(&token) else {
            debug!("Classifier returned unrecognised type {:?}, routing to default", token);
            return DEFAULT_AGENT_ID.to_string();
        };

        let matching: Vec<&RouteCandidate> = candidates.iter().filter(|c| c.kind == kind).collect();
        let chosen = match kind {
            AgentKind::Mail => matching
                .iter()
                .find(|c| c.connected)
                .or_else(|| matching.iter().rev().max_by_key(|c| id_suffix(&c.id))),
            _ => matching.first(),
        };
        match chosen {
            Some(c) => {
                debug!("Routing message to {} agent {}", kind, c.id);
                c.id.clone()
            }
            None => {
                debug!("No active {} agent, routing to default", kind);
                DEFAULT_AGENT_ID.to_string()
            }
        }
    }
}

fn parse_kind(token: &str) -> Option<AgentKind> {
    let cleaned = token
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric());
    cleaned.parse().ok()
}

/// Numeric part after the first `-`, e.g. `mail-1700000005000`.
pub fn id_suffix(id: &str) -> Option<u64> {
    id.split_once('-')?.1.parse().ok()
}
