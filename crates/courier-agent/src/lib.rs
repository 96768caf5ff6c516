//! Courier Agent - agent variants, credential store, registry and router

pub mod agent;
pub mod credentials;
pub mod default;
pub mod mail;
pub mod memory;
pub mod registry;
pub mod router;
pub mod spreadsheet;

pub use agent::{Agent, AgentContext, AgentSettings, AgentSnapshot, CredentialInfo, APOLOGY};
pub use credentials::{CredentialBackend, CredentialBlob, CredentialStore, EnvBackend, FileBackend};
pub use mail::{AuthState, MailAgent, MailCredentials, MailIntent};
pub use memory::{Memory, MemoryEntry, CONTEXT_WINDOW, MEMORY_CAP};
pub use registry::{AgentHandle, AgentRegistry, CreateOptions};
pub use router::{id_suffix, AgentClassifier, LlmClassifier, RouteCandidate, Router};
