//! Agent registry: creation, dispatch, persistence and restoration

use crate::agent::{Agent, AgentContext, AgentSnapshot};
use crate::credentials::{write_atomic, CredentialBlob};
use crate::router::{RouteCandidate, Router};
use courier_core::{
    AgentKind, AgentSummary, AgentTypeInfo, Command, CommandResult, Error, Result, RoutedReply, DEFAULT_AGENT_ID,
};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Shared handle to a live agent. Holding the lock serializes work on that agent.
pub type AgentHandle = Arc<Mutex<Agent>>;

struct RegisteredAgent {
    seq: u64,
    handle: AgentHandle,
    /// Routing flags as last observed, read while the agent is busy.
    route: RouteStatus,
}

#[derive(Clone)]
struct RouteStatus {
    active: bool,
    candidate: RouteCandidate,
}

impl RouteStatus {
    fn of(agent: &Agent) -> Self {
        Self {
            active: agent.is_active(),
            candidate: RouteCandidate {
                id: agent.id().to_string(),
                kind: agent.kind(),
                name: agent.name().to_string(),
                connected: agent.is_connected(),
            },
        }
    }
}

/// Holds an id reserved by an in-flight `create` until it returns.
struct Reservation<'a> {
    pending: &'a DashSet<String>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    pub name: Option<String>,
    /// Initial credential blob, merged under anything already stored.
    pub credentials: Option<CredentialBlob>,
}

impl CreateOptions {
    pub fn with_credentials(credentials: CredentialBlob) -> Self {
        Self {
            credentials: Some(credentials),
            ..Default::default()
        }
    }
}

pub struct AgentRegistry {
    agents: DashMap<String, RegisteredAgent>,
    creating: DashSet<String>,
    next_seq: AtomicU64,
    state_dir: PathBuf,
    ctx: AgentContext,
    router: Router,
}

impl AgentRegistry {
    pub fn new(state_dir: impl Into<PathBuf>, ctx: AgentContext) -> Self {
        Self {
            agents: DashMap::new(),
            creating: DashSet::new(),
            next_seq: AtomicU64::new(0),
            state_dir: state_dir.into(),
            ctx,
            router: Router::disabled(),
        }
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn available_types(&self) -> Vec<AgentTypeInfo> {
        AgentKind::ALL.iter().map(AgentKind::info).collect()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Create, start and register an agent. A start failure leaves nothing registered.
    pub async fn create(&self, agent_type: &str, id: &str, options: CreateOptions) -> Result<AgentHandle> {
        Error::check_id(id)?;
        let kind: AgentKind = agent_type.parse()?;
        let _reservation = self.reserve(id)?;

        let mut agent = Agent::new(kind, id, options.name, options.credentials, self.ctx.clone())?;
        agent.start().await?;
        let handle = self.register(id, agent)?;
        info!("Created {} agent {}", kind, id);
        self.persist(id).await;
        Ok(handle)
    }

    /// Claim `id` for a pending create. Registration clears the claim only
    /// after inserting, so checking the map after claiming sees either one.
    fn reserve(&self, id: &str) -> Result<Reservation<'_>> {
        if !self.creating.insert(id.to_string()) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        let reservation = Reservation {
            pending: &self.creating,
            id: id.to_string(),
        };
        if self.agents.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        Ok(reservation)
    }

    fn register(&self, id: &str, agent: Agent) -> Result<AgentHandle> {
        match self.agents.entry(id.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateId(id.to_string())),
            Entry::Vacant(slot) => {
                let route = RouteStatus::of(&agent);
                let handle = Arc::new(Mutex::new(agent));
                slot.insert(RegisteredAgent {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    handle: handle.clone(),
                    route,
                });
                Ok(handle)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<AgentHandle> {
        self.agents.get(id).map(|r| r.handle.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Handles in registration order.
    fn ordered_handles(&self) -> Vec<(String, AgentHandle)> {
        let mut entries: Vec<(u64, String, AgentHandle)> = self
            .agents
            .iter()
            .map(|r| (r.seq, r.key().clone(), r.handle.clone()))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries.into_iter().map(|(_, id, handle)| (id, handle)).collect()
    }

    /// Every registered agent with its status, in registration order.
    pub async fn list_active(&self) -> Vec<AgentSummary> {
        let mut out = Vec::new();
        for (_, handle) in self.ordered_handles() {
            out.push(handle.lock().await.summary());
        }
        out
    }

    /// Stop and unregister an agent, deleting its state file and credentials.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let handle = self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        {
            let mut agent = handle.lock().await;
            if let Err(e) = agent.stop() {
                error!("Failed to stop agent {} during removal: {}", id, e);
            }
        }
        self.agents.remove(id);

        match std::fs::remove_file(self.state_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!("Failed to delete state file for agent {}: {}", id, e),
        }
        if let Err(e) = self.ctx.credentials.delete(id) {
            error!("Failed to delete credentials for agent {}: {}", id, e);
        }
        info!("Removed agent {}", id);
        Ok(())
    }

    /// The reserved default agent, created on first use.
    async fn ensure_default(&self) -> Result<AgentHandle> {
        if let Some(handle) = self.get(DEFAULT_AGENT_ID) {
            return Ok(handle);
        }
        let mut agent = Agent::new(AgentKind::Default, DEFAULT_AGENT_ID, None, None, self.ctx.clone())?;
        agent.start().await?;
        let handle = self
            .agents
            .entry(DEFAULT_AGENT_ID.to_string())
            .or_insert_with(|| {
                info!("Created default agent on demand");
                RegisteredAgent {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    route: RouteStatus::of(&agent),
                    handle: Arc::new(Mutex::new(agent)),
                }
            })
            .handle
            .clone();
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub async fn dispatch_message(&self, id: &str, message: &str) -> Result<String> {
        let handle = match self.get(id) {
            Some(handle) => handle,
            None if id == DEFAULT_AGENT_ID => self.ensure_default().await?,
            None => return Err(Error::NotFound(id.to_string())),
        };
        let mut agent = handle.lock().await;
        let reply = agent.process(message).await;
        self.record_route(&agent);
        self.write_state(&agent);
        Ok(reply)
    }

    pub async fn dispatch_command(&self, id: &str, command: &Command) -> Result<CommandResult> {
        let handle = self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut agent = handle.lock().await;
        let result = agent.execute_command(command).await;
        self.record_route(&agent);
        self.write_state(&agent);
        Ok(result)
    }

    fn record_route(&self, agent: &Agent) {
        if let Some(mut entry) = self.agents.get_mut(agent.id()) {
            entry.route = RouteStatus::of(agent);
        }
    }

    /// Routing flags for every agent in registration order. Agents busy with
    /// another request report their last recorded flags instead of blocking.
    fn route_statuses(&self) -> Vec<RouteStatus> {
        let mut out = Vec::new();
        for (id, handle) in self.ordered_handles() {
            match handle.try_lock() {
                Ok(agent) => {
                    let status = RouteStatus::of(&agent);
                    self.record_route(&agent);
                    out.push(status);
                }
                Err(_) => {
                    if let Some(entry) = self.agents.get(&id) {
                        out.push(entry.route.clone());
                    }
                }
            }
        }
        out
    }

    /// Route `message` to the best active agent and dispatch it there.
    pub async fn process_with_routing(&self, message: &str) -> Result<RoutedReply> {
        let candidates: Vec<RouteCandidate> = self
            .route_statuses()
            .into_iter()
            .filter(|s| s.active)
            .map(|s| s.candidate)
            .collect();
        let agent_id = self.router.select_agent(message, &candidates).await;
        debug!("Routed message to {}", agent_id);
        let response = self.dispatch_message(&agent_id, message).await?;
        Ok(RoutedReply { agent_id, response })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn state_path(&self, id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", id))
    }

    /// Rewrite one agent's state file. No-op for unknown ids; failures are logged.
    pub async fn persist(&self, id: &str) {
        let Some(handle) = self.get(id) else {
            debug!("Not persisting unknown agent {}", id);
            return;
        };
        let agent = handle.lock().await;
        self.write_state(&agent);
    }

    fn write_state(&self, agent: &Agent) {
        if let Err(e) = self.try_write_state(agent) {
            error!("Failed to persist agent {}: {}", agent.id(), e);
        }
    }

    fn try_write_state(&self, agent: &Agent) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let json = serde_json::to_string_pretty(&agent.snapshot())?;
        write_atomic(&self.state_path(agent.id()), json.as_bytes())?;
        Ok(())
    }

    /// Load every state file under the state directory. Returns how many
    /// agents were registered. Bad records are logged and skipped.
    pub async fn restore_all(&self) -> usize {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No agent state directory at {}", self.state_dir.display());
                return 0;
            }
            Err(e) => {
                error!("Failed to read agent state directory {}: {}", self.state_dir.display(), e);
                return 0;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut restored = 0;
        for path in paths {
            let Some(snapshot) = read_snapshot(&path) else { continue };
            let id = snapshot.id.clone();
            if self.contains(&id) {
                debug!("Agent {} already registered, skipping {}", id, path.display());
                continue;
            }

            let was_active = snapshot.active;
            let mut agent = match Agent::from_snapshot(snapshot, self.ctx.clone()) {
                Ok(agent) => agent,
                Err(e) => {
                    error!("Failed to rebuild agent from {}: {}", path.display(), e);
                    continue;
                }
            };
            if was_active {
                if let Err(e) = agent.start().await {
                    error!("Failed to start restored agent {}: {}", id, e);
                }
            }
            match self.register(&id, agent) {
                Ok(_) => {
                    info!("Restored agent {}", id);
                    restored += 1;
                }
                Err(e) => warn!("Skipping restored agent {}: {}", id, e),
            }
        }
        info!("Restored {} agents from {}", restored, self.state_dir.display());
        restored
    }

    /// Stop and persist every agent. One agent's failure does not stop the rest.
    pub async fn shutdown_all(&self) {
        for (id, handle) in self.ordered_handles() {
            let mut agent = handle.lock().await;
            let stopped = agent.stop();
            self.record_route(&agent);
            if let Err(e) = stopped {
                error!("Failed to stop agent {}: {}", id, e);
                continue;
            }
            self.write_state(&agent);
        }
        info!("All agents shut down");
    }
}

/// Parse a state file. The file stem is authoritative for the id.
fn read_snapshot(path: &Path) -> Option<AgentSnapshot> {
    let id = path.file_stem()?.to_str()?.to_string();
    if let Err(e) = Error::check_id(&id) {
        warn!("Skipping {}: {}", path.display(), e);
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            error!("Corrupt agent record {}: {}", path.display(), e);
            return None;
        }
    };
    let type_token = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if serde_json::from_value::<AgentKind>(Value::String(type_token.to_string())).is_err() {
        warn!("Skipping {}: unknown agent type {:?}", path.display(), type_token);
        return None;
    }
    match serde_json::from_value::<AgentSnapshot>(value) {
        Ok(mut snapshot) => {
            snapshot.id = id;
            Some(snapshot)
        }
        Err(e) => {
            error!("Corrupt agent record {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use serde_json::json;

    fn registry(tmp: &tempfile::TempDir) -> AgentRegistry {
        let ctx = AgentContext::new(CredentialStore::file(tmp.path().join("credentials")));
        AgentRegistry::new(tmp.path().join("agents"), ctx)
    }

    #[tokio::test]
    async fn pending_create_turns_away_same_id_before_starting() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(&tmp);
        let claim = reg.reserve("sheet-1").unwrap();

        let mut creds = CredentialBlob::new();
        creds.insert("api_key".into(), json!("k"));
        let second = reg.create("spreadsheet", "sheet-1", CreateOptions::with_credentials(creds)).await;
        assert!(matches!(second, Err(Error::DuplicateId(id)) if id == "sheet-1"));
        assert!(reg.is_empty());
        assert!(!tmp.path().join("agents").join("sheet-1.json").exists());

        drop(claim);
        assert!(reg.create("spreadsheet", "sheet-1", CreateOptions::default()).await.is_ok());
        assert!(reg.reserve("sheet-1").is_err());
        assert!(reg.creating.is_empty());
    }
}
