//! Per-agent credential store with pluggable backends
//!
//! Blobs are opaque JSON objects owned by one agent. They never appear in
//! agent state files.

use courier_core::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type CredentialBlob = Map<String, Value>;

/// Where credential blobs live.
pub trait CredentialBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Write or overwrite a blob. Must not leave a partial file behind.
    fn save(&self, agent_id: &str, blob: &CredentialBlob) -> Result<()>;

    /// `Ok(None)` when nothing is stored; an unreadable blob is an error.
    fn load(&self, agent_id: &str) -> Result<Option<CredentialBlob>>;

    /// Returns whether anything was removed.
    fn delete(&self, agent_id: &str) -> Result<bool>;
}

/// One `<id>.json` per agent, written via temp file + rename.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", agent_id))
    }
}

impl CredentialBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn save(&self, agent_id: &str, blob: &CredentialBlob) -> Result<()> {
        Error::check_id(agent_id)?;
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(blob)?;
        write_atomic(&self.path_for(agent_id), json.as_bytes())?;
        debug!("Saved credentials for agent {}", agent_id);
        Ok(())
    }

    fn load(&self, agent_id: &str) -> Result<Option<CredentialBlob>> {
        Error::check_id(agent_id)?;
        let path = self.path_for(agent_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credentials file found for agent {}", agent_id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(blob)) => Ok(Some(blob)),
            Ok(_) => Err(Error::credential(format!("{} is not a JSON object", path.display()))),
            Err(e) => Err(Error::credential(format!("{}: {}", path.display(), e))),
        }
    }

    fn delete(&self, agent_id: &str) -> Result<bool> {
        Error::check_id(agent_id)?;
        match std::fs::remove_file(self.path_for(agent_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to `<path>.tmp` then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

const GMAIL_VARS: [(&str, &str); 6] = [
    ("GMAIL_CLIENT_ID", "client_id"),
    ("GMAIL_CLIENT_SECRET", "client_secret"),
    ("GMAIL_REDIRECT_URI", "redirect_uri"),
    ("GMAIL_ACCESS_TOKEN", "access_token"),
    ("GMAIL_REFRESH_TOKEN", "refresh_token"),
    ("GMAIL_EXPIRY_DATE", "expiry_date"),
];

/// Serves mail agents from `GMAIL_*` variables; everything else falls
/// through to a file backend. Saves and deletes are no-ops.
pub struct EnvBackend {
    vars: HashMap<String, String>,
    fallback: FileBackend,
}

impl EnvBackend {
    /// Snapshot the process environment.
    pub fn from_env(fallback_dir: impl Into<PathBuf>) -> Self {
        let vars = GMAIL_VARS
            .iter()
            .filter_map(|(var, _)| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self::with_vars(vars, fallback_dir)
    }

    pub fn with_vars(vars: HashMap<String, String>, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars,
            fallback: FileBackend::new(fallback_dir),
        }
    }

    fn serves(agent_id: &str) -> bool {
        agent_id.starts_with("mail") || agent_id.starts_with("gmail")
    }

    fn mail_blob(&self) -> Option<CredentialBlob> {
        let required = ["GMAIL_CLIENT_ID", "GMAIL_CLIENT_SECRET", "GMAIL_REDIRECT_URI"];
        if !required.iter().all(|k| self.vars.contains_key(*k)) {
            return None;
        }
        let mut blob = CredentialBlob::new();
        for (var, field) in GMAIL_VARS {
            let Some(raw) = self.vars.get(var) else { continue };
            let value = if field == "expiry_date" {
                match raw.trim().parse::<i64>() {
                    Ok(ms) => Value::from(ms),
                    Err(_) => {
                        warn!("Ignoring non-numeric GMAIL_EXPIRY_DATE");
                        continue;
                    }
                }
            } else {
                Value::String(raw.clone())
            };
            blob.insert(field.to_string(), value);
        }
        Some(blob)
    }
}

impl CredentialBackend for EnvBackend {
    fn name(&self) -> &str {
        "env"
    }

    fn save(&self, agent_id: &str, _blob: &CredentialBlob) -> Result<()> {
        info!("Environment credential backend: not saving credentials for agent {}", agent_id);
        Ok(())
    }

    fn load(&self, agent_id: &str) -> Result<Option<CredentialBlob>> {
        if Self::serves(agent_id) {
            if let Some(blob) = self.mail_blob() {
                debug!("Loaded mail credentials from environment for {}", agent_id);
                return Ok(Some(blob));
            }
            info!("Mail environment variables not set, falling back to file for {}", agent_id);
        }
        self.fallback.load(agent_id)
    }

    fn delete(&self, agent_id: &str) -> Result<bool> {
        info!("Environment credential backend: not deleting credentials for agent {}", agent_id);
        Ok(false)
    }
}

/// Cheap-to-clone handle over a backend.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn save(&self, agent_id: &str, blob: &CredentialBlob) -> Result<()> {
        self.backend.save(agent_id, blob)
    }

    pub fn load(&self, agent_id: &str) -> Result<Option<CredentialBlob>> {
        self.backend.load(agent_id)
    }

    pub fn delete(&self, agent_id: &str) -> Result<bool> {
        self.backend.delete(agent_id)
    }
}
