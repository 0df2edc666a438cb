// src/workspace/mod.rs

//! Workspace store - session directories on disk
//!
//! Each session owns one directory under the configured root:
//!
//! ```text
//! <root>/<session-id>/
//!   config/repos.yaml        # Spack config scope: session repo, then shared repos
//!   spack-repo/repo.yaml     # repo namespace
//!   spack-repo/packages/     # recipes: packages/<name>/package.py
//!   logs/                    # validate scripts and captured logs
//!   .session.lock            # advisory lock file
//! ```
//!
//! Sessions exist only when created through [`WorkspaceStore::create`]. A
//! directory that merely looks like a session is never adopted.
//!
//! # Deletion
//!
//! Deletion takes the session lock, removes the registry entry, renames the
//! directory to a `.trash-*` name (atomic on one filesystem), then removes the
//! renamed tree. A reader therefore sees either the whole session or nothing.

pub mod guard;
pub mod lock;

pub use lock::SessionLock;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recipe repository directory inside a session
pub const REPO_DIR: &str = "spack-repo";
/// Spack configuration scope inside a session
pub const CONFIG_DIR: &str = "config";
/// Scripts and captured logs inside a session
pub const LOGS_DIR: &str = "logs";

const TRASH_PREFIX: &str = ".trash-";

/// Workspace store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding all session directories
    pub root: PathBuf,
    /// Idle time after which the sweep deletes a session
    pub idle_ttl: Option<Duration>,
    /// Repositories listed after the session repo in repos.yaml
    pub shared_repos: Vec<PathBuf>,
}

impl StoreConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            idle_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            shared_repos: Vec::new(),
        }
    }

    /// Set the idle TTL (`None` disables sweeping)
    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Set the shared repositories
    pub fn with_shared_repos(mut self, repos: Vec<PathBuf>) -> Self {
        self.shared_repos = repos;
        self
    }
}

/// Snapshot of one session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub root: PathBuf,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Recipe repository root
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR)
    }

    /// Spack configuration scope
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    /// Scripts and logs
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }
}

/// Kind of a listed session entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// One entry in a session listing, path relative to the session root
#[derive(Debug, Clone, Serialize)]
pub struct SessionFile {
    pub name: String,
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Top level of a session plus its package directories
#[derive(Debug, Clone, Serialize)]
pub struct SessionFiles {
    pub session_files: Vec<SessionFile>,
    pub packages: Vec<SessionFile>,
}

/// Registry entry for a live session
struct SessionEntry {
    id: String,
    root: PathBuf,
    namespace: String,
    created_at: DateTime<Utc>,
    last_used: SyncMutex<DateTime<Utc>>,
    lock: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn snapshot(&self, idle_ttl: Option<Duration>) -> Session {
        let last_used_at = *self.last_used.lock();
        let expires_at = idle_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| last_used_at + ttl);
        Session {
            id: self.id.clone(),
            root: self.root.clone(),
            namespace: self.namespace.clone(),
            created_at: self.created_at,
            last_used_at,
            expires_at,
        }
    }
}

/// Concurrent registry of session workspaces
pub struct WorkspaceStore {
    config: StoreConfig,
    sessions: DashMap<String, Arc<SessionEntry>>,
}

impl WorkspaceStore {
    /// Open the store, creating the root and clearing leftover trash
    pub fn new(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root).map_err(|e| {
            Error::AllocationError(format!(
                "cannot create sessions root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        for entry in fs::read_dir(&config.root)?.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(TRASH_PREFIX) {
                debug!("Removing leftover trash {:?}", entry.path());
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!("Failed to remove leftover trash {:?}: {}", entry.path(), e);
                }
            }
        }

        info!("Workspace store at {}", config.root.display());

        Ok(Self {
            config,
            sessions: DashMap::new(),
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Allocate a fresh session
    pub fn create(&self, namespace: Option<&str>) -> Result<Session> {
        let id = Uuid::new_v4().simple().to_string();
        let namespace = match namespace {
            Some(ns) => {
                validate_namespace(ns)?;
                ns.to_string()
            }
            None => format!("session.{}", &id[..8]),
        };

        let root = self.config.root.join(&id);

        // create_dir (not create_dir_all) so an existing directory is never reused
        fs::create_dir(&root).map_err(|e| {
            Error::AllocationError(format!("cannot create {}: {}", root.display(), e))
        })?;

        if let Err(e) = self.scaffold(&root, &namespace) {
            warn!(session_id = %id, "Scaffolding failed, cleaning up: {}", e);
            let _ = fs::remove_dir_all(&root);
            return Err(Error::AllocationError(format!(
                "cannot prepare {}: {}",
                root.display(),
                e
            )));
        }

        let now = Utc::now();
        let entry = Arc::new(SessionEntry {
            id: id.clone(),
            root,
            namespace,
            created_at: now,
            last_used: SyncMutex::new(now),
            lock: Arc::new(Mutex::new(())),
        });
        let session = entry.snapshot(self.config.idle_ttl);
        self.sessions.insert(id.clone(), entry);

        info!(session_id = %id, namespace = %session.namespace, "Session created");
        Ok(session)
    }

    fn scaffold(&self, root: &Path, namespace: &str) -> std::io::Result<()> {
        let repo_dir = root.join(REPO_DIR);
        fs::create_dir_all(repo_dir.join("packages"))?;
        fs::create_dir_all(root.join(CONFIG_DIR))?;
        fs::create_dir_all(root.join(LOGS_DIR))?;

        fs::write(
            repo_dir.join("repo.yaml"),
            format!("repo:\n  namespace: {}\n", namespace),
        )?;

        let mut repos = format!("repos:\n- {}\n", repo_dir.display());
        for shared in &self.config.shared_repos {
            repos.push_str(&format!("- {}\n", shared.display()));
        }
        fs::write(root.join(CONFIG_DIR).join("repos.yaml"), repos)?;

        Ok(())
    }

    /// True iff the session was created here and its directory is present
    pub fn exists(&self, id: &str) -> bool {
        self.sessions
            .get(id)
            .map(|entry| entry.root.is_dir())
            .unwrap_or(false)
    }

    fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        let entry = self
            .sessions
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;

        if !entry.root.is_dir() {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(entry)
    }

    /// Snapshot of a session
    pub fn get(&self, id: &str) -> Result<Session> {
        Ok(self.entry(id)?.snapshot(self.config.idle_ttl))
    }

    /// Root directory of a session
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        Ok(self.entry(id)?.root.clone())
    }

    /// Resolve a session-relative path, rejecting escapes
    pub fn resolve_path(&self, id: &str, relative: &Path) -> Result<PathBuf> {
        let root = self.resolve(id)?;
        guard::confine(&root, relative)
    }

    /// Top-level entries and package directories of a session
    ///
    /// Hidden entries (the lock file, scratch clones) are left out. Both
    /// lists are sorted by name.
    pub fn list_files(&self, id: &str) -> Result<SessionFiles> {
        let root = self.resolve(id)?;
        let session_files = list_dir(&root, &root, false)?;
        let packages_dir = root.join(REPO_DIR).join("packages");
        let packages = if packages_dir.is_dir() {
            list_dir(&root, &packages_dir, true)?
        } else {
            Vec::new()
        };
        Ok(SessionFiles {
            session_files,
            packages,
        })
    }

    /// Record activity for idle accounting
    pub fn touch(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        *entry.last_used.lock() = Utc::now();
        Ok(())
    }

    /// All live sessions, oldest first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|e| e.root.is_dir())
            .map(|e| e.snapshot(self.config.idle_ttl))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Take the session lock without blocking
    pub fn try_lock(&self, id: &str) -> Result<SessionLock> {
        let entry = self.entry(id)?;
        SessionLock::try_acquire(&entry.id, entry.lock.clone(), &entry.root)
    }

    /// Delete a session
    ///
    /// Returns `Ok(false)` when the session did not exist. Fails with
    /// `SessionBusy` while an invocation holds the session lock.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.sessions.get(id).map(|e| e.value().clone()) else {
            debug!(session_id = id, "Delete of unknown session ignored");
            return Ok(false);
        };

        if !entry.root.is_dir() {
            self.sessions.remove(id);
            return Ok(false);
        }

        let lock = SessionLock::try_acquire(&entry.id, entry.lock.clone(), &entry.root)?;
        self.remove_locked(&entry, lock)?;
        Ok(true)
    }

    fn remove_locked(&self, entry: &SessionEntry, lock: SessionLock) -> Result<()> {
        self.sessions.remove(&entry.id);

        let trash = self
            .config
            .root
            .join(format!("{}{}-{}", TRASH_PREFIX, entry.id, Uuid::new_v4().simple()));
        let renamed = fs::rename(&entry.root, &trash);
        drop(lock);

        match renamed {
            Ok(()) => {
                if let Err(e) = fs::remove_dir_all(&trash) {
                    warn!(session_id = %entry.id, "Failed to remove trash {:?}: {}", trash, e);
                }
            }
            Err(e) => {
                warn!(session_id = %entry.id, "Rename before delete failed ({}), removing in place", e);
                fs::remove_dir_all(&entry.root).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", entry.root.display(), e))
                })?;
            }
        }

        info!(session_id = %entry.id, "Session deleted");
        Ok(())
    }

    /// Delete sessions idle past the TTL, skipping locked ones
    ///
    /// Returns the ids that were removed.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(ttl) = self
            .config
            .idle_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        else {
            return Vec::new();
        };

        let expired: Vec<Arc<SessionEntry>> = self
            .sessions
            .iter()
            .filter(|e| *e.last_used.lock() + ttl <= now)
            .map(|e| e.value().clone())
            .collect();

        let mut removed = Vec::new();
        for entry in expired {
            if !entry.root.is_dir() {
                self.sessions.remove(&entry.id);
                removed.push(entry.id.clone());
                continue;
            }

            let lock = match SessionLock::try_acquire(&entry.id, entry.lock.clone(), &entry.root) {
                Ok(lock) => lock,
                Err(Error::SessionBusy(_)) => {
                    debug!(session_id = %entry.id, "Skipping busy session in sweep");
                    continue;
                }
                Err(e) => {
                    warn!(session_id = %entry.id, "Sweep could not lock session: {}", e);
                    continue;
                }
            };

            // Activity may have landed between the scan and the lock
            if *entry.last_used.lock() + ttl > now {
                continue;
            }

            match self.remove_locked(&entry, lock) {
                Ok(()) => removed.push(entry.id.clone()),
                Err(e) => warn!(session_id = %entry.id, "Sweep failed to delete session: {}", e),
            }
        }

        if !removed.is_empty() {
            info!("Idle sweep removed {} session(s)", removed.len());
        }
        removed
    }

    /// Run the idle sweep every `interval` until `shutdown` fires
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let store = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || store.sweep_idle(Utc::now())).await {
                            warn!("Idle sweep task failed: {}", e);
                        }
                    }
                }
            }
            debug!("Idle sweeper stopped");
        })
    }
}

/// Namespaces end up in repo.yaml and Python module paths
fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace.len() <= 64
        && namespace
            .split('.')
            .all(|part| {
                !part.is_empty()
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !part.starts_with(|c: char| c.is_ascii_digit())
            });

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!(
            "namespace '{}' must be dot-separated identifiers",
            namespace
        )))
    }
}

fn list_dir(root: &Path, dir: &Path, dirs_only: bool) -> Result<Vec<SessionFile>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() && !dirs_only {
            FileKind::File
        } else {
            continue;
        };
        let path = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));
        entries.push(SessionFile { name, path, kind });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> WorkspaceStore {
        WorkspaceStore::new(StoreConfig::new(temp_dir.path().join("sessions"))).unwrap()
    }

    #[test]
    fn test_create_scaffolds_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let session = store.create(None).unwrap();
        assert!(store.exists(&session.id));
        assert_eq!(session.namespace, format!("session.{}", &session.id[..8]));
        assert!(session.repo_dir().join("packages").is_dir());
        assert!(session.logs_dir().is_dir());

        let repo_yaml = fs::read_to_string(session.repo_dir().join("repo.yaml")).unwrap();
        assert!(repo_yaml.contains(&session.namespace));

        let repos_yaml = fs::read_to_string(session.config_dir().join("repos.yaml")).unwrap();
        assert!(repos_yaml.contains(&session.repo_dir().display().to_string()));
    }

    #[test]
    fn test_list_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        fs::create_dir_all(session.repo_dir().join("packages/zlib")).unwrap();
        fs::write(session.root.join("notes.txt"), "x").unwrap();

        let files = store.list_files(&session.id).unwrap();
        let names: Vec<&str> = files.session_files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["config", "logs", "notes.txt", "spack-repo"]);
        assert_eq!(files.session_files[2].kind, FileKind::File);
        assert_eq!(files.session_files[0].kind, FileKind::Directory);

        assert_eq!(files.packages.len(), 1);
        assert_eq!(files.packages[0].path, PathBuf::from("spack-repo/packages/zlib"));

        assert!(matches!(store.list_files("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_custom_namespace_and_shared_repos() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path().join("sessions"))
            .with_shared_repos(vec![PathBuf::from("/srv/curated")]);
        let store = WorkspaceStore::new(config).unwrap();

        let session = store.create(Some("team.builds")).unwrap();
        assert_eq!(session.namespace, "team.builds");
        let repos_yaml = fs::read_to_string(session.config_dir().join("repos.yaml")).unwrap();
        assert!(repos_yaml.ends_with("- /srv/curated\n"));

        assert!(matches!(
            store.create(Some("bad/ns")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(store.create(Some("9lives")), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_sessions_never_share_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let a = store.create(None).unwrap();
        let b = store.create(None).unwrap();
        assert_ne!(a.id, b.id);
        assert!(!a.root.starts_with(&b.root));
        assert!(!b.root.starts_with(&a.root));
    }

    #[test]
    fn test_unregistered_directory_is_not_a_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let fake = temp_dir.path().join("sessions").join("deadbeef");
        fs::create_dir_all(fake.join("spack-repo")).unwrap();

        assert!(!store.exists("deadbeef"));
        assert!(matches!(store.resolve("deadbeef"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();

        assert!(store.delete(&session.id).unwrap());
        assert!(!session.root.exists());
        assert!(!store.exists(&session.id));
        assert!(matches!(store.resolve(&session.id), Err(Error::NotFound(_))));

        assert!(!store.delete(&session.id).unwrap());
        assert!(!store.delete("never-existed").unwrap());

        // No trash left behind
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("sessions"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_while_locked_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();

        let lock = store.try_lock(&session.id).unwrap();
        assert!(matches!(store.delete(&session.id), Err(Error::SessionBusy(_))));
        assert!(session.root.exists());

        drop(lock);
        assert!(store.delete(&session.id).unwrap());
    }

    #[test]
    fn test_resolve_path_rejects_escape() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let a = store.create(None).unwrap();
        let b = store.create(None).unwrap();

        let escape = PathBuf::from("..").join(&b.id).join("spack-repo");
        assert!(matches!(
            store.resolve_path(&a.id, &escape),
            Err(Error::PathEscape(_))
        ));
        assert!(store.resolve_path(&a.id, Path::new("spack-repo/packages")).is_ok());
    }

    #[test]
    fn test_sweep_skips_busy_and_fresh_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path().join("sessions"))
            .with_idle_ttl(Some(Duration::from_secs(60)));
        let store = WorkspaceStore::new(config).unwrap();

        let idle = store.create(None).unwrap();
        let busy = store.create(None).unwrap();
        let fresh = store.create(None).unwrap();
        let _lock = store.try_lock(&busy.id).unwrap();

        // Pretend two minutes pass, except for `fresh`
        let later = Utc::now() + chrono::Duration::seconds(120);
        *store.sessions.get(&fresh.id).unwrap().last_used.lock() = later;

        let removed = store.sweep_idle(later);
        assert_eq!(removed, vec![idle.id.clone()]);
        assert!(!store.exists(&idle.id));
        assert!(store.exists(&busy.id));
        assert!(store.exists(&fresh.id));
    }

    #[test]
    fn test_sweep_disabled_without_ttl() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path().join("sessions")).with_idle_ttl(None);
        let store = WorkspaceStore::new(config).unwrap();
        let session = store.create(None).unwrap();

        let far_future = Utc::now() + chrono::Duration::days(365);
        assert!(store.sweep_idle(far_future).is_empty());
        assert!(store.exists(&session.id));
    }

    #[test]
    fn test_new_clears_leftover_trash() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sessions");
        fs::create_dir_all(root.join(".trash-old/spack-repo")).unwrap();

        let _store = WorkspaceStore::new(StoreConfig::new(&root)).unwrap();
        assert!(!root.join(".trash-old").exists());
    }
}
