//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Process-local remote store backend for demos and tests."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::Credentials;
use crate::session::{Connector, RemoteSession};

/// Operation that an injected fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FaultPoint {
    Read,
    Write,
    Remove,
}

impl FaultPoint {
    fn operation(&self) -> &'static str {
        match self {
            FaultPoint::Read => "read",
            FaultPoint::Write => "write",
            FaultPoint::Remove => "delete",
        }
    }
}

#[derive(Debug)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    faults: BTreeSet<(FaultPoint, String)>,
    open_sessions: usize,
    sessions_opened: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::from(["/".to_owned()]),
            faults: BTreeSet::new(),
            open_sessions: 0,
            sessions_opened: 0,
        }
    }
}

impl State {
    fn check_fault(&self, point: FaultPoint, path: &str) -> Result<()> {
        if self.faults.contains(&(point, path.to_owned())) {
            return Err(StoreError::transport(
                point.operation(),
                path,
                "injected fault",
            ));
        }
        Ok(())
    }

    fn create_dirs(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.dirs.insert(current.clone());
        }
    }
}

/// Shared in-memory file tree. Clones observe the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating its parent directories.
    pub fn put_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();
        if let Some(parent) = parent_dir(path) {
            state.create_dirs(parent);
        }
        state.files.insert(path.to_owned(), contents.into());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().dirs.contains(path)
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Make every later `point` operation on `path` fail with a transport error.
    pub fn inject_fault(&self, point: FaultPoint, path: impl Into<String>) {
        self.state.lock().faults.insert((point, path.into()));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().sessions_opened
    }
}

/// Connector handing out sessions on a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
    login: Option<(String, String)>,
}

impl MemoryConnector {
    /// Connector that accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self { store, login: None }
    }

    /// Only accept this user/password pair.
    pub fn require_login(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some((user.into(), password.into()));
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteSession>> {
        if let Some((user, password)) = &self.login {
            if &credentials.user != user || &credentials.password != password {
                return Err(StoreError::Connection {
                    host: credentials.host.clone(),
                    port: credentials.effective_port(),
                    reason: "530 login incorrect".to_owned(),
                });
            }
        }
        {
            let mut state = self.store.state.lock();
            state.open_sessions += 1;
            state.sessions_opened += 1;
        }
        debug!(host = %credentials.host, user = %credentials.user, "memory session opened");
        Ok(Box::new(MemorySession {
            store: self.store.clone(),
            closed: false,
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self, operation: &'static str, path: &str) -> Result<()> {
        if self.closed {
            return Err(StoreError::transport(operation, path, "session closed"));
        }
        Ok(())
    }
}

impl RemoteSession for MemorySession {
    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_open("mkdir", path)?;
        self.store.state.lock().create_dirs(path);
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        self.ensure_open("read", path)?;
        let state = self.store.state.lock();
        state.check_fault(FaultPoint::Read, path)?;
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_owned(),
            })
    }

    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        self.ensure_open("write", path)?;
        let mut state = self.store.state.lock();
        state.check_fault(FaultPoint::Write, path)?;
        let parent = parent_dir(path).unwrap_or("/");
        if !state.dirs.contains(parent) {
            return Err(StoreError::transport(
                "write",
                path,
                format!("550 directory {parent} does not exist"),
            ));
        }
        state.files.insert(path.to_owned(), contents.to_vec());
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.ensure_open("delete", path)?;
        let mut state = self.store.state.lock();
        state.check_fault(FaultPoint::Remove, path)?;
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::transport(
                "delete",
                path,
                "550 no such file",
            )),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.store.state.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
        Ok(())
    }
}

fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}
