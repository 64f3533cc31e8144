//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Remote session seam and scoped session acquisition."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Credentials;

/// An authenticated connection to the remote file store.
///
/// Calls block; callers on the async runtime run them on the blocking pool.
pub trait RemoteSession: Send {
    /// Create `path` and any missing parents. Existing directories are fine.
    fn ensure_dir(&mut self, path: &str) -> Result<()>;

    /// Full contents of a file, or [`StoreError::NotFound`](crate::StoreError::NotFound)
    /// when it does not exist.
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite a file.
    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<()>;

    fn remove_file(&mut self, path: &str) -> Result<()>;

    /// Politely end the session. The session is unusable afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Opens sessions for caller-supplied credentials.
pub trait Connector: Send + Sync + 'static {
    /// Short backend label for logs and the status endpoint.
    fn name(&self) -> &'static str;

    /// Fails with [`StoreError::Connection`](crate::StoreError::Connection) on any
    /// connect, TLS, or login failure. Never retries.
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteSession>>;
}

/// Open a session, run `op`, and close the session on every exit path.
///
/// The error from `op` wins over a close failure; a close failure after a
/// successful `op` is only logged.
pub fn with_session<T>(
    connector: &dyn Connector,
    credentials: &Credentials,
    op: impl FnOnce(&mut dyn RemoteSession) -> Result<T>,
) -> Result<T> {
    credentials.validate()?;
    let mut session = connector.connect(credentials)?;
    debug!(backend = connector.name(), host = %credentials.host, "remote session opened");

    let outcome = op(session.as_mut());

    if let Err(err) = session.close() {
        warn!(backend = connector.name(), host = %credentials.host, error = %err, "failed to close remote session");
    } else {
        debug!(backend = connector.name(), host = %credentials.host, "remote session closed");
    }
    outcome
}
