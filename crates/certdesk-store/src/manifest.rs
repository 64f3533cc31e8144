//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Manifest document: remote read/write and in-memory edits."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::Certificate;
use crate::session::RemoteSession;

/// Ordered certificate list. Edits keep certificate numbers unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: Vec<Certificate>,
}

impl Manifest {
    pub fn new(records: Vec<Certificate>) -> Self {
        Self { records }
    }

    /// Parse the remote document. `path` only feeds the error message.
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self> {
        let records: Vec<Certificate> =
            serde_json::from_slice(bytes).map_err(|source| StoreError::ManifestCorrupt {
                path: path.to_owned(),
                source,
            })?;
        Ok(Self::new(records))
    }

    /// Pretty-printed JSON array.
    pub fn to_json(&self) -> Vec<u8> {
        // Serialising plain string fields into a Vec cannot fail.
        serde_json::to_vec_pretty(&self.records).unwrap_or_else(|_| b"[]".to_vec())
    }

    pub fn records(&self) -> &[Certificate] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Certificate> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, cert_number: &str) -> Option<&Certificate> {
        self.records
            .iter()
            .find(|record| record.cert_number == cert_number)
    }

    /// Drop any record with the same number and put `record` first.
    /// Returns the record it replaced.
    pub fn upsert_front(&mut self, record: Certificate) -> Option<Certificate> {
        let previous = self.remove(&record.cert_number);
        self.records.insert(0, record);
        previous
    }

    /// Filter out every record with this number, returning the first one.
    pub fn remove(&mut self, cert_number: &str) -> Option<Certificate> {
        let mut removed = None;
        self.records.retain(|record| {
            if record.cert_number != cert_number {
                return true;
            }
            if removed.is_none() {
                removed = Some(record.clone());
            }
            false
        });
        removed
    }
}

/// Fetch the manifest; an absent file is an empty manifest.
pub fn read_manifest(session: &mut dyn RemoteSession, path: &str) -> Result<Manifest> {
    match read_existing_manifest(session, path) {
        Err(err) if err.is_not_found() => {
            debug!(path, "manifest absent; treating as empty");
            Ok(Manifest::default())
        }
        other => other,
    }
}

/// Fetch the manifest; an absent file is [`StoreError::NotFound`].
pub fn read_existing_manifest(session: &mut dyn RemoteSession, path: &str) -> Result<Manifest> {
    let bytes = session.read_file(path)?;
    let manifest = Manifest::parse(path, &bytes)?;
    debug!(path, records = manifest.len(), "manifest loaded");
    Ok(manifest)
}

/// Overwrite the remote manifest with `manifest`.
pub fn write_manifest(
    session: &mut dyn RemoteSession,
    path: &str,
    manifest: &Manifest,
) -> Result<()> {
    session.write_file(path, &manifest.to_json())?;
    debug!(path, records = manifest.len(), "manifest written");
    Ok(())
}
