//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Certificate operations, one remote session per call."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
//! Each operation opens a session with the caller's credentials, runs a short
//! linear sequence against the manifest and image files, and closes the session.
//! Nothing is shared between calls: two concurrent writers both read the same
//! manifest and the later write wins.

use std::fmt;
use std::sync::Arc;

use certdesk_common::config::{Backend, RemoteConfig};
use tracing::{info, info_span, warn};

use crate::error::{Result, StoreError};
use crate::ftp::FtpConnector;
use crate::layout::RemoteLayout;
use crate::manifest::{read_existing_manifest, read_manifest, write_manifest};
use crate::memory::MemoryConnector;
use crate::model::{validate_lookup_number, Certificate, Credentials, NewCertificate};
use crate::session::{with_session, Connector, RemoteSession};

/// Entry point for the HTTP layer: a connector plus the remote layout.
#[derive(Clone)]
pub struct CertificateStore {
    connector: Arc<dyn Connector>,
    layout: RemoteLayout,
}

impl CertificateStore {
    pub fn new(connector: Arc<dyn Connector>, layout: RemoteLayout) -> Self {
        Self { connector, layout }
    }

    /// Build the store described by the `[remote]` configuration section.
    pub fn from_config(config: &RemoteConfig) -> Self {
        let connector: Arc<dyn Connector> = match config.backend {
            Backend::Ftp => Arc::new(FtpConnector::new(config.connect_timeout)),
            Backend::Memory => Arc::new(MemoryConnector::new()),
        };
        Self::new(connector, RemoteLayout::new(config.base_dir.clone()))
    }

    pub fn backend(&self) -> &'static str {
        self.connector.name()
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Open a session and make sure the base directory exists.
    pub async fn test_connection(&self, credentials: Credentials) -> Result<()> {
        self.run("test_connection", credentials, |session, layout| {
            ensure_base_dir(session, layout)
        })
        .await
    }

    /// Current manifest contents; empty when no manifest exists yet.
    pub async fn list(&self, credentials: Credentials) -> Result<Vec<Certificate>> {
        self.run("list", credentials, |session, layout| {
            Ok(read_manifest(session, &layout.manifest_path())?.into_records())
        })
        .await
    }

    /// Store the image, then put the record at the front of the manifest.
    pub async fn upload(
        &self,
        credentials: Credentials,
        certificate: NewCertificate,
    ) -> Result<Certificate> {
        let extension = certificate.validate()?;
        self.run("upload", credentials, move |session, layout| {
            upload_certificate(session, layout, &certificate, &extension)
        })
        .await
    }

    /// Drop the record from the manifest, then remove its image.
    pub async fn delete(
        &self,
        credentials: Credentials,
        cert_number: String,
    ) -> Result<Certificate> {
        validate_lookup_number(&cert_number)?;
        self.run("delete", credentials, move |session, layout| {
            delete_certificate(session, layout, &cert_number)
        })
        .await
    }

    /// Runs `op` in a fresh session on the blocking pool, inside a span naming
    /// the operation and target host.
    async fn run<T, F>(
        &self,
        operation: &'static str,
        credentials: Credentials,
        op: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RemoteSession, &RemoteLayout) -> Result<T> + Send + 'static,
    {
        let connector = Arc::clone(&self.connector);
        let layout = self.layout.clone();
        let span = info_span!(
            "remote",
            operation,
            backend = connector.name(),
            host = %credentials.host
        );
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            with_session(connector.as_ref(), &credentials, |session| op(session, &layout))
        })
        .await
        .map_err(|err| {
            StoreError::transport(
                "session",
                self.layout.base_dir(),
                format!("worker task failed: {err}"),
            )
        })?
    }
}

impl fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateStore")
            .field("backend", &self.connector.name())
            .field("layout", &self.layout)
            .finish()
    }
}

fn ensure_base_dir(session: &mut dyn RemoteSession, layout: &RemoteLayout) -> Result<()> {
    session.ensure_dir(layout.base_dir())
}

fn upload_certificate(
    session: &mut dyn RemoteSession,
    layout: &RemoteLayout,
    certificate: &NewCertificate,
    extension: &str,
) -> Result<Certificate> {
    let manifest_path = layout.manifest_path();
    let mut manifest = read_manifest(session, &manifest_path)?;

    // Image first: an interruption before the manifest write leaves an orphaned
    // image, never a record pointing at a missing file.
    let file_name = format!("{}{}", certificate.cert_number, extension);
    let image_path = layout.image_path(&file_name);
    session.ensure_dir(&layout.images_dir())?;
    session.write_file(&image_path, &certificate.image)?;

    let record = Certificate {
        cert_number: certificate.cert_number.clone(),
        issue_date: certificate.issue_date.clone(),
        issued_to_name: certificate.issued_to_name.clone(),
        image_url: RemoteLayout::image_url(&file_name),
    };
    let replaced = manifest.upsert_front(record.clone());
    write_manifest(session, &manifest_path, &manifest)?;

    info!(
        cert_number = %record.cert_number,
        image = %image_path,
        bytes = certificate.image.len(),
        replaced = replaced.is_some(),
        records = manifest.len(),
        "certificate uploaded"
    );
    if let Some(previous) = replaced {
        if previous.image_url != record.image_url {
            warn!(
                cert_number = %record.cert_number,
                previous_image = %previous.image_url,
                "replaced certificate used a different image file; old image left in place"
            );
        }
    }
    Ok(record)
}

fn delete_certificate(
    session: &mut dyn RemoteSession,
    layout: &RemoteLayout,
    cert_number: &str,
) -> Result<Certificate> {
    let manifest_path = layout.manifest_path();
    let mut manifest = read_existing_manifest(session, &manifest_path)?;
    let removed = manifest
        .remove(cert_number)
        .ok_or_else(|| StoreError::RecordNotFound {
            cert_number: cert_number.to_owned(),
        })?;
    let image_file = RemoteLayout::image_file_from_url(&removed.image_url)?;
    let image_path = layout.image_path(image_file);

    // Manifest first: a failed removal leaves a stray file, never a record
    // pointing at a deleted image.
    write_manifest(session, &manifest_path, &manifest)?;
    session.remove_file(&image_path)?;

    info!(
        cert_number,
        image = %image_path,
        records = manifest.len(),
        "certificate deleted"
    );
    Ok(removed)
}
