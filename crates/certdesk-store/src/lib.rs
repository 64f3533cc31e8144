//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Certificate store over per-request remote sessions."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
//! Certificate records live in a single JSON manifest next to their image files
//! on a remote FTP/FTPS server. Every operation opens its own session with the
//! caller's credentials; the crate keeps no state between calls.

pub mod error;
pub mod ftp;
pub mod layout;
pub mod manifest;
pub mod memory;
pub mod model;
pub mod service;
pub mod session;

pub use error::{Result, StoreError};
pub use ftp::FtpConnector;
pub use layout::RemoteLayout;
pub use manifest::Manifest;
pub use memory::{FaultPoint, MemoryConnector, MemoryStore};
pub use model::{Certificate, Credentials, NewCertificate, SecurityMode};
pub use service::CertificateStore;
pub use session::{with_session, Connector, RemoteSession};
