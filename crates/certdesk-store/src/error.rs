//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Error taxonomy for remote certificate store operations."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by sessions and certificate operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Opening or authenticating the remote session failed.
    #[error("unable to connect to {host}:{port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },
    /// The manifest exists remotely but does not hold a list of certificates.
    #[error("manifest {path} is corrupt: {source}")]
    ManifestCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// A remote file that the operation requires does not exist.
    #[error("remote file {path} not found")]
    NotFound { path: String },
    /// The manifest holds no record with the requested certificate number.
    #[error("certificate {cert_number} not found")]
    RecordNotFound { cert_number: String },
    /// A request field is missing or unusable.
    #[error("{0}")]
    Validation(String),
    /// Any other remote I/O failure.
    #[error("remote {operation} failed for {path}: {reason}")]
    Transport {
        operation: &'static str,
        path: String,
        reason: String,
    },
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn transport(operation: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Transport {
            operation,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the absent-file condition that manifest reads treat as empty.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Short machine-friendly label, used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Connection { .. } => "connection",
            StoreError::ManifestCorrupt { .. } => "manifest_corrupt",
            StoreError::NotFound { .. } => "not_found",
            StoreError::RecordNotFound { .. } => "record_not_found",
            StoreError::Validation(_) => "validation",
            StoreError::Transport { .. } => "transport",
        }
    }
}
