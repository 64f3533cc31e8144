//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Certificate records, upload payloads, and session credentials."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, StoreError};

/// One entry of the remote manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub cert_number: String,
    pub issue_date: String,
    pub issued_to_name: String,
    pub image_url: String,
}

/// A certificate as submitted for upload, before its image location is known.
#[derive(Clone)]
pub struct NewCertificate {
    pub cert_number: String,
    pub issue_date: String,
    pub issued_to_name: String,
    /// Client-side file name; only its extension is used.
    pub file_name: String,
    pub image: Vec<u8>,
}

impl NewCertificate {
    /// Check the fields that end up in remote paths. Returns the image extension
    /// including the leading dot, or an empty string when the file has none.
    pub fn validate(&self) -> Result<String> {
        validate_cert_number(&self.cert_number)?;
        if self.image.is_empty() {
            return Err(StoreError::validation("no image file uploaded"));
        }
        image_extension(&self.file_name)
    }
}

impl fmt::Debug for NewCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCertificate")
            .field("cert_number", &self.cert_number)
            .field("issue_date", &self.issue_date)
            .field("issued_to_name", &self.issued_to_name)
            .field("file_name", &self.file_name)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

/// Reject certificate numbers that cannot safely name a remote file.
pub fn validate_cert_number(cert_number: &str) -> Result<()> {
    let trimmed = cert_number.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation("certNumber is required"));
    }
    if trimmed != cert_number {
        return Err(StoreError::validation(
            "certNumber must not start or end with whitespace",
        ));
    }
    if cert_number == "." || cert_number == ".." {
        return Err(StoreError::validation("certNumber must not be '.' or '..'"));
    }
    if cert_number.contains(['/', '\\']) || cert_number.chars().any(char::is_control) {
        return Err(StoreError::validation(
            "certNumber must not contain path separators or control characters",
        ));
    }
    Ok(())
}

/// Looser check for numbers that only select an existing record. Stored
/// records may carry numbers an upload would refuse today.
pub fn validate_lookup_number(cert_number: &str) -> Result<()> {
    if cert_number.trim().is_empty() {
        return Err(StoreError::validation("certNumber is required"));
    }
    Ok(())
}

/// Extension of an uploaded file name, including the dot.
pub fn image_extension(file_name: &str) -> Result<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let Some((stem, ext)) = base.rsplit_once('.') else {
        return Ok(String::new());
    };
    if stem.is_empty() {
        // dotfile such as ".jpg" with no stem carries no extension
        return Ok(String::new());
    }
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StoreError::validation(format!(
            "unsupported image file extension in '{file_name}'"
        )));
    }
    Ok(format!(".{ext}"))
}

/// Transport security requested for the remote session.
///
/// Accepts `false`/`true` (plain/explicit TLS) or one of the strings
/// `"plain"`, `"explicit"`, `"implicit"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    Plain,
    /// `AUTH TLS` upgrade of the control connection.
    Explicit,
    /// TLS negotiated immediately on connect.
    Implicit,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Plain => "plain",
            SecurityMode::Explicit => "explicit",
            SecurityMode::Implicit => "implicit",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            SecurityMode::Implicit => 990,
            SecurityMode::Plain | SecurityMode::Explicit => 21,
        }
    }
}

impl Serialize for SecurityMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SecurityMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(SecurityMode::Plain),
            Raw::Flag(true) => Ok(SecurityMode::Explicit),
            Raw::Named(name) => match name.to_ascii_lowercase().as_str() {
                "plain" | "false" | "" => Ok(SecurityMode::Plain),
                "explicit" | "true" => Ok(SecurityMode::Explicit),
                "implicit" => Ok(SecurityMode::Implicit),
                other => Err(de::Error::custom(format!(
                    "unknown security mode '{other}', expected plain, explicit or implicit"
                ))),
            },
        }
    }
}

fn default_user() -> String {
    "anonymous".to_owned()
}

/// Connection details supplied by the caller on every request. Never stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub secure: SecurityMode,
}

impl Credentials {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            password: password.into(),
            secure: SecurityMode::Plain,
        }
    }

    pub fn with_security(mut self, secure: SecurityMode) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Port to dial, falling back to the conventional port of the security mode.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.secure.default_port())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StoreError::validation("host is required"));
        }
        if self.port == Some(0) {
            return Err(StoreError::validation("port must be between 1 and 65535"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.effective_port())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("secure", &self.secure)
            .finish()
    }
}
