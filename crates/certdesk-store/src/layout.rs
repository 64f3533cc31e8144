//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Remote directory layout for the manifest and certificate images."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use crate::error::{Result, StoreError};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const IMAGES_DIR: &str = "images";
/// Prefix of the `imageUrl` stored with every record.
pub const IMAGE_URL_PREFIX: &str = "/api/image/";

/// Where things live on the remote server, relative to one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    base_dir: String,
}

impl RemoteLayout {
    pub fn new(base_dir: impl Into<String>) -> Self {
        let base_dir = base_dir.into();
        let trimmed = base_dir.trim_end_matches('/');
        Self {
            base_dir: if trimmed.is_empty() {
                "/".to_owned()
            } else {
                trimmed.to_owned()
            },
        }
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn manifest_path(&self) -> String {
        self.join(MANIFEST_FILE)
    }

    pub fn images_dir(&self) -> String {
        self.join(IMAGES_DIR)
    }

    /// Remote path of an image file such as `A1.jpg`.
    pub fn image_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.images_dir(), file_name)
    }

    /// Public URL recorded in the manifest for an image file.
    pub fn image_url(file_name: &str) -> String {
        format!("{IMAGE_URL_PREFIX}{file_name}")
    }

    /// Recover the image file name from a record's `imageUrl`.
    pub fn image_file_from_url(image_url: &str) -> Result<&str> {
        let name = image_url
            .strip_prefix(IMAGE_URL_PREFIX)
            .unwrap_or(image_url)
            .rsplit('/')
            .next()
            .unwrap_or_default();
        if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
            return Err(StoreError::validation(format!(
                "record imageUrl '{image_url}' does not name an image file"
            )));
        }
        Ok(name)
    }

    fn join(&self, name: &str) -> String {
        if self.base_dir == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.base_dir)
        }
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self::new("/certificates")
    }
}
