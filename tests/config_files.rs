//! ---
//! cd_section: "15-testing-qa-runbook"
//! cd_subsection: "integration-tests"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Checks that shipped configuration files load cleanly."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use certdesk_common::{AppConfig, Backend, LogFormat};

fn repo_path(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

#[test]
fn shipped_config_matches_defaults() {
    let config = AppConfig::from_path(repo_path("configs/certdesk.toml"))
        .unwrap_or_else(|err| panic!("configs/certdesk.toml failed to load: {err:#}"));
    let defaults = AppConfig::default();

    assert_eq!(config.server.listen, defaults.server.listen);
    assert_eq!(config.server.max_upload_bytes, defaults.server.max_upload_bytes);
    assert!(config.server.static_dir.is_none());
    assert!(!config.server.cors);
    assert_eq!(config.remote.backend, Backend::Ftp);
    assert_eq!(config.remote.base_dir, "/certificates");
    assert_eq!(config.remote.connect_timeout, Duration::from_secs(10));
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(config.logging.file_prefix.as_deref(), Some("certdeskd"));
}

#[test]
fn shipped_config_never_carries_credentials() {
    let raw = std::fs::read_to_string(repo_path("configs/certdesk.toml")).unwrap();
    for line in raw.lines().map(str::trim).filter(|line| !line.starts_with('#')) {
        let key = line.split('=').next().unwrap_or_default().trim();
        assert!(
            !["password", "user", "host"].contains(&key),
            "configuration must not define {key}"
        );
    }
}
