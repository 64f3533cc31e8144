//! ---
//! cd_section: "01-core-functionality"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Shared primitives for the certdesk workspace."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
//! Configuration loading and tracing setup consumed by the daemon and the API crate.

pub mod config;
pub mod logging;

pub use config::{AppConfig, Backend, LoadedAppConfig, LoggingConfig, RemoteConfig, ServerConfig};
pub use logging::{init_stdout, init_tracing, LogFormat};
