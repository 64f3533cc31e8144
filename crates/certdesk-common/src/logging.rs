//! ---
//! cd_section: "01-core-functionality"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Tracing subscriber setup for stdout and rolling log files."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "CERTDESK_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Flush handles for the non-blocking writers; dropped only at process exit.
struct WriterGuards {
    _file: WorkerGuard,
    _stdout: WorkerGuard,
}

static GUARDS: OnceCell<WriterGuards> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the daemon subscriber: stdout in the configured format plus a daily
/// JSON file named by [`log_file_name`].
///
/// JSON output carries the enclosing `remote` span, so every store event is
/// tagged with its `operation`, `backend` and `host`. The filter comes from
/// `CERTDESK_LOG`, then `RUST_LOG`, then `info`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let file_name = log_file_name(service_name, config);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set(WriterGuards {
        _file: file_guard,
        _stdout: stdout_guard,
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer(config.format, stdout_writer))
        .with(json_layer(file_writer, true))
        .try_init()
        .is_ok();

    if installed {
        info!(
            service = %service_name,
            log_file = %config.directory.join(&file_name).display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}

/// Install a stdout-only subscriber; used by tests and one-shot CLI commands.
pub fn init_stdout() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Base name of the rolling file; the appender adds a date suffix.
pub fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config
        .file_prefix
        .as_deref()
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(service_name);
    format!("{prefix}.log")
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::StructuredJson => json_layer(writer, false),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed(),
    }
}

fn json_layer<S>(writer: NonBlocking, with_target: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(with_target)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer)
        .boxed()
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive '{directive}' ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_uses_kebab_case() {
        assert_eq!(rendered_format(LogFormat::StructuredJson), "structured-json");
        assert_eq!(rendered_format(LogFormat::Pretty), "pretty");
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("unit".into()),
        };
        init_tracing("certdesk-test", &config).unwrap();
        assert!(config.directory.is_dir());
        init_stdout();
    }

    #[test]
    fn file_name_prefers_configured_prefix() {
        let mut config = LoggingConfig::default();
        assert_eq!(log_file_name("certdeskd", &config), "certdeskd.log");
        config.file_prefix = Some("registry".into());
        assert_eq!(log_file_name("certdeskd", &config), "registry.log");
        config.file_prefix = Some("  ".into());
        assert_eq!(log_file_name("certdeskd", &config), "certdeskd.log");
    }

    fn rendered_format(format: LogFormat) -> String {
        #[derive(Serialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let rendered = toml::to_string(&Wrapper { format }).unwrap();
        rendered
            .trim()
            .trim_start_matches("format = ")
            .trim_matches('"')
            .to_owned()
    }
}
