//! ---
//! cd_section: "01-core-functionality"
//! cd_subsection: "binary"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "Binary entrypoint for the certdesk daemon."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use certdesk_api::{new_registry, spawn_api_server, ApiMetrics, ApiState};
use certdesk_common::{init_tracing, AppConfig, Backend};
use certdesk_store::CertificateStore;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("certdesk ", env!("CARGO_PKG_VERSION")),
    about = "Certificate registry daemon backed by an FTP/FTPS server",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the HTTP listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, value_enum, help = "Override the remote storage backend")]
    backend: Option<CliBackend>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliBackend {
    Ftp,
    Memory,
}

impl From<CliBackend> for Backend {
    fn from(value: CliBackend) -> Self {
        match value {
            CliBackend::Ftp => Backend::Ftp,
            CliBackend::Memory => Backend::Memory,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the HTTP API")]
    Run,
    #[command(about = "Validate configuration and print the effective settings")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/certdesk.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(backend) = cli.backend {
        config.remote.backend = backend.into();
    }
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("certdeskd", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; running with defaults"),
            }
            run_daemon(config).await?
        }
        Commands::CheckConfig => {
            let rendered = toml::to_string_pretty(&config)
                .context("failed to render effective configuration")?;
            if let Some(path) = &loaded.source {
                println!("# loaded from {}", path.display());
            }
            print!("{rendered}");
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    if config.remote.backend == Backend::Memory {
        warn!("memory backend selected; certificates will not survive a restart");
    }
    let store = CertificateStore::from_config(&config.remote);
    info!(
        backend = store.backend(),
        base_dir = store.layout().base_dir(),
        "certificate store ready"
    );

    let metrics = ApiMetrics::new(new_registry())?;
    let state = Arc::new(ApiState::new(store, metrics));
    let server = spawn_api_server(state, &config.server)?;
    info!(address = %server.addr(), "daemon running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}
