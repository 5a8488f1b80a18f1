//! Stevedore server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use stevedore_core::config::AppConfig;
use stevedore_server::{AppState, Janitor, create_router};
use stevedore_storage::{ScratchDir, TargetStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stevedore - resumable chunked upload server
#[derive(Parser, Debug)]
#[command(name = "stevedored")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STEVEDORE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Stevedore v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration. The file is optional: every field has a default
    // and env vars can provide or override anything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STEVEDORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Register Prometheus metrics
    stevedore_server::metrics::register_metrics();

    // Initialize the data plane; both directories are created if absent.
    let targets = TargetStore::new(&config.storage.upload_dir)
        .await
        .context("failed to initialize upload directory")?;
    let scratch = ScratchDir::new(&config.storage.temp_dir)
        .await
        .context("failed to initialize temp directory")?;
    tracing::info!(
        upload_dir = %config.storage.upload_dir.display(),
        temp_dir = %config.storage.temp_dir.display(),
        "Storage directories ready"
    );

    // Initialize the metadata store and verify connectivity before serving.
    let metadata = stevedore_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    // Spawn the janitor
    if config.janitor.enabled {
        let janitor = Janitor::new(
            metadata.clone(),
            targets.clone(),
            scratch.clone(),
            config.janitor.clone(),
        );
        let _janitor_handle = janitor.spawn();
    } else {
        tracing::info!("Janitor disabled");
    }

    // Create application state and router
    let bind = config.server.bind.clone();
    let state = AppState::new(config, metadata, targets, scratch);
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
