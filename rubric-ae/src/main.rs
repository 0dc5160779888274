//! rubric-ae - Writing assessment engine
//!
//! Assesses student writing against assignment rubrics, streams progress to
//! observers over SSE, and serves cached statistics and growth reports.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rubric_ae::assessment::{AssessmentClient, AssessmentProvider, ChatCompletionsProvider, FallbackGenerator};
use rubric_ae::broadcast::ProgressBroadcaster;
use rubric_ae::config::{CliOverrides, EngineConfig, TomlConfig};
use rubric_ae::db::SqliteRepository;
use rubric_ae::services::AssessmentService;
use rubric_ae::AppState;
use rubric_common::config::{default_config_path, load_toml_config};

/// Command-line arguments for rubric-ae
#[derive(Parser, Debug)]
#[command(name = "rubric-ae")]
#[command(about = "Writing assessment engine")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "RUBRIC_AE_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "RUBRIC_DATABASE")]
    database: Option<PathBuf>,

    /// TOML config file (default: ~/.config/rubric/rubric-ae.toml)
    #[arg(short, long, env = "RUBRIC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path("rubric-ae"));
    let toml_config: TomlConfig = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => TomlConfig::default(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rubric-ae (Assessment Engine)");
    info!(
        "Version: {} ({}, {} build)",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let config = EngineConfig::resolve(
        CliOverrides {
            port: args.port,
            database: args.database,
        },
        &toml_config,
    )?;

    info!("Database: {}", config.database_path.display());
    let pool = rubric_ae::db::init_database_pool(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let broadcaster = ProgressBroadcaster::new(config.subscriber_buffer);

    let provider = match &config.provider {
        Some(settings) => {
            // Transport bound sits just above the per-call timeout
            let transport_timeout = config.retry.timeout + std::time::Duration::from_secs(5);
            let provider = ChatCompletionsProvider::new(settings.clone(), transport_timeout)
                .context("Failed to build provider client")?;
            Some(Arc::new(provider) as Arc<dyn AssessmentProvider>)
        }
        None => None,
    };

    let fallback = match config.fallback_seed {
        Some(seed) => FallbackGenerator::with_seed(seed),
        None => FallbackGenerator::new(),
    };

    let client = AssessmentClient::new(provider, broadcaster.clone())
        .with_policy(config.retry)
        .with_fallback(fallback);

    let service = Arc::new(AssessmentService::new(
        client,
        Arc::new(SqliteRepository::new(pool)),
        config.cache_ttl,
    ));

    let state = AppState::new(service, broadcaster.clone());
    let app = rubric_ae::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(broadcaster))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then end every open progress stream so
/// graceful shutdown is not held up by long-lived connections
async fn shutdown_signal(broadcaster: ProgressBroadcaster) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    broadcaster.shutdown();
}
