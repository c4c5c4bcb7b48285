//! casefile-review - Verification & Locking Workflow Engine service
//!
//! Boots the HTTP API over the casefile database. Configuration comes from the
//! bootstrap TOML file, overridden by command-line flags and their env vars.

use anyhow::{Context, Result};
use casefile_common::config::load_bootstrap_config;
use casefile_common::db::init_database;
use casefile_common::events::EventBus;
use casefile_review::{build_router, AppState, EngineSettings, EVENT_BUS_CAPACITY};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

/// Command-line arguments for casefile-review
#[derive(Parser, Debug)]
#[command(name = "casefile-review")]
#[command(about = "Record verification and locking workflow service")]
#[command(version)]
struct Args {
    /// Bootstrap config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "CASEFILE_DATABASE")]
    database: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CASEFILE_PORT")]
    port: Option<u16>,

    /// Log level or filter directive (ignored when RUST_LOG is set)
    #[arg(long, env = "CASEFILE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Start at info so config loading is visible; the configured level is
    // applied once the config file has been read.
    let rust_log = EnvFilter::try_from_default_env().ok();
    let filter_from_env = rust_log.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(rust_log.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Casefile Review (casefile-review) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = load_bootstrap_config(args.config.as_deref());
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    if !filter_from_env {
        filter_handle
            .reload(EnvFilter::new(&config.logging.level))
            .context("Failed to apply log level")?;
    }

    let settings = EngineSettings::from_config(&config.workflow);
    info!(
        lock_minutes = settings.lock_duration.num_minutes(),
        require_distinct_approver = settings.require_distinct_approver,
        "Workflow settings"
    );

    info!("Database path: {}", config.database_path.display());
    let pool = match init_database(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(pool, event_bus, settings);
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("casefile-review listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
