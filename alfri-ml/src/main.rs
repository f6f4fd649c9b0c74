//! alfri-ml - ML inference service for student advising
//!
//! Serves passing-chance and passing-mark predictions plus focus-vector
//! clustering and subject recommendations. Models load in the background;
//! the HTTP listener is up immediately and reports readiness on
//! `/health/ready`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use alfri_common::config::{load_toml_or_default, read_toml_config, ConfigFileResolver};
use alfri_common::db::{PgSubjectStore, SubjectCatalog, SubjectSource};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alfri_ml::config::ServiceConfig;
use alfri_ml::registry::ModelRegistry;
use alfri_ml::{build_router, AppState};

/// Command-line arguments for alfri-ml
#[derive(Parser, Debug)]
#[command(name = "alfri-ml")]
#[command(about = "ML inference service for student advising")]
#[command(version)]
struct Args {
    /// Config file (also ALFRI_ML_CONFIG, then ~/.config/alfri, then /etc/alfri)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "5000", env = "ALFRI_ML_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "ALFRI_ML_BIND")]
    bind: String,

    /// Directory holding model artifacts
    #[arg(long, env = "ALFRI_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// PostgreSQL connection string for subject data
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigFileResolver::new("alfri-ml");
    let resolved = resolver.resolve(args.config.as_deref());

    // Configured log level applies unless RUST_LOG is set
    let log_level = resolved
        .as_ref()
        .and_then(|(path, _)| read_toml_config::<ServiceConfig>(path).ok())
        .map(|c| c.log_level)
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "alfri_ml={level},alfri_common={level},tower_http={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting alfri-ml v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config: ServiceConfig = load_toml_or_default(resolved);
    config
        .apply_model_map_env()
        .context("Failed to read MODEL_MAP")?;
    if args.models_dir.is_some() {
        config.models_dir = args.models_dir;
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    info!("{} model(s) configured", config.models.len());

    let subjects = open_subject_source(&config).await;
    let state = AppState::new(&config, subjects);

    // Load models off the async runtime; the server starts meanwhile
    let loader_state = state.clone();
    let model_map = config.models.clone();
    let models_dir = config.models_dir.clone();
    let failed_map = config.models.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || {
            ModelRegistry::builder(model_map)
                .models_dir(models_dir)
                .load_all()
        })
        .await;

        match loaded {
            Ok(registry) => {
                let ready = registry.is_ready();
                info!(
                    "Model loading finished in {:.2}s: {} loaded, {} failed{}",
                    started.elapsed().as_secs_f64(),
                    registry.loaded_count(),
                    registry.error_count(),
                    if ready { "" } else { " (service not ready)" }
                );
                loader_state.install_registry(registry).await;
            }
            Err(e) => {
                error!("Model loading task failed: {}", e);
                // Every configured model counts as failed
                let registry = ModelRegistry::load_failed(
                    failed_map,
                    format!("model loading task failed: {}", e),
                );
                loader_state.install_registry(registry).await;
            }
        }
    });

    let app = build_router(state);

    let ip = args
        .bind
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid bind address: {}", args.bind))?;
    let addr = SocketAddr::new(ip, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("alfri-ml listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("alfri-ml stopped");
    Ok(())
}

/// PostgreSQL when configured, else metadata files, else none
async fn open_subject_source(config: &ServiceConfig) -> Option<Arc<dyn SubjectSource>> {
    if let Some(url) = &config.database_url {
        match PgSubjectStore::connect(url, config.database_max_connections).await {
            Ok(store) => {
                if store.test_connection().await {
                    info!("✓ Connected to subject database");
                } else {
                    warn!("Subject database did not answer the connection test");
                }
                return Some(Arc::new(store));
            }
            Err(e) => error!("Failed to connect to subject database: {}", e),
        }
    }

    if !config.subjects_metadata.is_empty() {
        match SubjectCatalog::from_metadata_files(config.subjects_metadata.as_slice()) {
            Ok(catalog) => {
                info!(
                    "Using subjects metadata catalog ({} study program(s))",
                    catalog.program_count()
                );
                return Some(Arc::new(catalog));
            }
            Err(e) => error!("Failed to load subjects metadata: {}", e),
        }
    }

    warn!("No subject data source; recommendation endpoints will return 503");
    None
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
