use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cvlens_core::{
    config::LogFormat, create_llm_client, load_config, validate_config, AnalysisProcessor,
    AnalysisScheduler, AnalysisStore, DocumentStore, FsDocumentStore, NotificationStore,
    Notifier, PdfTextExtractor, PromptBuilder, SanitizedConfig, SqliteAnalysisStore,
    SqliteNotificationStore,
};

use cvlens_server::api::create_router;
use cvlens_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("CVLENS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration before logging so the format can be chosen
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!(version = VERSION, "Configuration loaded from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite stores
    let analyses: Arc<dyn AnalysisStore> = Arc::new(
        SqliteAnalysisStore::new(&config.database.path)
            .context("Failed to create analysis store")?,
    );
    info!("Analysis store initialized");

    let notifications: Arc<dyn NotificationStore> = Arc::new(
        SqliteNotificationStore::new(&config.database.path)
            .context("Failed to create notification store")?,
    );
    info!("Notification store initialized");

    // Create document storage
    let documents: Arc<dyn DocumentStore> = Arc::new(
        FsDocumentStore::new(&config.storage.documents_dir).with_context(|| {
            format!(
                "Failed to create document store at {:?}",
                config.storage.documents_dir
            )
        })?,
    );
    info!("Document store at {:?}", config.storage.documents_dir);

    // Create model client
    let llm = create_llm_client(&config.llm).context("Failed to create LLM client")?;

    let prompt = PromptBuilder::from_config(&config.pipeline)
        .context("Failed to load prompt template")?;

    let processor = AnalysisProcessor::new(
        Arc::clone(&analyses),
        Arc::new(PdfTextExtractor::new(Arc::clone(&documents))),
        llm,
        Notifier::new(Arc::clone(&notifications), config.notifications.clone()),
        config.pipeline.clone(),
    )
    .with_prompt(prompt)
    .with_generation(config.llm.max_tokens, config.llm.temperature);

    // Create and start the scheduler
    let scheduler = Arc::new(AnalysisScheduler::new(
        config.scheduler.clone(),
        config.pipeline.max_attempts,
        Arc::new(processor),
        Arc::clone(&analyses),
    ));
    scheduler.start().await;
    info!(
        workers = config.scheduler.workers,
        tool_mode = config.pipeline.tool_mode,
        "Analysis scheduler started"
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        analyses,
        notifications,
        documents,
        Arc::clone(&scheduler),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.stop().await;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
