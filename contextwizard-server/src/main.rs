use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};

use contextwizard_core::{LlmBackend, RecordingLogger, ReviewPipeline};
use contextwizard_server::clock::SystemClock;
use contextwizard_server::config::Config;
use contextwizard_server::store::SqliteRepository;
use contextwizard_server::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting ContextWizard backend");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    if config.provider.api_key.is_none() {
        warn!(
            "{} is not set; LLM calls will fail until it is provided",
            config.provider.provider.api_key_var()
        );
    }

    let recording_logger = if config.recording_enabled {
        match RecordingLogger::open(PathBuf::from(&config.recording_log_path)).await {
            Ok(logger) => Some(logger),
            Err(e) => {
                error!("Failed to initialize recording logger: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let backend = LlmBackend::connect(&config.provider, recording_logger.clone())?;
    info!(
        "Using {} (classification model {}, code model {})",
        config.provider.provider,
        config.pipeline.models.classification_model,
        config.pipeline.models.code_model
    );

    info!(
        "Using pending comments database: {}",
        config.pending_comments_db.display()
    );
    let store = SqliteRepository::new(&config.pending_comments_db)
        .context("Failed to initialize pending comments database")?;

    let state = Arc::new(AppState {
        pipeline: ReviewPipeline::new(config.pipeline.clone(), backend),
        store: Arc::new(store),
        recording_logger,
        clock: Arc::new(SystemClock),
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
