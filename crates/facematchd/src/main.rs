use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod acquisition;
mod config;
mod engine;
mod error;
mod http;
mod preprocess;
mod startup;

use acquisition::ImageFetcher;
use config::Config;
use http::AppState;
use preprocess::Preprocessor;

fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Environment edits happen before the runtime spawns any worker threads.
    startup::apply_runtime_env(&config);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(startup::DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        detector = %config.detector,
        preprocess = ?config.preprocess,
        "facematchd starting"
    );

    let (detector, verifier) = engine::load_models(&config)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(
        detector,
        verifier,
        config.match_threshold,
        config.inference_timeout,
    )?;

    let fetcher = ImageFetcher::new(config.fetch_timeout)?.with_max_bytes(config.max_image_bytes);
    let preprocessor = Preprocessor::from_config(&config, fetcher, engine.clone());
    let app = http::router(AppState {
        preprocessor: Arc::new(preprocessor),
        engine,
        temp_dir: config.temp_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "facematchd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("facematchd shutting down");
    Ok(())
}
