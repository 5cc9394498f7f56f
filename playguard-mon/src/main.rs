//! playguard-mon - playback monitor daemon entry point
//!
//! Startup order: configuration (fatal on violation) → database → provider
//! client → override hydration → classification engine → action executor
//! bootstrap → review API + polling loop. Ctrl-C stops the loop
//! cooperatively between ticks.

use anyhow::Result;
use clap::Parser;
use playguard_common::config::Config;
use playguard_common::events::EventBus;
use playguard_mon::actions::ActionExecutor;
use playguard_mon::classify::{ClassificationEngine, DecisionCache, OllamaFallback, OverrideStore};
use playguard_mon::monitor::PlaybackMonitor;
use playguard_mon::provider::{PlaybackProvider, SpotifyProvider};
use playguard_mon::{build_adapters, build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "playguard-mon", version, about = "Artificial-artist playback guard")]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting playguard-mon");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Configuration errors are fatal here and only here
    let config = Config::load(args.config.as_deref())?;

    // Database
    info!("Database: {}", config.database.path.display());
    let pool = playguard_mon::db::init_pool(&config.database.path).await?;

    // Event bus
    let event_bus = EventBus::new(256);

    // Playback provider
    let provider: Arc<dyn PlaybackProvider> = Arc::new(SpotifyProvider::new(&config.provider)?);
    match provider.current_playback().await {
        Ok(snapshot) if snapshot.device_active => info!("Active playback device found"),
        Ok(_) => warn!(
            "No active playback device; open the player on a device to enable control"
        ),
        Err(e) => warn!(error = %e, "Initial playback query failed"),
    }

    // Classification engine
    let overrides = OverrideStore::load(pool.clone()).await?;
    let cache = DecisionCache::new(config.classification.cache_duration_seconds);
    let fallback = config
        .ollama
        .enabled
        .then(|| OllamaFallback::new(config.ollama.clone()));
    if fallback.is_some() {
        info!(model = %config.ollama.model, "LLM fallback enabled");
    }
    let adapters = build_adapters(&config.sources);
    info!(
        sources = adapters.len(),
        min_agreement = config.classification.min_source_agreement,
        "Classification engine ready"
    );
    let engine = Arc::new(ClassificationEngine::new(
        adapters,
        overrides.clone(),
        cache,
        fallback,
        &config.classification,
        pool.clone(),
        event_bus.clone(),
    ));

    // Action executor (resolves user + blocked playlist, degrading on failure)
    let executor = ActionExecutor::bootstrap(Arc::clone(&provider), config.actions.clone()).await;

    // Review API
    let cancel = CancellationToken::new();
    let mut api_handle = None;
    if config.api.enabled {
        let state = AppState::new(
            pool.clone(),
            Arc::clone(&engine),
            overrides.clone(),
            event_bus.clone(),
        );
        let app = build_router(state);
        let addr = format!("{}:{}", config.api.host, config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Review API listening on http://{}", addr);

        let shutdown = cancel.clone();
        api_handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                warn!(error = %e, "Review API server error");
            }
        }));
    }

    // Ctrl-C requests a cooperative stop between poll ticks
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping");
                cancel.cancel();
            }
        });
    }

    // Polling loop (runs until cancellation)
    let mut monitor = PlaybackMonitor::new(
        provider,
        engine,
        executor,
        pool,
        event_bus,
        config.monitor.clone(),
    );
    monitor.run(cancel.clone()).await;

    if let Some(handle) = api_handle {
        let _ = handle.await;
    }
    info!("playguard-mon stopped");
    Ok(())
}
