//! playguard-mon - playback monitor daemon
//!
//! Watches the user's streaming playback, classifies the currently-playing
//! artist as artificial or human by agreement among open data sources, and
//! skips/removes tracks when confidence is sufficient. Exposes a review API
//! for plays, decisions, overrides, and on-demand reclassification.

pub mod actions;
pub mod api;
pub mod classify;
pub mod db;
pub mod error;
pub mod monitor;
pub mod provider;
pub mod sources;

pub use crate::error::{ApiError, ApiResult};

use crate::classify::{ClassificationEngine, OverrideStore};
use crate::sources::{LastFmSource, MusicBrainzSource, SourceAdapter, WikidataSource};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use playguard_common::config::SourcesConfig;
use playguard_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<ClassificationEngine>,
    pub overrides: OverrideStore,
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        engine: Arc<ClassificationEngine>,
        overrides: OverrideStore,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            engine,
            overrides,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build the review API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/plays", get(api::reviews::get_plays))
        .route("/decisions", get(api::reviews::get_decisions))
        .route(
            "/decisions/:decision_id/sources",
            get(api::reviews::get_decision_sources),
        )
        .route("/artists/:artist_id", get(api::reviews::get_artist))
        .route("/overrides", get(api::overrides::list_overrides))
        .route(
            "/overrides/:artist_id",
            get(api::overrides::get_override)
                .post(api::overrides::set_override)
                .delete(api::overrides::delete_override),
        )
        .route("/classify/:artist_id", post(api::classify::reclassify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Construct the enabled source adapters. Config validation has already
/// guaranteed each enabled source has what it needs.
pub fn build_adapters(config: &SourcesConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if config.wikidata.enabled {
        adapters.push(Arc::new(WikidataSource::new(&config.wikidata)));
    }
    if config.musicbrainz.enabled {
        adapters.push(Arc::new(MusicBrainzSource::new(&config.musicbrainz)));
    }
    if config.lastfm.enabled {
        adapters.push(Arc::new(LastFmSource::new(&config.lastfm)));
    }
    adapters
}
