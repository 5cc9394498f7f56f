//! Read access to the play and decision journals

use crate::api::PageParams;
use crate::db;
use crate::{ApiError, ApiResult, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};

/// GET /plays?limit&offset: recent plays, newest first
pub async fn get_plays(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = params.clamped();
    let plays = db::plays::list_plays(&state.db, limit, offset).await?;
    Ok(Json(json!({
        "plays": plays,
        "count": plays.len(),
        "limit": limit,
        "offset": offset,
    })))
}

/// GET /decisions?limit&offset: recent decisions, newest first
pub async fn get_decisions(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Value>> {
    let (limit, offset) = params.clamped();
    let decisions = db::decisions::list_decisions(&state.db, limit, offset).await?;
    Ok(Json(json!({
        "decisions": decisions,
        "count": decisions.len(),
        "limit": limit,
        "offset": offset,
    })))
}

/// GET /decisions/:decision_id/sources: journaled signal evidence
pub async fn get_decision_sources(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let sources = db::decisions::signals_for_decision(&state.db, &decision_id).await?;
    Ok(Json(json!({
        "decision_id": decision_id,
        "sources": sources,
    })))
}

/// GET /artists/:artist_id: artist row, recent decisions, and override
pub async fn get_artist(
    State(state): State<AppState>,
    Path(artist_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let artist = db::artists::get_artist(&state.db, &artist_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("artist {}", artist_id)))?;
    let decisions = db::decisions::decisions_for_artist(&state.db, &artist_id, 10).await?;
    let override_ = state.overrides.get(&artist_id).await;

    Ok(Json(json!({
        "artist": artist,
        "decisions": decisions,
        "override": override_,
    })))
}
