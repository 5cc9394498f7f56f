//! Override CRUD
//!
//! Writes go through the shared [`OverrideStore`] so the polling loop sees
//! them immediately; the next classification of the artist short-circuits
//! on the new override.

use crate::{ApiError, ApiResult, AppState};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use playguard_common::model::Override;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub is_artificial: bool,
    pub reason: Option<String>,
}

/// GET /overrides: all overrides, newest first
pub async fn list_overrides(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let overrides = state.overrides.all().await;
    Ok(Json(json!({
        "overrides": overrides,
        "count": overrides.len(),
    })))
}

/// GET /overrides/:artist_id
pub async fn get_override(
    State(state): State<AppState>,
    Path(artist_id): Path<String>,
) -> ApiResult<Json<Override>> {
    state
        .overrides
        .get(&artist_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("override for artist {}", artist_id)))
}

/// POST /overrides/:artist_id
pub async fn set_override(
    State(state): State<AppState>,
    Path(artist_id): Path<String>,
    Json(payload): Json<SetOverrideRequest>,
) -> ApiResult<Json<Value>> {
    if artist_id.trim().is_empty() {
        return Err(ApiError::BadRequest("artist_id cannot be empty".to_string()));
    }

    let ov = Override {
        artist_id: artist_id.clone(),
        is_artificial: payload.is_artificial,
        reason: payload.reason,
        set_at: Utc::now(),
    };
    state.overrides.set(ov.clone()).await?;
    info!(
        artist_id = %artist_id,
        is_artificial = ov.is_artificial,
        "Override set"
    );

    Ok(Json(json!({
        "message": "override set",
        "override": ov,
    })))
}

/// DELETE /overrides/:artist_id
pub async fn delete_override(
    State(state): State<AppState>,
    Path(artist_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let existed = state.overrides.delete(&artist_id).await?;
    if !existed {
        return Err(ApiError::NotFound(format!(
            "override for artist {}",
            artist_id
        )));
    }
    info!(artist_id = %artist_id, "Override deleted");
    Ok(Json(json!({
        "message": "override deleted",
        "artist_id": artist_id,
    })))
}
