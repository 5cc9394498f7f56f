//! On-demand reclassification
//!
//! Bypasses the decision cache and re-runs the full engine pipeline;
//! overrides still win.

use crate::{ApiError, ApiResult, AppState};
use axum::extract::{Path, State};
use axum::Json;
use playguard_common::model::{ArtistIdentity, Decision};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ReclassifyRequest {
    pub artist_name: String,
}

/// POST /classify/:artist_id
pub async fn reclassify(
    State(state): State<AppState>,
    Path(artist_id): Path<String>,
    Json(payload): Json<ReclassifyRequest>,
) -> ApiResult<Json<Decision>> {
    if payload.artist_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "artist_name cannot be empty".to_string(),
        ));
    }

    let artist = ArtistIdentity::new(artist_id, payload.artist_name);
    let decision = state.engine.reclassify(&artist).await;
    Ok(Json(decision))
}
