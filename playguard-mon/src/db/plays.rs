//! Play journal: one row per distinct track-playback instance
//!
//! Append-only apart from the two finalization updates (decision id, action
//! outcome); a play is immutable once its action is recorded.

use chrono::{DateTime, Utc};
use playguard_common::model::{ActionTaken, Play};
use playguard_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Play row for the review API (artist name joined in)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlayRow {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub artist_id: String,
    pub artist_name: String,
    pub track_id: String,
    pub track_name: String,
    pub context_uri: Option<String>,
    pub device_name: Option<String>,
    pub decision_id: Option<String>,
    pub action_taken: String,
    pub added_to_blocked: bool,
    pub action_error: Option<String>,
}

pub async fn insert_play(pool: &SqlitePool, play: &Play) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO plays
            (id, started_at, artist_id, track_id, track_name, track_uri,
             context_uri, device_name, decision_id, action_taken,
             added_to_blocked, action_error)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(play.play_id.to_string())
    .bind(play.started_at)
    .bind(&play.artist.id)
    .bind(&play.track_id)
    .bind(&play.track_name)
    .bind(&play.track_uri)
    .bind(&play.context_uri)
    .bind(&play.device_name)
    .bind(play.decision_id.map(|id| id.to_string()))
    .bind(play.action_taken.as_str())
    .bind(play.added_to_blocked)
    .bind(&play.action_error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Attach the decision that classified this play's artist
pub async fn set_decision(pool: &SqlitePool, play_id: Uuid, decision_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE plays SET decision_id = ? WHERE id = ?")
        .bind(decision_id.to_string())
        .bind(play_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the action outcome, finalizing the play
pub async fn set_action(
    pool: &SqlitePool,
    play_id: Uuid,
    action: ActionTaken,
    added_to_blocked: bool,
    action_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE plays SET action_taken = ?, added_to_blocked = ?, action_error = ? WHERE id = ?",
    )
    .bind(action.as_str())
    .bind(added_to_blocked)
    .bind(action_error)
    .bind(play_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Recent plays, newest first
pub async fn list_plays(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<PlayRow>> {
    let rows = sqlx::query_as::<_, PlayRow>(
        r#"
        SELECT p.id, p.started_at, p.artist_id, a.name AS artist_name,
               p.track_id, p.track_name, p.context_uri, p.device_name,
               p.decision_id, p.action_taken, p.added_to_blocked, p.action_error
        FROM plays p
        JOIN artists a ON a.id = p.artist_id
        ORDER BY p.started_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ============================================================================
// Tests
// ============================================================================
