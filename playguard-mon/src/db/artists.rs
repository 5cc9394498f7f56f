//! Artist rows: seen-tracking keyed by the provider-assigned id

use chrono::{DateTime, Utc};
use playguard_common::model::ArtistIdentity;
use playguard_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// Artist row for the review API
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ArtistRow {
    pub id: String,
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub play_count: i64,
}

/// Record a sighting: insert on first sight, otherwise bump last_seen and
/// the play counter
pub async fn record_seen(pool: &SqlitePool, artist: &ArtistIdentity) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO artists (id, name, first_seen, last_seen, play_count)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            last_seen = excluded.last_seen,
            play_count = play_count + 1
        "#,
    )
    .bind(&artist.id)
    .bind(&artist.name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_artist(pool: &SqlitePool, artist_id: &str) -> Result<Option<ArtistRow>> {
    let row = sqlx::query_as::<_, ArtistRow>(
        "SELECT id, name, first_seen, last_seen, play_count FROM artists WHERE id = ?",
    )
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ============================================================================
// Tests
// ============================================================================
