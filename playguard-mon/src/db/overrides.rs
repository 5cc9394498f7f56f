//! Override rows: user-authored classifications, mutable, keyed by artist

use playguard_common::model::Override;
use playguard_common::Result;
use sqlx::SqlitePool;

pub async fn upsert_override(pool: &SqlitePool, ov: &Override) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO overrides (artist_id, is_artificial, reason, set_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(artist_id) DO UPDATE SET
            is_artificial = excluded.is_artificial,
            reason = excluded.reason,
            set_at = excluded.set_at
        "#,
    )
    .bind(&ov.artist_id)
    .bind(ov.is_artificial)
    .bind(&ov.reason)
    .bind(ov.set_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_override(pool: &SqlitePool, artist_id: &str) -> Result<Option<Override>> {
    let row = sqlx::query_as::<_, (String, bool, Option<String>, chrono::DateTime<chrono::Utc>)>(
        "SELECT artist_id, is_artificial, reason, set_at FROM overrides WHERE artist_id = ?",
    )
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(artist_id, is_artificial, reason, set_at)| Override {
        artist_id,
        is_artificial,
        reason,
        set_at,
    }))
}

/// Deletes are idempotent; removing a missing override is not an error
pub async fn delete_override(pool: &SqlitePool, artist_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM overrides WHERE artist_id = ?")
        .bind(artist_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_overrides(pool: &SqlitePool) -> Result<Vec<Override>> {
    let rows = sqlx::query_as::<_, (String, bool, Option<String>, chrono::DateTime<chrono::Utc>)>(
        "SELECT artist_id, is_artificial, reason, set_at FROM overrides ORDER BY set_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(artist_id, is_artificial, reason, set_at)| Override {
            artist_id,
            is_artificial,
            reason,
            set_at,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
