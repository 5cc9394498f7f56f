//! Database access for the monitor daemon
//!
//! SQLite via sqlx. Plays and decisions are append-only journals; overrides
//! are mutable and keyed by artist id. UUIDs are stored as TEXT, timestamps
//! as RFC 3339 TEXT.

pub mod artists;
pub mod decisions;
pub mod overrides;
pub mod plays;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool, creating the file and schema on
/// first run
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the schema if it does not exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            play_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plays (
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            track_name TEXT NOT NULL,
            track_uri TEXT NOT NULL,
            context_uri TEXT,
            device_name TEXT,
            decision_id TEXT,
            action_taken TEXT NOT NULL DEFAULT 'none',
            added_to_blocked INTEGER NOT NULL DEFAULT 0,
            action_error TEXT,
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            artist_name TEXT NOT NULL,
            decided_at TEXT NOT NULL,
            label TEXT NOT NULL,
            is_artificial INTEGER NOT NULL,
            confidence REAL NOT NULL,
            agreeing_sources TEXT NOT NULL,
            band_policy_applied INTEGER NOT NULL DEFAULT 0,
            used_llm_fallback INTEGER NOT NULL DEFAULT 0,
            reason TEXT NOT NULL,
            cached_until TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decision_sources (
            decision_id TEXT NOT NULL,
            source TEXT NOT NULL,
            label TEXT,
            confidence REAL,
            evidence TEXT NOT NULL DEFAULT '[]',
            url TEXT,
            virtual_hint INTEGER NOT NULL DEFAULT 0,
            query_time_ms INTEGER NOT NULL DEFAULT 0,
            queried_at TEXT NOT NULL,
            error TEXT,
            PRIMARY KEY (decision_id, source),
            FOREIGN KEY (decision_id) REFERENCES decisions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS overrides (
            artist_id TEXT PRIMARY KEY,
            is_artificial INTEGER NOT NULL,
            reason TEXT,
            set_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_plays_started_at ON plays(started_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_artist ON decisions(artist_id)")
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_initializes_idempotently() {
        let pool = init_memory_pool().await.unwrap();
        // Re-running the DDL must be a no-op
        init_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in [
            "artists",
            "decision_sources",
            "decisions",
            "overrides",
            "plays",
        ] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }
}
