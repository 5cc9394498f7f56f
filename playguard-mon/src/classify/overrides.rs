//! Override store: user-entered classifications, checked before anything else
//!
//! In-memory map hydrated from the overrides table at startup and kept
//! write-through, so the polling loop and the review API observe the same
//! state. Reads are atomic with respect to concurrent writes.

use crate::db;
use playguard_common::model::Override;
use playguard_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone)]
pub struct OverrideStore {
    pool: SqlitePool,
    inner: Arc<RwLock<HashMap<String, Override>>>,
}

impl OverrideStore {
    /// Hydrate the store from the database
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let existing = db::overrides::list_overrides(&pool).await?;
        let map: HashMap<String, Override> = existing
            .into_iter()
            .map(|ov| (ov.artist_id.clone(), ov))
            .collect();
        if !map.is_empty() {
            info!(count = map.len(), "Loaded artist overrides");
        }
        Ok(Self {
            pool,
            inner: Arc::new(RwLock::new(map)),
        })
    }

    pub async fn get(&self, artist_id: &str) -> Option<Override> {
        self.inner.read().await.get(artist_id).cloned()
    }

    /// Insert or replace, write-through to the database first so a crash
    /// never leaves the map ahead of the table
    pub async fn set(&self, ov: Override) -> Result<()> {
        db::overrides::upsert_override(&self.pool, &ov).await?;
        self.inner.write().await.insert(ov.artist_id.clone(), ov);
        Ok(())
    }

    /// Remove an override; returns whether one existed
    pub async fn delete(&self, artist_id: &str) -> Result<bool> {
        let existed = db::overrides::delete_override(&self.pool, artist_id).await?;
        self.inner.write().await.remove(artist_id);
        Ok(existed)
    }

    pub async fn all(&self) -> Vec<Override> {
        let mut overrides: Vec<Override> = self.inner.read().await.values().cloned().collect();
        overrides.sort_by(|a, b| b.set_at.cmp(&a.set_at));
        overrides
    }
}

// ============================================================================
// Tests
// ============================================================================
