//! TTL cache for classification decisions
//!
//! Shared between the polling loop and the review API. Reads see either the
//! old or the new entry atomically, never a partial one. A lookup past
//! expiry is a cache miss, not an error.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use playguard_common::model::Decision;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One cached decision with its expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub decision: Decision,
    pub expires_at: DateTime<Utc>,
}

/// Decision cache keyed by artist id
#[derive(Clone)]
pub struct DecisionCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: ChronoDuration,
}

impl DecisionCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl: ChronoDuration::seconds(ttl_seconds as i64),
        }
    }

    /// Non-expired decision for the artist, if any
    pub async fn get(&self, artist_id: &str) -> Option<Decision> {
        let map = self.inner.read().await;
        let entry = map.get(artist_id)?;
        if entry.expires_at <= Utc::now() {
            debug!(artist_id = %artist_id, "Cache entry expired");
            return None;
        }
        Some(entry.decision.clone())
    }

    /// Store a decision; `expires_at = decided_at + ttl`
    pub async fn insert(&self, decision: Decision) {
        let expires_at = decision.decided_at + self.ttl;
        let artist_id = decision.artist.id.clone();
        let mut map = self.inner.write().await;
        map.insert(
            artist_id,
            CacheEntry {
                decision,
                expires_at,
            },
        );
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
