//! Shared test fixtures: scripted source adapters and engine wiring
#![allow(dead_code)]

use async_trait::async_trait;
use playguard_common::config::ClassificationConfig;
use playguard_common::events::EventBus;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use playguard_mon::classify::{ClassificationEngine, DecisionCache, OverrideStore};
use playguard_mon::sources::{SourceAdapter, SourceError};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Adapter with a fixed, scripted response and a call counter
pub struct ScriptedSource {
    pub name: &'static str,
    pub label: Option<Label>,
    pub virtual_hint: bool,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub timeout: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn reporting(name: &'static str, label: Label) -> Arc<Self> {
        Arc::new(Self {
            name,
            label: Some(label),
            virtual_hint: false,
            fail: false,
            delay: None,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    }

    /// A `band` signal annotated as a virtual band (band-policy input)
    pub fn virtual_band(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            label: Some(Label::Band),
            virtual_hint: true,
            fail: false,
            delay: None,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn no_data(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            label: None,
            virtual_hint: false,
            fail: false,
            delay: None,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            label: None,
            virtual_hint: false,
            fail: true,
            delay: None,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    }

    /// Sleeps longer than its own timeout, so the engine must cut it off
    pub fn hanging(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            label: Some(Label::Human),
            virtual_hint: false,
            fail: false,
            delay: Some(Duration::from_secs(30)),
            timeout: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, _artist: &ArtistIdentity) -> Result<SourceSignal, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Unavailable("scripted failure".to_string()));
        }
        match self.label {
            Some(label) => Ok(SourceSignal::found(self.name, label, 0.9, Vec::new(), None)
                .with_virtual_hint(self.virtual_hint)),
            None => Ok(SourceSignal::no_data(self.name, "no data scripted")),
        }
    }
}

/// Engine wired against an in-memory database with default classification
/// config and no LLM fallback
pub async fn engine_with(
    adapters: Vec<Arc<dyn SourceAdapter>>,
) -> (Arc<ClassificationEngine>, SqlitePool, OverrideStore, EventBus) {
    engine_with_config(adapters, ClassificationConfig::default()).await
}

pub async fn engine_with_config(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: ClassificationConfig,
) -> (Arc<ClassificationEngine>, SqlitePool, OverrideStore, EventBus) {
    let pool = playguard_mon::db::init_memory_pool().await.unwrap();
    let event_bus = EventBus::new(64);
    let overrides = OverrideStore::load(pool.clone()).await.unwrap();
    let engine = Arc::new(ClassificationEngine::new(
        adapters,
        overrides.clone(),
        DecisionCache::new(config.cache_duration_seconds),
        None,
        &config,
        pool.clone(),
        event_bus.clone(),
    ));
    (engine, pool, overrides, event_bus)
}

pub fn artist() -> ArtistIdentity {
    ArtistIdentity::new("artist-1", "Test Artist")
}
