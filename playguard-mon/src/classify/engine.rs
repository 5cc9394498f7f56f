//! Classification engine
//!
//! Resolution order, short-circuiting at the first conclusive step:
//! 1. Override check: always wins, bypasses the cache, never cached
//! 2. Cache check: a non-expired entry is returned unchanged
//! 3. Concurrent source queries, each under its own timeout
//! 4. Aggregation under the agreement rule
//! 5. LLM fallback on inconclusive or low-confidence aggregates
//! 6. Cache write + journal
//!
//! The whole source/aggregate/fallback stage runs under one bounded timeout;
//! on exhaustion the engine falls through to `unknown`/not-artificial so the
//! polling loop is never stalled. `classify` cannot fail; every internal
//! error degrades into the decision's audit trail.

use crate::classify::aggregator::{aggregate, Aggregate, AggregatePolicy};
use crate::classify::cache::DecisionCache;
use crate::classify::llm::OllamaFallback;
use crate::classify::overrides::OverrideStore;
use crate::db;
use crate::sources::SourceAdapter;
use chrono::Utc;
use playguard_common::config::ClassificationConfig;
use playguard_common::events::{EventBus, PlayguardEvent};
use playguard_common::model::{ArtistIdentity, Decision, Label, Override, SourceSignal};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ClassificationEngine {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    overrides: OverrideStore,
    cache: DecisionCache,
    fallback: Option<OllamaFallback>,
    policy: AggregatePolicy,
    llm_confidence_threshold: f32,
    classify_timeout: Duration,
    cache_duration: chrono::Duration,
    pool: SqlitePool,
    event_bus: EventBus,
}

impl ClassificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        overrides: OverrideStore,
        cache: DecisionCache,
        fallback: Option<OllamaFallback>,
        config: &ClassificationConfig,
        pool: SqlitePool,
        event_bus: EventBus,
    ) -> Self {
        Self {
            adapters,
            overrides,
            cache,
            fallback,
            policy: AggregatePolicy {
                min_source_agreement: config.min_source_agreement,
                band_policy_enabled: config.band_policy.virtual_or_fictional_is_artificial,
            },
            llm_confidence_threshold: config.llm_confidence_threshold,
            classify_timeout: Duration::from_secs(config.classify_timeout_seconds),
            cache_duration: chrono::Duration::seconds(config.cache_duration_seconds as i64),
            pool,
            event_bus,
        }
    }

    /// Classify an artist. Never fails and never blocks beyond the
    /// configured timeout.
    pub async fn classify(&self, artist: &ArtistIdentity) -> Decision {
        self.classify_inner(artist, false).await
    }

    /// Re-run the full pipeline ignoring any cached decision (the cache is
    /// still rewritten with the fresh result). Overrides still win.
    pub async fn reclassify(&self, artist: &ArtistIdentity) -> Decision {
        self.classify_inner(artist, true).await
    }

    async fn classify_inner(&self, artist: &ArtistIdentity, bypass_cache: bool) -> Decision {
        // 1. Override supersedes everything, including the cache
        if let Some(ov) = self.overrides.get(&artist.id).await {
            info!(artist = %artist.name, is_artificial = ov.is_artificial, "Using override");
            let decision = decision_from_override(artist, &ov);
            self.journal(&decision, false).await;
            self.emit_decision(&decision);
            return decision;
        }

        // 2. Cache
        if !bypass_cache {
            if let Some(decision) = self.cache.get(&artist.id).await {
                debug!(artist = %artist.name, "Using cached decision");
                return decision;
            }
        }

        // 3-5. Sources, aggregation, fallback, all under one timeout
        info!(artist = %artist.name, artist_id = %artist.id, "Classifying artist");
        let decision = match tokio::time::timeout(
            self.classify_timeout,
            self.resolve_fresh(artist),
        )
        .await
        {
            Ok(decision) => decision,
            Err(_) => {
                warn!(
                    artist = %artist.name,
                    timeout_s = self.classify_timeout.as_secs(),
                    "Classification pass timed out, failing open"
                );
                // Not cached: the sources were never fully consulted, so the
                // next play should retry rather than pin unknown for a week.
                let decision = timeout_decision(artist, self.classify_timeout);
                self.journal(&decision, false).await;
                self.emit_decision(&decision);
                return decision;
            }
        };

        // 6. Cache write
        self.cache.insert(decision.clone()).await;
        self.journal(&decision, true).await;
        self.emit_decision(&decision);
        decision
    }

    /// One fresh pass: fan out to every adapter, aggregate, consult the
    /// fallback when the aggregate is inconclusive or weak.
    async fn resolve_fresh(&self, artist: &ArtistIdentity) -> Decision {
        let signals = self.query_sources(artist).await;
        let aggregate = aggregate(&signals, self.adapters.len(), &self.policy);

        let needs_fallback = !aggregate.is_conclusive()
            || aggregate.confidence < self.llm_confidence_threshold;

        let mut decision = decision_from_aggregate(artist, aggregate, signals);

        if needs_fallback {
            if let Some(ref fallback) = self.fallback {
                debug!(artist = %artist.name, "Aggregate inconclusive, consulting LLM fallback");
                if let Some(verdict) = fallback.classify(artist, &decision.signals).await {
                    info!(
                        artist = %artist.name,
                        label = %verdict.label,
                        confidence = verdict.confidence,
                        "LLM fallback verdict"
                    );
                    decision.label = verdict.label;
                    decision.is_artificial = verdict.is_artificial;
                    decision.confidence = verdict.confidence;
                    decision.used_llm_fallback = true;
                    decision.reason = format!("{}; llm fallback: {}", decision.reason, verdict.reason);
                }
            }
        }

        decision
    }

    /// Dispatch all adapters concurrently, each bounded by its own timeout.
    /// A failing or timed-out adapter becomes a null signal, never an error.
    async fn query_sources(&self, artist: &ArtistIdentity) -> Vec<SourceSignal> {
        let lookups = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let artist = artist.clone();
            async move {
                let name = adapter.name();
                match tokio::time::timeout(adapter.timeout(), adapter.lookup(&artist)).await {
                    Ok(Ok(signal)) => signal,
                    Ok(Err(e)) => {
                        warn!(source = name, error = %e, "Source lookup failed");
                        SourceSignal::no_data(name, e.to_string())
                    }
                    Err(_) => {
                        warn!(source = name, "Source lookup timed out");
                        SourceSignal::no_data(
                            name,
                            format!("timed out after {}s", adapter.timeout().as_secs()),
                        )
                    }
                }
            }
        });
        futures::future::join_all(lookups).await
    }

    /// Journal to the persistence sink. Failures are logged, never surfaced:
    /// a decision that cannot be journaled is still a valid decision.
    async fn journal(&self, decision: &Decision, cacheable: bool) {
        let cached_until = cacheable.then(|| decision.decided_at + self.cache_duration);
        if let Err(e) = db::decisions::insert_decision(&self.pool, decision, cached_until).await {
            warn!(error = %e, decision_id = %decision.decision_id, "Failed to journal decision");
        }
    }

    fn emit_decision(&self, decision: &Decision) {
        let _ = self.event_bus.emit(PlayguardEvent::DecisionMade {
            artist_id: decision.artist.id.clone(),
            label: decision.label.as_str().to_string(),
            is_artificial: decision.is_artificial,
            confidence: decision.confidence,
            used_llm_fallback: decision.used_llm_fallback,
            timestamp: decision.decided_at,
        });
    }
}

/// An override carries only the artificial flag, so the label is the
/// generic class member for that flag.
fn decision_from_override(artist: &ArtistIdentity, ov: &Override) -> Decision {
    Decision {
        decision_id: Uuid::new_v4(),
        artist: artist.clone(),
        label: if ov.is_artificial {
            Label::AiGenerated
        } else {
            Label::Human
        },
        confidence: 1.0,
        is_artificial: ov.is_artificial,
        agreeing_sources: BTreeSet::from(["override".to_string()]),
        band_policy_applied: false,
        used_llm_fallback: false,
        reason: format!(
            "user override: {}",
            ov.reason.as_deref().unwrap_or("manual classification")
        ),
        signals: Vec::new(),
        decided_at: Utc::now(),
    }
}

fn decision_from_aggregate(
    artist: &ArtistIdentity,
    aggregate: Aggregate,
    signals: Vec<SourceSignal>,
) -> Decision {
    Decision {
        decision_id: Uuid::new_v4(),
        artist: artist.clone(),
        label: aggregate.label,
        confidence: aggregate.confidence,
        is_artificial: aggregate.is_artificial,
        agreeing_sources: aggregate.agreeing_sources,
        band_policy_applied: aggregate.band_policy_applied,
        used_llm_fallback: false,
        reason: aggregate.reason,
        signals,
        decided_at: Utc::now(),
    }
}

fn timeout_decision(artist: &ArtistIdentity, budget: Duration) -> Decision {
    Decision {
        decision_id: Uuid::new_v4(),
        artist: artist.clone(),
        label: Label::Unknown,
        confidence: 0.0,
        is_artificial: false,
        agreeing_sources: BTreeSet::new(),
        band_policy_applied: false,
        used_llm_fallback: false,
        reason: format!(
            "classification timed out after {}s; sources not fully consulted",
            budget.as_secs()
        ),
        signals: Vec::new(),
        decided_at: Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================
