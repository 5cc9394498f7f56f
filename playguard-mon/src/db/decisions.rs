//! Decision journal with nested source evidence
//!
//! Append-only. Every decision the engine produces is journaled here with
//! its constituent signals, so no classification is a silent black box.

use chrono::{DateTime, Utc};
use playguard_common::model::{Decision, SourceSignal};
use playguard_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// Decision record for the review API
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub decided_at: DateTime<Utc>,
    pub label: String,
    pub is_artificial: bool,
    pub confidence: f64,
    pub agreeing_sources: Vec<String>,
    pub band_policy_applied: bool,
    pub used_llm_fallback: bool,
    pub reason: String,
    pub cached_until: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    artist_id: String,
    artist_name: String,
    decided_at: DateTime<Utc>,
    label: String,
    is_artificial: bool,
    confidence: f64,
    agreeing_sources: String,
    band_policy_applied: bool,
    used_llm_fallback: bool,
    reason: String,
    cached_until: Option<DateTime<Utc>>,
}

impl DecisionRow {
    fn into_record(self) -> DecisionRecord {
        let agreeing_sources =
            serde_json::from_str(&self.agreeing_sources).unwrap_or_default();
        DecisionRecord {
            id: self.id,
            artist_id: self.artist_id,
            artist_name: self.artist_name,
            decided_at: self.decided_at,
            label: self.label,
            is_artificial: self.is_artificial,
            confidence: self.confidence,
            agreeing_sources,
            band_policy_applied: self.band_policy_applied,
            used_llm_fallback: self.used_llm_fallback,
            reason: self.reason,
            cached_until: self.cached_until,
        }
    }
}

/// Journal a decision and its signals. `cached_until` is `None` for
/// override-backed decisions, which are never cached.
pub async fn insert_decision(
    pool: &SqlitePool,
    decision: &Decision,
    cached_until: Option<DateTime<Utc>>,
) -> Result<()> {
    let agreeing = serde_json::to_string(&decision.agreeing_sources)
        .map_err(|e| Error::Internal(format!("serialize agreeing_sources: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO decisions
            (id, artist_id, artist_name, decided_at, label, is_artificial,
             confidence, agreeing_sources, band_policy_applied,
             used_llm_fallback, reason, cached_until)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(decision.decision_id.to_string())
    .bind(&decision.artist.id)
    .bind(&decision.artist.name)
    .bind(decision.decided_at)
    .bind(decision.label.as_str())
    .bind(decision.is_artificial)
    .bind(decision.confidence as f64)
    .bind(agreeing)
    .bind(decision.band_policy_applied)
    .bind(decision.used_llm_fallback)
    .bind(&decision.reason)
    .bind(cached_until)
    .execute(pool)
    .await?;

    for signal in &decision.signals {
        insert_signal(pool, &decision.decision_id.to_string(), signal).await?;
    }
    Ok(())
}

async fn insert_signal(
    pool: &SqlitePool,
    decision_id: &str,
    signal: &SourceSignal,
) -> Result<()> {
    let evidence = serde_json::to_string(&signal.evidence)
        .map_err(|e| Error::Internal(format!("serialize evidence: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO decision_sources
            (decision_id, source, label, confidence, evidence, url,
             virtual_hint, query_time_ms, queried_at, error)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(decision_id)
    .bind(&signal.source)
    .bind(signal.label.map(|l| l.as_str()))
    .bind(signal.confidence.map(|c| c as f64))
    .bind(evidence)
    .bind(&signal.url)
    .bind(signal.virtual_hint)
    .bind(signal.query_time_ms as i64)
    .bind(signal.queried_at)
    .bind(&signal.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Recent decisions, newest first
pub async fn list_decisions(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<DecisionRecord>> {
    let rows = sqlx::query_as::<_, DecisionRow>(
        r#"
        SELECT id, artist_id, artist_name, decided_at, label, is_artificial,
               confidence, agreeing_sources, band_policy_applied,
               used_llm_fallback, reason, cached_until
        FROM decisions
        ORDER BY decided_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(DecisionRow::into_record).collect())
}

/// Recent decisions for one artist, newest first
pub async fn decisions_for_artist(
    pool: &SqlitePool,
    artist_id: &str,
    limit: i64,
) -> Result<Vec<DecisionRecord>> {
    let rows = sqlx::query_as::<_, DecisionRow>(
        r#"
        SELECT id, artist_id, artist_name, decided_at, label, is_artificial,
               confidence, agreeing_sources, band_policy_applied,
               used_llm_fallback, reason, cached_until
        FROM decisions
        WHERE artist_id = ?
        ORDER BY decided_at DESC
        LIMIT ?
        "#,
    )
    .bind(artist_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(DecisionRow::into_record).collect())
}

/// Signals journaled for one decision
pub async fn signals_for_decision(
    pool: &SqlitePool,
    decision_id: &str,
) -> Result<Vec<SignalRecord>> {
    let rows = sqlx::query_as::<_, SignalRow>(
        r#"
        SELECT source, label, confidence, evidence, url, virtual_hint,
               query_time_ms, queried_at, error
        FROM decision_sources
        WHERE decision_id = ?
        ORDER BY source
        "#,
    )
    .bind(decision_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(SignalRow::into_record).collect())
}

/// Journaled signal for the review API
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub source: String,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub evidence: Vec<String>,
    pub url: Option<String>,
    pub virtual_hint: bool,
    pub query_time_ms: i64,
    pub queried_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    source: String,
    label: Option<String>,
    confidence: Option<f64>,
    evidence: String,
    url: Option<String>,
    virtual_hint: bool,
    query_time_ms: i64,
    queried_at: DateTime<Utc>,
    error: Option<String>,
}

impl SignalRow {
    fn into_record(self) -> SignalRecord {
        let evidence = serde_json::from_str(&self.evidence).unwrap_or_default();
        SignalRecord {
            source: self.source,
            label: self.label,
            confidence: self.confidence,
            evidence,
            url: self.url,
            virtual_hint: self.virtual_hint,
            query_time_ms: self.query_time_ms,
            queried_at: self.queried_at,
            error: self.error,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
