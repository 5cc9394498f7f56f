//! Wikidata source adapter
//!
//! Resolves the artist name to a Wikidata entity, then sweeps the entity's
//! classes and occupations for virtual/AI indicators. An entity with no
//! virtual indicator classifies as `human`; a missing entity yields no data.
//!
//! # API Reference
//! - Endpoint: https://query.wikidata.org/sparql
//! - Rate limits are generous for single-entity lookups; no limiter needed

use crate::sources::{SourceAdapter, SourceError};
use async_trait::async_trait;
use playguard_common::config::WikidataConfig;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Wikidata SPARQL endpoint
const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// User-Agent (Wikimedia asks API clients to identify themselves)
const USER_AGENT: &str = concat!(
    "playguard/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/playguard/playguard)"
);

/// Wikidata classes that mark a virtual/AI act, in label precedence order.
/// The virtual-band class maps to `band` with the virtual hint set so the
/// band policy can see it.
const VIRTUAL_CLASSES: &[(&str, Label, bool)] = &[
    ("Q55155641", Label::Vtuber, false),
    ("Q24236999", Label::VirtualIdol, false),
    ("Q125130106", Label::Vocaloid, false),
    ("Q3736859", Label::Band, true), // virtual band
];

/// Disambiguation pages are excluded from entity search and the class sweep
const DISAMBIGUATION_CLASS: &str = "Q4167410";

/// Wikidata adapter
pub struct WikidataSource {
    http_client: Client,
    timeout: Duration,
    base_confidence: f32,
}

impl WikidataSource {
    pub fn new(config: &WikidataConfig) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .default_headers(headers)
                .build()
                .expect("Failed to create HTTP client"),
            timeout: Duration::from_secs(config.timeout_seconds),
            base_confidence: 0.9,
        }
    }

    async fn run_query(&self, query: &str) -> Result<SparqlResponse, SourceError> {
        let response = self
            .http_client
            .get(SPARQL_ENDPOINT)
            .query(&[("query", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("Wikidata request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "Wikidata returned status {}",
                response.status()
            )));
        }

        response
            .json::<SparqlResponse>()
            .await
            .map_err(|e| SourceError::Parse(format!("Wikidata response: {}", e)))
    }

    /// Find the entity QID for an artist name: a human, a musical group, or
    /// anything with an occupation, excluding disambiguation pages.
    async fn find_entity(&self, artist_name: &str) -> Result<Option<String>, SourceError> {
        let escaped = artist_name.replace('\\', "\\\\").replace('"', "\\\"");
        let query = format!(
            r#"SELECT ?item WHERE {{
  {{
    ?item rdfs:label "{name}"@en .
    ?item wdt:P31/wdt:P279* wd:Q5 .
    FILTER NOT EXISTS {{ ?item wdt:P31 wd:{disambig} }}
  }}
  UNION
  {{
    ?item rdfs:label "{name}"@en .
    ?item wdt:P31/wdt:P279* wd:Q215380 .
    FILTER NOT EXISTS {{ ?item wdt:P31 wd:{disambig} }}
  }}
  UNION
  {{
    ?item rdfs:label "{name}"@en .
    ?item wdt:P106 ?occupation .
    FILTER NOT EXISTS {{ ?item wdt:P31 wd:{disambig} }}
  }}
}}
LIMIT 1"#,
            name = escaped,
            disambig = DISAMBIGUATION_CLASS,
        );

        let response = self.run_query(&query).await?;
        Ok(response
            .results
            .bindings
            .first()
            .and_then(|b| b.get("item"))
            .map(|v| qid_from_uri(&v.value)))
    }

    /// Sweep the entity's classes and occupations (with subclass closure)
    /// and collect any virtual indicators.
    async fn virtual_classes_of(&self, entity_id: &str) -> Result<Vec<String>, SourceError> {
        let query = format!(
            "SELECT ?class WHERE {{ wd:{} (wdt:P31|wdt:P106)/wdt:P279* ?class . }}",
            entity_id
        );

        let response = self.run_query(&query).await?;
        let matched: Vec<String> = response
            .results
            .bindings
            .iter()
            .filter_map(|b| b.get("class"))
            .map(|v| qid_from_uri(&v.value))
            .filter(|qid| VIRTUAL_CLASSES.iter().any(|(known, _, _)| known == qid))
            .collect();
        Ok(matched)
    }
}

#[async_trait]
impl SourceAdapter for WikidataSource {
    fn name(&self) -> &'static str {
        "wikidata"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, artist: &ArtistIdentity) -> Result<SourceSignal, SourceError> {
        let started = Instant::now();

        let Some(entity_id) = self.find_entity(&artist.name).await? else {
            debug!(artist = %artist.name, "Wikidata entity not found");
            return Ok(
                SourceSignal::no_data(self.name(), "entity not found")
                    .with_query_time(started.elapsed().as_millis() as u64),
            );
        };

        let matched = self.virtual_classes_of(&entity_id).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let url = format!("https://www.wikidata.org/wiki/{}", entity_id);

        let signal = match VIRTUAL_CLASSES
            .iter()
            .find(|(qid, _, _)| matched.iter().any(|m| m == qid))
        {
            Some(&(_, label, virtual_hint)) => {
                debug!(
                    artist = %artist.name,
                    entity = %entity_id,
                    label = %label,
                    classes = ?matched,
                    "Wikidata virtual indicator found"
                );
                SourceSignal::found(self.name(), label, self.base_confidence, matched, Some(url))
                    .with_virtual_hint(virtual_hint)
            }
            None => {
                debug!(artist = %artist.name, entity = %entity_id, "Wikidata: no virtual indicators");
                SourceSignal::found(
                    self.name(),
                    Label::Human,
                    self.base_confidence,
                    Vec::new(),
                    Some(url),
                )
            }
        };

        Ok(signal.with_query_time(elapsed_ms))
    }
}

fn qid_from_uri(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}

// ============================================================================
// SPARQL Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<std::collections::HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

// ============================================================================
// Tests
// ============================================================================
