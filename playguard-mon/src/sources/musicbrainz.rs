//! MusicBrainz source adapter
//!
//! Searches the artist by name, then fetches the artist's tags and genres
//! and matches them against the virtual keyword set. Tags without a virtual
//! match classify as `human`; an artist MusicBrainz does not know yields no
//! data.
//!
//! # API Reference
//! - Endpoint: https://musicbrainz.org/ws/2
//! - Rate Limit: 1 request/second (MusicBrainz Terms of Service)
//! - An identifying User-Agent is required

use crate::sources::{is_virtual_tag, label_from_virtual_tags, SourceAdapter, SourceError};
use async_trait::async_trait;
use playguard_common::config::MusicBrainzConfig;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use reqwest::{header, Client};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// MusicBrainz API base URL
const MUSICBRAINZ_API_URL: &str = "https://musicbrainz.org/ws/2";

/// Rate limit: 1 request per second (MusicBrainz TOS)
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1000);

/// MusicBrainz adapter
///
/// Implements rate limiting (1 req/sec) per MusicBrainz Terms of Service;
/// one `lookup` issues two requests (search, then tag fetch), so a single
/// call can take just over a second.
pub struct MusicBrainzSource {
    http_client: Client,
    timeout: Duration,
    base_confidence: f32,
    /// Rate limiter (last request time)
    rate_limiter: Arc<Mutex<Option<Instant>>>,
}

impl MusicBrainzSource {
    pub fn new(config: &MusicBrainzConfig) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| header::HeaderValue::from_static("playguard")),
        );

        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .default_headers(headers)
                .build()
                .expect("Failed to create HTTP client"),
            // Budget for two rate-limited requests plus transfer time
            timeout: Duration::from_secs(config.timeout_seconds) + 2 * RATE_LIMIT_INTERVAL,
            base_confidence: 0.85,
            rate_limiter: Arc::new(Mutex::new(None)),
        }
    }

    /// Enforce rate limit (1 request/second), sleeping when necessary
    async fn enforce_rate_limit(&self) {
        let mut last_request = self.rate_limiter.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < RATE_LIMIT_INTERVAL {
                let sleep_duration = RATE_LIMIT_INTERVAL - elapsed;
                debug!(
                    sleep_ms = sleep_duration.as_millis(),
                    "Rate limiting: sleeping before MusicBrainz request"
                );
                sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    /// Search for the artist's MBID by name (best match only)
    async fn search_artist(&self, artist_name: &str) -> Result<Option<String>, SourceError> {
        self.enforce_rate_limit().await;

        let query = format!("artist:\"{}\"", artist_name.replace('"', "\\\""));
        let response = self
            .http_client
            .get(format!("{}/artist/", MUSICBRAINZ_API_URL))
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("MusicBrainz search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "MusicBrainz search returned status {}",
                response.status()
            )));
        }

        let search: ArtistSearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("MusicBrainz search response: {}", e)))?;

        Ok(search.artists.into_iter().next().map(|a| a.id))
    }

    /// Fetch the artist's tags and genres for the MBID
    async fn artist_tags(&self, mbid: &str) -> Result<Vec<String>, SourceError> {
        self.enforce_rate_limit().await;

        let response = self
            .http_client
            .get(format!("{}/artist/{}", MUSICBRAINZ_API_URL, mbid))
            .query(&[("inc", "tags+genres"), ("fmt", "json")])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("MusicBrainz lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "MusicBrainz lookup returned status {}",
                response.status()
            )));
        }

        let artist: ArtistLookupResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("MusicBrainz lookup response: {}", e)))?;

        let mut tags: Vec<String> = artist.tags.into_iter().map(|t| t.name).collect();
        tags.extend(artist.genres.into_iter().map(|g| g.name));
        Ok(tags)
    }
}

#[async_trait]
impl SourceAdapter for MusicBrainzSource {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, artist: &ArtistIdentity) -> Result<SourceSignal, SourceError> {
        let started = std::time::Instant::now();

        let Some(mbid) = self.search_artist(&artist.name).await? else {
            debug!(artist = %artist.name, "MusicBrainz artist not found");
            return Ok(
                SourceSignal::no_data(self.name(), "artist not found")
                    .with_query_time(started.elapsed().as_millis() as u64),
            );
        };

        let tags = self.artist_tags(&mbid).await?;
        let matching: Vec<String> = tags.iter().filter(|t| is_virtual_tag(t)).cloned().collect();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let url = format!("https://musicbrainz.org/artist/{}", mbid);

        let signal = if matching.is_empty() {
            debug!(artist = %artist.name, mbid = %mbid, "MusicBrainz: no virtual tags");
            SourceSignal::found(
                self.name(),
                Label::Human,
                self.base_confidence,
                Vec::new(),
                Some(url),
            )
        } else {
            let label = label_from_virtual_tags(&matching);
            debug!(
                artist = %artist.name,
                mbid = %mbid,
                label = %label,
                tags = ?matching,
                "MusicBrainz virtual tags found"
            );
            SourceSignal::found(self.name(), label, self.base_confidence, matching, Some(url))
        };

        Ok(signal.with_query_time(elapsed_ms))
    }
}

// ============================================================================
// MusicBrainz API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<ArtistSearchEntry>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ArtistLookupResponse {
    #[serde(default)]
    tags: Vec<NamedEntry>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

// ============================================================================
// Tests
// ============================================================================
