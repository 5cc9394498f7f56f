//! Last.fm source adapter
//!
//! Fetches the artist's top tags and matches them against the virtual
//! keyword set. Tags below the configured vote count are discarded as noise
//! before matching. Tags without a virtual match classify as `human`; an
//! artist with no tags at all yields no data.
//!
//! # API Reference
//! - Endpoint: https://ws.audioscrobbler.com/2.0/ (artist.getTopTags)
//! - Requires an API key

use crate::sources::{is_virtual_tag, label_from_virtual_tags, SourceAdapter, SourceError};
use async_trait::async_trait;
use playguard_common::config::LastFmConfig;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last.fm API base URL
const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Last.fm adapter
pub struct LastFmSource {
    http_client: Client,
    api_key: String,
    timeout: Duration,
    min_tag_count: u32,
    base_confidence: f32,
}

impl LastFmSource {
    /// `api_key` presence is enforced by config validation before this is
    /// constructed.
    pub fn new(config: &LastFmConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: config.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(config.timeout_seconds),
            min_tag_count: config.min_tag_count,
            base_confidence: 0.7,
        }
    }

    async fn top_tags(&self, artist_name: &str) -> Result<Vec<Tag>, SourceError> {
        let response = self
            .http_client
            .get(LASTFM_API_URL)
            .query(&[
                ("method", "artist.getTopTags"),
                ("artist", artist_name),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("Last.fm request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "Last.fm returned status {}",
                response.status()
            )));
        }

        let payload: TopTagsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Last.fm response: {}", e)))?;

        Ok(payload.toptags.map(|t| t.tag).unwrap_or_default())
    }
}

#[async_trait]
impl SourceAdapter for LastFmSource {
    fn name(&self) -> &'static str {
        "lastfm"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, artist: &ArtistIdentity) -> Result<SourceSignal, SourceError> {
        let started = Instant::now();

        let tags = self.top_tags(&artist.name).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if tags.is_empty() {
            debug!(artist = %artist.name, "Last.fm: no tags found");
            return Ok(SourceSignal::no_data(self.name(), "no tags found")
                .with_query_time(elapsed_ms));
        }

        let matching: Vec<String> = tags
            .iter()
            .filter(|t| t.count >= self.min_tag_count && is_virtual_tag(&t.name))
            .map(|t| t.name.clone())
            .collect();

        let url = format!(
            "https://www.last.fm/music/{}",
            urlencoding::encode(&artist.name)
        );

        let signal = if matching.is_empty() {
            debug!(artist = %artist.name, "Last.fm: no virtual tags above threshold");
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
                label = %label,
                tags = ?matching,
                "Last.fm virtual tags found"
            );
            SourceSignal::found(self.name(), label, self.base_confidence, matching, Some(url))
        };

        Ok(signal.with_query_time(elapsed_ms))
    }
}

// ============================================================================
// Last.fm API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TopTagsResponse {
    toptags: Option<TopTags>,
}

#[derive(Debug, Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    count: u32,
}

// ============================================================================
// Tests
// ============================================================================
