//! Spotify Web API provider
//!
//! Consumes a bearer token resolved from configuration; token refresh is
//! handled outside this daemon. HTTP 429 is mapped to
//! [`ProviderError::RateLimited`] with the Retry-After hint so the monitor
//! can back off without treating it as a failure.
//!
//! # API Reference
//! - Endpoint: https://api.spotify.com/v1
//! - Playback: GET /me/player, POST /me/player/next
//! - Playlists: /me/playlists, /playlists/{id}, /playlists/{id}/tracks

use crate::provider::{
    CurrentTrack, PlayContext, PlaybackProvider, PlaybackSnapshot, PlaylistInfo, ProviderError,
};
use async_trait::async_trait;
use playguard_common::config::ProviderConfig;
use playguard_common::model::ArtistIdentity;
use playguard_common::{Error, Result};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Request timeout for all provider calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size for playlist listings and membership scans
const PAGE_LIMIT: u32 = 50;

/// Upper bound on membership-scan pages; playlists larger than this are
/// treated as not containing the track
const MAX_SCAN_PAGES: u32 = 20;

pub struct SpotifyProvider {
    http_client: Client,
    api_base: String,
}

impl SpotifyProvider {
    /// Fails when no access token is configured, a startup-time
    /// configuration error.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "playback provider access token not configured \
                     (provider.access_token or PLAYGUARD_SPOTIFY_TOKEN)"
                        .to_string(),
                )
            })?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Config("provider access token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        Ok(Self {
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .default_headers(headers)
                .build()
                .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Map non-success statuses to the provider error taxonomy
    async fn check(response: Response) -> std::result::Result<Response, ProviderError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ProviderError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Response(format!("status {}: {}", status, body)))
            }
        }
    }

    async fn get(&self, path: &str) -> std::result::Result<Response, ProviderError> {
        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Self::check(response).await
    }
}

#[async_trait]
impl PlaybackProvider for SpotifyProvider {
    async fn current_playback(&self) -> std::result::Result<PlaybackSnapshot, ProviderError> {
        let response = self.get("/me/player").await?;

        // 204: no active session
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(PlaybackSnapshot::default());
        }

        let payload: PlayerResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        let device_active = payload
            .device
            .as_ref()
            .map(|d| d.is_active)
            .unwrap_or(false);
        let device_name = payload.device.map(|d| d.name);

        // Only full tracks are classified; episodes and local files are not
        let track = payload
            .item
            .filter(|item| item.kind.as_deref() != Some("episode"))
            .map(|item| CurrentTrack {
                track_id: item.id,
                track_name: item.name,
                track_uri: item.uri,
                artists: item
                    .artists
                    .into_iter()
                    .map(|a| ArtistIdentity::new(a.id, a.name))
                    .collect(),
                context: payload.context.map(|c| PlayContext {
                    uri: c.uri,
                    kind: c.kind,
                }),
                device_name,
            });

        Ok(PlaybackSnapshot {
            track,
            is_playing: payload.is_playing,
            device_active,
        })
    }

    async fn skip_next(&self) -> std::result::Result<(), ProviderError> {
        let response = self
            .http_client
            .post(self.url("/me/player/next"))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Self::check(response).await?;
        debug!("Skipped to next track");
        Ok(())
    }

    async fn current_user_id(&self) -> std::result::Result<String, ProviderError> {
        let payload: UserResponse = self
            .get("/me")
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(payload.id)
    }

    async fn list_user_playlists(&self) -> std::result::Result<Vec<PlaylistInfo>, ProviderError> {
        let payload: PlaylistPage = self
            .get(&format!("/me/playlists?limit={}", PAGE_LIMIT))
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(payload
            .items
            .into_iter()
            .map(|p| PlaylistInfo {
                id: p.id,
                name: p.name,
                owner_id: p.owner.map(|o| o.id),
            })
            .collect())
    }

    async fn playlist(
        &self,
        playlist_id: &str,
    ) -> std::result::Result<Option<PlaylistInfo>, ProviderError> {
        match self.get(&format!("/playlists/{}", playlist_id)).await {
            Ok(response) => {
                let payload: PlaylistResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Response(e.to_string()))?;
                Ok(Some(PlaylistInfo {
                    id: payload.id,
                    name: payload.name,
                    owner_id: payload.owner.map(|o| o.id),
                }))
            }
            // Algorithmic mixes and radio contexts are not accessible
            Err(ProviderError::Response(_)) | Err(ProviderError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn playlist_contains(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> std::result::Result<bool, ProviderError> {
        let mut offset = 0;
        for _ in 0..MAX_SCAN_PAGES {
            let payload: TrackPage = self
                .get(&format!(
                    "/playlists/{}/tracks?fields=items(track(uri)),next&limit={}&offset={}",
                    playlist_id, PAGE_LIMIT, offset
                ))
                .await?
                .json()
                .await
                .map_err(|e| ProviderError::Response(e.to_string()))?;

            if payload
                .items
                .iter()
                .filter_map(|i| i.track.as_ref())
                .any(|t| t.uri == track_uri)
            {
                return Ok(true);
            }
            if payload.next.is_none() {
                return Ok(false);
            }
            offset += PAGE_LIMIT;
        }
        Ok(false)
    }

    async fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> std::result::Result<(), ProviderError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/playlists/{}/tracks", playlist_id)))
            .json(&json!({ "tracks": [{ "uri": track_uri }] }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Self::check(response).await?;
        debug!(playlist_id = %playlist_id, track_uri = %track_uri, "Removed track from playlist");
        Ok(())
    }

    async fn add_track_to_playlist(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> std::result::Result<(), ProviderError> {
        let response = self
            .http_client
            .post(self.url(&format!("/playlists/{}/tracks", playlist_id)))
            .json(&json!({ "uris": [track_uri] }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Self::check(response).await?;
        debug!(playlist_id = %playlist_id, track_uri = %track_uri, "Added track to playlist");
        Ok(())
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> std::result::Result<PlaylistInfo, ProviderError> {
        let user_id = self.current_user_id().await?;
        let response = self
            .http_client
            .post(self.url(&format!("/users/{}/playlists", user_id)))
            .json(&json!({
                "name": name,
                "public": false,
                "description": description,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let payload: PlaylistResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(PlaylistInfo {
            id: payload.id,
            name: payload.name,
            owner_id: payload.owner.map(|o| o.id),
        })
    }
}

// ============================================================================
// Spotify API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    #[serde(default)]
    is_playing: bool,
    device: Option<DeviceInfo>,
    context: Option<ContextInfo>,
    item: Option<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    name: String,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ContextInfo {
    uri: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
    name: String,
    uri: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistInfo>,
}

#[derive(Debug, Deserialize)]
struct ArtistInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistResponse>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    id: String,
    name: String,
    owner: Option<OwnerInfo>,
}

#[derive(Debug, Deserialize)]
struct OwnerInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackPageItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackPageItem {
    track: Option<TrackUri>,
}

#[derive(Debug, Deserialize)]
struct TrackUri {
    uri: String,
}

// ============================================================================
// Tests
// ============================================================================
