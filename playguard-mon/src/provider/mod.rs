//! Playback provider boundary
//!
//! The monitor consumes the provider through [`PlaybackProvider`] so the
//! polling loop and the action executor can be exercised against a scripted
//! fake. Rate limiting is a first-class outcome, distinguishable from every
//! other failure, with the provider's retry-after hint carried along.

pub mod spotify;

pub use spotify::SpotifyProvider;

use async_trait::async_trait;
use playguard_common::model::ArtistIdentity;
use std::time::Duration;
use thiserror::Error;

/// Currently-playing snapshot. `track == None` covers both no-session and
/// nothing-playing; the state machine treats either as Idle.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSnapshot {
    pub track: Option<CurrentTrack>,
    pub is_playing: bool,
    pub device_active: bool,
}

/// The track under the cursor, with enough artist metadata to seed
/// classification without a second round-trip
#[derive(Debug, Clone)]
pub struct CurrentTrack {
    pub track_id: String,
    pub track_name: String,
    pub track_uri: String,
    /// Credited artists in order; the first is the primary
    pub artists: Vec<ArtistIdentity>,
    pub context: Option<PlayContext>,
    pub device_name: Option<String>,
}

impl CurrentTrack {
    pub fn primary_artist(&self) -> Option<&ArtistIdentity> {
        self.artists.first()
    }
}

/// What the track is playing from (playlist, album, ...)
#[derive(Debug, Clone)]
pub struct PlayContext {
    pub uri: String,
    pub kind: String,
}

impl PlayContext {
    /// Trailing id segment of a context URI like `spotify:playlist:37i9dQ`
    pub fn id(&self) -> &str {
        self.uri.rsplit(':').next().unwrap_or(&self.uri)
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
}

/// Provider failure taxonomy. `RateLimited` drives monitor backoff; the
/// rest degrade at the caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider authorization missing or rejected")]
    Unauthorized,

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("unexpected provider response: {0}")]
    Response(String),
}

/// Playback provider operations the core consumes
#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    async fn current_playback(&self) -> Result<PlaybackSnapshot, ProviderError>;

    async fn skip_next(&self) -> Result<(), ProviderError>;

    async fn current_user_id(&self) -> Result<String, ProviderError>;

    async fn list_user_playlists(&self) -> Result<Vec<PlaylistInfo>, ProviderError>;

    /// `None` when the playlist is not accessible (algorithmic mixes and
    /// radio contexts often are not); expected, not an error
    async fn playlist(&self, playlist_id: &str) -> Result<Option<PlaylistInfo>, ProviderError>;

    async fn playlist_contains(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> Result<bool, ProviderError>;

    async fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> Result<(), ProviderError>;

    async fn add_track_to_playlist(
        &self,
        playlist_id: &str,
        track_uri: &str,
    ) -> Result<(), ProviderError>;

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PlaylistInfo, ProviderError>;
}

// ============================================================================
// Test support
// ============================================================================
