//! Action executor: skip, playlist removal, blocked-playlist filing
//!
//! Runs after a sufficiently confident artificial decision. Every provider
//! call is retried a bounded number of times with backoff; exhausted retries
//! are recorded on the play as a failure annotation and the polling loop
//! continues. Adding a track already in the blocked playlist is a no-op.

use crate::provider::{CurrentTrack, PlaybackProvider, ProviderError};
use playguard_common::config::ActionsConfig;
use playguard_common::model::{ActionTaken, Decision};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Bounded retries per provider action
const MAX_ACTION_ATTEMPTS: usize = 3;
/// First retry delay; doubled per attempt. A rate-limit retry-after hint
/// takes precedence.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// What the executor did for one play
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: ActionTaken,
    pub added_to_blocked: bool,
    pub error: Option<String>,
}

pub struct ActionExecutor {
    provider: Arc<dyn PlaybackProvider>,
    config: ActionsConfig,
    user_id: Option<String>,
    blocked_playlist_id: Option<String>,
}

impl ActionExecutor {
    /// Resolve the current user and the blocked playlist (found by name, or
    /// created private if missing). Failures degrade the respective action
    /// rather than aborting startup.
    pub async fn bootstrap(provider: Arc<dyn PlaybackProvider>, config: ActionsConfig) -> Self {
        let user_id = match provider.current_user_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Could not resolve provider user; playlist removal disabled");
                None
            }
        };

        let blocked_playlist_id = if config.add_to_blocked_playlist.is_empty() {
            None
        } else {
            Self::ensure_blocked_playlist(&provider, &config.add_to_blocked_playlist).await
        };

        Self {
            provider,
            config,
            user_id,
            blocked_playlist_id,
        }
    }

    async fn ensure_blocked_playlist(
        provider: &Arc<dyn PlaybackProvider>,
        name: &str,
    ) -> Option<String> {
        match provider.list_user_playlists().await {
            Ok(playlists) => {
                if let Some(existing) = playlists.iter().find(|p| p.name == name) {
                    info!(playlist = %name, id = %existing.id, "Found blocked playlist");
                    return Some(existing.id.clone());
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not list playlists while resolving blocked playlist");
                return None;
            }
        }

        match provider
            .create_playlist(name, "Artificial artists blocked by playguard")
            .await
        {
            Ok(created) => {
                info!(playlist = %name, id = %created.id, "Created blocked playlist");
                Some(created.id)
            }
            Err(e) => {
                warn!(error = %e, playlist = %name, "Could not create blocked playlist");
                None
            }
        }
    }

    /// Whether this decision clears the action threshold
    pub fn should_act(&self, decision: &Decision) -> bool {
        decision.is_artificial && decision.confidence >= self.config.action_threshold
    }

    /// Apply the configured actions for an artificial track. Never fails;
    /// the outcome records what succeeded and why anything did not.
    pub async fn execute(&self, track: &CurrentTrack, decision: &Decision) -> ActionOutcome {
        let mut skipped = false;
        let mut removed = false;
        let mut added_to_blocked = false;
        let mut errors: Vec<String> = Vec::new();

        warn!(
            track = %track.track_name,
            artist = %decision.artist.name,
            label = %decision.label,
            confidence = decision.confidence,
            "Artificial artist detected, taking action"
        );

        if self.config.auto_skip {
            match with_retries("skip", || self.provider.skip_next()).await {
                Ok(()) => {
                    skipped = true;
                    info!(track = %track.track_name, "Skipped track");
                }
                Err(e) => errors.push(format!("skip failed after {} attempts: {}", MAX_ACTION_ATTEMPTS, e)),
            }
        }

        if self.config.remove_from_user_playlists {
            match self.remove_from_owned_playlist(track).await {
                Ok(did_remove) => removed = did_remove,
                Err(e) => errors.push(format!(
                    "playlist removal failed after {} attempts: {}",
                    MAX_ACTION_ATTEMPTS, e
                )),
            }
        }

        if let Some(ref playlist_id) = self.blocked_playlist_id {
            match self.file_in_blocked_playlist(playlist_id, track).await {
                Ok(()) => added_to_blocked = true,
                Err(e) => errors.push(format!(
                    "blocked-playlist add failed after {} attempts: {}",
                    MAX_ACTION_ATTEMPTS, e
                )),
            }
        }

        ActionOutcome {
            action: ActionTaken::from_flags(skipped, removed),
            added_to_blocked,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }

    /// Remove the track from the playing context's playlist, only when that
    /// playlist is owned by the current user
    async fn remove_from_owned_playlist(
        &self,
        track: &CurrentTrack,
    ) -> std::result::Result<bool, ProviderError> {
        let Some(ref context) = track.context else {
            return Ok(false);
        };
        if context.kind != "playlist" {
            return Ok(false);
        }
        let Some(ref user_id) = self.user_id else {
            return Ok(false);
        };

        let playlist_id = context.id().to_string();
        let Some(playlist) = self.provider.playlist(&playlist_id).await? else {
            debug!(playlist_id = %playlist_id, "Context playlist not accessible, skipping removal");
            return Ok(false);
        };
        if playlist.owner_id.as_deref() != Some(user_id.as_str()) {
            debug!(playlist = %playlist.name, "Playlist not owned by user, skipping removal");
            return Ok(false);
        }

        with_retries("remove_track_from_playlist", || {
            self.provider
                .remove_track_from_playlist(&playlist_id, &track.track_uri)
        })
        .await?;
        info!(track = %track.track_name, playlist = %playlist.name, "Removed track from playlist");
        Ok(true)
    }

    /// Add to the blocked playlist; already present is a no-op, not an error
    async fn file_in_blocked_playlist(
        &self,
        playlist_id: &str,
        track: &CurrentTrack,
    ) -> std::result::Result<(), ProviderError> {
        if self
            .provider
            .playlist_contains(playlist_id, &track.track_uri)
            .await?
        {
            debug!(track = %track.track_name, "Track already in blocked playlist");
            return Ok(());
        }

        with_retries("add_track_to_playlist", || {
            self.provider
                .add_track_to_playlist(playlist_id, &track.track_uri)
        })
        .await?;
        info!(track = %track.track_name, "Added track to blocked playlist");
        Ok(())
    }
}

/// Run a provider action with bounded retries. Rate-limit responses honor
/// the retry-after hint; other failures back off exponentially.
async fn with_retries<F, Fut>(op_name: &str, mut op: F) -> std::result::Result<(), ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), ProviderError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut last_error = ProviderError::Request("no attempts made".to_string());

    for attempt in 1..=MAX_ACTION_ATTEMPTS {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt < MAX_ACTION_ATTEMPTS {
                    let wait = match &e {
                        ProviderError::RateLimited {
                            retry_after: Some(hint),
                        } => *hint,
                        _ => delay,
                    };
                    debug!(
                        op = op_name,
                        attempt,
                        wait_ms = wait.as_millis(),
                        error = %e,
                        "Provider action failed, retrying"
                    );
                    sleep(wait).await;
                    delay *= 2;
                }
                last_error = e;
            }
        }
    }
    Err(last_error)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{track, PollStep, ScriptedProvider};
    use chrono::Utc;
    use playguard_common::model::{ArtistIdentity, Label};
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn artificial_decision(confidence: f32) -> Decision {
        Decision {
            decision_id: Uuid::new_v4(),
            artist: ArtistIdentity::new("artist-1", "Test Artist"),
            label: Label::Vtuber,
            confidence,
            is_artificial: true,
            agreeing_sources: BTreeSet::new(),
            band_policy_applied: false,
            used_llm_fallback: false,
            reason: "test".to_string(),
            signals: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    fn executor_config(blocked: &str) -> ActionsConfig {
        ActionsConfig {
            auto_skip: true,
            action_threshold: 0.5,
            remove_from_user_playlists: false,
            add_to_blocked_playlist: blocked.to_string(),
        }
    }

    #[tokio::test]
    async fn threshold_gates_actions() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        let executor = ActionExecutor::bootstrap(provider, executor_config("")).await;

        assert!(executor.should_act(&artificial_decision(0.6)));
        assert!(!executor.should_act(&artificial_decision(0.4)));

        let mut human = artificial_decision(1.0);
        human.is_artificial = false;
        assert!(!executor.should_act(&human));
    }

    #[tokio::test]
    async fn successful_skip_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        let executor = ActionExecutor::bootstrap(provider.clone(), executor_config("")).await;

        let outcome = executor
            .execute(&track("t1", "artist-1", "Test Artist"), &artificial_decision(1.0))
            .await;

        assert_eq!(outcome.action, ActionTaken::Skip);
        assert!(outcome.error.is_none());
        assert_eq!(provider.skip_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_skip_is_retried_then_annotated() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        provider.fail_actions.store(true, Ordering::SeqCst);
        let executor = ActionExecutor::bootstrap(provider.clone(), executor_config("")).await;

        let outcome = executor
            .execute(&track("t1", "artist-1", "Test Artist"), &artificial_decision(1.0))
            .await;

        assert_eq!(outcome.action, ActionTaken::None);
        assert_eq!(provider.skip_calls.load(Ordering::SeqCst), MAX_ACTION_ATTEMPTS);
        let error = outcome.error.unwrap();
        assert!(error.contains("skip failed after 3 attempts"));
    }

    #[tokio::test]
    async fn blocked_playlist_add_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        provider
            .playlist_tracks
            .lock()
            .unwrap()
            .insert("spotify:track:t1".to_string());
        let mut executor =
            ActionExecutor::bootstrap(provider.clone(), executor_config("Blocked")).await;
        // ScriptedProvider lists no playlists, so bootstrap created one
        assert_eq!(
            executor.blocked_playlist_id.as_deref(),
            Some("created-playlist")
        );
        executor.config.auto_skip = false;

        let outcome = executor
            .execute(&track("t1", "artist-1", "Test Artist"), &artificial_decision(1.0))
            .await;

        // Already present: success without an add call
        assert!(outcome.added_to_blocked);
        assert!(outcome.error.is_none());
        assert_eq!(provider.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn absent_track_is_added_to_blocked_playlist() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        let mut executor =
            ActionExecutor::bootstrap(provider.clone(), executor_config("Blocked")).await;
        executor.config.auto_skip = false;

        let outcome = executor
            .execute(&track("t1", "artist-1", "Test Artist"), &artificial_decision(1.0))
            .await;

        assert!(outcome.added_to_blocked);
        assert_eq!(provider.add_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_helper_honors_bound() {
        let mut calls = 0;
        let result = with_retries("test", || {
            calls += 1;
            async { Err::<(), _>(ProviderError::Request("nope".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, MAX_ACTION_ATTEMPTS);
    }

    #[tokio::test]
    async fn retry_helper_returns_on_first_success() {
        let mut calls = 0;
        let result = with_retries("test", || {
            calls += 1;
            async { Ok::<(), ProviderError>(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }
}
