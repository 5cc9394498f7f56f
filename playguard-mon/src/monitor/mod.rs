//! Playback monitor: poll loop and track-change state machine
//!
//! States: `Idle → Tracking(track_id) → Idle`. Each poll tick compares the
//! provider's currently-playing track against the tracked one; a change
//! emits exactly one `TrackChanged`, creates the play record, classifies the
//! primary artist, and runs the action executor. Re-polling the same track
//! is a no-op, as is a track already handled this session.
//!
//! A rate-limited poll suspends polling for the provider's retry-after hint
//! (or an exponentially growing delay, capped) without touching the
//! `Tracking` state; a rate limit is not a track change. Any successful
//! poll resets the delay to the base interval.
//!
//! The loop is sequential and cooperatively stoppable between ticks; a
//! classification in flight when stop is requested completes first.

use crate::actions::ActionExecutor;
use crate::classify::ClassificationEngine;
use crate::db;
use crate::provider::{CurrentTrack, PlaybackProvider, ProviderError};
use chrono::Utc;
use playguard_common::config::MonitorConfig;
use playguard_common::events::{EventBus, PlayguardEvent};
use playguard_common::model::Play;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Tracking { track_id: String },
}

pub struct PlaybackMonitor {
    provider: Arc<dyn PlaybackProvider>,
    engine: Arc<ClassificationEngine>,
    executor: ActionExecutor,
    pool: SqlitePool,
    event_bus: EventBus,
    config: MonitorConfig,
    state: MonitorState,
    /// Tracks already handled this session; suppresses duplicate actions on
    /// replays
    processed_tracks: HashSet<String>,
    current_delay: Duration,
}

impl PlaybackMonitor {
    pub fn new(
        provider: Arc<dyn PlaybackProvider>,
        engine: Arc<ClassificationEngine>,
        executor: ActionExecutor,
        pool: SqlitePool,
        event_bus: EventBus,
        config: MonitorConfig,
    ) -> Self {
        let current_delay = Duration::from_secs_f64(config.poll_interval_seconds);
        Self {
            provider,
            engine,
            executor,
            pool,
            event_bus,
            config,
            state: MonitorState::Idle,
            processed_tracks: HashSet::new(),
            current_delay,
        }
    }

    /// Drive the polling loop until cancellation. Stop requests are honored
    /// between ticks; the in-flight tick always completes.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            poll_interval_s = self.config.poll_interval_seconds,
            "Starting playback monitor"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.tick().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.current_delay) => {}
            }
        }

        let _ = self.event_bus.emit(PlayguardEvent::MonitorStopped {
            timestamp: Utc::now(),
        });
        info!("Playback monitor stopped");
    }

    /// One poll cycle. Never fails; every provider outcome degrades into
    /// state/delay adjustments.
    async fn tick(&mut self) {
        let base = Duration::from_secs_f64(self.config.poll_interval_seconds);

        let snapshot = match self.provider.current_playback().await {
            Ok(snapshot) => snapshot,
            Err(ProviderError::RateLimited { retry_after }) => {
                // Backoff; Tracking state is deliberately preserved
                let grown = self
                    .current_delay
                    .mul_f64(self.config.rate_limit_backoff_multiplier);
                let cap = Duration::from_secs_f64(self.config.max_backoff_seconds);
                self.current_delay = retry_after.unwrap_or(grown).min(cap);
                warn!(
                    delay_s = self.current_delay.as_secs_f64(),
                    "Provider rate limited, backing off"
                );
                let _ = self.event_bus.emit(PlayguardEvent::MonitorBackoff {
                    delay_seconds: self.current_delay.as_secs_f64(),
                    timestamp: Utc::now(),
                });
                return;
            }
            Err(e) => {
                warn!(error = %e, "Playback poll failed");
                self.current_delay = base;
                return;
            }
        };

        // Any successful poll resets the backoff
        self.current_delay = base;

        let track = match snapshot.track {
            Some(track) if snapshot.is_playing => track,
            _ => {
                if self.state != MonitorState::Idle {
                    debug!("Playback stopped or paused");
                }
                self.state = MonitorState::Idle;
                return;
            }
        };

        // Same track as last poll: idempotent no-op
        if let MonitorState::Tracking { ref track_id } = self.state {
            if *track_id == track.track_id {
                return;
            }
        }
        self.state = MonitorState::Tracking {
            track_id: track.track_id.clone(),
        };

        if !self.processed_tracks.insert(track.track_id.clone()) {
            debug!(track_id = %track.track_id, "Track already handled this session");
            return;
        }

        self.handle_track_change(track).await;
    }

    /// A new track instance: journal the play, classify the primary artist
    /// exactly once, and act on the decision.
    async fn handle_track_change(&mut self, track: CurrentTrack) {
        let Some(artist) = track.primary_artist().cloned() else {
            warn!(track = %track.track_name, "Track has no artists, skipping");
            return;
        };

        info!(
            track = %track.track_name,
            artist = %artist.name,
            "New track"
        );

        let mut play = Play::started(
            artist.clone(),
            &track.track_id,
            &track.track_name,
            &track.track_uri,
        );
        play.context_uri = track.context.as_ref().map(|c| c.uri.clone());
        play.device_name = track.device_name.clone();

        if let Err(e) = db::artists::record_seen(&self.pool, &artist).await {
            warn!(error = %e, "Failed to record artist sighting");
        }
        if let Err(e) = db::plays::insert_play(&self.pool, &play).await {
            warn!(error = %e, "Failed to journal play");
        }

        let _ = self.event_bus.emit(PlayguardEvent::TrackChanged {
            play_id: play.play_id,
            track_id: track.track_id.clone(),
            track_name: track.track_name.clone(),
            artist_id: artist.id.clone(),
            artist_name: artist.name.clone(),
            timestamp: play.started_at,
        });

        let decision = self.engine.classify(&artist).await;
        info!(
            artist = %artist.name,
            label = %decision.label,
            is_artificial = decision.is_artificial,
            confidence = decision.confidence,
            "Classification"
        );
        if let Err(e) =
            db::plays::set_decision(&self.pool, play.play_id, decision.decision_id).await
        {
            warn!(error = %e, "Failed to attach decision to play");
        }

        if self.executor.should_act(&decision) {
            let outcome = self.executor.execute(&track, &decision).await;
            if let Err(e) = db::plays::set_action(
                &self.pool,
                play.play_id,
                outcome.action,
                outcome.added_to_blocked,
                outcome.error.as_deref(),
            )
            .await
            {
                warn!(error = %e, "Failed to record action outcome");
            }
            let _ = self.event_bus.emit(PlayguardEvent::ActionTaken {
                play_id: play.play_id,
                action: outcome.action,
                added_to_blocked: outcome.added_to_blocked,
                timestamp: Utc::now(),
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DecisionCache, OverrideStore};
    use crate::db::init_memory_pool;
    use crate::provider::testing::{track, PollStep, ScriptedProvider};
    use crate::sources::{SourceAdapter, SourceError};
    use async_trait::async_trait;
    use playguard_common::config::{ActionsConfig, ClassificationConfig};
    use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
    use std::sync::atomic::Ordering;

    /// Adapter that always reports the same label
    struct FixedAdapter {
        name: &'static str,
        label: Label,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn lookup(&self, _artist: &ArtistIdentity) -> Result<SourceSignal, SourceError> {
            Ok(SourceSignal::found(self.name, self.label, 0.9, Vec::new(), None))
        }
    }

    async fn monitor_with(
        provider: Arc<ScriptedProvider>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
    ) -> (PlaybackMonitor, EventBus) {
        let pool = init_memory_pool().await.unwrap();
        let event_bus = EventBus::new(64);
        let overrides = OverrideStore::load(pool.clone()).await.unwrap();
        let config = ClassificationConfig::default();
        let engine = Arc::new(ClassificationEngine::new(
            adapters,
            overrides,
            DecisionCache::new(config.cache_duration_seconds),
            None,
            &config,
            pool.clone(),
            event_bus.clone(),
        ));
        let executor = ActionExecutor::bootstrap(
            provider.clone() as Arc<dyn PlaybackProvider>,
            ActionsConfig::default(),
        )
        .await;
        let monitor = PlaybackMonitor::new(
            provider,
            engine,
            executor,
            pool,
            event_bus.clone(),
            MonitorConfig::default(),
        );
        (monitor, event_bus)
    }

    fn count_track_changed(
        rx: &mut tokio::sync::broadcast::Receiver<PlayguardEvent>,
    ) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PlayguardEvent::TrackChanged { .. }) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn same_track_repolls_emit_exactly_one_event() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::Playing(track("t1", "a1", "Artist One")),
        ]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();

        for _ in 0..3 {
            monitor.tick().await;
        }

        assert_eq!(count_track_changed(&mut rx), 1);
        assert_eq!(
            monitor.state,
            MonitorState::Tracking {
                track_id: "t1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn distinct_tracks_each_emit_an_event() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::Playing(track("t2", "a2", "Artist Two")),
        ]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();

        monitor.tick().await;
        monitor.tick().await;

        assert_eq!(count_track_changed(&mut rx), 2);
    }

    #[tokio::test]
    async fn rate_limit_preserves_tracking_and_grows_delay() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::RateLimited(None),
            PollStep::RateLimited(Some(Duration::from_secs(7))),
            PollStep::Playing(track("t1", "a1", "Artist One")),
        ]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();
        let base = Duration::from_secs_f64(monitor.config.poll_interval_seconds);

        monitor.tick().await; // t1 observed
        monitor.tick().await; // rate limited, no hint
        assert_eq!(
            monitor.current_delay,
            base.mul_f64(monitor.config.rate_limit_backoff_multiplier)
        );
        assert_eq!(
            monitor.state,
            MonitorState::Tracking {
                track_id: "t1".to_string()
            }
        );

        monitor.tick().await; // rate limited with retry-after hint
        assert_eq!(monitor.current_delay, Duration::from_secs(7));

        monitor.tick().await; // recovery resets the delay
        assert_eq!(monitor.current_delay, base);

        // Only the first poll produced a TrackChanged
        assert_eq!(count_track_changed(&mut rx), 1);
    }

    #[tokio::test]
    async fn backoff_is_capped_at_max() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::RateLimited(None)]));
        let (mut monitor, _bus) = monitor_with(provider, Vec::new()).await;
        monitor.config.max_backoff_seconds = 10.0;

        for _ in 0..8 {
            monitor.tick().await;
        }
        assert_eq!(monitor.current_delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn replay_after_idle_is_not_reprocessed() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::NothingPlaying,
            PollStep::Playing(track("t1", "a1", "Artist One")),
        ]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();

        monitor.tick().await;
        monitor.tick().await;
        assert_eq!(monitor.state, MonitorState::Idle);
        monitor.tick().await;

        // Tracking resumed but the session already handled t1
        assert_eq!(count_track_changed(&mut rx), 1);
        assert_eq!(
            monitor.state,
            MonitorState::Tracking {
                track_id: "t1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn provider_failure_keeps_state_and_base_delay() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Artist One")),
            PollStep::Failure,
        ]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();
        let base = Duration::from_secs_f64(monitor.config.poll_interval_seconds);

        monitor.tick().await;
        monitor.tick().await;

        assert_eq!(monitor.current_delay, base);
        assert_eq!(
            monitor.state,
            MonitorState::Tracking {
                track_id: "t1".to_string()
            }
        );
        assert_eq!(count_track_changed(&mut rx), 1);
    }

    #[tokio::test]
    async fn artificial_agreement_triggers_one_skip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            PollStep::Playing(track("t1", "a1", "Virtual Artist")),
            PollStep::Playing(track("t1", "a1", "Virtual Artist")),
        ]));
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FixedAdapter {
                name: "wikidata",
                label: Label::Vtuber,
            }),
            Arc::new(FixedAdapter {
                name: "lastfm",
                label: Label::VirtualIdol,
            }),
        ];
        let (mut monitor, _bus) = monitor_with(provider.clone(), adapters).await;

        monitor.tick().await;
        monitor.tick().await; // same track, no second classification/action

        assert_eq!(provider.skip_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn human_agreement_takes_no_action() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::Playing(track(
            "t1", "a1", "Real Artist",
        ))]));
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FixedAdapter {
                name: "wikidata",
                label: Label::Human,
            }),
            Arc::new(FixedAdapter {
                name: "lastfm",
                label: Label::Human,
            }),
        ];
        let (mut monitor, _bus) = monitor_with(provider.clone(), adapters).await;

        monitor.tick().await;

        assert_eq!(provider.skip_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_cooperatively() {
        let provider = Arc::new(ScriptedProvider::new(vec![PollStep::NothingPlaying]));
        let (mut monitor, bus) = monitor_with(provider, Vec::new()).await;
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                monitor.run(cancel).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor should stop after cancellation")
            .unwrap();

        let mut stopped = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PlayguardEvent::MonitorStopped { .. }) {
                stopped = true;
            }
        }
        assert!(stopped);
    }
}
