//! Event types and broadcast bus for the monitor loop
//!
//! The monitor publishes what it observed and did; subscribers (the review
//! API, tests, future UIs) consume without coupling to the loop. Events are
//! observability, not control flow; losing one never changes a decision.

use crate::model::ActionTaken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Monitor lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayguardEvent {
    /// A new track instance was observed (exactly once per instance)
    TrackChanged {
        play_id: Uuid,
        track_id: String,
        track_name: String,
        artist_id: String,
        artist_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The classification engine produced a decision
    DecisionMade {
        artist_id: String,
        label: String,
        is_artificial: bool,
        confidence: f32,
        used_llm_fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// The action executor finished for a play
    ActionTaken {
        play_id: Uuid,
        action: ActionTaken,
        added_to_blocked: bool,
        timestamp: DateTime<Utc>,
    },

    /// The playback provider rate-limited us; polling is suspended
    MonitorBackoff {
        delay_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// The polling loop stopped cooperatively
    MonitorStopped { timestamp: DateTime<Utc> },
}

impl PlayguardEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayguardEvent::TrackChanged { .. } => "TrackChanged",
            PlayguardEvent::DecisionMade { .. } => "DecisionMade",
            PlayguardEvent::ActionTaken { .. } => "ActionTaken",
            PlayguardEvent::MonitorBackoff { .. } => "MonitorBackoff",
            PlayguardEvent::MonitorStopped { .. } => "MonitorStopped",
        }
    }
}

/// Broadcast bus for [`PlayguardEvent`]s.
///
/// Thin wrapper over `tokio::sync::broadcast`; cloning shares the channel.
/// Slow subscribers lag and drop old events rather than blocking the loop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayguardEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayguardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers. Returns the subscriber count, or
    /// `Err` when nobody is listening; callers treat that as non-fatal.
    pub fn emit(&self, event: PlayguardEvent) -> Result<usize, Box<PlayguardEvent>> {
        self.tx
            .send(event)
            .map_err(|broadcast::error::SendError(ev)| Box::new(ev))
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================
