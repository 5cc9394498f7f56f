//! Core data model: labels, source signals, decisions, overrides, plays
//!
//! Everything here is plain data. The aggregation rule that turns a set of
//! [`SourceSignal`]s into a [`Decision`] lives in the monitor crate; this
//! module only fixes the vocabulary those components exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Classification label reported by a knowledge source or decided by the engine.
///
/// Closed enum: every signal and decision carries exactly one of these.
/// `is_artificial()` is the derived predicate the action path keys off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Vocaloid,
    Vtuber,
    VirtualIdol,
    Virtual,
    Fictional,
    AiGenerated,
    Human,
    Band,
    Unknown,
}

impl Label {
    /// True for every label except `human`, `band`, and `unknown`.
    pub fn is_artificial(&self) -> bool {
        !matches!(self, Label::Human | Label::Band | Label::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Vocaloid => "vocaloid",
            Label::Vtuber => "vtuber",
            Label::VirtualIdol => "virtual_idol",
            Label::Virtual => "virtual",
            Label::Fictional => "fictional",
            Label::AiGenerated => "ai_generated",
            Label::Human => "human",
            Label::Band => "band",
            Label::Unknown => "unknown",
        }
    }

    /// Parse the snake_case form. Unrecognized strings map to `None` rather
    /// than `Unknown` so callers can distinguish bad input from a real
    /// `unknown` verdict.
    pub fn parse(s: &str) -> Option<Label> {
        match s {
            "vocaloid" => Some(Label::Vocaloid),
            "vtuber" => Some(Label::Vtuber),
            "virtual_idol" => Some(Label::VirtualIdol),
            "virtual" => Some(Label::Virtual),
            "fictional" => Some(Label::Fictional),
            "ai_generated" => Some(Label::AiGenerated),
            "human" => Some(Label::Human),
            "band" => Some(Label::Band),
            "unknown" => Some(Label::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-assigned artist identity. The opaque `id` is the join key across
/// plays, decisions, and overrides; never mutated once seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistIdentity {
    pub id: String,
    pub name: String,
}

impl ArtistIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Output of one source adapter for one artist at one point in time.
///
/// `label == None` means the source yielded no data for this artist (not
/// found, errored, or timed out), with `error` carrying the reason for the
/// audit trail. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSignal {
    /// Adapter name, e.g. "wikidata"
    pub source: String,
    pub label: Option<Label>,
    /// Adapter base confidence in its own verdict; `None` when no data
    pub confidence: Option<f32>,
    /// Matched tags / entity classes backing the label
    pub evidence: Vec<String>,
    /// Public URL consulted, for the review trail
    pub url: Option<String>,
    /// A virtual/fictional annotation co-reported with the label
    /// (band-policy input: a `band` label with this set is a virtual band)
    pub virtual_hint: bool,
    pub query_time_ms: u64,
    pub queried_at: DateTime<Utc>,
    /// Why the source degraded to no data, when it did
    pub error: Option<String>,
}

impl SourceSignal {
    /// Signal with a concrete verdict.
    pub fn found(
        source: impl Into<String>,
        label: Label,
        confidence: f32,
        evidence: Vec<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            label: Some(label),
            confidence: Some(confidence),
            evidence,
            url,
            virtual_hint: false,
            query_time_ms: 0,
            queried_at: Utc::now(),
            error: None,
        }
    }

    /// Null signal: the source had nothing to say about this artist.
    pub fn no_data(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            label: None,
            confidence: None,
            evidence: Vec::new(),
            url: None,
            virtual_hint: false,
            query_time_ms: 0,
            queried_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn with_virtual_hint(mut self, hint: bool) -> Self {
        self.virtual_hint = hint;
        self
    }

    pub fn with_query_time(mut self, ms: u64) -> Self {
        self.query_time_ms = ms;
        self
    }

    /// True when the source returned any verdict at all.
    pub fn responded(&self) -> bool {
        self.label.is_some()
    }
}

/// One labeled classification with its audit trail.
///
/// Cached and reused across plays until the TTL expires or an override
/// changes it. `reason` always explains an `unknown` (which sources failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: Uuid,
    pub artist: ArtistIdentity,
    pub label: Label,
    pub confidence: f32,
    pub is_artificial: bool,
    pub agreeing_sources: BTreeSet<String>,
    pub band_policy_applied: bool,
    pub used_llm_fallback: bool,
    pub reason: String,
    /// Constituent signals, journaled as nested evidence
    pub signals: Vec<SourceSignal>,
    pub decided_at: DateTime<Utc>,
}

/// User-authored manual classification. Once present for an artist it
/// supersedes every other signal unconditionally until deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub artist_id: String,
    pub is_artificial: bool,
    pub reason: Option<String>,
    pub set_at: DateTime<Utc>,
}

/// Action recorded on a play after the executor ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    Skip,
    Remove,
    SkipRemove,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::None => "none",
            ActionTaken::Skip => "skip",
            ActionTaken::Remove => "remove",
            ActionTaken::SkipRemove => "skip_remove",
        }
    }

    pub fn parse(s: &str) -> Option<ActionTaken> {
        match s {
            "none" => Some(ActionTaken::None),
            "skip" => Some(ActionTaken::Skip),
            "remove" => Some(ActionTaken::Remove),
            "skip_remove" => Some(ActionTaken::SkipRemove),
            _ => None,
        }
    }

    pub fn from_flags(skipped: bool, removed: bool) -> ActionTaken {
        match (skipped, removed) {
            (true, true) => ActionTaken::SkipRemove,
            (true, false) => ActionTaken::Skip,
            (false, true) => ActionTaken::Remove,
            (false, false) => ActionTaken::None,
        }
    }
}

impl std::fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One distinct track-playback instance. Created by the state machine when a
/// track change is observed, finalized by the action executor; immutable
/// after the action is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub play_id: Uuid,
    pub artist: ArtistIdentity,
    pub track_id: String,
    pub track_name: String,
    pub track_uri: String,
    pub context_uri: Option<String>,
    pub device_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub decision_id: Option<Uuid>,
    pub action_taken: ActionTaken,
    /// Blocked-playlist addition, tracked separately from the action enum
    pub added_to_blocked: bool,
    /// Failure annotation when a provider action was retried out
    pub action_error: Option<String>,
}

impl Play {
    pub fn started(
        artist: ArtistIdentity,
        track_id: impl Into<String>,
        track_name: impl Into<String>,
        track_uri: impl Into<String>,
    ) -> Self {
        Self {
            play_id: Uuid::new_v4(),
            artist,
            track_id: track_id.into(),
            track_name: track_name.into(),
            track_uri: track_uri.into(),
            context_uri: None,
            device_name: None,
            started_at: Utc::now(),
            decision_id: None,
            action_taken: ActionTaken::None,
            added_to_blocked: false,
            action_error: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
