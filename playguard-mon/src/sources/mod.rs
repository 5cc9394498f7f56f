//! Source adapters: one per external knowledge source
//!
//! Each adapter queries one open data source for an artist and returns a
//! normalized [`SourceSignal`]. Adapters never abort a classification pass:
//! transport and parse failures surface as [`SourceError`] and the engine
//! degrades them to null signals.

pub mod lastfm;
pub mod musicbrainz;
pub mod wikidata;

pub use lastfm::LastFmSource;
pub use musicbrainz::MusicBrainzSource;
pub use wikidata::WikidataSource;

use async_trait::async_trait;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single source lookup. Always contained at the adapter
/// boundary; the classification pass continues with a null signal.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure or non-success status from the source API
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source responded but the payload did not parse
    #[error("source response parse failed: {0}")]
    Parse(String),
}

/// One external knowledge source.
///
/// `lookup` returns a signal even when the source has no data for the artist
/// (`label == None` with the reason in `error`); `Err` is reserved for
/// transport-level failures.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source name used in signals, decisions, and the audit trail
    fn name(&self) -> &'static str;

    /// Upper bound the engine applies to one `lookup` call
    fn timeout(&self) -> Duration;

    async fn lookup(&self, artist: &ArtistIdentity) -> Result<SourceSignal, SourceError>;
}

/// Tag keywords that indicate a virtual/synthetic act. Matched
/// case-insensitively as substrings against source tags.
pub(crate) const VIRTUAL_KEYWORDS: &[&str] = &[
    "vocaloid",
    "vtuber",
    "virtual idol",
    "virtual singer",
    "virtual",
    "fictional",
    "ai generated",
    "voice synthesis",
    "synthesized voice",
    "synthesized",
];

/// True when the tag matches any virtual keyword
pub(crate) fn is_virtual_tag(tag: &str) -> bool {
    let lower = tag.to_lowercase();
    VIRTUAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Map a set of matched virtual tags to the most specific label.
///
/// Fixed precedence: exact tag names win over the generic `virtual` bucket.
pub(crate) fn label_from_virtual_tags(tags: &[String]) -> Label {
    let lower: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let has = |name: &str| lower.iter().any(|t| t == name);

    if has("vocaloid") {
        Label::Vocaloid
    } else if has("vtuber") {
        Label::Vtuber
    } else if has("virtual idol") || has("virtual singer") {
        Label::VirtualIdol
    } else if has("fictional") {
        Label::Fictional
    } else if has("ai generated") {
        Label::AiGenerated
    } else {
        Label::Virtual
    }
}

// ============================================================================
// Tests
// ============================================================================
