//! Signal aggregation: agreement rule, band policy, label priority
//!
//! Pure logic, no I/O. Combines the signals of one classification pass into
//! a single labeled verdict under the multi-source agreement rule. The rule
//! table lives here so it can be audited and unit-tested in isolation:
//!
//! 1. Enough artificial-class signals → artificial, most frequent specific
//!    label, ties broken by a fixed priority order.
//! 2. Band policy: a `band` signal carrying a virtual/fictional hint forces
//!    artificial regardless of the threshold.
//! 3. Enough human-class (`human` + `band`) signals → human or band.
//! 4. Otherwise `unknown`, not artificial (fail open).
//!
//! Aggregation is order-independent: permuting the input signals yields an
//! identical result.

use playguard_common::model::{Label, SourceSignal};
use std::collections::{BTreeSet, HashMap};

/// Specific-label tie-break order for artificial decisions
const ARTIFICIAL_PRIORITY: &[Label] = &[
    Label::Vtuber,
    Label::Vocaloid,
    Label::VirtualIdol,
    Label::Virtual,
    Label::Fictional,
    Label::AiGenerated,
];

/// Band-policy confidence never exceeds this; a forced verdict must not
/// outrank true multi-source agreement
const BAND_POLICY_CONFIDENCE_CAP: f32 = 0.8;

/// Aggregation parameters, fixed at startup
#[derive(Debug, Clone)]
pub struct AggregatePolicy {
    /// Sources that must agree before a label is accepted
    pub min_source_agreement: usize,
    /// Enables the virtual/fictional band override
    pub band_policy_enabled: bool,
}

/// Result of aggregating one pass's signals
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub label: Label,
    pub is_artificial: bool,
    pub confidence: f32,
    pub agreeing_sources: BTreeSet<String>,
    pub band_policy_applied: bool,
    pub reason: String,
}

impl Aggregate {
    /// An inconclusive aggregate is a candidate for the LLM fallback
    pub fn is_conclusive(&self) -> bool {
        self.label != Label::Unknown
    }
}

/// Combine `signals` into one verdict. `total_queried` is the number of
/// adapters dispatched; a source that errored is excluded from conclusive
/// confidence denominators but counted against the unknown-case response
/// fraction.
pub fn aggregate(
    signals: &[SourceSignal],
    total_queried: usize,
    policy: &AggregatePolicy,
) -> Aggregate {
    let responding: Vec<&SourceSignal> = signals.iter().filter(|s| s.responded()).collect();
    let responding_count = responding.len();

    let mut label_counts: HashMap<Label, usize> = HashMap::new();
    for signal in &responding {
        if let Some(label) = signal.label {
            *label_counts.entry(label).or_insert(0) += 1;
        }
    }

    let artificial: Vec<&SourceSignal> = responding
        .iter()
        .filter(|s| s.label.is_some_and(|l| l.is_artificial()))
        .copied()
        .collect();
    let human_count = *label_counts.get(&Label::Human).unwrap_or(&0);
    let band_count = *label_counts.get(&Label::Band).unwrap_or(&0);
    let hinted_bands: Vec<&SourceSignal> = responding
        .iter()
        .filter(|s| s.label == Some(Label::Band) && s.virtual_hint)
        .copied()
        .collect();

    // Rule 1: artificial agreement
    if artificial.len() >= policy.min_source_agreement {
        let label = most_frequent_artificial(&label_counts).unwrap_or(Label::Virtual);
        let agreeing: BTreeSet<String> = artificial.iter().map(|s| s.source.clone()).collect();
        let labels: BTreeSet<&str> = artificial
            .iter()
            .filter_map(|s| s.label.map(|l| l.as_str()))
            .collect();
        let reason = format!(
            "classified artificial: {}/{} responding sources agree (labels: {}); threshold {}",
            artificial.len(),
            responding_count,
            labels.into_iter().collect::<Vec<_>>().join(", "),
            policy.min_source_agreement,
        );
        return Aggregate {
            label,
            is_artificial: true,
            confidence: artificial.len() as f32 / responding_count as f32,
            agreeing_sources: agreeing,
            band_policy_applied: false,
            reason,
        };
    }

    // Rule 2: band policy. A virtual band is artificial even when the
    // general threshold is not met, and even when the human count is.
    if policy.band_policy_enabled && !hinted_bands.is_empty() {
        let label = most_frequent_artificial(&label_counts).unwrap_or(Label::Virtual);
        let agreeing: BTreeSet<String> = hinted_bands
            .iter()
            .chain(artificial.iter())
            .map(|s| s.source.clone())
            .collect();
        let sources: Vec<&str> = hinted_bands.iter().map(|s| s.source.as_str()).collect();
        let confidence =
            (hinted_bands.len() as f32 / responding_count as f32).min(BAND_POLICY_CONFIDENCE_CAP);
        let reason = format!(
            "band policy applied: virtual/fictional band signal from {} forces artificial",
            sources.join(", "),
        );
        return Aggregate {
            label,
            is_artificial: true,
            confidence,
            agreeing_sources: agreeing,
            band_policy_applied: true,
            reason,
        };
    }

    // Rule 3: human-class agreement (band is a human-class subtype)
    let human_class_count = human_count + band_count;
    if human_class_count >= policy.min_source_agreement {
        let label = if band_count >= policy.min_source_agreement {
            Label::Band
        } else {
            Label::Human
        };
        let agreeing: BTreeSet<String> = responding
            .iter()
            .filter(|s| matches!(s.label, Some(Label::Human) | Some(Label::Band)))
            .map(|s| s.source.clone())
            .collect();
        let reason = format!(
            "classified {}: {}/{} responding sources agree; threshold {}",
            label, human_class_count, responding_count, policy.min_source_agreement,
        );
        return Aggregate {
            label,
            is_artificial: false,
            confidence: human_class_count as f32 / responding_count as f32,
            agreeing_sources: agreeing,
            band_policy_applied: false,
            reason,
        };
    }

    // Rule 4: fail open. Unknown artists are never auto-skipped without
    // fallback or override.
    let confidence = if total_queried == 0 {
        0.0
    } else {
        responding_count as f32 / total_queried as f32
    };
    let mut reason = format!(
        "inconclusive: {} artificial, {} human-class of {} responding ({} queried); threshold {}",
        artificial.len(),
        human_class_count,
        responding_count,
        total_queried,
        policy.min_source_agreement,
    );
    let mut failed: Vec<String> = signals
        .iter()
        .filter(|s| !s.responded())
        .map(|s| {
            format!(
                "{} ({})",
                s.source,
                s.error.as_deref().unwrap_or("no data")
            )
        })
        .collect();
    if !failed.is_empty() {
        failed.sort();
        reason.push_str(&format!("; no data from: {}", failed.join(", ")));
    }
    Aggregate {
        label: Label::Unknown,
        is_artificial: false,
        confidence,
        agreeing_sources: BTreeSet::new(),
        band_policy_applied: false,
        reason,
    }
}

/// Most frequent artificial label, ties broken by the fixed priority order
fn most_frequent_artificial(label_counts: &HashMap<Label, usize>) -> Option<Label> {
    let mut best: Option<(Label, usize)> = None;
    for &label in ARTIFICIAL_PRIORITY {
        let count = *label_counts.get(&label).unwrap_or(&0);
        if count == 0 {
            continue;
        }
        // Strictly greater: an earlier entry keeps the tie
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: usize, band: bool) -> AggregatePolicy {
        AggregatePolicy {
            min_source_agreement: min,
            band_policy_enabled: band,
        }
    }

    fn signal(source: &str, label: Label) -> SourceSignal {
        SourceSignal::found(source, label, 0.9, Vec::new(), None)
    }

    fn null_signal(source: &str, error: &str) -> SourceSignal {
        SourceSignal::no_data(source, error)
    }

    #[test]
    fn two_artificial_sources_agree() {
        // wikidata: vtuber, musicbrainz: null, lastfm: virtual_idol
        let signals = vec![
            signal("wikidata", Label::Vtuber),
            null_signal("musicbrainz", "artist not found"),
            signal("lastfm", Label::VirtualIdol),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert!(result.is_artificial);
        assert_eq!(result.label, Label::Vtuber); // 1-1 tie, vtuber wins priority
        assert_eq!(result.confidence, 1.0); // 2/2 responding
        assert_eq!(
            result.agreeing_sources,
            BTreeSet::from(["wikidata".to_string(), "lastfm".to_string()])
        );
        assert!(!result.band_policy_applied);
    }

    #[test]
    fn single_human_signal_is_inconclusive() {
        // wikidata: human, musicbrainz: null, lastfm: null
        let signals = vec![
            signal("wikidata", Label::Human),
            null_signal("musicbrainz", "artist not found"),
            null_signal("lastfm", "no tags found"),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert_eq!(result.label, Label::Unknown);
        assert!(!result.is_artificial);
        assert!((result.confidence - 1.0 / 3.0).abs() < 1e-6);
        assert!(!result.is_conclusive());
    }

    #[test]
    fn below_threshold_fails_open() {
        let signals = vec![
            signal("wikidata", Label::Vocaloid),
            signal("musicbrainz", Label::Human),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert_eq!(result.label, Label::Unknown);
        assert!(!result.is_artificial);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut signals = vec![
            signal("wikidata", Label::Vtuber),
            signal("musicbrainz", Label::Vocaloid),
            signal("lastfm", Label::Vtuber),
            null_signal("extra", "timed out"),
        ];
        let baseline = aggregate(&signals, 4, &policy(2, true));

        // Rotate through every cyclic permutation
        for _ in 0..signals.len() {
            signals.rotate_left(1);
            let permuted = aggregate(&signals, 4, &policy(2, true));
            assert_eq!(permuted.label, baseline.label);
            assert_eq!(permuted.is_artificial, baseline.is_artificial);
            assert_eq!(permuted.confidence, baseline.confidence);
            assert_eq!(permuted.agreeing_sources, baseline.agreeing_sources);
            assert_eq!(permuted.reason, baseline.reason);
        }
    }

    #[test]
    fn most_frequent_artificial_label_wins() {
        let signals = vec![
            signal("wikidata", Label::Vocaloid),
            signal("musicbrainz", Label::Vocaloid),
            signal("lastfm", Label::Vtuber),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));
        assert_eq!(result.label, Label::Vocaloid); // 2 vocaloid beats 1 vtuber
    }

    #[test]
    fn tie_breaks_by_priority_order() {
        let signals = vec![
            signal("wikidata", Label::AiGenerated),
            signal("lastfm", Label::Vocaloid),
        ];
        let result = aggregate(&signals, 2, &policy(2, true));
        assert_eq!(result.label, Label::Vocaloid); // vocaloid outranks ai_generated
    }

    #[test]
    fn band_policy_forces_artificial_below_threshold() {
        let signals = vec![
            signal("wikidata", Label::Band).with_virtual_hint(true),
            signal("musicbrainz", Label::Human),
            null_signal("lastfm", "no tags found"),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert!(result.is_artificial);
        assert!(result.band_policy_applied);
        assert_eq!(result.label, Label::Virtual);
        assert!(result.agreeing_sources.contains("wikidata"));
        assert!(result.confidence <= BAND_POLICY_CONFIDENCE_CAP);
    }

    #[test]
    fn band_policy_overrides_human_agreement() {
        let signals = vec![
            signal("wikidata", Label::Band).with_virtual_hint(true),
            signal("musicbrainz", Label::Human),
            signal("lastfm", Label::Human),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));
        assert!(result.is_artificial);
        assert!(result.band_policy_applied);
    }

    #[test]
    fn band_policy_disabled_leaves_band_human_class() {
        let signals = vec![
            signal("wikidata", Label::Band).with_virtual_hint(true),
            signal("musicbrainz", Label::Human),
        ];
        let result = aggregate(&signals, 3, &policy(2, false));

        assert!(!result.is_artificial);
        assert_eq!(result.label, Label::Human); // band alone below threshold
        assert!(!result.band_policy_applied);
    }

    #[test]
    fn plain_band_without_hint_is_human_class() {
        let signals = vec![
            signal("wikidata", Label::Band),
            signal("musicbrainz", Label::Band),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert!(!result.is_artificial);
        assert_eq!(result.label, Label::Band); // band count reached threshold
    }

    #[test]
    fn mixed_human_and_band_labels_as_human() {
        let signals = vec![
            signal("wikidata", Label::Human),
            signal("musicbrainz", Label::Band),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert!(!result.is_artificial);
        assert_eq!(result.label, Label::Human); // band alone did not reach threshold
        assert_eq!(result.confidence, 1.0); // 2/2 responding agree human-class
    }

    #[test]
    fn errored_source_does_not_lower_conclusive_confidence() {
        let signals = vec![
            signal("wikidata", Label::Vtuber),
            signal("lastfm", Label::Vtuber),
            null_signal("musicbrainz", "timed out"),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));
        assert_eq!(result.confidence, 1.0); // 2/2 responding, errored source excluded
    }

    #[test]
    fn zero_signals_yield_zero_confidence_unknown() {
        let signals = vec![
            null_signal("wikidata", "request failed"),
            null_signal("musicbrainz", "timed out"),
            null_signal("lastfm", "no tags found"),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));

        assert_eq!(result.label, Label::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reason.contains("no data from"));
        assert!(result.reason.contains("musicbrainz (timed out)"));
    }

    #[test]
    fn unknown_reason_names_failed_sources() {
        let signals = vec![
            signal("wikidata", Label::Human),
            null_signal("lastfm", "no tags found"),
        ];
        let result = aggregate(&signals, 3, &policy(2, true));
        assert_eq!(result.label, Label::Unknown);
        assert!(result.reason.contains("lastfm (no tags found)"));
    }
}
