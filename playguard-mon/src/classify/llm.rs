//! Local LLM fallback via Ollama
//!
//! Consulted only when the aggregate is inconclusive or below the confidence
//! threshold. Sampling is pinned (temperature 0, fixed seed) so identical
//! inputs and configuration reproduce the same verdict. Any failure
//! (transport, malformed JSON, failed validation) yields `None` and the
//! engine keeps the aggregate untouched.

use playguard_common::config::OllamaConfig;
use playguard_common::model::{ArtistIdentity, Label, SourceSignal};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Validated fallback verdict
#[derive(Debug, Clone)]
pub struct LlmVerdict {
    pub label: Label,
    pub is_artificial: bool,
    pub confidence: f32,
    pub reason: String,
    pub citations: Vec<String>,
}

/// Ollama fallback client
pub struct OllamaFallback {
    http_client: Client,
    config: OllamaConfig,
}

impl OllamaFallback {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Ask the local model for a verdict on the artist given the evidence
    /// gathered from the sources. Returns `None` on any failure.
    pub async fn classify(
        &self,
        artist: &ArtistIdentity,
        signals: &[SourceSignal],
    ) -> Option<LlmVerdict> {
        let prompt = build_prompt(artist, signals);

        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": self.config.temperature,
                "seed": self.config.seed,
                "num_predict": self.config.num_predict,
            },
        });

        let response = match self
            .http_client
            .post(format!("{}/api/generate", self.config.host))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Ollama request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Ollama returned error status");
            return None;
        }

        let generate: GenerateResponse = match response.json().await {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "Ollama response parse failed");
                return None;
            }
        };

        debug!(
            artist = %artist.name,
            eval_ms = generate.eval_duration.unwrap_or(0) / 1_000_000,
            "Ollama generation complete"
        );

        let verdict = parse_verdict(&generate.response, self.config.require_citations);
        if verdict.is_none() {
            warn!(artist = %artist.name, "Ollama verdict failed validation");
        }
        verdict
    }
}

/// Fixed prompt template plus formatted evidence. Only the gathered signals
/// go in; no live context, so the call stays reproducible.
fn build_prompt(artist: &ArtistIdentity, signals: &[SourceSignal]) -> String {
    let mut evidence = format!("Artist: {}\n", artist.name);
    for signal in signals {
        let Some(label) = signal.label else { continue };
        evidence.push_str(&format!("\n{} source:\n  Result: {}\n", signal.source, label));
        if !signal.evidence.is_empty() {
            evidence.push_str(&format!("  Signals: {}\n", signal.evidence.join(", ")));
        }
        if let Some(ref url) = signal.url {
            evidence.push_str(&format!("  URL: {}\n", url));
        }
    }

    format!(
        r#"You are a music expert assistant helping classify whether an artist is AI-generated, virtual, or uses voice synthesis.

**Task:** Analyze the provided evidence and determine if the artist should be classified as "artificial" (includes virtual idols, VTubers, Vocaloid characters, AI-generated artists, voice synthesis, fictional bands, or any non-human performers).

**Evidence provided:**
{evidence}

**Instructions:**
1. Read the evidence carefully from the sources provided
2. Look for clear indicators of artificial/virtual/fictional nature
3. Only use information from the provided evidence - do not use external knowledge
4. Return your decision in valid JSON format with the exact schema below
5. Include citations (URLs) from the provided evidence only
6. Be conservative: if evidence is ambiguous or contradictory, return "unknown"

**Response format (strict JSON):**
{{
  "label": "virtual_idol|vocaloid|vtuber|virtual|fictional|ai_generated|human|band|unknown",
  "is_artificial": true|false|null,
  "confidence": 0.0-1.0,
  "reason": "brief explanation citing specific evidence",
  "citations": ["url1", "url2"]
}}

**Important:**
- is_artificial should be true for: virtual_idol, vocaloid, vtuber, virtual, fictional, ai_generated
- is_artificial should be false for: human, band
- If you cannot determine with confidence >= 0.6, use label "unknown" and is_artificial: null
"#,
        evidence = evidence
    )
}

/// Parse and validate the model's JSON verdict. Markdown code fences are
/// stripped first; some models wrap their output regardless of format=json.
fn parse_verdict(raw: &str, require_citations: bool) -> Option<LlmVerdict> {
    let text = strip_code_fences(raw);
    let output: VerdictPayload = serde_json::from_str(text).ok()?;

    let label = Label::parse(&output.label)?;
    let confidence = output.confidence?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    // An unknown or undecided verdict is no help
    let is_artificial = output.is_artificial?;
    if label == Label::Unknown {
        return None;
    }
    // The declared flag must agree with the label class
    if is_artificial != label.is_artificial() {
        return None;
    }
    if require_citations && output.citations.is_empty() {
        return None;
    }

    Some(LlmVerdict {
        label,
        is_artificial,
        confidence,
        reason: output.reason.unwrap_or_default(),
        citations: output.citations,
    })
}

fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

// ============================================================================
// Ollama API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VerdictPayload {
    label: String,
    is_artificial: Option<bool>,
    confidence: Option<f32>,
    reason: Option<String>,
    #[serde(default)]
    citations: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "label": "vtuber",
        "is_artificial": true,
        "confidence": 0.85,
        "reason": "wikidata lists the VTuber class",
        "citations": ["https://www.wikidata.org/wiki/Q1"]
    }"#;

    #[test]
    fn valid_verdict_parses() {
        let verdict = parse_verdict(VALID, true).unwrap();
        assert_eq!(verdict.label, Label::Vtuber);
        assert!(verdict.is_artificial);
        assert_eq!(verdict.confidence, 0.85);
        assert_eq!(verdict.citations.len(), 1);
    }

    #[test]
    fn code_fences_are_stripped() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_verdict(&fenced, true).is_some());

        let fenced = format!("```\n{}\n```", VALID);
        assert!(parse_verdict(&fenced, true).is_some());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(parse_verdict("not json at all", true).is_none());
        assert!(parse_verdict("{\"label\":", true).is_none());
    }

    #[test]
    fn missing_citations_rejected_when_required() {
        let no_citations = r#"{
            "label": "vtuber", "is_artificial": true,
            "confidence": 0.9, "reason": "x", "citations": []
        }"#;
        assert!(parse_verdict(no_citations, true).is_none());
        assert!(parse_verdict(no_citations, false).is_some());
    }

    #[test]
    fn unknown_or_undecided_verdicts_are_rejected() {
        let unknown = r#"{
            "label": "unknown", "is_artificial": null,
            "confidence": 0.3, "reason": "unclear", "citations": ["u"]
        }"#;
        assert!(parse_verdict(unknown, true).is_none());

        let undecided = r#"{
            "label": "vtuber", "is_artificial": null,
            "confidence": 0.9, "reason": "x", "citations": ["u"]
        }"#;
        assert!(parse_verdict(undecided, true).is_none());
    }

    #[test]
    fn contradictory_flag_is_rejected() {
        let contradictory = r#"{
            "label": "human", "is_artificial": true,
            "confidence": 0.9, "reason": "x", "citations": ["u"]
        }"#;
        assert!(parse_verdict(contradictory, true).is_none());
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let bad = r#"{
            "label": "vtuber", "is_artificial": true,
            "confidence": 1.5, "reason": "x", "citations": ["u"]
        }"#;
        assert!(parse_verdict(bad, true).is_none());
    }

    #[test]
    fn bad_label_string_is_rejected() {
        let bad = r#"{
            "label": "cyborg", "is_artificial": true,
            "confidence": 0.9, "reason": "x", "citations": ["u"]
        }"#;
        assert!(parse_verdict(bad, true).is_none());
    }

    #[test]
    fn prompt_includes_only_responding_sources() {
        let artist = ArtistIdentity::new("a1", "Test Artist");
        let signals = vec![
            SourceSignal::found(
                "wikidata",
                Label::Vtuber,
                0.9,
                vec!["Q55155641".to_string()],
                Some("https://www.wikidata.org/wiki/Q1".to_string()),
            ),
            SourceSignal::no_data("musicbrainz", "artist not found"),
        ];
        let prompt = build_prompt(&artist, &signals);
        assert!(prompt.contains("wikidata source"));
        assert!(prompt.contains("Q55155641"));
        assert!(!prompt.contains("musicbrainz source"));
    }
}
