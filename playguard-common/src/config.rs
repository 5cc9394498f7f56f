//! Configuration loading and validation
//!
//! TOML file resolved by priority: explicit path (CLI) → `PLAYGUARD_CONFIG`
//! env var → `~/.config/playguard/playguard.toml` → built-in defaults.
//! Secrets (provider token, Last.fm key) may come from the environment and
//! override the file. Validation failures are fatal at startup only.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PLAYGUARD_CONFIG";
/// Environment override for the playback provider bearer token
pub const PROVIDER_TOKEN_ENV_VAR: &str = "PLAYGUARD_SPOTIFY_TOKEN";
/// Environment override for the Last.fm API key
pub const LASTFM_KEY_ENV_VAR: &str = "PLAYGUARD_LASTFM_API_KEY";

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub monitor: MonitorConfig,
    pub classification: ClassificationConfig,
    pub actions: ActionsConfig,
    pub sources: SourcesConfig,
    pub ollama: OllamaConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
}

/// Playback provider connection. Token management (OAuth refresh) is
/// external; the daemon only consumes a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub access_token: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.spotify.com/v1".to_string(),
            access_token: None,
        }
    }
}

/// Polling loop timing and rate-limit backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_seconds: f64,
    pub rate_limit_backoff_multiplier: f64,
    pub max_backoff_seconds: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 2.0,
            rate_limit_backoff_multiplier: 2.0,
            max_backoff_seconds: 300.0,
        }
    }
}

/// Agreement rule, cache TTL, and classification timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Sources that must agree before a label is accepted
    pub min_source_agreement: usize,
    pub cache_duration_seconds: u64,
    /// Upper bound on one whole classification pass
    pub classify_timeout_seconds: u64,
    /// Conclusive aggregates below this confidence still consult the LLM
    pub llm_confidence_threshold: f32,
    pub band_policy: BandPolicyConfig,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_source_agreement: 2,
            cache_duration_seconds: 604_800, // one week
            classify_timeout_seconds: 30,
            llm_confidence_threshold: 0.5,
            band_policy: BandPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandPolicyConfig {
    /// A `band` signal co-annotated virtual/fictional forces artificial
    pub virtual_or_fictional_is_artificial: bool,
}

impl Default for BandPolicyConfig {
    fn default() -> Self {
        Self {
            virtual_or_fictional_is_artificial: true,
        }
    }
}

/// What to do once an artificial decision is confident enough
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub auto_skip: bool,
    /// Minimum decision confidence before any action fires
    pub action_threshold: f32,
    pub remove_from_user_playlists: bool,
    /// Playlist name; empty disables the blocked-playlist action
    pub add_to_blocked_playlist: String,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            auto_skip: true,
            action_threshold: 0.5,
            remove_from_user_playlists: false,
            add_to_blocked_playlist: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub wikidata: WikidataConfig,
    pub musicbrainz: MusicBrainzConfig,
    pub lastfm: LastFmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikidataConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    /// MusicBrainz requires an identifying User-Agent
    pub user_agent: String,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 10,
            user_agent: format!(
                "playguard/{} (https://github.com/playguard/playguard)",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
    /// Tags with fewer votes than this are discarded as noise
    pub min_tag_count: u32,
}

impl Default for LastFmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 10,
            api_key: None,
            min_tag_count: 5,
        }
    }
}

/// Local LLM fallback. Sampling is pinned (temperature 0, fixed seed) so the
/// same inputs and configuration reproduce the same verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub enabled: bool,
    pub host: String,
    pub model: String,
    pub seed: i64,
    pub temperature: f32,
    pub num_predict: u32,
    pub timeout_ms: u64,
    /// Reject verdicts that cite no evidence URLs
    pub require_citations: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "http://127.0.0.1:11434".to_string(),
            model: "granite4:tiny-h".to_string(),
            seed: 42,
            temperature: 0.0,
            num_predict: 128,
            timeout_ms: 8_000,
            require_citations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8889,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// `~/.local/share/playguard/playguard.db` (platform equivalent), falling
/// back to the working directory
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("playguard").join("playguard.db"))
        .unwrap_or_else(|| PathBuf::from("playguard.db"))
}

impl Config {
    /// Load configuration: explicit path → env var → default location →
    /// built-in defaults. Environment secrets override the file. The result
    /// is validated; a violation is fatal.
    pub fn load(explicit_path: Option<&Path>) -> Result<Config> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                let config: Config = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("parse {}: {}", p.display(), e)))?;
                tracing::info!(path = %p.display(), "Configuration loaded");
                config
            }
            Some(ref p) if explicit_path.is_some() => {
                // An explicitly named file that does not exist is an error;
                // a missing default location just means defaults.
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            _ => {
                tracing::info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(PROVIDER_TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.provider.access_token = Some(token);
            }
        }
        if let Ok(key) = std::env::var(LASTFM_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                self.sources.lastfm.api_key = Some(key);
            }
        }
    }

    /// Startup validation. Everything here is fatal; nothing here can fire
    /// during steady-state polling.
    pub fn validate(&self) -> Result<()> {
        if self.classification.min_source_agreement == 0 {
            return Err(Error::Config(
                "classification.min_source_agreement must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval_seconds <= 0.0 {
            return Err(Error::Config(
                "monitor.poll_interval_seconds must be positive".to_string(),
            ));
        }
        if self.monitor.rate_limit_backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "monitor.rate_limit_backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.monitor.max_backoff_seconds < self.monitor.poll_interval_seconds {
            return Err(Error::Config(
                "monitor.max_backoff_seconds must be >= poll_interval_seconds".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.actions.action_threshold) {
            return Err(Error::Config(
                "actions.action_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classification.llm_confidence_threshold) {
            return Err(Error::Config(
                "classification.llm_confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.sources.lastfm.enabled
            && self
                .sources
                .lastfm
                .api_key
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(Error::Config(format!(
                "sources.lastfm.enabled requires an API key \
                 (sources.lastfm.api_key or {})",
                LASTFM_KEY_ENV_VAR
            )));
        }
        if self.classification.classify_timeout_seconds == 0 {
            return Err(Error::Config(
                "classification.classify_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of enabled source adapters
    pub fn enabled_source_count(&self) -> usize {
        [
            self.sources.wikidata.enabled,
            self.sources.musicbrainz.enabled,
            self.sources.lastfm.enabled,
        ]
        .iter()
        .filter(|&&enabled| enabled)
        .count()
    }
}

/// Default per-user config location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playguard").join("playguard.toml"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.sources.lastfm.api_key = Some("test-key".to_string());
        config
    }

    #[test]
    fn defaults_validate_with_lastfm_key() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn zero_agreement_threshold_is_rejected() {
        let mut config = valid_config();
        config.classification.min_source_agreement = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn lastfm_enabled_without_key_is_rejected() {
        let mut config = valid_config();
        config.sources.lastfm.api_key = Some("   ".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.sources.lastfm.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_poll_interval_is_rejected() {
        let mut config = valid_config();
        config.monitor.poll_interval_seconds = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn action_threshold_out_of_range_is_rejected() {
        let mut config = valid_config();
        config.actions.action_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_src = r#"
            [classification]
            min_source_agreement = 3

            [sources.lastfm]
            enabled = false
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.classification.min_source_agreement, 3);
        assert!(!config.sources.lastfm.enabled);
        // untouched sections keep defaults
        assert!(config.sources.wikidata.enabled);
        assert_eq!(config.monitor.poll_interval_seconds, 2.0);
        assert_eq!(config.classification.cache_duration_seconds, 604_800);
    }

    #[test]
    fn enabled_source_count_tracks_flags() {
        let mut config = valid_config();
        assert_eq!(config.enabled_source_count(), 3);
        config.sources.musicbrainz.enabled = false;
        assert_eq!(config.enabled_source_count(), 2);
    }
}
