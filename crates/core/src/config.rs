//! Layered settings: defaults, then the JSON config file, then `VIRALSCAN_*`
//! environment variables, then whatever the caller applies last (CLI flags).

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    analyzer::GenerationSettings,
    chunker::{ChunkerConfig, DEFAULT_MAX_CHUNK_CHARS, DEFAULT_OVERLAP_SECONDS},
    client::{
        CallPolicy, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BACKOFF,
        DEFAULT_TEMPERATURE, ModelClient, ModelError,
    },
    error::{Result, ViralscanError},
    options::{AnalyzeOptions, ContentType, OutputPolicy},
    overlap::OverlapStrategy,
    provider::{ClientOptions, Provider},
    rubric::{Rubric, RubricKind},
};

pub const ENV_PREFIX: &str = "VIRALSCAN_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub keep_alive: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_chunk_chars: usize,
    pub overlap_seconds: f64,
    pub rubric: RubricKind,
    pub content_type: ContentType,
    pub overlap_strategy: OverlapStrategy,
    /// `None` keeps the rubric's default.
    pub min_clip_duration: Option<f64>,
    pub max_clip_duration: Option<f64>,
    pub target_count: Option<usize>,
    pub min_viral_score: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            keep_alive: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            overlap_seconds: DEFAULT_OVERLAP_SECONDS,
            rubric: RubricKind::default(),
            content_type: ContentType::default(),
            overlap_strategy: OverlapStrategy::default(),
            min_clip_duration: None,
            max_clip_duration: None,
            target_count: None,
            min_viral_score: None,
        }
    }
}

/// One partial layer. Unset fields leave the value below untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigLayer {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
    pub keep_alive: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub max_chunk_chars: Option<usize>,
    pub overlap_seconds: Option<f64>,
    pub rubric: Option<RubricKind>,
    pub content_type: Option<ContentType>,
    pub overlap_strategy: Option<OverlapStrategy>,
    pub min_clip_duration: Option<f64>,
    pub max_clip_duration: Option<f64>,
    pub target_count: Option<usize>,
    pub min_viral_score: Option<f64>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ViralscanError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read `VIRALSCAN_*` variables through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            provider: parse_var(&var, "PROVIDER")?,
            model: var("MODEL"),
            base_url: var("BASE_URL"),
            temperature: parse_var(&var, "TEMPERATURE")?,
            max_tokens: parse_var(&var, "MAX_TOKENS")?,
            stream: var("STREAM").map(|v| parse_bool("STREAM", &v)).transpose()?,
            keep_alive: var("KEEP_ALIVE"),
            request_timeout_secs: parse_var(&var, "REQUEST_TIMEOUT_SECS")?,
            max_retries: parse_var(&var, "MAX_RETRIES")?,
            retry_backoff_ms: parse_var(&var, "RETRY_BACKOFF_MS")?,
            max_chunk_chars: parse_var(&var, "MAX_CHUNK_CHARS")?,
            overlap_seconds: parse_var(&var, "OVERLAP_SECONDS")?,
            rubric: parse_var(&var, "RUBRIC")?,
            content_type: parse_var(&var, "CONTENT_TYPE")?,
            overlap_strategy: parse_var(&var, "OVERLAP_STRATEGY")?,
            min_clip_duration: parse_var(&var, "MIN_CLIP_DURATION")?,
            max_clip_duration: parse_var(&var, "MAX_CLIP_DURATION")?,
            target_count: parse_var(&var, "TARGET_COUNT")?,
            min_viral_score: parse_var(&var, "MIN_VIRAL_SCORE")?,
        })
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ViralscanError::InvalidSetting {
                key: format!("{ENV_PREFIX}{name}"),
                value: format!("'{raw}' ({e})"),
            })
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ViralscanError::InvalidSetting {
            key: format!("{ENV_PREFIX}{name}"),
            value: raw.to_string(),
        }),
    }
}

macro_rules! overlay {
    ($target:expr, $layer:expr, [$($field:ident),* $(,)?], [$($optional:ident),* $(,)?]) => {
        $(if let Some(value) = $layer.$field { $target.$field = value; })*
        $(if $layer.$optional.is_some() { $target.$optional = $layer.$optional; })*
    };
}

impl AppConfig {
    /// `<config dir>/viralscan/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("viralscan").join("config.json"))
    }

    /// Defaults, the config file, then the process environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        match path {
            Some(path) if !path.exists() => {
                return Err(ViralscanError::InvalidConfig {
                    path: path.to_path_buf(),
                    reason: "file does not exist".to_string(),
                });
            }
            Some(path) => config.apply(ConfigLayer::from_file(path)?),
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.exists()) {
                    config.apply(ConfigLayer::from_file(&default)?);
                }
            }
        }

        config.apply(ConfigLayer::from_env(lookup)?);
        Ok(config)
    }

    pub fn apply(&mut self, layer: ConfigLayer) {
        overlay!(
            self,
            layer,
            [
                provider,
                temperature,
                max_tokens,
                stream,
                request_timeout_secs,
                max_retries,
                retry_backoff_ms,
                max_chunk_chars,
                overlap_seconds,
                rubric,
                content_type,
                overlap_strategy,
            ],
            [
                model,
                base_url,
                keep_alive,
                min_clip_duration,
                max_clip_duration,
                target_count,
                min_viral_score,
            ]
        );
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, value: String| {
            Err(ViralscanError::InvalidSetting {
                key: key.to_string(),
                value,
            })
        };

        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid("temperature", self.temperature.to_string());
        }
        if self.max_tokens == 0 {
            return invalid("maxTokens", "0".to_string());
        }
        if self.max_chunk_chars == 0 {
            return invalid("maxChunkChars", "0".to_string());
        }
        if !self.overlap_seconds.is_finite() || self.overlap_seconds < 0.0 {
            return invalid("overlapSeconds", self.overlap_seconds.to_string());
        }
        if self.request_timeout_secs == 0 {
            return invalid("requestTimeoutSecs", "0".to_string());
        }
        let options = self.analyze_options();
        if options.min_clip_duration < 0.0 || options.max_clip_duration < options.min_clip_duration {
            return invalid(
                "minClipDuration/maxClipDuration",
                format!("{}-{}", options.min_clip_duration, options.max_clip_duration),
            );
        }
        if let Some(score) = options.min_viral_score.filter(|s| !(0.0..=100.0).contains(s)) {
            return invalid("minViralScore", score.to_string());
        }
        if self.target_count == Some(0) {
            return invalid("targetCount", "0".to_string());
        }
        Ok(())
    }

    pub fn rubric(&self) -> Rubric {
        Rubric::from_kind(self.rubric)
    }

    /// Rubric defaults with explicit settings on top. A target count switches
    /// the output policy to a plain cap.
    pub fn analyze_options(&self) -> AnalyzeOptions {
        let mut options = AnalyzeOptions::for_rubric(self.rubric);
        options.content_type = self.content_type;
        options.overlap = self.overlap_strategy;
        if let Some(min) = self.min_clip_duration {
            options.min_clip_duration = min;
        }
        if let Some(max) = self.max_clip_duration {
            options.max_clip_duration = max;
        }
        if let Some(n) = self.target_count {
            options.output = OutputPolicy::TargetCount(n);
        }
        if self.min_viral_score.is_some() {
            options.min_viral_score = self.min_viral_score;
        }
        options
    }

    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.max_chunk_chars,
            overlap_seconds: self.overlap_seconds,
        }
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn generation(&self) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            keep_alive: self.keep_alive.clone(),
            api_key: None,
        }
    }

    pub fn connect(&self) -> std::result::Result<Arc<dyn ModelClient>, ModelError> {
        self.provider.connect(&self.client_options())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.max_chunk_chars, 12_000);
        assert_eq!(config.overlap_seconds, 30.0);
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.request_timeout_secs, 180);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_backoff_ms, 1000);
        assert!(config.stream);
        config.validate().unwrap();
    }

    #[test]
    fn file_layer_accepts_partial_camel_case() {
        let layer: ConfigLayer =
            serde_json::from_str(r#"{"provider":"ollama","model":"qwen2.5","maxChunkChars":8000}"#).unwrap();
        let mut config = AppConfig::default();
        config.apply(layer);
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.model.as_deref(), Some("qwen2.5"));
        assert_eq!(config.max_chunk_chars, 8000);
        assert_eq!(config.overlap_seconds, 30.0);
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::default();
        config.apply(ConfigLayer {
            model: Some("from-file".into()),
            max_retries: Some(1),
            ..Default::default()
        });
        let layer = ConfigLayer::from_env(env(&[
            ("VIRALSCAN_MODEL", "from-env"),
            ("VIRALSCAN_STREAM", "off"),
            ("VIRALSCAN_RUBRIC", "mentorship"),
            ("VIRALSCAN_OVERLAP_STRATEGY", "optimal"),
        ]))
        .unwrap();
        config.apply(layer);
        assert_eq!(config.model.as_deref(), Some("from-env"));
        assert_eq!(config.max_retries, 1);
        assert!(!config.stream);
        assert_eq!(config.rubric, RubricKind::Mentorship);
        assert_eq!(config.overlap_strategy, OverlapStrategy::Optimal);
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let err = ConfigLayer::from_env(env(&[("VIRALSCAN_MAX_TOKENS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("VIRALSCAN_MAX_TOKENS"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let layer = ConfigLayer::from_env(env(&[("VIRALSCAN_MODEL", "  ")])).unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let err = AppConfig::load_with(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(err, ViralscanError::InvalidConfig { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"targetCount": 3, "contentType": "podcast"}"#).unwrap();
        let config = AppConfig::load_with(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.target_count, Some(3));
        assert_eq!(config.content_type, ContentType::Podcast);
    }

    #[test]
    fn analyze_options_layer_over_rubric_defaults() {
        let config = AppConfig {
            rubric: RubricKind::Mentorship,
            max_clip_duration: Some(60.0),
            ..Default::default()
        };
        let options = config.analyze_options();
        assert_eq!(options.min_clip_duration, 30.0);
        assert_eq!(options.max_clip_duration, 60.0);
        assert_eq!(options.min_viral_score, None);
        assert!(matches!(options.output, OutputPolicy::Tiered { .. }));

        let capped = AppConfig {
            target_count: Some(4),
            ..config
        };
        assert_eq!(capped.analyze_options().target_count(), Some(4));
    }

    #[test]
    fn validate_rejects_inverted_durations() {
        let config = AppConfig {
            min_clip_duration: Some(60.0),
            max_clip_duration: Some(30.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ViralscanError::InvalidSetting { .. })));
    }

    #[test]
    fn call_policy_uses_configured_units() {
        let config = AppConfig {
            request_timeout_secs: 30,
            retry_backoff_ms: 250,
            max_retries: 2,
            ..Default::default()
        };
        let policy = config.call_policy();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.max_retries, 2);
    }
}
