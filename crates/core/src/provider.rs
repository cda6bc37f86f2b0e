use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::{ModelClient, ModelError, OllamaClient, OpenAiClient};
use crate::client::ollama::{DEFAULT_KEEP_ALIVE, DEFAULT_OLLAMA_URL};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Grok,
    Openai,
    Gemini,
    /// Any other OpenAI-compatible endpoint; needs `baseUrl` and `model`.
    Custom,
    /// Local inference server, no credential.
    Ollama,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: Option<&'static str>,
}

/// Per-run overrides on top of a provider preset.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub keep_alive: Option<String>,
    /// Takes precedence over the provider's environment variable.
    pub api_key: Option<String>,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Grok,
        Provider::Openai,
        Provider::Gemini,
        Provider::Custom,
        Provider::Ollama,
    ];

    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: Some("XAI_API_KEY"),
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: Some("OPENAI_API_KEY"),
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: Some("GEMINI_API_KEY"),
            },
            Provider::Custom => ProviderConfig {
                api_url: "",
                model: "",
                env_var: Some("VIRALSCAN_API_KEY"),
            },
            Provider::Ollama => ProviderConfig {
                api_url: DEFAULT_OLLAMA_URL,
                model: "llama3.1",
                env_var: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Grok => "Grok",
            Provider::Openai => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Custom => "Custom",
            Provider::Ollama => "Ollama",
        }
    }

    pub(crate) fn api_key_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ModelError> {
        let Some(var) = self.config().env_var else {
            return Ok(String::new());
        };
        lookup(var)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::not_configured(self.name(), format!("{var} is not set")))
    }

    /// Build the client for this preset.
    pub fn connect(&self, options: &ClientOptions) -> Result<Arc<dyn ModelClient>, ModelError> {
        self.connect_with(options, |var| std::env::var(var).ok())
    }

    pub(crate) fn connect_with(
        &self,
        options: &ClientOptions,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<dyn ModelClient>, ModelError> {
        let config = self.config();

        let model = non_empty(options.model.as_deref())
            .or(non_empty(Some(config.model)))
            .ok_or_else(|| ModelError::not_configured(self.name(), "no model selected"))?;
        let base_url = non_empty(options.base_url.as_deref())
            .or(non_empty(Some(config.api_url)))
            .ok_or_else(|| ModelError::not_configured(self.name(), "no endpoint URL configured"))?;

        match self {
            Provider::Ollama => {
                let keep_alive = non_empty(options.keep_alive.as_deref()).unwrap_or(DEFAULT_KEEP_ALIVE);
                Ok(Arc::new(OllamaClient::new(base_url, model).with_keep_alive(keep_alive)))
            }
            _ => {
                let api_key = match non_empty(options.api_key.as_deref()) {
                    Some(key) => key.to_string(),
                    None => self.api_key_from(lookup)?,
                };
                Ok(Arc::new(OpenAiClient::new(self.name(), base_url, api_key, model)))
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grok" | "xai" => Ok(Provider::Grok),
            "openai" => Ok(Provider::Openai),
            "gemini" => Ok(Provider::Gemini),
            "custom" => Ok(Provider::Custom),
            "ollama" | "local" => Ok(Provider::Ollama),
            other => Err(format!(
                "unknown provider '{other}' (expected grok, openai, gemini, custom or ollama)"
            )),
        }
    }
}
