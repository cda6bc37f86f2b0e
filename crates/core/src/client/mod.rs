//! The "send prompt, get text" boundary and the guarded call wrapper around it.

pub mod ollama;
pub mod openai;
pub mod stream;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cancel::CancelToken;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use stream::LineBuffer;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(1000);

/// Receives streamed text deltas as they arrive.
pub type TokenSink<'a> = dyn FnMut(&str) + Send + 'a;

#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("{backend} is not configured: {reason}")]
    NotConfigured { backend: String, reason: String },

    #[error("{backend} request failed: {reason}")]
    Unavailable {
        backend: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model call cancelled")]
    Cancelled,
}

impl ModelError {
    pub fn not_configured(backend: &str, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(backend: &str, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.to_string(),
            status,
            reason: reason.into(),
        }
    }

    /// Worth another attempt with the same configuration.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Unavailable { .. } | ModelError::Timeout { .. } | ModelError::EmptyResponse
        )
    }

    /// Message for the person running the analysis.
    pub fn user_message(&self) -> String {
        match self {
            ModelError::NotConfigured { backend, reason } => format!(
                "No usable AI backend: {backend} is not set up ({reason}). Fix the configuration and try again."
            ),
            ModelError::Unavailable { backend, .. } => format!(
                "Could not reach {backend}. Check that it is running and reachable, then try again."
            ),
            ModelError::Timeout { secs } => format!(
                "The AI backend did not answer within {secs}s. Try a smaller model or a longer timeout."
            ),
            ModelError::EmptyResponse => {
                "The AI backend answered but sent no usable content. Try again or pick another model."
                    .to_string()
            }
            ModelError::Cancelled => "Analysis cancelled.".to_string(),
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable backend name, e.g. "OpenAI" or "Ollama".
    fn backend(&self) -> &str;

    fn model(&self) -> &str;

    /// Run one prompt pair and return the full response text.
    ///
    /// When `request.stream` is set, text deltas are passed to `on_token` as they arrive.
    async fn chat(
        &self,
        request: &ChatRequest<'_>,
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: 0,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// One model call with a per-call timeout, cancellation and bounded retry.
///
/// Cancellation drops the in-flight request. Only transient errors are
/// retried, after `backoff * attempt`.
pub async fn call_model(
    client: &dyn ModelClient,
    request: &ChatRequest<'_>,
    policy: &CallPolicy,
    cancel: &CancelToken,
    on_token: &mut TokenSink<'_>,
) -> Result<String, ModelError> {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            result = tokio::time::timeout(policy.timeout, client.chat(request, &mut *on_token)) => {
                result.unwrap_or(Err(ModelError::Timeout {
                    secs: policy.timeout.as_secs(),
                }))
            }
        };

        let result = match result {
            Ok(text) if text.trim().is_empty() => Err(ModelError::EmptyResponse),
            other => other,
        };

        match result {
            Ok(text) => {
                debug!(
                    backend = client.backend(),
                    model = client.model(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "model call finished"
                );
                return Ok(text);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(attempt, max = policy.max_retries, error = %e, "retrying model call");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                    _ = tokio::time::sleep(policy.backoff * attempt) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
