use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::stream::{Frame, collect_stream, request_error, status_error};
use super::{ChatRequest, ModelClient, ModelError, TokenSink};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_KEEP_ALIVE: &str = "5m";

const BACKEND: &str = "Ollama";

/// Local Ollama server via `/api/chat`.
pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    model: String,
    keep_alive: String,
}

impl OllamaClient {
    pub fn new(host: &str, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: model.into(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
        }
    }

    /// How long Ollama keeps the model loaded after the call, e.g. "5m" or "0".
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    fn body(&self, request: &ChatRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "stream": request.stream,
            "keep_alive": self.keep_alive,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        })
    }
}

fn log_done(value: &Value) {
    let (Some(evals), Some(nanos)) = (value["eval_count"].as_u64(), value["eval_duration"].as_u64())
    else {
        return;
    };
    let per_sec = if nanos > 0 {
        evals as f64 / (nanos as f64 / 1e9)
    } else {
        0.0
    };
    debug!(
        backend = BACKEND,
        prompt_tokens = value["prompt_eval_count"].as_u64().unwrap_or(0),
        completion_tokens = evals,
        tokens_per_sec = (per_sec * 10.0).round() / 10.0,
        "token usage"
    );
}

/// Decode one NDJSON line of a streamed chat.
fn decode_line(line: &str) -> Result<Frame, ModelError> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        ModelError::unavailable(BACKEND, None, format!("malformed stream line: {e}"))
    })?;
    if let Some(err) = value["error"].as_str() {
        return Err(ModelError::unavailable(BACKEND, None, err));
    }
    if value["done"].as_bool() == Some(true) {
        log_done(&value);
        return Ok(match value["message"]["content"].as_str() {
            Some(token) if !token.is_empty() => Frame::Token(token.to_string()),
            _ => Frame::Done,
        });
    }
    match value["message"]["content"].as_str() {
        Some(token) if !token.is_empty() => Ok(Frame::Token(token.to_string())),
        _ => Ok(Frame::Skip),
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn backend(&self) -> &str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        request: &ChatRequest<'_>,
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ModelError> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.host))
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| request_error(BACKEND, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ModelError::not_configured(
                BACKEND,
                format!("model '{}' is not installed; run `ollama pull {}`", self.model, self.model),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(BACKEND, status, &body));
        }

        if request.stream {
            return collect_stream(response, BACKEND, on_token, decode_line).await;
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::unavailable(BACKEND, None, format!("invalid response body: {e}")))?;
        if let Some(err) = value["error"].as_str() {
            return Err(ModelError::unavailable(BACKEND, None, err));
        }
        log_done(&value);

        let content = value["message"]["content"].as_str().unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        on_token(content);
        Ok(content.to_string())
    }
}
