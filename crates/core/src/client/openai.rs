use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::stream::{Frame, collect_stream, request_error, sse_data, status_error};
use super::{ChatRequest, ModelClient, ModelError, TokenSink};

/// Any OpenAI-compatible `chat/completions` endpoint (OpenAI, xAI, Gemini's compat layer, ...).
pub struct OpenAiClient {
    http: reqwest::Client,
    backend: String,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        backend: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            backend: backend.into(),
            endpoint: completions_url(base_url),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, request: &ChatRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": request.stream,
        });
        if request.stream {
            body["stream_options"] = json!({"include_usage": true});
        }
        body
    }
}

/// Accepts either a bare API root (`https://api.x.ai/v1`) or the full completions URL.
fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

fn log_usage(backend: &str, usage: &Value) {
    if let Some(total) = usage["total_tokens"].as_u64() {
        debug!(
            backend,
            prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens = usage["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens = total,
            "token usage"
        );
    }
}

fn api_error(backend: &str, value: &Value) -> Option<ModelError> {
    let error = value.get("error")?;
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(ModelError::unavailable(backend, None, message))
}

/// Decode one SSE line of a streamed completion.
fn decode_sse(backend: &str, line: &str) -> Result<Frame, ModelError> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }
    let value: Value = serde_json::from_str(data).map_err(|e| {
        ModelError::unavailable(backend, None, format!("malformed stream event: {e}"))
    })?;
    if let Some(err) = api_error(backend, &value) {
        return Err(err);
    }
    if !value["usage"].is_null() {
        log_usage(backend, &value["usage"]);
    }
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(token) if !token.is_empty() => Ok(Frame::Token(token.to_string())),
        _ => Ok(Frame::Skip),
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn backend(&self) -> &str {
        &self.backend
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
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| request_error(&self.backend, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.backend, status, &body));
        }

        if request.stream {
            let backend = self.backend.as_str();
            return collect_stream(response, backend, on_token, |line| decode_sse(backend, line))
                .await;
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::unavailable(&self.backend, None, format!("invalid response body: {e}")))?;
        if let Some(err) = api_error(&self.backend, &value) {
            return Err(err);
        }
        log_usage(&self.backend, &value["usage"]);

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        on_token(content);
        Ok(content.to_string())
    }
}
