//! Line framing for streamed responses (SSE `data:` lines and NDJSON).

use futures_util::StreamExt;

use super::{ModelError, TokenSink};
use crate::parser::excerpt;

/// Splits a byte stream into complete lines.
///
/// Bytes are held until a newline arrives, so multi-byte characters split
/// across network chunks are decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every line they complete, without terminators.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Payload of an SSE `data:` line. Comments, event names and ids yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// What a backend-specific decoder made of one line.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    Token(String),
    Skip,
    Done,
}

/// Drain a streaming response through `decode`, forwarding tokens.
pub(crate) async fn collect_stream<F>(
    response: reqwest::Response,
    backend: &str,
    on_token: &mut TokenSink<'_>,
    mut decode: F,
) -> Result<String, ModelError>
where
    F: FnMut(&str) -> Result<Frame, ModelError> + Send,
{
    let mut text = String::new();
    let mut lines = LineBuffer::new();
    let mut body = response.bytes_stream();

    let mut handle = |line: &str, text: &mut String| -> Result<bool, ModelError> {
        if line.trim().is_empty() {
            return Ok(false);
        }
        match decode(line)? {
            Frame::Token(token) => {
                on_token(&token);
                text.push_str(&token);
                Ok(false)
            }
            Frame::Skip => Ok(false),
            Frame::Done => Ok(true),
        }
    };

    'read: while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|e| {
            ModelError::unavailable(backend, None, format!("stream interrupted: {e}"))
        })?;
        for line in lines.push(&bytes) {
            if handle(&line, &mut text)? {
                break 'read;
            }
        }
    }
    if let Some(line) = lines.finish() {
        handle(&line, &mut text)?;
    }

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

/// Non-success HTTP status as a model error.
pub(crate) fn status_error(backend: &str, status: reqwest::StatusCode, body: &str) -> ModelError {
    let detail = format!("HTTP {status}: {}", excerpt(body.trim()));
    match status.as_u16() {
        401 | 403 => ModelError::not_configured(backend, format!("credentials rejected ({detail})")),
        _ => ModelError::unavailable(backend, Some(status.as_u16()), detail),
    }
}

pub(crate) fn request_error(backend: &str, err: reqwest::Error) -> ModelError {
    let reason = if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    ModelError::unavailable(backend, err.status().map(|s| s.as_u16()), reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_pushes() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\n\ndata: x\r\n"), vec!["data: {\"a\":1}", "", "data: x"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let bytes = "héllo\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..2]).is_empty());
        assert_eq!(buf.push(&bytes[2..]), vec!["héllo"]);
    }

    #[test]
    fn trailing_line_without_newline() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"done\":true}").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn sse_data_lines() {
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: message"), None);
    }

    #[test]
    fn auth_failures_are_configuration_errors() {
        let err = status_error("OpenAI", reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, ModelError::NotConfigured { .. }));
        let err = status_error("OpenAI", reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, ModelError::Unavailable { status: Some(502), .. }));
    }
}
