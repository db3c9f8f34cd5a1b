//! Ollama HTTP client with automatic retry for transient errors.
//!
//! Speaks `/api/generate` (single-shot and NDJSON streaming) and `/api/tags`.
//! This is the only module that knows Ollama's wire format; the engine sees
//! it purely through the [`CompletionBackend`] / [`ModelCatalog`] traits.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::error::{BackendError, RetryConfig};
use super::{CompletionBackend, CompletionRequest, CompletionStream, ModelCatalog, ModelInfo};
use crate::config::EngineConfig;

/// HTTP client for a local or proxied Ollama instance.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Option<Duration>,
    retry_config: RetryConfig,
    log_wire: bool,
}

impl OllamaClient {
    /// Default Ollama API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    /// Client against the default local instance.
    pub fn new() -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: None,
            request_timeout: None,
            retry_config: RetryConfig::default(),
            log_wire: false,
        }
    }

    /// Client wired from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut client = Self::with_base_url(config.base_url.clone());
        client.api_key = config.api_key.clone();
        client.request_timeout = Some(config.http_timeout);
        client.log_wire = config.verbose;
        client
    }

    /// Bearer token for proxied deployments; plain Ollama needs none.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the retry budget.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Per-request timeout; unset means the client default.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Parse a Retry-After header given in seconds, if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok().map(Duration::from_secs))
    }

    fn map_send_error(error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Network(format!("request timeout: {error}"))
        } else if error.is_connect() {
            BackendError::Network(format!("connection failed: {error}"))
        } else {
            BackendError::Network(format!("request failed: {error}"))
        }
    }

    /// POST `/api/generate`, returning the raw response on 2xx.
    async fn post_generate(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let body = GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        tracing::debug!(model = %request.model, stream, "sending generate request");

        let response = self
            .prepare(self.client.post(self.endpoint("/api/generate")).json(&body))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let error = match BackendError::from_status(status.as_u16(), text) {
                BackendError::RateLimited { message, .. } => {
                    BackendError::RateLimited {
                        message,
                        retry_after,
                    }
                }
                other => other,
            };
            return Err(error);
        }
        Ok(response)
    }

    /// Execute a single non-streaming request without retry.
    async fn execute_once(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let response = self.post_generate(request, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(format!("failed to read response body: {e}")))?;

        if self.log_wire {
            tracing::trace!(body = %text, "generate response body");
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Parse(format!("invalid generate response: {e}")))?;
        Ok(parsed.response)
    }

    /// Execute with automatic retry for transient errors.
    async fn execute_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, BackendError> {
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match self.execute_once(request).await {
                Ok(output) => {
                    if attempt > 0 {
                        tracing::info!(
                            retries = attempt,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "generate request succeeded after retries"
                        );
                    }
                    return Ok(output);
                }
                Err(error) => {
                    if !self.retry_config.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let remaining = self
                        .retry_config
                        .max_retry_duration
                        .saturating_sub(start.elapsed());
                    let delay = error.suggested_delay(attempt).min(remaining);
                    if delay.is_zero() {
                        return Err(error);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient backend failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.execute_with_retry(request).await
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, BackendError> {
        let response = self.post_generate(request, true).await?;
        let log_wire = self.log_wire;

        // NDJSON decode. HTTP chunk boundaries need not align with line
        // boundaries, so buffer bytes and split on newlines ourselves.
        let stream = async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'outer: while let Some(item) = body.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(BackendError::Stream(format!("body stream failed: {e}")));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match decode_line(&line, log_wire) {
                        Ok(Some(LinePayload { response, done })) => {
                            if !response.is_empty() {
                                yield Ok(response);
                            }
                            if done {
                                break 'outer;
                            }
                        }
                        Ok(None) => {}
                        Err(error) => {
                            yield Err(error);
                            return;
                        }
                    }
                }
            }

            // A final line without a trailing newline is still valid NDJSON.
            if !buffer.is_empty() {
                match decode_line(&buffer, log_wire) {
                    Ok(Some(LinePayload { response, .. })) if !response.is_empty() => {
                        yield Ok(response);
                    }
                    Ok(_) => {}
                    Err(error) => yield Err(error),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ModelCatalog for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let response = self
            .prepare(self.client.get(self.endpoint("/api/tags")))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), text));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(format!("invalid tags response: {e}")))?;
        Ok(tags.models)
    }
}

struct LinePayload {
    response: String,
    done: bool,
}

/// Decode one NDJSON line; empty lines yield `None`.
fn decode_line(raw: &[u8], log_wire: bool) -> Result<Option<LinePayload>, BackendError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| BackendError::Parse(format!("stream line is not UTF-8: {e}")))?
        .trim();
    if line.is_empty() {
        return Ok(None);
    }
    if log_wire {
        tracing::trace!(line = %line, "ndjson stream line");
    }
    let parsed: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| BackendError::Parse(format!("invalid stream line: {e}")))?;
    Ok(Some(LinePayload {
        response: parsed.response,
        done: parsed.done,
    }))
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Sampling options understood by Ollama.
#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One `/api/generate` response object (final for single-shot, per-line for
/// streaming).
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Response from `/api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let client = OllamaClient::with_base_url("http://localhost:11434/");
        assert_eq!(
            client.endpoint("/api/generate"),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_generate_request_wire_format() {
        let body = GenerateRequest {
            model: "llama3:8b",
            prompt: "hello",
            stream: false,
            options: GenerateOptions {
                temperature: 0.7,
                num_predict: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3:8b");
        assert_eq!(json["stream"], false);
        assert!(json["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_decode_stream_lines() {
        let line = br#"{"model":"llama3:8b","response":"Hel","done":false}"#;
        let payload = decode_line(line, false).unwrap().unwrap();
        assert_eq!(payload.response, "Hel");
        assert!(!payload.done);

        let done = br#"{"response":"","done":true}"#;
        let payload = decode_line(done, false).unwrap().unwrap();
        assert!(payload.done);

        assert!(decode_line(b"  \n", false).unwrap().is_none());
        assert!(decode_line(b"not json", false).is_err());
    }

    #[test]
    fn test_tags_response_parsing() {
        let json = r#"{"models":[
            {"name":"llama3:8b","size":4661224676,"digest":"abc","modified_at":"2024-05-01T10:00:00Z"},
            {"name":"codellama:7b"}
        ]}"#;
        let tags: TagsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[0].name, "llama3:8b");
        assert_eq!(tags.models[0].size, Some(4661224676));
        assert_eq!(tags.models[1].size, None);
    }
}
