use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{TransportError, TransportErrorKind};
use crate::schema::GenerationRequest;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_MODEL: &str = "llama3:8b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw model text, or why we could not get any.
pub type GenerationResult = Result<String, TransportError>;

/// Anything that can turn a prompt into text. The orchestrators only see this.
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    fn timeout(&self) -> Duration;

    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = GenerationResult> + Send;

    fn request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest::new(self.model(), prompt, self.timeout())
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    endpoint: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<Value>,
}

impl OllamaResponse {
    /// `response` first, then `message` (plain string or chat-style `{content}`).
    fn into_text(self) -> Option<String> {
        if let Some(text) = self.response.filter(|t| !t.is_empty()) {
            return Some(text);
        }
        match self.message? {
            Value::String(text) if !text.is_empty() => Some(text),
            Value::Object(map) => match map.get("content") {
                Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl OllamaClient {
    pub fn new(endpoint: String, model: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            model,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, request: &GenerationRequest) -> GenerationResult {
        let body = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: request.stream(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(
                TransportError::new(TransportErrorKind::Status, format!("LLM error: {}", status))
                    .with_status(status.as_u16(), text),
            );
        }

        let bytes = response.bytes().await?;
        let parsed: OllamaResponse = serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Decode,
                format!("Failed to parse LLM response: {}", e),
            )
            .with_status(status.as_u16(), String::from_utf8_lossy(&bytes).into_owned())
        })?;

        parsed.into_text().ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::EmptyPayload,
                "LLM response carried no text",
            )
            .with_status(status.as_u16(), String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}

impl TextGenerator for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Single attempt, no retries. Dropping the future aborts the HTTP call.
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let started = Instant::now();
        let result = self.send(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => debug!(
                model = %request.model,
                elapsed_ms,
                response_len = text.len(),
                "LLM call succeeded"
            ),
            Err(e) => warn!(
                model = %request.model,
                elapsed_ms,
                kind = %e.kind,
                status = e.status,
                error = %e.cause,
                "LLM call failed"
            ),
        }

        result
    }
}
