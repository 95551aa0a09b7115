use std::time::Duration;

use async_trait::async_trait;
use bruttus_common::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Trait for the LLM backends a prompt is fanned out to (Gemini, OpenAI).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "gemini", "openai").
    fn provider_id(&self) -> &str;

    /// Upper-case label used in status lines (e.g. "GEMINI").
    fn display_name(&self) -> &str;

    /// Whether a non-blank credential is configured. The provider is never
    /// called without one; see [`crate::probe::probe`].
    fn api_key_present(&self) -> bool;

    /// Send one prompt and return the extracted text.
    ///
    /// A response without the expected text field yields `Ok("")`; only
    /// transport, status and non-JSON bodies are errors. No retries.
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
        }
    }

    /// The minimal request used by the availability probe.
    pub fn ping() -> Self {
        Self {
            prompt: "ping".to_string(),
            max_tokens: Some(8),
        }
    }
}

/// Build the HTTP client shared by both providers.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

/// Send `request` and normalize the outcome into the provider error taxonomy.
///
/// The request URL is stripped from transport errors because the Gemini
/// credential travels in the query string.
pub(crate) async fn send_json(provider: &str, request: RequestBuilder) -> Result<Value> {
    let response = request.send().await.map_err(|e| Error::ProviderTransport {
        provider: provider.to_string(),
        message: e.without_url().to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        debug!(provider, status = status.as_u16(), "provider returned error status");
        return Err(Error::ProviderHttp {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|e| Error::ProviderTransport {
        provider: provider.to_string(),
        message: e.without_url().to_string(),
    })?;

    serde_json::from_str(&body).map_err(|e| Error::ProviderPayload {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// Read the string at `pointer`, or `""` when it is missing or not a string.
pub(crate) fn extract_text(payload: &Value, pointer: &str) -> String {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_follows_pointer() {
        let payload = json!({"choices": [{"message": {"content": "run httpx"}}]});
        assert_eq!(extract_text(&payload, "/choices/0/message/content"), "run httpx");
    }

    #[test]
    fn extract_text_is_empty_for_missing_or_non_string() {
        let payload = json!({"choices": [], "other": {"content": 3}});
        assert_eq!(extract_text(&payload, "/choices/0/message/content"), "");
        assert_eq!(extract_text(&payload, "/other/content"), "");
    }

    #[test]
    fn ping_request_is_minimal() {
        let ping = LlmRequest::ping();
        assert_eq!(ping.prompt, "ping");
        assert_eq!(ping.max_tokens, Some(8));
        assert_eq!(LlmRequest::new("x").max_tokens, None);
    }
}
