use super::{LlmProvider, LlmRequest, extract_text, send_json};
use async_trait::async_trait;
use bruttus_common::Result;
use bruttus_config::GeminiConfig;
use bruttus_config::model::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

const TEXT_POINTER: &str = "/candidates/0/content/parts/0/text";

/// Google "generateContent" adapter. The key is sent as the `key` query
/// parameter.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &GeminiConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        "GEMINI"
    }

    fn api_key_present(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %self.model))]
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        // Output length is left to the model; `max_tokens` only shapes OpenAI calls.
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }]
        });

        let builder = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_deref().unwrap_or_default())])
            .json(&body);

        let payload = send_json(self.provider_id(), builder).await?;
        let text = extract_text(&payload, TEXT_POINTER);
        debug!(chars = text.len(), "gemini response received");
        Ok(text)
    }
}
