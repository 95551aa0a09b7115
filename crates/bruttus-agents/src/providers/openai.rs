use super::{LlmProvider, LlmRequest, extract_text, send_json};
use async_trait::async_trait;
use bruttus_common::Result;
use bruttus_config::OpenAiConfig;
use bruttus_config::model::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

const TEXT_POINTER: &str = "/choices/0/message/content";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn from_config(config: &OpenAiConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn build_request<'a>(&'a self, request: &'a LlmRequest) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.model,
            messages: vec![OpenAiMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.max_tokens.is_none().then_some(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        "openai"
    }

    fn display_name(&self) -> &str {
        "OPENAI"
    }

    fn api_key_present(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    #[instrument(skip_all, fields(provider = "openai", model = %self.model))]
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let builder = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .json(&self.build_request(request));

        let payload = send_json(self.provider_id(), builder).await?;
        let text = extract_text(&payload, TEXT_POINTER);
        debug!(chars = text.len(), "openai response received");
        Ok(text)
    }
}

// Request Types
#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}
