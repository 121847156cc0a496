//! OpenRouter-compatible HTTP client for chat completions and the model list.

use std::time::Duration;

use async_trait::async_trait;
use proto::{
    CatalogError, CompletionError, ModelArchitecture, ModelCatalogEntry, ModelPricing,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSource;
use crate::completion::{CompletionProvider, CompletionRequest};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const ERROR_PREVIEW_CHARS: usize = 500;

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<RemoteModel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteModel {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    context_length: Option<u64>,
    pricing: Option<RemotePricing>,
    architecture: Option<RemoteArchitecture>,
    top_provider: Option<TopProvider>,
    supported_parameters: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemotePricing {
    prompt: Option<String>,
    completion: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteArchitecture {
    tokenizer: Option<String>,
    modality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TopProvider {
    max_completion_tokens: Option<u64>,
}

// ── Client ─────────────────────────────────────────────────────────────────────

/// Client for the completion and catalog endpoints.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterClient {
    /// Creates a client targeting the public OpenRouter API.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client targeting a custom base URL (useful for proxies/tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Replaces the transport default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, reqwest::Error> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            model: &req.model,
            messages: vec![RequestMessage {
                role: "user",
                content: &req.prompt,
            }],
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %req.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&req.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(format!("Request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Completion response received");
        if status.as_u16() == 429 {
            return Err(CompletionError::RateLimit);
        }

        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("Reading response failed: {e}")))?;

        if !status.is_success() {
            let preview: String = text.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(CompletionError::Transport(format!("HTTP {status}: {preview}")));
        }

        parse_completion(&text)
    }
}

#[async_trait]
impl CatalogSource for OpenRouterClient {
    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
        let url = format!("{}/models", self.base_url);
        debug!(url = %url, "Fetching model catalog");

        let body: ModelsResponse = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| CatalogError::FetchFailed(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| CatalogError::FetchFailed(format!("http status: {e}")))?
            .json()
            .await
            .map_err(|e| CatalogError::FetchFailed(format!("json decode: {e}")))?;

        Ok(normalize_models(body.data))
    }
}

/// Decodes a success body into the first choice's text.
fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::MalformedResponse(format!(
            "{e}; body: {}",
            body.chars().take(200).collect::<String>()
        ))
    })?;

    match parsed.choices.into_iter().next() {
        Some(choice) => Ok(choice.message.content.unwrap_or_default()),
        None => match parsed.error {
            Some(err) if !err.message.is_empty() => Err(CompletionError::Transport(err.message)),
            _ => Err(CompletionError::MalformedResponse(
                "No choices in response".to_string(),
            )),
        },
    }
}

/// Maps remote records 1:1; absent fields default to empty or zero.
fn normalize_models(records: Vec<RemoteModel>) -> Vec<ModelCatalogEntry> {
    records
        .into_iter()
        .map(|record| {
            let pricing = record.pricing.unwrap_or_default();
            let architecture = record.architecture.unwrap_or_default();
            ModelCatalogEntry {
                id: record.id.unwrap_or_default(),
                name: record.name.unwrap_or_default(),
                description: record.description.unwrap_or_default(),
                context_length: record.context_length.unwrap_or_default(),
                max_completion_tokens: record
                    .top_provider
                    .and_then(|p| p.max_completion_tokens)
                    .unwrap_or_default(),
                pricing: ModelPricing {
                    prompt: pricing.prompt.unwrap_or_default(),
                    completion: pricing.completion.unwrap_or_default(),
                },
                architecture: ModelArchitecture {
                    tokenizer: architecture.tokenizer.unwrap_or_default(),
                    modality: architecture.modality.unwrap_or_default(),
                },
                supported_parameters: record.supported_parameters.unwrap_or_default(),
            }
        })
        .collect()
}
