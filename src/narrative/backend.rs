//! Narrative backends.
//!
//! A backend is selected once per run from configuration and treated as
//! a pure function from request to text.

use crate::config::{NarrativeConfig, Provider};
use crate::error::BackendError;
use crate::narrative::prompts;
use crate::narrative::NarrativeRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text generation service.
#[async_trait]
pub trait NarrativeBackend: Send + Sync {
    /// Label recorded in report metadata, e.g. `ollama:llama3.2:latest`.
    fn name(&self) -> String;

    async fn generate(&self, request: &NarrativeRequest) -> Result<String, BackendError>;
}

/// Build the configured backend. `Ok(None)` means offline.
pub fn create_backend(config: &NarrativeConfig) -> Result<Option<Arc<dyn NarrativeBackend>>> {
    match config.provider {
        Provider::Offline => {
            info!("Narrative backend disabled; using statistical fallbacks");
            Ok(None)
        }
        Provider::Ollama => Ok(Some(Arc::new(OllamaBackend::new(config)?))),
        Provider::Anthropic => {
            let api_key = std::env::var(ANTHROPIC_KEY_ENV)
                .with_context(|| format!("{} is not set", ANTHROPIC_KEY_ENV))?;
            Ok(Some(Arc::new(AnthropicBackend::new(config, api_key)?)))
        }
    }
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// Classify a transport failure.
fn send_error(err: reqwest::Error, endpoint: &str) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() {
        BackendError::Unavailable(format!("cannot connect to {}", endpoint))
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Classify a non-success HTTP status.
fn status_error(status: reqwest::StatusCode, body: String) -> BackendError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BackendError::RateLimited
    } else if status.is_server_error() {
        BackendError::Unavailable(format!("server returned {}", status))
    } else {
        BackendError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

fn non_empty(text: String) -> Result<String, BackendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(BackendError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Local Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaBackend {
    pub fn new(config: &NarrativeConfig) -> Result<Self> {
        info!(
            "Using Ollama model {} at {}",
            config.model, config.ollama_url
        );
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl NarrativeBackend for OllamaBackend {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.url);
        let body = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompts::SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompts::render_prompt(request),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!("Sending {} to Ollama", request.section);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, &self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        non_empty(chat.message.content)
    }
}

/// Anthropic Messages API request.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(config: &NarrativeConfig, api_key: String) -> Result<Self> {
        info!("Using Anthropic model {}", config.model);
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            url: config.anthropic_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl NarrativeBackend for AnthropicBackend {
    fn name(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<String, BackendError> {
        let url = format!("{}/v1/messages", self.url);
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: prompts::SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompts::render_prompt(request),
            }],
        };

        debug!("Sending {} to Anthropic", request.section);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, &self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let text = messages
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        non_empty(text)
    }
}
