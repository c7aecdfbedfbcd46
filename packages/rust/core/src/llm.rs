//! Completion providers: single-turn prompt in, completion text out.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use askpage_shared::{AnswerSource, AskPageError, LlmConfig, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A hosted model that can complete a prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Recorded as `answerSource` when this provider answers.
    fn source(&self) -> AnswerSource;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Providers with credentials present, in priority order: OpenAI, then Anthropic.
pub fn providers_from_config(config: &LlmConfig) -> Result<Vec<Box<dyn CompletionProvider>>> {
    let mut providers: Vec<Box<dyn CompletionProvider>> = Vec::new();

    if let Some(key) = config.openai_api_key() {
        providers.push(Box::new(OpenAiProvider::new(key, config)?));
    }
    if let Some(key) = config.anthropic_api_key() {
        providers.push(Box::new(AnthropicProvider::new(key, config)?));
    }

    Ok(providers)
}

fn build_client(config: &LlmConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| AskPageError::Llm(format!("failed to build HTTP client: {e}")))
}

fn classify(provider: &str, e: reqwest::Error) -> AskPageError {
    if e.is_timeout() {
        AskPageError::UpstreamTimeout(format!("{provider}: {e}"))
    } else {
        AskPageError::Llm(format!("{provider}: {e}"))
    }
}

/// Read an error body for the log, bounded.
async fn error_body(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    text.chars().take(300).collect()
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> UserMessage<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<UserMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            api_key: api_key.into(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn source(&self) -> AnswerSource {
        AnswerSource::OpenAi
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![UserMessage::new(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            warn!(%status, error = %body, "OpenAI API error");
            return Err(AskPageError::Llm(format!("openai: HTTP {status}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify("openai", e))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AskPageError::Llm("openai: no completion in response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages-API client.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            api_key: api_key.into(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            model: config.anthropic_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn source(&self) -> AnswerSource {
        AnswerSource::Anthropic
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![UserMessage::new(prompt)],
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify("anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            warn!(%status, error = %body, "Anthropic API error");
            return Err(AskPageError::Llm(format!("anthropic: HTTP {status}")));
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| classify("anthropic", e))?;

        let content = messages
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AskPageError::Llm("anthropic: no text block in response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Anthropic message"
        );
        Ok(content)
    }
}
