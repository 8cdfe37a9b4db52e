//! OpenAI-compatible chat completion backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::{CompletionRequest, LanguageModel};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::{ilog_debug, ilog_trace};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Chat backend speaking the `/chat/completions` protocol.
pub struct ChatBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl ChatBackend {
    /// # Errors
    /// Returns `Error::Configuration` when no API key is configured.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration(
                    "no API key found for the chat backend (set AI_API_KEY)".to_string(),
                )
            })?;
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: Self::endpoint_for(base_url),
            model: config.effective_model().to_string(),
            api_key: api_key.to_string(),
            temperature: config.temperature,
        })
    }

    fn endpoint_for(base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
        }
    }

    fn parse_response(body: &str) -> Result<String> {
        let response: ChatResponse = serde_json::from_str(body)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Backend("response contains no message content".to_string()))
    }

    fn parse_error(status: u16, body: &str) -> Error {
        let detail = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        Error::Backend(format!("HTTP {}: {}", status, detail))
    }
}

#[async_trait]
impl LanguageModel for ChatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        ilog_debug!("POST {} model={}", self.endpoint, self.model);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        ilog_trace!("Chat response ({}): {}", status, body);
        if status != 200 {
            return Err(Self::parse_error(status, &body));
        }
        Self::parse_response(&body)
    }
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}
