//! Text-generation clients
//!
//! Both providers speak the OpenAI chat-completions wire format. The
//! diagnostic core never calls into this module; only `analyze` does.

mod localai;
mod openai;

pub use localai::LocalAiClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Errors raised while building a client or completing a request
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY environment variable is required for the openai provider")]
    MissingApiKey,

    #[error("ai_endpoint must be set for the localai provider")]
    MissingEndpoint,

    #[error("unsupported AI provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no completions returned")]
    NoChoices,
}

/// Speaker of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Generated text plus token accounting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
    pub finish_reason: String,
}

/// Connection settings shared by all providers
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    /// Request timeout in seconds; provider default when `None`
    pub timeout_secs: Option<u64>,
}

/// A text-generation service
#[async_trait]
pub trait Client: Send + Sync {
    fn provider(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Build the client named by `provider`
pub fn new_client(provider: &str, options: ClientOptions) -> Result<Box<dyn Client>, LlmError> {
    match provider.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiClient::new(options)?)),
        "localai" => Ok(Box::new(LocalAiClient::new(options)?)),
        other => Err(LlmError::UnsupportedProvider(other.to_string())),
    }
}

/// Build the configured client, validating provider requirements
pub fn client_from_config(config: &Config, api_key: Option<String>) -> Result<Box<dyn Client>, LlmError> {
    let options = match config.ai_provider.to_lowercase().as_str() {
        "openai" => ClientOptions {
            api_key: Some(api_key.filter(|k| !k.is_empty()).ok_or(LlmError::MissingApiKey)?),
            endpoint: config.ai_endpoint.clone(),
            timeout_secs: Some(30),
        },
        "localai" => ClientOptions {
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: Some(
                config
                    .ai_endpoint
                    .clone()
                    .filter(|e| !e.is_empty())
                    .ok_or(LlmError::MissingEndpoint)?,
            ),
            timeout_secs: Some(60),
        },
        other => return Err(LlmError::UnsupportedProvider(other.to_string())),
    };
    new_client(&config.ai_provider, options)
}
