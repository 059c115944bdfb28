//! OpenAI chat-completions client

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{Client, ClientOptions, CompletionRequest, CompletionResponse, LlmError};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
pub(super) struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl ChatResponse {
    pub(super) fn into_completion(self) -> Result<CompletionResponse, LlmError> {
        let choice = self.choices.into_iter().next().ok_or(LlmError::NoChoices)?;
        Ok(CompletionResponse {
            content: choice.message.content,
            model: self.model,
            tokens_used: self.usage.total_tokens,
            finish_reason: choice.finish_reason.unwrap_or_default(),
        })
    }
}

pub(super) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST a chat request and return the status code and raw body
pub(super) async fn post_chat(
    http: &reqwest::Client,
    endpoint: &Url,
    api_key: Option<&str>,
    request: &CompletionRequest,
) -> Result<(reqwest::StatusCode, String), LlmError> {
    let mut builder = http
        .post(endpoint.clone())
        .header(CONTENT_TYPE, "application/json")
        .json(request);
    if let Some(key) = api_key {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

/// Client for the hosted OpenAI API
#[derive(Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(options: ClientOptions) -> Result<Self, LlmError> {
        let api_key = options
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        let endpoint = options
            .endpoint
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            http: http_client(options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?,
            endpoint: Url::parse(&endpoint)?,
            api_key,
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Client for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (status, body) = post_chat(&self.http, &self.endpoint, Some(&self.api_key), request).await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                if !envelope.error.message.is_empty() {
                    return Err(LlmError::Api(envelope.error.message));
                }
            }
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ChatResponse>(&body)?.into_completion()
    }
}
