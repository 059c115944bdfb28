//! Client for LocalAI, Ollama and other OpenAI-compatible local servers

use async_trait::async_trait;
use url::Url;

use super::openai::{http_client, post_chat, ChatResponse};
use super::{Client, ClientOptions, CompletionRequest, CompletionResponse, LlmError};

/// Local models may be slower
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug)]
pub struct LocalAiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl LocalAiClient {
    pub fn new(options: ClientOptions) -> Result<Self, LlmError> {
        let endpoint = options
            .endpoint
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or(LlmError::MissingEndpoint)?;

        Ok(Self {
            http: http_client(options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?,
            endpoint: Url::parse(&endpoint)?,
            api_key: options.api_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl Client for LocalAiClient {
    fn provider(&self) -> &str {
        "localai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (status, body) =
            post_chat(&self.http, &self.endpoint, self.api_key.as_deref(), request).await?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ChatResponse>(&body)?.into_completion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama3".to_string(),
            messages: vec![Message::user("why is my deployment stuck?")],
            max_tokens: Some(500),
            temperature: Some(0.7),
        }
    }

    #[test]
    fn test_endpoint_required() {
        assert!(matches!(
            LocalAiClient::new(ClientOptions::default()),
            Err(LlmError::MissingEndpoint)
        ));
        assert!(matches!(
            LocalAiClient::new(ClientOptions {
                endpoint: Some("not a url".to_string()),
                ..ClientOptions::default()
            }),
            Err(LlmError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_complete_without_api_key() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(
                r#"{"model": "llama3", "usage": {"total_tokens": 7},
                    "choices": [{"message": {"content": "Run kubectl rollout status."}, "finish_reason": null}]}"#,
            )
            .create();

        let client = LocalAiClient::new(ClientOptions {
            endpoint: Some(format!("{}/v1/chat/completions", server.url())),
            ..ClientOptions::default()
        })
        .unwrap();
        let response = tokio_test::block_on(client.complete(&request())).unwrap();

        mock.assert();
        assert_eq!(response.content, "Run kubectl rollout status.");
        assert_eq!(response.tokens_used, 7);
        assert_eq!(response.finish_reason, "");
    }

    #[test]
    fn test_error_status_reports_body() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("model not loaded")
            .create();

        let client = LocalAiClient::new(ClientOptions {
            endpoint: Some(format!("{}/v1/chat/completions", server.url())),
            ..ClientOptions::default()
        })
        .unwrap();
        let err = tokio_test::block_on(client.complete(&request())).unwrap_err();

        assert_eq!(
            err.to_string(),
            "API request failed with status 500: model not loaded"
        );
    }
}
