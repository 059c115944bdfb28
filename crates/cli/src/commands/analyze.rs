//! Free-form question answering through the configured text-generation service

use anyhow::{Context, Result};
use colored::Colorize;
use med_lib::Anonymizer;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::llm::{self, Client, CompletionRequest, CompletionResponse, Message, OPENAI_API_KEY_ENV};
use crate::output::{print_structured, OutputFormat};

const SYSTEM_PROMPT: &str = "You are K8sMed, an AI-powered Kubernetes troubleshooting assistant.
Help diagnose issues in Kubernetes clusters based on the query provided.
Provide clear explanations and suggest remediation steps or commands when possible.";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct AnalyzeOutput<'a> {
    query: &'a str,
    anonymized: bool,
    #[serde(flatten)]
    response: &'a CompletionResponse,
}

/// Anonymize the query when asked to, either by flag or by configuration
pub fn prepare_query(query: &str, anonymize: bool) -> String {
    if anonymize {
        Anonymizer::new().anonymize(query)
    } else {
        query.to_string()
    }
}

pub fn build_request(model: &str, query: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![Message::system(SYSTEM_PROMPT), Message::user(query)],
        max_tokens: Some(MAX_TOKENS),
        temperature: Some(TEMPERATURE),
    }
}

pub async fn analyze(
    query: &str,
    explain: bool,
    anonymize: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let anonymize = anonymize || config.anonymize_default;
    let client = llm::client_from_config(config, std::env::var(OPENAI_API_KEY_ENV).ok())
        .context("Failed to create AI client")?;
    let query = prepare_query(query, anonymize);

    if format == OutputFormat::Text {
        println!("{} {}", "Analyzing query:".bold(), query);
    }

    let response = complete(client.as_ref(), &build_request(&config.ai_model, &query)).await?;

    match format {
        OutputFormat::Text => {
            println!("\n{}", response.content);
            if explain {
                println!("\nModel: {}", response.model);
                println!("Tokens used: {}", response.tokens_used);
            }
            Ok(())
        }
        _ => print_structured(
            &AnalyzeOutput {
                query: &query,
                anonymized: anonymize,
                response: &response,
            },
            format,
        ),
    }
}

async fn complete(client: &dyn Client, request: &CompletionRequest) -> Result<CompletionResponse> {
    debug!(
        event = "completion_requested",
        provider = client.provider(),
        model = %request.model,
        "Sending completion request"
    );
    let response = client
        .complete(request)
        .await
        .context("Failed to get AI response")?;
    debug!(
        event = "completion_received",
        provider = client.provider(),
        tokens = response.tokens_used,
        "Completion received"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, Role};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Client for Echo {
        fn provider(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: request.messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                model: request.model.clone(),
                tokens_used: 3,
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[test]
    fn test_request_shape() {
        let request = build_request("gpt-3.5-turbo", "pod crashing");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.starts_with("You are K8sMed"));
        assert_eq!(request.messages[1].content, "pod crashing");
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_prepare_query() {
        let query = "pods in namespace payments cannot reach 10.0.0.4";
        assert_eq!(prepare_query(query, false), query);
        assert_eq!(
            prepare_query(query, true),
            "pods in namespace [NAMESPACE_NAME] cannot reach [IP_ADDRESS]"
        );
    }

    #[tokio::test]
    async fn test_complete_through_trait_object() {
        let response = complete(&Echo, &build_request("m", "hello")).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.model, "m");
    }
}
