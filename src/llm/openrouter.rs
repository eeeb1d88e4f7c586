//! OpenRouter chat-completion adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    ChatMessage, ChatOptions, ChatResponse, LlmClient, LlmError, ReasoningContent, ToolCall,
    ToolDefinition,
};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// OpenRouter API client.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self { client, api_key }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = OpenRouterRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.map(|t| t.to_vec()),
            tool_choice: tools.map(|_| "auto".to_string()),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(model, message_count = messages.len(), "chat completion request");

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "chat completion error: {}", body);
            return Err(LlmError::http(status.as_u16(), body));
        }

        let parsed: OpenRouterResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("failed to parse chat response: {}", e);
            LlmError::parse(format!("{}: {}", e, body.chars().take(500).collect::<String>()))
        })?;

        let OpenRouterChoice {
            message,
            finish_reason,
        } = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("no choices in response".to_string()))?;

        Ok(ChatResponse {
            content: message.content,
            tool_calls: message.tool_calls,
            finish_reason,
            reasoning: message.reasoning_details,
        })
    }
}

/// OpenRouter request format (OpenAI-compatible).
#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, alias = "reasoning")]
    reasoning_details: Option<Vec<ReasoningContent>>,
}
