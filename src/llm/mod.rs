//! Chat-LLM abstraction for the agent loop.
//!
//! The orchestrator speaks an ordered-message, tool-calling contract and
//! stays vendor-agnostic; a concrete adapter translates it to the wire
//! protocol of whatever model is configured. Reasoning blocks emitted by
//! "thinking" models are carried as opaque payloads and re-sent verbatim
//! on assistant turns that contained tool calls, since some providers
//! reject the next request without them.

mod error;
mod openrouter;

pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Opaque reasoning block from a thinking model. Preserved and re-sent
/// unchanged; the agent never inspects the contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningContent {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "text")]
    pub content: Option<String>,

    /// Encrypted continuation token. Must survive the round trip.
    #[serde(skip_serializing_if = "Option::is_none", alias = "thoughtSignature")]
    pub thought_signature: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub reasoning_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Reasoning blocks to pass back unchanged on re-sent history.
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "reasoning_details",
        alias = "reasoning"
    )]
    pub reasoning: Option<Vec<ReasoningContent>>,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            reasoning: None,
        }
    }

    /// A tool-result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            reasoning: None,
        }
    }

    /// Attach reasoning blocks for preservation on the next request.
    pub fn with_reasoning(mut self, reasoning: Option<Vec<ReasoningContent>>) -> Self {
        if let Some(r) = reasoning {
            if !r.is_empty() {
                self.reasoning = Some(r);
            }
        }
        self
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
    #[serde(skip_serializing_if = "Option::is_none", alias = "thoughtSignature")]
    pub thought_signature: Option<String>,
}

/// Function call details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string; may be empty for no-argument tools.
    #[serde(default)]
    pub arguments: String,
    #[serde(skip_serializing_if = "Option::is_none", alias = "thoughtSignature")]
    pub thought_signature: Option<String>,
}

/// Tool definition published to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Function definition with schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Canonical response shape every adapter translates into.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<String>,
    pub reasoning: Option<Vec<ReasoningContent>>,
}

impl ChatResponse {
    /// Whether this turn requested tool dispatch.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map_or(false, |t| !t.is_empty())
    }
}

/// Optional per-request parameters.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

/// Trait for chat-completion clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError>;
}
