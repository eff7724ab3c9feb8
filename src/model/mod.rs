//! Model capability
//!
//! Chat-style completion interface the stages call. Implementations stream
//! incremental tokens and surface tool invocations embedded in assistant
//! turns, so the enrichment stage can read status-reporting calls directly
//! from the response instead of parsing free text.

mod openai;

pub use openai::OpenAiCompatModel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::{Error, Result};

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A named tool the model may invoke, with a JSON-schema argument shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation surfaced from an assistant turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A chunk of a streamed model response
#[derive(Debug, Clone)]
pub enum ModelChunk {
    /// Incremental text
    Token(String),
    /// Tool call embedded in the assistant turn
    ToolCall(ToolInvocation),
    /// Stream finished
    Done,
    /// Error occurred mid-stream
    Error(String),
}

/// Streamed response from a model
pub type ModelStream = Pin<Box<dyn futures::Stream<Item = ModelChunk> + Send>>;

/// One completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// Fully drained model response
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Core model capability trait
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a completion request and get a streaming response
    async fn send(&self, request: ChatRequest) -> Result<ModelStream>;
}

/// Drain a stream into a complete response. A mid-stream error chunk fails
/// the whole turn.
pub async fn collect(mut stream: ModelStream) -> Result<ModelResponse> {
    use futures::StreamExt;

    let mut response = ModelResponse::default();
    while let Some(chunk) = stream.next().await {
        match chunk {
            ModelChunk::Token(text) => response.text.push_str(&text),
            ModelChunk::ToolCall(call) => response.tool_calls.push(call),
            ModelChunk::Done => break,
            ModelChunk::Error(e) => return Err(Error::Model(e)),
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_collect_gathers_tokens_and_tools() {
        let chunks = vec![
            ModelChunk::Token("Hello ".to_string()),
            ModelChunk::Token("world".to_string()),
            ModelChunk::ToolCall(ToolInvocation {
                id: "1".to_string(),
                name: "report_requirements".to_string(),
                arguments: serde_json::json!({"confidence": 0.9}),
            }),
            ModelChunk::Done,
        ];
        let response = collect(Box::pin(stream::iter(chunks))).await.unwrap();
        assert_eq!(response.text, "Hello world");
        assert_eq!(response.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_propagates_stream_errors() {
        let chunks = vec![ModelChunk::Error("boom".to_string())];
        let err = collect(Box::pin(stream::iter(chunks))).await.unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
