//! OpenAI-compatible chat completion client
//!
//! Default [`ModelClient`] implementation: bearer-auth JSON POST with SSE
//! streaming, tool-call fragments accumulated across deltas until the finish
//! marker arrives.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ChatRequest, ModelChunk, ModelClient, ModelStream, ToolInvocation};
use crate::config::ModelConfig;
use crate::{Error, Result};

pub struct OpenAiCompatModel {
    base_url: String,
    client: reqwest::Client,
}

/// Wire-side message shape
#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl OpenAiCompatModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| Error::Config("model API key not configured".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| Error::Config(format!("invalid API key format: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Model(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    /// Parse one SSE line into a stream chunk, skipping keep-alives
    fn parse_sse_line(line: &str) -> Option<StreamChunk> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data: ")?;
        if data == "[DONE]" {
            return None;
        }

        match serde_json::from_str(data) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                debug!("skipping unparseable SSE data: {} - {}", e, data);
                None
            }
        }
    }
}

/// Splits an SSE byte stream into lines across chunk boundaries
struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Append a chunk and return every complete line it closed
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// The trailing line left when the body ends without a newline
    fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Decodes SSE lines and forwards chunks to the consumer as they arrive,
/// accumulating tool-call fragments by index until the finish marker
struct SseDispatcher {
    tx: mpsc::UnboundedSender<ModelChunk>,
    pending_tools: HashMap<u32, (String, String, String)>,
    finished: bool,
}

impl SseDispatcher {
    fn new(tx: mpsc::UnboundedSender<ModelChunk>) -> Self {
        Self {
            tx,
            pending_tools: HashMap::new(),
            finished: false,
        }
    }

    /// Decode one SSE line; tokens go out immediately, tool calls once the
    /// finish reason names them
    fn line(&mut self, line: &str) {
        let Some(chunk) = OpenAiCompatModel::parse_sse_line(line) else {
            return;
        };
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                let _ = self.tx.send(ModelChunk::Token(content));
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for tc in tool_calls {
                    let entry = self.pending_tools.entry(tc.index).or_default();
                    if let Some(id) = tc.id {
                        entry.0 = id;
                    }
                    if let Some(func) = tc.function {
                        if let Some(name) = func.name {
                            entry.1 = name;
                        }
                        if let Some(args) = func.arguments {
                            entry.2.push_str(&args);
                        }
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                if reason == "tool_calls" {
                    let mut calls: Vec<_> = self.pending_tools.drain().collect();
                    calls.sort_by_key(|(index, _)| *index);
                    for (_, (id, name, args)) in calls {
                        let arguments: serde_json::Value =
                            serde_json::from_str(&args).unwrap_or(serde_json::Value::Null);
                        let _ = self.tx.send(ModelChunk::ToolCall(ToolInvocation {
                            id,
                            name,
                            arguments,
                        }));
                    }
                }
                let _ = self.tx.send(ModelChunk::Done);
                self.finished = true;
            }
        }
    }

    fn error(&mut self, message: String) {
        let _ = self.tx.send(ModelChunk::Error(message));
        self.finished = true;
    }

    /// The body ended; guarantee the consumer sees a terminal marker
    fn finish(self) {
        if !self.finished {
            let _ = self.tx.send(ModelChunk::Done);
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatModel {
    async fn send(&self, request: ChatRequest) -> Result<ModelStream> {
        let wire = CompletionRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(
                    request
                        .tools
                        .iter()
                        .map(|t| WireTool {
                            tool_type: "function".to_string(),
                            function: WireFunction {
                                name: t.name.clone(),
                                description: t.description.clone(),
                                parameters: t.parameters.clone(),
                            },
                        })
                        .collect(),
                )
            },
            stream: true,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&wire)
            .send()
            .await
            .map_err(|e| Error::Model(format!("API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("API error {}: {}", status, body)));
        }

        // Decode the SSE body on a reader task so tokens reach the consumer
        // as they arrive, not after the completion finishes
        let (tx, rx) = mpsc::unbounded_channel();
        let mut body = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            let mut dispatcher = SseDispatcher::new(tx);

            while let Some(item) = body.next().await {
                match item {
                    Ok(bytes) => {
                        for line in lines.push(&String::from_utf8_lossy(&bytes)) {
                            dispatcher.line(&line);
                        }
                    }
                    Err(e) => {
                        dispatcher.error(format!("stream error: {}", e));
                        return;
                    }
                }
            }
            // A final data line may arrive without a trailing newline
            if let Some(rest) = lines.flush() {
                dispatcher.line(&rest);
            }
            dispatcher.finish();
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })))
    }
}
