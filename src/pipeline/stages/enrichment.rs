//! Enrichment stage: conversational requirements gathering
//!
//! One model call per user turn, with a bound `report_requirements` tool the
//! model invokes to set readiness directly; readiness is never inferred
//! from free text. Tokens stream to the session channel as they arrive.
//! This stage never touches the platform API.

use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

use crate::channel::OutboundMessage;
use crate::model::{ChatMessage, ChatRequest, ModelChunk, ToolSpec};
use crate::pipeline::StageContext;
use crate::state::{RequirementsStatus, SessionState, StageDelta, StageOutcome};
use crate::{Error, Result};

const REPORT_TOOL: &str = "report_requirements";

const SYSTEM_PROMPT: &str = "You help users design automation workflows. \
Ask focused questions until you know what the workflow should do: its \
trigger, the services involved, and the data that flows between them. \
After every reply, call the report_requirements tool with your current \
assessment. Set hasAllRequiredInfo to true only when a concrete workflow \
could be built from the conversation as it stands.";

pub async fn run(state: &SessionState, ctx: &StageContext) -> Result<StageOutcome> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    messages.extend(state.messages.iter().cloned());

    let request = ChatRequest {
        model: ctx.config.model.model.clone(),
        messages,
        tools: vec![report_tool_spec()],
        temperature: ctx.config.model.temperature,
    };

    let mut stream = ctx.model.send(request).await?;

    let mut text = String::new();
    let mut requirements = None;

    while let Some(chunk) = stream.next().await {
        match chunk {
            ModelChunk::Token(token) => {
                ctx.channel.send(OutboundMessage::Token {
                    token: token.clone(),
                });
                text.push_str(&token);
            }
            ModelChunk::ToolCall(call) if call.name == REPORT_TOOL => {
                match decode_report(&call.arguments) {
                    Some(status) => {
                        debug!(
                            confidence = status.confidence,
                            ready = status.has_all_required_info,
                            "requirements reported"
                        );
                        requirements = Some(status);
                    }
                    None => warn!("unusable {} arguments: {}", REPORT_TOOL, call.arguments),
                }
            }
            ModelChunk::ToolCall(call) => {
                debug!("ignoring unexpected tool call: {}", call.name);
            }
            ModelChunk::Done => break,
            ModelChunk::Error(e) => return Err(Error::Model(e)),
        }
    }

    let mut delta = StageDelta {
        requirements,
        ..Default::default()
    };
    if !text.is_empty() {
        delta.messages.push(ChatMessage::assistant(text));
    }

    Ok(StageOutcome {
        delta,
        next_hint: None,
    })
}

fn report_tool_spec() -> ToolSpec {
    ToolSpec {
        name: REPORT_TOOL.to_string(),
        description: "Report whether enough is known to plan the workflow".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "hasAllRequiredInfo": {
                    "type": "boolean",
                    "description": "Whether a concrete workflow could be built now"
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Confidence in that assessment"
                },
                "missingInfo": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "What is still unknown"
                }
            },
            "required": ["hasAllRequiredInfo", "confidence"]
        }),
    }
}

fn decode_report(arguments: &serde_json::Value) -> Option<RequirementsStatus> {
    let has_all = arguments.get("hasAllRequiredInfo")?.as_bool()?;
    let confidence = arguments.get("confidence")?.as_f64()?.clamp(0.0, 1.0);
    let missing_info = arguments
        .get("missingInfo")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(RequirementsStatus {
        has_all_required_info: has_all,
        confidence,
        missing_info,
    })
}
