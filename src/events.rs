//! Best-effort observability events
//!
//! Lifecycle, handoff, and error events for logging and tracing. Emission is
//! infallible and never on the correctness-critical path; losing an event
//! loses visibility, not state.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::state::Stage;
use crate::ExecutionErrorCategory;

/// One pipeline lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    SessionStarted {
        session_id: String,
    },
    StageStarted {
        session_id: String,
        stage: Stage,
    },
    StageCompleted {
        session_id: String,
        stage: Stage,
    },
    /// Control moved from one stage to the next
    Handoff {
        session_id: String,
        from: Stage,
        to: Stage,
    },
    /// Run paused before the executor, awaiting approval
    Paused {
        session_id: String,
    },
    Resumed {
        session_id: String,
    },
    WorkflowCreated {
        session_id: String,
        workflow_id: String,
        workflow_name: String,
        node_count: usize,
    },
    StageFailed {
        session_id: String,
        stage: Stage,
        category: Option<ExecutionErrorCategory>,
        message: String,
    },
    SessionClosed {
        session_id: String,
    },
}

/// Sink for pipeline events; implementations must not block or fail
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Sink that writes events to the tracing subscriber
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::StageFailed {
                session_id,
                stage,
                category,
                message,
            } => {
                error!(
                    session = %session_id,
                    stage = %stage,
                    category = ?category,
                    "stage failed: {}",
                    message
                );
            }
            other => {
                info!(event = ?other, "pipeline event");
            }
        }
    }
}

/// Sink that forwards events over an mpsc channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that discards everything
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}
