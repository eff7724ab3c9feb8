//! Session channel: outbound messages to the UI/transport boundary
//!
//! The core only emits; message framing and delivery are the transport's
//! problem. Inbound `chat` and `apply_plan` map to the orchestrator's
//! `start` and `resume` entry points.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::plan::Plan;

/// A tagged message for the UI side of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Incremental model text
    Token { token: String },
    /// Candidate plan ready for approval
    Plan { plan: Plan },
    /// The workflow was created on the platform
    WorkflowCreated {
        workflow_id: String,
        workflow_url: String,
    },
    /// Which agent is doing what right now
    AgentActivity {
        agent: String,
        activity: String,
        status: String,
    },
    /// User-facing error text
    Error { error: String },
    /// Turn finished
    Done {},
}

/// Outbound side of a session's duplex channel.
///
/// Sending is best-effort and infallible from the core's view; a closed
/// transport just drops messages.
pub trait SessionChannel: Send + Sync {
    fn send(&self, message: OutboundMessage);
}

/// Channel backed by a tokio mpsc sender, for transports and tests
pub struct MpscChannel {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl MpscChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionChannel for MpscChannel {
    fn send(&self, message: OutboundMessage) {
        // Receiver gone means the client disconnected; nothing to do
        let _ = self.tx.send(message);
    }
}

/// Channel that discards everything
pub struct NullChannel;

impl SessionChannel for NullChannel {
    fn send(&self, _message: OutboundMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpsc_channel_delivers() {
        let (channel, mut rx) = MpscChannel::new();
        channel.send(OutboundMessage::Token {
            token: "hi".to_string(),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundMessage::Token { .. }
        ));
    }

    #[test]
    fn test_mpsc_channel_survives_dropped_receiver() {
        let (channel, rx) = MpscChannel::new();
        drop(rx);
        channel.send(OutboundMessage::Done {});
    }

    #[test]
    fn test_wire_tagging() {
        let msg = OutboundMessage::WorkflowCreated {
            workflow_id: "42".to_string(),
            workflow_url: "http://localhost:5678/workflow/42".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "workflow_created");
        assert_eq!(json["workflow_id"], "42");
    }
}
