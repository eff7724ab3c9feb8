//! Flowwright: conversational workflow authoring with human-approved apply
//!
//! The control core of a workflow-authoring assistant. From a natural-language
//! conversation it converges on a structured automation-workflow definition,
//! validates it against the constraints of a target automation platform, and
//! applies it, pausing for explicit human approval before the one
//! state-changing action.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Session Registry               │
//! │  session id → live orchestrator         │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          Orchestrator loop              │
//! │  route → stage → apply delta → persist  │
//! │  enrichment → planner ⇄ validator       │
//! │            ── pause ── executor         │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  Model + platform capabilities (traits) │
//! │  plan data rides a compact text codec   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The pipeline pauses before the executor stage; `resume` is a separate
//! entry point that runs it after the operator approves the candidate plan.

pub mod channel;
pub mod checkpoint;
pub mod config;
pub mod events;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod platform;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;
pub mod validation;

// Re-exports for convenience
pub use channel::{OutboundMessage, SessionChannel};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::Config;
pub use events::{EventSink, PipelineEvent};
pub use model::ModelClient;
pub use pipeline::{Orchestrator, RunOutcome};
pub use plan::Plan;
pub use platform::PlatformClient;
pub use registry::NodeTypeRegistry;
pub use session::{SessionRegistry, SessionServices};
pub use state::{SessionState, Stage};

/// How an executor failure is classified for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorCategory {
    Timeout,
    Network,
    Authentication,
    Authorization,
    Server,
    Unknown,
}

impl std::fmt::Display for ExecutionErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionErrorCategory::Timeout => "timeout",
            ExecutionErrorCategory::Network => "network",
            ExecutionErrorCategory::Authentication => "authentication",
            ExecutionErrorCategory::Authorization => "authorization",
            ExecutionErrorCategory::Server => "server",
            ExecutionErrorCategory::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error(transparent)]
    Protocol(#[from] protocol::ParseFailure),

    #[error("Could not produce a valid plan: {0}")]
    PlanDecode(String),

    #[error("Workflow creation failed ({category}): {message}")]
    Execution {
        category: ExecutionErrorCategory,
        message: String,
    },

    #[error("No workflow to apply: nothing is paused awaiting approval")]
    NoPendingWorkflow,

    #[error("Workflow already created for this session")]
    WorkflowAlreadyCreated,

    #[error("Run is not paused before the executor (pending: {pending})")]
    NotPausedForExecutor { pending: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
