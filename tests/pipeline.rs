//! End-to-end pipeline tests over scripted model and platform fakes.
//!
//! The model fake replays a fixed sequence of responses, one per `send`
//! call, so each test pins down exactly which stages ran and in what order.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use flowwright::channel::{MpscChannel, OutboundMessage};
use flowwright::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
use flowwright::events::{ChannelSink, EventSink, NullSink, PipelineEvent};
use flowwright::model::{
    ChatMessage, ChatRequest, ModelChunk, ModelClient, ModelStream, ToolInvocation,
};
use flowwright::pipeline::{Orchestrator, RunOutcome, StageContext};
use flowwright::platform::{
    CreatedWorkflow, PlatformClient, PlatformCredential, WorkflowPayload, WorkflowSummary,
};
use flowwright::registry::{NodeTypeInfo, NodeTypeRegistry};
use flowwright::state::{SessionState, Stage};
use flowwright::{Config, Error, ExecutionErrorCategory};

/// Replays scripted responses in order, one per model call
struct ScriptedModel {
    responses: Mutex<VecDeque<Vec<ModelChunk>>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Vec<ModelChunk>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    fn text_response(text: &str) -> Vec<ModelChunk> {
        vec![ModelChunk::Token(text.to_string()), ModelChunk::Done]
    }

    fn report(has_all: bool, confidence: f64) -> Vec<ModelChunk> {
        vec![
            ModelChunk::Token("Got it, let me plan that.".to_string()),
            ModelChunk::ToolCall(ToolInvocation {
                id: "call-1".to_string(),
                name: "report_requirements".to_string(),
                arguments: json!({
                    "hasAllRequiredInfo": has_all,
                    "confidence": confidence,
                    "missingInfo": [],
                }),
            }),
            ModelChunk::Done,
        ]
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn send(&self, _request: ChatRequest) -> flowwright::Result<ModelStream> {
        let chunks = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| vec![ModelChunk::Done]);
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct FakePlatform {
    credentials: Vec<PlatformCredential>,
}

impl FakePlatform {
    fn new() -> Self {
        Self {
            credentials: Vec::new(),
        }
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn list_workflows(&self) -> flowwright::Result<Vec<WorkflowSummary>> {
        Ok(Vec::new())
    }

    async fn create_workflow(
        &self,
        _payload: &WorkflowPayload,
    ) -> flowwright::Result<CreatedWorkflow> {
        Ok(CreatedWorkflow {
            id: "wf-42".to_string(),
        })
    }

    async fn list_credentials(&self) -> flowwright::Result<Vec<PlatformCredential>> {
        Ok(self.credentials.clone())
    }

    fn workflow_url(&self, id: &str) -> String {
        format!("http://localhost:5678/workflow/{}", id)
    }

    fn credential_setup_url(&self, credential_type: &str) -> String {
        format!(
            "http://localhost:5678/credentials/new?type={}",
            credential_type
        )
    }
}

/// Platform whose workflow creation never completes in time
struct SlowPlatform;

#[async_trait]
impl PlatformClient for SlowPlatform {
    async fn list_workflows(&self) -> flowwright::Result<Vec<WorkflowSummary>> {
        Ok(Vec::new())
    }

    async fn create_workflow(
        &self,
        _payload: &WorkflowPayload,
    ) -> flowwright::Result<CreatedWorkflow> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(CreatedWorkflow {
            id: "wf-never".to_string(),
        })
    }

    async fn list_credentials(&self) -> flowwright::Result<Vec<PlatformCredential>> {
        Ok(Vec::new())
    }

    fn workflow_url(&self, id: &str) -> String {
        format!("http://localhost:5678/workflow/{}", id)
    }

    fn credential_setup_url(&self, credential_type: &str) -> String {
        format!(
            "http://localhost:5678/credentials/new?type={}",
            credential_type
        )
    }
}

fn test_registry() -> NodeTypeRegistry {
    NodeTypeRegistry::new(vec![
        NodeTypeInfo {
            name: "scheduleTrigger".to_string(),
            display_name: "Schedule Trigger".to_string(),
            required_params: Vec::new(),
        },
        NodeTypeInfo {
            name: "slack".to_string(),
            display_name: "Slack".to_string(),
            required_params: vec!["channel".to_string()],
        },
    ])
}

const GOOD_PLAN: &str = "\
title: Daily Report
summary: Posts a daily report to Slack
workflow:
  name: Daily Report
  nodes:
    - name: Schedule
      type: scheduleTrigger
      parameters:
        interval: daily
    - name: Slack
      type: slack
      parameters:
        channel: reports
  connections:
    Schedule:
      main:
        - node: Slack
          type: main
          index: 0
credentialsNeeded:
  - type: slackApi
    nodeName: Slack
";

const VALID_VERDICT: &str = "validation:\n  status: valid\n";

struct Harness {
    orchestrator: Orchestrator,
    store: Arc<InMemoryCheckpointStore>,
    rx: tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>,
}

fn harness(session_id: &str, responses: Vec<Vec<ModelChunk>>) -> Harness {
    let store = Arc::new(InMemoryCheckpointStore::new());
    harness_with_store(session_id, responses, store)
}

fn init_tracing() {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn harness_with_store(
    session_id: &str,
    responses: Vec<Vec<ModelChunk>>,
    store: Arc<InMemoryCheckpointStore>,
) -> Harness {
    build_harness(
        session_id,
        responses,
        store,
        Arc::new(FakePlatform::new()),
        Config::default(),
        Arc::new(NullSink),
    )
}

fn build_harness(
    session_id: &str,
    responses: Vec<Vec<ModelChunk>>,
    store: Arc<InMemoryCheckpointStore>,
    platform: Arc<dyn PlatformClient>,
    config: Config,
    events: Arc<dyn EventSink>,
) -> Harness {
    init_tracing();
    let (channel, rx) = MpscChannel::new();
    let ctx = StageContext {
        config,
        model: Arc::new(ScriptedModel::new(responses)),
        platform,
        node_types: Arc::new(test_registry()),
        channel: Arc::new(channel),
        events,
    };
    let orchestrator = Orchestrator::new(session_id, ctx, store.clone());
    Harness {
        orchestrator,
        store,
        rx,
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn test_enrichment_loops_while_requirements_incomplete() {
    let mut h = harness("s-loop", vec![ScriptedModel::report(false, 0.4)]);

    let outcome = h
        .orchestrator
        .start(vec![ChatMessage::user("make something")])
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingInput);

    let state = h.orchestrator.state().await;
    assert_eq!(state.current_stage, Some(Stage::Enrichment));
    assert!(state.plan.is_none());
    assert!(!state.requirements.unwrap().has_all_required_info);

    // The turn ended with a Done marker
    let messages = drain(&mut h.rx);
    assert!(matches!(messages.last(), Some(OutboundMessage::Done {})));
}

#[tokio::test]
async fn test_full_run_pauses_then_resume_creates_workflow() {
    let mut h = harness(
        "s-full",
        vec![
            ScriptedModel::report(true, 0.95),
            ScriptedModel::text_response(GOOD_PLAN),
            ScriptedModel::text_response(VALID_VERDICT),
        ],
    );

    let outcome = h
        .orchestrator
        .start(vec![ChatMessage::user(
            "post a daily report to our slack channel",
        )])
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingApproval);

    let paused = h.orchestrator.state().await;
    assert_eq!(paused.plan.as_ref().unwrap().workflow.nodes.len(), 2);
    assert!(paused.validation.as_ref().unwrap().valid);
    assert!(paused.workflow_id.is_none());

    // The pause is durable and names the executor
    let checkpoint = h.store.load("s-full").await.unwrap().unwrap();
    assert_eq!(checkpoint.pending_stage, Some(Stage::Executor));

    // The candidate plan went out for approval
    let messages = drain(&mut h.rx);
    assert!(messages
        .iter()
        .any(|m| matches!(m, OutboundMessage::Plan { .. })));

    let outcome = h.orchestrator.resume().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            workflow_id: "wf-42".to_string()
        }
    );

    let done = h.orchestrator.state().await;
    assert_eq!(done.workflow_id.as_deref(), Some("wf-42"));
    // The approved plan was applied unchanged
    assert_eq!(done.plan.as_ref().unwrap().workflow.nodes.len(), 2);
    assert_eq!(done.stage_history.last(), Some(&Stage::Executor));

    // The fake platform has no slackApi credential configured
    let guidance = done.credential_guidance.unwrap();
    assert_eq!(guidance.missing.len(), 1);
    assert_eq!(guidance.missing[0].credential_type, "slackApi");
    assert!(guidance.missing[0].setup_url.contains("type=slackApi"));

    let messages = drain(&mut h.rx);
    assert!(messages.iter().any(|m| matches!(
        m,
        OutboundMessage::WorkflowCreated { workflow_id, .. } if workflow_id == "wf-42"
    )));
}

#[tokio::test]
async fn test_structural_failure_feeds_back_into_planner() {
    let bad_plan = GOOD_PLAN.replace("type: slack\n", "type: slak\n");
    let h = harness(
        "s-retry",
        vec![
            ScriptedModel::report(true, 0.95),
            ScriptedModel::text_response(&bad_plan),
            ScriptedModel::text_response(GOOD_PLAN),
            ScriptedModel::text_response(VALID_VERDICT),
        ],
    );

    let outcome = h
        .orchestrator
        .start(vec![ChatMessage::user("daily slack report")])
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingApproval);

    let state = h.orchestrator.state().await;
    let planner_runs = state
        .stage_history
        .iter()
        .filter(|s| **s == Stage::Planner)
        .count();
    assert_eq!(planner_runs, 2);

    // The feedback message entered the conversation as a user turn
    assert!(state
        .messages
        .iter()
        .any(|m| m.content.contains("failed validation") && m.content.contains("slak")));
}

#[tokio::test]
async fn test_undecodable_verdict_counts_as_valid() {
    let h = harness(
        "s-permissive",
        vec![
            ScriptedModel::report(true, 0.95),
            ScriptedModel::text_response(GOOD_PLAN),
            ScriptedModel::text_response("Looks good to me!"),
        ],
    );

    let outcome = h
        .orchestrator
        .start(vec![ChatMessage::user("daily slack report")])
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingApproval);
    assert!(h.orchestrator.state().await.validation.unwrap().valid);
}

#[tokio::test]
async fn test_resume_without_checkpoint_is_rejected() {
    let h = harness("s-nothing", vec![]);
    let err = h.orchestrator.resume().await.unwrap_err();
    assert!(matches!(err, Error::NoPendingWorkflow));
}

#[tokio::test]
async fn test_resume_twice_is_rejected() {
    let h = harness(
        "s-twice",
        vec![
            ScriptedModel::report(true, 0.95),
            ScriptedModel::text_response(GOOD_PLAN),
            ScriptedModel::text_response(VALID_VERDICT),
        ],
    );

    h.orchestrator
        .start(vec![ChatMessage::user("daily slack report")])
        .await
        .unwrap();
    h.orchestrator.resume().await.unwrap();

    let err = h.orchestrator.resume().await.unwrap_err();
    assert!(matches!(err, Error::WorkflowAlreadyCreated));
}

#[tokio::test]
async fn test_resume_when_not_paused_for_executor_is_rejected() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    store
        .save(&Checkpoint::new("s-fresh", SessionState::default(), None))
        .await
        .unwrap();

    let h = harness_with_store("s-fresh", vec![], store);
    let err = h.orchestrator.resume().await.unwrap_err();
    assert!(matches!(err, Error::NotPausedForExecutor { .. }));
}

#[tokio::test]
async fn test_executor_timeout_keeps_pause_for_retry() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut config = Config::default();
    config.platform.timeout_secs = 0;
    let h = build_harness(
        "s-timeout",
        vec![
            ScriptedModel::report(true, 0.95),
            ScriptedModel::text_response(GOOD_PLAN),
            ScriptedModel::text_response(VALID_VERDICT),
        ],
        store,
        Arc::new(SlowPlatform),
        config,
        Arc::new(NullSink),
    );

    let outcome = h
        .orchestrator
        .start(vec![ChatMessage::user("daily slack report")])
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingApproval);

    let err = h.orchestrator.resume().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Execution {
            category: ExecutionErrorCategory::Timeout,
            ..
        }
    ));

    // The pause survives the failed attempt, so approval can be retried
    let checkpoint = h.store.load("s-timeout").await.unwrap().unwrap();
    assert_eq!(checkpoint.pending_stage, Some(Stage::Executor));
    assert!(checkpoint.state.workflow_id.is_none());
}

#[tokio::test]
async fn test_session_started_emitted_once_across_turns() {
    let (sink, mut events) = ChannelSink::new();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let h = build_harness(
        "s-events",
        vec![
            ScriptedModel::report(false, 0.3),
            ScriptedModel::report(false, 0.5),
        ],
        store,
        Arc::new(FakePlatform::new()),
        Config::default(),
        Arc::new(sink),
    );

    h.orchestrator
        .start(vec![ChatMessage::user("first turn")])
        .await
        .unwrap();
    h.orchestrator
        .start(vec![ChatMessage::user("second turn")])
        .await
        .unwrap();

    let mut started = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PipelineEvent::SessionStarted { .. }) {
            started += 1;
        }
    }
    assert_eq!(started, 1);
}

#[tokio::test]
async fn test_tokens_stream_during_enrichment() {
    let mut h = harness("s-stream", vec![ScriptedModel::report(false, 0.2)]);
    h.orchestrator
        .start(vec![ChatMessage::user("hello")])
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    let streamed: String = messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::Token { token } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Got it, let me plan that.");
}
