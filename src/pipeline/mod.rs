//! Orchestrator: the per-session pipeline loop
//!
//! Drives exactly one linear-with-loops pipeline per conversation:
//! route → run stage → apply delta → persist checkpoint → repeat, until a
//! terminal stage or the interrupt. The pipeline has one stage flagged
//! interrupt-before (the executor), so the run pauses, the
//! candidate plan goes out for approval, and `resume` picks the run up from
//! the persisted checkpoint.
//!
//! `start` and `resume` are distinct entry points with their own
//! precondition contracts; resume takes no conversation input.

pub mod router;
pub mod stages;

pub use router::{route, RouteDecision};

use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::{OutboundMessage, SessionChannel};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::Config;
use crate::events::{EventSink, PipelineEvent};
use crate::model::{ChatMessage, ModelClient};
use crate::platform::PlatformClient;
use crate::registry::NodeTypeRegistry;
use crate::state::{SessionState, Stage, StageOutcome};
use crate::{Error, ExecutionErrorCategory, Result};

/// Everything a stage can reach: capabilities, the registry, and the
/// session's outbound handles
pub struct StageContext {
    pub config: Config,
    pub model: Arc<dyn ModelClient>,
    pub platform: Arc<dyn PlatformClient>,
    pub node_types: Arc<NodeTypeRegistry>,
    pub channel: Arc<dyn SessionChannel>,
    pub events: Arc<dyn EventSink>,
}

/// How a `start` or `resume` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Enrichment needs another user turn
    AwaitingInput,
    /// Paused before the executor; a candidate plan went out for approval
    AwaitingApproval,
    /// The executor ran and the workflow exists
    Completed { workflow_id: String },
}

/// One session's orchestrator. Stages execute strictly sequentially within
/// a session; instances for different sessions are fully independent.
pub struct Orchestrator {
    session_id: String,
    ctx: StageContext,
    store: Arc<dyn CheckpointStore>,
    state: tokio::sync::Mutex<SessionState>,
}

impl Orchestrator {
    pub fn new(session_id: impl Into<String>, ctx: StageContext, store: Arc<dyn CheckpointStore>) -> Self {
        Self::with_state(session_id, ctx, store, SessionState::default())
    }

    /// Construct with a pre-loaded state, e.g. from a prior checkpoint
    pub fn with_state(
        session_id: impl Into<String>,
        ctx: StageContext,
        store: Arc<dyn CheckpointStore>,
        state: SessionState,
    ) -> Self {
        let session_id = session_id.into();
        // Once per live session, not once per turn
        ctx.events.emit(PipelineEvent::SessionStarted {
            session_id: session_id.clone(),
        });
        Self {
            session_id,
            ctx,
            store,
            state: tokio::sync::Mutex::new(state),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Snapshot of the current state, for inspection
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Run a conversation turn: append the incoming messages and drive the
    /// pipeline until it needs input, pauses for approval, or terminates.
    pub async fn start(&self, new_messages: Vec<ChatMessage>) -> Result<RunOutcome> {
        let mut state = self.state.lock().await;
        state.messages.extend(new_messages);

        loop {
            let stage = state.current_stage.unwrap_or(Stage::Enrichment);
            if stage == Stage::Executor {
                // The interrupt keeps start() away from the executor; only
                // resume() may run it
                return Err(Error::Internal(
                    "start() reached the executor stage".to_string(),
                ));
            }

            let outcome = self.run_stage(&state, stage).await?;
            state.current_stage = Some(stage);
            state.apply(outcome.delta);
            state.stage_history.push(stage);

            let decision = route(&state);
            if let Some(hint) = outcome.next_hint {
                if decision != RouteDecision::Goto(hint) {
                    debug!(stage = %stage, "stage hint disagrees with routing table; table wins");
                }
            }

            match decision {
                RouteDecision::Terminate => {
                    self.persist(&state, None).await?;
                    self.ctx.channel.send(OutboundMessage::Done {});
                    let workflow_id = state.workflow_id.clone().unwrap_or_default();
                    return Ok(RunOutcome::Completed { workflow_id });
                }
                RouteDecision::Goto(Stage::Executor) => {
                    // Interrupt-before: persist the pause, ship the plan for
                    // approval, and stop without invoking the executor
                    self.persist(&state, Some(Stage::Executor)).await?;
                    if let Some(plan) = &state.plan {
                        self.ctx
                            .channel
                            .send(OutboundMessage::Plan { plan: plan.clone() });
                    }
                    self.ctx.events.emit(PipelineEvent::Paused {
                        session_id: self.session_id.clone(),
                    });
                    info!(session = %self.session_id, "paused before executor, awaiting approval");
                    return Ok(RunOutcome::AwaitingApproval);
                }
                RouteDecision::Goto(Stage::Enrichment) => {
                    // Enrichment self-loop: this turn is done, the next user
                    // message re-enters enrichment
                    state.current_stage = Some(Stage::Enrichment);
                    self.persist(&state, None).await?;
                    self.ctx.channel.send(OutboundMessage::Done {});
                    return Ok(RunOutcome::AwaitingInput);
                }
                RouteDecision::Goto(next) => {
                    self.ctx.events.emit(PipelineEvent::Handoff {
                        session_id: self.session_id.clone(),
                        from: stage,
                        to: next,
                    });
                    state.current_stage = Some(next);
                    self.persist(&state, None).await?;
                }
            }
        }
    }

    /// Resume a run paused before the executor. Takes no conversation
    /// input; the checkpoint is the sole source of state.
    pub async fn resume(&self) -> Result<RunOutcome> {
        let mut state = self.state.lock().await;

        let checkpoint = self
            .store
            .load(&self.session_id)
            .await?
            .ok_or(Error::NoPendingWorkflow)?;

        if checkpoint.state.workflow_id.is_some() {
            return Err(Error::WorkflowAlreadyCreated);
        }
        match checkpoint.pending_stage {
            Some(Stage::Executor) => {}
            other => {
                return Err(Error::NotPausedForExecutor {
                    pending: other
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                })
            }
        }

        *state = checkpoint.state;
        self.ctx.events.emit(PipelineEvent::Resumed {
            session_id: self.session_id.clone(),
        });

        let outcome = self.run_stage(&state, Stage::Executor).await?;
        state.current_stage = Some(Stage::Executor);
        state.apply(outcome.delta);
        state.stage_history.push(Stage::Executor);

        // Executor is terminal; persist the final state with the pause
        // cleared so a second resume is rejected as already-created
        self.persist(&state, None).await?;

        let workflow_id = state.workflow_id.clone().unwrap_or_default();
        if let Some(plan) = &state.plan {
            self.ctx.events.emit(PipelineEvent::WorkflowCreated {
                session_id: self.session_id.clone(),
                workflow_id: workflow_id.clone(),
                workflow_name: plan.workflow.name.clone(),
                node_count: plan.workflow.nodes.len(),
            });
        }
        self.ctx.channel.send(OutboundMessage::Done {});

        Ok(RunOutcome::Completed { workflow_id })
    }

    /// Run one stage with activity reporting and failure classification
    async fn run_stage(&self, state: &SessionState, stage: Stage) -> Result<StageOutcome> {
        self.ctx.events.emit(PipelineEvent::StageStarted {
            session_id: self.session_id.clone(),
            stage,
        });
        self.ctx.channel.send(OutboundMessage::AgentActivity {
            agent: stage.to_string(),
            activity: activity_label(stage).to_string(),
            status: "running".to_string(),
        });

        let result = match stage {
            Stage::Enrichment => stages::enrichment::run(state, &self.ctx).await,
            Stage::Planner => stages::planner::run(state, &self.ctx).await,
            Stage::Validator => stages::validator::run(state, &self.ctx).await,
            Stage::Executor => stages::executor::run(state, &self.ctx).await,
        };

        match result {
            Ok(outcome) => {
                self.ctx.events.emit(PipelineEvent::StageCompleted {
                    session_id: self.session_id.clone(),
                    stage,
                });
                self.ctx.channel.send(OutboundMessage::AgentActivity {
                    agent: stage.to_string(),
                    activity: activity_label(stage).to_string(),
                    status: "completed".to_string(),
                });
                Ok(outcome)
            }
            Err(e) => {
                let category = match &e {
                    Error::Execution { category, .. } => Some(*category),
                    _ => None::<ExecutionErrorCategory>,
                };
                self.ctx.events.emit(PipelineEvent::StageFailed {
                    session_id: self.session_id.clone(),
                    stage,
                    category,
                    message: e.to_string(),
                });
                self.ctx.channel.send(OutboundMessage::Error {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Write a checkpoint; a pause records which stage is pending
    async fn persist(&self, state: &SessionState, pending: Option<Stage>) -> Result<()> {
        let checkpoint = Checkpoint::new(&self.session_id, state.clone(), pending);
        self.store.save(&checkpoint).await
    }
}

fn activity_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Enrichment => "gathering requirements",
        Stage::Planner => "drafting the workflow plan",
        Stage::Validator => "validating the plan",
        Stage::Executor => "creating the workflow",
    }
}
