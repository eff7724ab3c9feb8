//! Session state: the single mutable record threaded through every stage
//!
//! Stages never mutate state directly. Each returns a [`StageDelta`] the
//! orchestrator applies: message appends plus optional field overrides.
//! History is append-only; the validator's synthetic feedback message is an
//! append, never an edit. `stage_history` records execution order for
//! retry counting and checkpoint replay.

use serde::{Deserialize, Serialize};

use crate::model::ChatMessage;
use crate::plan::Plan;

/// One role in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Enrichment,
    Planner,
    Validator,
    Executor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Enrichment => write!(f, "enrichment"),
            Stage::Planner => write!(f, "planner"),
            Stage::Validator => write!(f, "validator"),
            Stage::Executor => write!(f, "executor"),
        }
    }
}

/// What the enrichment stage learned about requirement readiness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementsStatus {
    pub has_all_required_info: bool,
    /// In `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub missing_info: Vec<String>,
}

/// The validator's verdict on the current plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatus {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Guidance when required credentials are missing on the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialGuidance {
    pub message: String,
    pub missing: Vec<MissingCredential>,
}

/// One credential the workflow needs but the platform does not have
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingCredential {
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub setup_url: String,
}

/// The per-session orchestrator state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Ordered conversation log, append-only
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Current stage tag; `None` means the run is fresh and starts at
    /// enrichment
    #[serde(default)]
    pub current_stage: Option<Stage>,

    /// Stage tags actually executed, in order, append-only
    #[serde(default)]
    pub stage_history: Vec<Stage>,

    #[serde(default)]
    pub requirements: Option<RequirementsStatus>,

    /// Set once the planner succeeds
    #[serde(default)]
    pub plan: Option<Plan>,

    #[serde(default)]
    pub validation: Option<ValidationStatus>,

    /// Set if and only if the executor completed successfully
    #[serde(default)]
    pub workflow_id: Option<String>,

    #[serde(default)]
    pub credential_guidance: Option<CredentialGuidance>,
}

impl SessionState {
    /// Apply a stage's delta: append messages, override optionals
    pub fn apply(&mut self, delta: StageDelta) {
        self.messages.extend(delta.messages);
        if let Some(requirements) = delta.requirements {
            self.requirements = Some(requirements);
        }
        if let Some(plan) = delta.plan {
            self.plan = Some(plan);
        }
        if let Some(validation) = delta.validation {
            self.validation = Some(validation);
        }
        if let Some(workflow_id) = delta.workflow_id {
            self.workflow_id = Some(workflow_id);
        }
        if let Some(guidance) = delta.credential_guidance {
            self.credential_guidance = Some(guidance);
        }
    }

    /// Count adjacent `(validator, planner)` pairs in the history, i.e. the
    /// number of validation-failure retries so far
    pub fn validator_retry_count(&self) -> usize {
        self.stage_history
            .windows(2)
            .filter(|w| w[0] == Stage::Validator && w[1] == Stage::Planner)
            .count()
    }
}

/// The state fragment a stage returns; applying it never rewrites history
#[derive(Debug, Clone, Default)]
pub struct StageDelta {
    pub messages: Vec<ChatMessage>,
    pub requirements: Option<RequirementsStatus>,
    pub plan: Option<Plan>,
    pub validation: Option<ValidationStatus>,
    pub workflow_id: Option<String>,
    pub credential_guidance: Option<CredentialGuidance>,
}

/// What a stage hands back: a state delta and a routing hint, kept as two
/// separate, independently testable values
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    pub delta: StageDelta,
    /// A stage may suggest the next stage; the routing table is the arbiter
    pub next_hint: Option<Stage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_appends_messages_and_overrides() {
        let mut state = SessionState::default();
        state.messages.push(ChatMessage::user("hi"));

        state.apply(StageDelta {
            messages: vec![ChatMessage::assistant("hello")],
            requirements: Some(RequirementsStatus {
                has_all_required_info: false,
                confidence: 0.4,
                missing_info: vec!["schedule".to_string()],
            }),
            ..Default::default()
        });

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.requirements.as_ref().unwrap().confidence, 0.4);

        // A later delta without requirements leaves them in place
        state.apply(StageDelta::default());
        assert!(state.requirements.is_some());
    }

    #[test]
    fn test_validator_retry_count() {
        let mut state = SessionState::default();
        state.stage_history = vec![
            Stage::Enrichment,
            Stage::Planner,
            Stage::Validator,
            Stage::Planner,
            Stage::Validator,
            Stage::Planner,
        ];
        assert_eq!(state.validator_retry_count(), 2);
    }

    #[test]
    fn test_stage_serde_tags() {
        let json = serde_json::to_value(Stage::Enrichment).unwrap();
        assert_eq!(json, "enrichment");
    }
}
