//! Executor stage: apply the approved plan to the platform
//!
//! Preconditions are hard: running without a plan is a programming error,
//! not a user-facing retry. The credential presence check is non-blocking:
//! missing credentials produce guidance with setup links, never failure.
//! The creation call runs under an explicit timeout; failures are
//! classified, surfaced once, and never retried automatically.

use std::collections::HashSet;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::channel::OutboundMessage;
use crate::pipeline::StageContext;
use crate::platform::WorkflowPayload;
use crate::state::{
    CredentialGuidance, MissingCredential, SessionState, StageDelta, StageOutcome,
};
use crate::{Error, ExecutionErrorCategory, Result};

pub async fn run(state: &SessionState, ctx: &StageContext) -> Result<StageOutcome> {
    let plan = state
        .plan
        .as_ref()
        .ok_or_else(|| Error::Internal("executor stage ran without a plan".to_string()))?;

    let payload = WorkflowPayload::from_plan(plan);
    let credential_guidance = check_credentials(state, ctx).await;

    let bound = ctx.config.platform.timeout();
    info!(
        workflow = %payload.name,
        nodes = payload.nodes.len(),
        timeout = %humantime::format_duration(bound),
        "creating workflow"
    );

    let created = match timeout(bound, ctx.platform.create_workflow(&payload)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Execution {
                category: ExecutionErrorCategory::Timeout,
                message: format!(
                    "workflow creation did not finish within {}",
                    humantime::format_duration(bound)
                ),
            })
        }
    };

    let workflow_url = ctx.platform.workflow_url(&created.id);
    info!(workflow_id = %created.id, "workflow created");

    ctx.channel.send(OutboundMessage::WorkflowCreated {
        workflow_id: created.id.clone(),
        workflow_url,
    });

    Ok(StageOutcome {
        delta: StageDelta {
            workflow_id: Some(created.id),
            credential_guidance,
            ..Default::default()
        },
        next_hint: None,
    })
}

/// Compare the plan's needed credentials against what the platform has.
/// Any failure here is logged and skipped; creation proceeds regardless.
async fn check_credentials(state: &SessionState, ctx: &StageContext) -> Option<CredentialGuidance> {
    let plan = state.plan.as_ref()?;
    if plan.credentials_needed.is_empty() {
        return None;
    }

    let available = match ctx.platform.list_credentials().await {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("credential check skipped: {}", e);
            return None;
        }
    };

    let available_types: HashSet<&str> = available.iter().map(|c| c.kind.as_str()).collect();

    let missing: Vec<MissingCredential> = plan
        .credentials_needed
        .iter()
        .filter(|needed| !available_types.contains(needed.credential_type.as_str()))
        .map(|needed| MissingCredential {
            credential_type: needed.credential_type.clone(),
            node_name: needed.node_name.clone(),
            setup_url: ctx
                .platform
                .credential_setup_url(&needed.credential_type),
        })
        .collect();

    if missing.is_empty() {
        return None;
    }

    warn!(count = missing.len(), "workflow needs credentials the platform does not have");
    let types: Vec<&str> = missing.iter().map(|m| m.credential_type.as_str()).collect();
    Some(CredentialGuidance {
        message: format!(
            "The workflow was created, but these credentials still need to be set up: {}",
            types.join(", ")
        ),
        missing,
    })
}
