//! Validator stage: two-phase plan checking
//!
//! Phase 1 runs the structural checks locally; anything critical short-
//! circuits into an invalid verdict with a synthetic feedback message the
//! next planner attempt can act on. Phase 2 asks the model to judge
//! parameter semantics. The failure policy is deliberately asymmetric: an
//! unreachable or undecodable phase 2 degrades to the phase-1 result rather
//! than blocking the run, bounded overall by the routing retry cap.

use tracing::{info, warn};

use crate::model::{self, ChatMessage, ChatRequest};
use crate::pipeline::StageContext;
use crate::state::{SessionState, StageDelta, StageOutcome, ValidationStatus};
use crate::validation::{
    decode_semantic_response, feedback_message, has_critical, semantic_prompt, validate_structure,
};
use crate::{Error, Result};

pub async fn run(state: &SessionState, ctx: &StageContext) -> Result<StageOutcome> {
    let plan = state
        .plan
        .as_ref()
        .ok_or_else(|| Error::Internal("validator stage ran without a plan".to_string()))?;

    // Phase 1: structural, local, always first
    let issues = validate_structure(plan, &ctx.node_types);
    if has_critical(&issues) {
        info!(issues = issues.len(), "plan failed structural validation");
        let errors: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        return Ok(invalid_outcome(errors, feedback_message(&issues)));
    }

    // Phase 2: model-assisted semantics, a refinement only
    let document = plan.to_document()?;
    let prompt = semantic_prompt(&document, &ctx.node_types);
    let request = ChatRequest::new(
        ctx.config.model.model.clone(),
        vec![ChatMessage::user(prompt)],
    );

    let response = match ctx.model.send(request).await {
        Ok(stream) => match model::collect(stream).await {
            Ok(response) => response,
            Err(e) => {
                warn!("semantic validation unreachable, keeping structural result: {}", e);
                return Ok(valid_outcome(None));
            }
        },
        Err(e) => {
            warn!("semantic validation unreachable, keeping structural result: {}", e);
            return Ok(valid_outcome(None));
        }
    };

    match decode_semantic_response(&response.text) {
        Some(outcome) if outcome.valid => {
            info!("plan passed semantic validation");
            Ok(valid_outcome(outcome.revised_plan))
        }
        Some(outcome) => {
            info!(errors = outcome.errors.len(), "plan failed semantic validation");
            let feedback = numbered_feedback(&outcome.errors);
            Ok(invalid_outcome(outcome.errors, feedback))
        }
        None => {
            // Permissive failure: an unparseable verdict counts as valid so
            // the planner-validator loop cannot spin on noise
            warn!("validator response was not decodable; treating plan as valid");
            Ok(valid_outcome(None))
        }
    }
}

fn valid_outcome(revised_plan: Option<crate::plan::Plan>) -> StageOutcome {
    StageOutcome {
        delta: StageDelta {
            plan: revised_plan,
            validation: Some(ValidationStatus {
                valid: true,
                errors: Vec::new(),
            }),
            ..Default::default()
        },
        next_hint: None,
    }
}

fn invalid_outcome(errors: Vec<String>, feedback: String) -> StageOutcome {
    StageOutcome {
        delta: StageDelta {
            messages: vec![ChatMessage::user(feedback)],
            validation: Some(ValidationStatus {
                valid: false,
                errors,
            }),
            ..Default::default()
        },
        next_hint: None,
    }
}

fn numbered_feedback(errors: &[String]) -> String {
    let mut lines = vec![
        "The generated plan failed validation. Fix these issues and produce a corrected plan:"
            .to_string(),
    ];
    for (i, error) in errors.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, error));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_feedback() {
        let msg = numbered_feedback(&["missing url".to_string(), "bad channel".to_string()]);
        assert!(msg.contains("1. missing url"));
        assert!(msg.contains("2. bad channel"));
    }

    #[test]
    fn test_invalid_outcome_appends_feedback_message() {
        let outcome = invalid_outcome(vec!["e".to_string()], "feedback".to_string());
        assert_eq!(outcome.delta.messages.len(), 1);
        assert!(!outcome.delta.validation.as_ref().unwrap().valid);
    }
}
