//! Routing controller
//!
//! Pure, synchronous decision table over session state. No network calls,
//! no side effects: given identical routing-relevant fields it always
//! returns the same decision, which is what makes checkpoint replay
//! reproducible from `stage_history`.

use crate::state::{SessionState, Stage};

/// Confidence must be strictly above this before enrichment hands off
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Validation failures re-enter the planner at most this many times
pub const MAX_VALIDATION_RETRIES: usize = 3;

/// Where the pipeline goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Goto(Stage),
    Terminate,
}

/// Decide the next stage for the given state.
///
/// A fresh state (no current stage) starts at enrichment. The caller, not
/// this function, appends the previous stage tag to `stage_history` when it
/// performs the transition.
pub fn route(state: &SessionState) -> RouteDecision {
    match state.current_stage.unwrap_or(Stage::Enrichment) {
        Stage::Enrichment => {
            let ready = state
                .requirements
                .as_ref()
                .map(|r| r.has_all_required_info && r.confidence > CONFIDENCE_THRESHOLD)
                .unwrap_or(false);
            if ready {
                RouteDecision::Goto(Stage::Planner)
            } else {
                RouteDecision::Goto(Stage::Enrichment)
            }
        }
        Stage::Planner => RouteDecision::Goto(Stage::Validator),
        Stage::Validator => {
            let valid = state
                .validation
                .as_ref()
                .map(|v| v.valid)
                .unwrap_or(false);
            if valid {
                RouteDecision::Goto(Stage::Executor)
            } else if state.validator_retry_count() < MAX_VALIDATION_RETRIES {
                RouteDecision::Goto(Stage::Planner)
            } else {
                // Retries exhausted: force-proceed and let the platform API
                // be the final arbiter
                RouteDecision::Goto(Stage::Executor)
            }
        }
        Stage::Executor => RouteDecision::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RequirementsStatus, ValidationStatus};

    fn enrichment_state(has_all: bool, confidence: f64) -> SessionState {
        SessionState {
            current_stage: Some(Stage::Enrichment),
            requirements: Some(RequirementsStatus {
                has_all_required_info: has_all,
                confidence,
                missing_info: Vec::new(),
            }),
            ..Default::default()
        }
    }

    fn validator_state(valid: bool, history: Vec<Stage>) -> SessionState {
        SessionState {
            current_stage: Some(Stage::Validator),
            validation: Some(ValidationStatus {
                valid,
                errors: Vec::new(),
            }),
            stage_history: history,
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_state_starts_at_enrichment() {
        let state = SessionState::default();
        assert_eq!(route(&state), RouteDecision::Goto(Stage::Enrichment));
    }

    #[test]
    fn test_enrichment_loops_until_confident() {
        assert_eq!(
            route(&enrichment_state(false, 0.95)),
            RouteDecision::Goto(Stage::Enrichment)
        );
        assert_eq!(
            route(&enrichment_state(true, 0.5)),
            RouteDecision::Goto(Stage::Enrichment)
        );
    }

    #[test]
    fn test_enrichment_boundary_confidence_is_not_enough() {
        // Exactly 0.8 stays in enrichment; the threshold is strict
        assert_eq!(
            route(&enrichment_state(true, 0.8)),
            RouteDecision::Goto(Stage::Enrichment)
        );
        assert_eq!(
            route(&enrichment_state(true, 0.81)),
            RouteDecision::Goto(Stage::Planner)
        );
    }

    #[test]
    fn test_planner_always_goes_to_validator() {
        let state = SessionState {
            current_stage: Some(Stage::Planner),
            ..Default::default()
        };
        assert_eq!(route(&state), RouteDecision::Goto(Stage::Validator));
    }

    #[test]
    fn test_valid_plan_goes_to_executor() {
        assert_eq!(
            route(&validator_state(true, vec![])),
            RouteDecision::Goto(Stage::Executor)
        );
    }

    #[test]
    fn test_invalid_plan_retries_planner() {
        let history = vec![Stage::Enrichment, Stage::Planner, Stage::Validator];
        assert_eq!(
            route(&validator_state(false, history)),
            RouteDecision::Goto(Stage::Planner)
        );
    }

    #[test]
    fn test_retry_bound_forces_executor() {
        // Exactly three (validator, planner) adjacent pairs
        let history = vec![
            Stage::Enrichment,
            Stage::Planner,
            Stage::Validator,
            Stage::Planner,
            Stage::Validator,
            Stage::Planner,
            Stage::Validator,
            Stage::Planner,
        ];
        assert_eq!(
            route(&validator_state(false, history)),
            RouteDecision::Goto(Stage::Executor)
        );
    }

    #[test]
    fn test_executor_terminates() {
        let state = SessionState {
            current_stage: Some(Stage::Executor),
            ..Default::default()
        };
        assert_eq!(route(&state), RouteDecision::Terminate);
    }

    #[test]
    fn test_route_is_deterministic() {
        let a = validator_state(false, vec![Stage::Validator, Stage::Planner]);
        let b = validator_state(false, vec![Stage::Validator, Stage::Planner]);
        assert_eq!(route(&a), route(&b));
    }
}
