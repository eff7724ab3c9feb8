//! Stage nodes
//!
//! Four role-specific units, each an async function over shared session
//! state. A stage reads state, may call the model or the platform, and
//! returns a [`crate::state::StageOutcome`]. It never mutates state or
//! picks the next stage itself; the orchestrator applies the delta and the
//! routing table decides where to go.

pub mod enrichment;
pub mod executor;
pub mod planner;
pub mod validator;
