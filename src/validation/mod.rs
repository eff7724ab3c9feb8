//! Two-phase validation engine
//!
//! Phase 1 (`structural`) checks a plan locally against the node-type
//! registry: no model calls, always runs first, and any critical finding
//! stops the pipeline from going deeper. Phase 2 (`semantic`) is a
//! model-assisted sanity check over parameter semantics; it is a refinement,
//! never a single point of failure; any trouble reaching or decoding it
//! degrades to the phase-1 result.

mod semantic;
mod structural;
mod suggest;

pub use semantic::{decode_semantic_response, semantic_prompt, SemanticOutcome};
pub use structural::validate_structure;
pub use suggest::suggest_alternatives;

use serde::{Deserialize, Serialize};

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks workflow creation
    Critical,
    /// Worth telling the planner about, but not blocking
    Warning,
}

/// What part of the plan a finding concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    NodeType,
    NodeStructure,
    Connection,
    Parameter,
    Credential,
    Format,
}

/// One validation finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub category: IssueCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub field: String,
    pub expected: String,
    pub actual: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_alternatives: Option<Vec<String>>,
}

impl std::fmt::Display for ValidationIssue {
    /// One actionable sentence per issue; this is what the planner reads back
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.node_name {
            write!(f, "[{}] ", name)?;
        }
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )?;
        if !self.suggestion.is_empty() {
            write!(f, " - {}", self.suggestion)?;
        }
        if let Some(alts) = &self.available_alternatives {
            if !alts.is_empty() {
                write!(f, " (alternatives: {})", alts.join(", "))?;
            }
        }
        Ok(())
    }
}

/// True when any finding blocks workflow creation
pub fn has_critical(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Critical)
}

/// Render findings as the numbered feedback message appended to the
/// conversation so the next planner attempt sees concrete issues.
pub fn feedback_message(issues: &[ValidationIssue]) -> String {
    let mut lines = vec![
        "The generated plan failed validation. Fix these issues and produce a corrected plan:"
            .to_string(),
    ];
    for (i, issue) in issues.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, issue));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> ValidationIssue {
        ValidationIssue {
            severity,
            category: IssueCategory::NodeStructure,
            node_id: None,
            node_name: Some("Slack".to_string()),
            field: "id".to_string(),
            expected: "non-empty id".to_string(),
            actual: "missing".to_string(),
            suggestion: "add a unique id".to_string(),
            available_alternatives: None,
        }
    }

    #[test]
    fn test_has_critical() {
        assert!(has_critical(&[issue(Severity::Critical)]));
        assert!(!has_critical(&[issue(Severity::Warning)]));
    }

    #[test]
    fn test_feedback_message_is_numbered() {
        let msg = feedback_message(&[issue(Severity::Critical), issue(Severity::Critical)]);
        assert!(msg.contains("1. [Slack]"));
        assert!(msg.contains("2. [Slack]"));
    }
}
