//! Phase 1: structural validation
//!
//! Local checks only, no model calls. Every finding is collected so the
//! planner gets the full picture in one feedback round, but the caller stops
//! at phase 1 whenever anything critical shows up.

use std::collections::HashSet;

use super::suggest::suggest_alternatives;
use super::{IssueCategory, Severity, ValidationIssue};
use crate::plan::Plan;
use crate::registry::NodeTypeRegistry;

/// Check a plan's structure against the node-type registry
pub fn validate_structure(plan: &Plan, registry: &NodeTypeRegistry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let workflow = &plan.workflow;

    let node_names: Vec<&str> = workflow.nodes.iter().map(|n| n.name.as_str()).collect();

    // Per-node field presence and registry membership
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    for node in &workflow.nodes {
        if node.id.is_empty() {
            issues.push(node_issue(
                node.id.as_str(),
                node.name.as_str(),
                "id",
                "non-empty node id",
                "empty",
                "assign a unique id to this node",
            ));
        } else if !seen_ids.insert(node.id.as_str()) {
            issues.push(node_issue(
                node.id.as_str(),
                node.name.as_str(),
                "id",
                "unique node id",
                &format!("duplicate id {}", node.id),
                "give each node its own id",
            ));
        }

        if node.name.is_empty() {
            issues.push(node_issue(
                node.id.as_str(),
                node.name.as_str(),
                "name",
                "non-empty node name",
                "empty",
                "name the node; connections address nodes by name",
            ));
        } else if !seen_names.insert(node.name.as_str()) {
            issues.push(node_issue(
                node.id.as_str(),
                node.name.as_str(),
                "name",
                "unique node name",
                &format!("duplicate name {}", node.name),
                "rename one of the duplicates",
            ));
        }

        if node.kind.is_empty() {
            issues.push(node_issue(
                node.id.as_str(),
                node.name.as_str(),
                "type",
                "non-empty node type",
                "empty",
                "set the node type",
            ));
        } else if !registry.contains(&node.kind) {
            let alternatives = suggest_alternatives(&node.kind, registry);
            let suggestion = match alternatives.first() {
                Some(best) => format!("did you mean {}?", best),
                None => "use a type from the registry".to_string(),
            };
            issues.push(ValidationIssue {
                severity: Severity::Critical,
                category: IssueCategory::NodeType,
                node_id: Some(node.id.clone()),
                node_name: Some(node.name.clone()),
                field: "type".to_string(),
                expected: "a registered node type".to_string(),
                actual: node.kind.clone(),
                suggestion,
                available_alternatives: Some(alternatives),
            });
        }

        // Missing required parameters are warnings, not errors
        if let Some(info) = registry.get(&node.kind) {
            for param in &info.required_params {
                if !node.parameters.contains_key(param) {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        category: IssueCategory::Parameter,
                        node_id: Some(node.id.clone()),
                        node_name: Some(node.name.clone()),
                        field: param.clone(),
                        expected: format!("required parameter for {}", node.kind),
                        actual: "missing".to_string(),
                        suggestion: format!("set parameters.{}", param),
                        available_alternatives: None,
                    });
                }
            }
        }
    }

    // Connection endpoints must name existing nodes, strictly
    let known: HashSet<&str> = node_names.iter().copied().collect();
    let listing = if node_names.is_empty() {
        "(no nodes)".to_string()
    } else {
        node_names.join(", ")
    };

    for (source, ports) in &workflow.connections {
        if !known.contains(source.as_str()) {
            issues.push(connection_issue("source", source, &listing));
        }
        for branches in ports.values() {
            for branch in branches {
                for target in branch {
                    if !known.contains(target.node.as_str()) {
                        issues.push(connection_issue("target", &target.node, &listing));
                    }
                }
            }
        }
    }

    issues
}

fn node_issue(
    id: &str,
    name: &str,
    field: &str,
    expected: &str,
    actual: &str,
    suggestion: &str,
) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Critical,
        category: IssueCategory::NodeStructure,
        node_id: (!id.is_empty()).then(|| id.to_string()),
        node_name: (!name.is_empty()).then(|| name.to_string()),
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
        suggestion: suggestion.to_string(),
        available_alternatives: None,
    }
}

fn connection_issue(endpoint: &str, unknown: &str, listing: &str) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Critical,
        category: IssueCategory::Connection,
        node_id: None,
        node_name: Some(unknown.to_string()),
        field: format!("connections.{}", endpoint),
        expected: "an existing node name".to_string(),
        actual: unknown.to_string(),
        suggestion: format!("existing nodes: {}", listing),
        available_alternatives: None,
    }
}
