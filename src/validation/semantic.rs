//! Phase 2: model-assisted semantic validation
//!
//! Only runs once phase 1 is clean. The plan is rendered back into the
//! compact protocol and the model is asked to judge parameter semantics
//! against the enumerated registry. This module owns the prompt text and the
//! response decoding; the validator stage owns the model call itself, so the
//! fallback policy stays in one place.

use serde_json::Value;

use crate::plan::Plan;
use crate::protocol;
use crate::registry::NodeTypeRegistry;

/// What a decoded validator response said
#[derive(Debug, Clone)]
pub struct SemanticOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    /// A corrected plan, when the model returned one alongside its verdict
    pub revised_plan: Option<Plan>,
}

/// Build the semantic-check prompt for a candidate plan
pub fn semantic_prompt(plan_document: &Value, registry: &NodeTypeRegistry) -> String {
    format!(
        "You are validating an automation workflow plan before it is created.\n\
         Check every node's parameters for semantic problems: wrong values,\n\
         misconfigured required parameters, connections that make no sense.\n\
         \n\
         Valid node types and their required parameters:\n{}\n\
         \n\
         The candidate plan:\n\n{}\n\
         Respond in the same compact format, with exactly this shape:\n\
         \n\
         validation:\n\
         \x20\x20status: valid\n\
         \n\
         or, when the plan has problems:\n\
         \n\
         validation:\n\
         \x20\x20status: invalid\n\
         \x20\x20errors:\n\
         \x20\x20\x20\x20- first problem\n\
         \x20\x20\x20\x20- second problem\n\
         \n\
         You may also include a corrected plan (title, summary, workflow)\n\
         alongside the validation block. No prose outside the document.",
        registry.prompt_listing(),
        protocol::format(plan_document),
    )
}

/// Decode a validator model response.
///
/// `None` means the response was not decodable as a verdict at all; the
/// caller treats that as valid rather than looping forever.
pub fn decode_semantic_response(text: &str) -> Option<SemanticOutcome> {
    let doc = protocol::parse(protocol::strip_fences(text)).ok()?;
    let validation = doc.get("validation")?.as_object()?;
    let status = validation.get("status")?.as_str()?;

    let valid = match status {
        "valid" => true,
        "invalid" => false,
        _ => return None,
    };

    let errors = validation
        .get("errors")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|e| match e {
                    Value::String(s) => Some(s.clone()),
                    other => other.as_str().map(|s| s.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    // A returned workflow section means the model shipped a corrected plan
    let revised_plan = if doc.get("workflow").is_some() {
        Plan::from_document(&doc).ok()
    } else {
        None
    };

    Some(SemanticOutcome {
        valid,
        errors,
        revised_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeTypeInfo;

    #[test]
    fn test_decode_valid_verdict() {
        let outcome = decode_semantic_response("validation:\n  status: valid\n").unwrap();
        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_decode_invalid_verdict_with_errors() {
        let text = "validation:\n  status: invalid\n  errors:\n    - missing url\n";
        let outcome = decode_semantic_response(text).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.errors, ["missing url"]);
    }

    #[test]
    fn test_decode_verdict_with_revised_plan() {
        let text = "validation:\n  status: valid\n\
                    title: Fixed\n\
                    workflow:\n  name: Fixed\n  nodes:\n    - name: A\n      type: t\n";
        let outcome = decode_semantic_response(text).unwrap();
        assert!(outcome.valid);
        assert_eq!(outcome.revised_plan.unwrap().title, "Fixed");
    }

    #[test]
    fn test_undecodable_response_is_none() {
        assert!(decode_semantic_response("I think it looks fine!").is_none());
        assert!(decode_semantic_response("status: maybe\n").is_none());
    }

    #[test]
    fn test_prompt_enumerates_registry() {
        let registry = NodeTypeRegistry::new(vec![NodeTypeInfo {
            name: "slack".to_string(),
            display_name: String::new(),
            required_params: vec!["channel".to_string()],
        }]);
        let prompt = semantic_prompt(&serde_json::json!({"title": "X"}), &registry);
        assert!(prompt.contains("- slack (requires: channel)"));
        assert!(prompt.contains("title: X"));
    }
}
