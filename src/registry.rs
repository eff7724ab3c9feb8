//! Node-type registry
//!
//! Read-only catalog of the node types the target platform accepts, with the
//! required parameters per type. Shared across sessions behind an `Arc`; the
//! validation engine resolves every node's `type` against it.

use serde::{Deserialize, Serialize};

use crate::Result;

/// One entry in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    /// Full type identifier, e.g. `n8n-nodes-base.httpRequest`
    pub name: String,
    /// Human-readable name shown in prompts and suggestions
    #[serde(default)]
    pub display_name: String,
    /// Parameters the platform requires for this type
    #[serde(default)]
    pub required_params: Vec<String>,
}

/// Enumerable catalog of valid node types.
///
/// Order matters: fuzzy-suggestion ties are broken by registry order.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: Vec<NodeTypeInfo>,
}

impl NodeTypeRegistry {
    pub fn new(types: Vec<NodeTypeInfo>) -> Self {
        Self { types }
    }

    /// Load a registry from a JSON array of type entries
    pub fn from_json_str(json: &str) -> Result<Self> {
        let types: Vec<NodeTypeInfo> = serde_json::from_str(json)?;
        Ok(Self { types })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.iter().any(|t| t.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&NodeTypeInfo> {
        self.types.iter().find(|t| t.name == name)
    }

    /// All type entries in registry order
    pub fn entries(&self) -> &[NodeTypeInfo] {
        &self.types
    }

    /// All type names in registry order
    pub fn names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// One line per type, for enumerating the catalog in a model prompt
    pub fn prompt_listing(&self) -> String {
        self.types
            .iter()
            .map(|t| {
                if t.required_params.is_empty() {
                    format!("- {}", t.name)
                } else {
                    format!("- {} (requires: {})", t.name, t.required_params.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
