//! Target-platform capability
//!
//! The automation platform the executor applies plans to. Consumed as a
//! trait; the default implementation is a thin JSON REST client with a
//! static API key header. Connection payloads always go out in the
//! platform's double-nested array convention regardless of what shape the
//! model produced.

mod http;

pub use http::HttpPlatformClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::plan::{ConnectionMap, Node, Plan};
use crate::Result;

/// A workflow already present on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// Result of creating a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedWorkflow {
    pub id: String,
}

/// A credential configured on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The workflow-creation payload, in the platform's wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPayload {
    pub name: String,
    pub nodes: Vec<Node>,
    pub connections: ConnectionMap,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowPayload {
    /// Build the payload from an approved plan. The plan's connections are
    /// already normalized to double-nested form at conversion time; the
    /// typed map reproduces that convention on the wire.
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            name: plan.workflow.name.clone(),
            nodes: plan.workflow.nodes.clone(),
            connections: plan.workflow.connections.clone(),
            settings: serde_json::Map::new(),
        }
    }
}

/// Core platform capability trait
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>>;

    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<CreatedWorkflow>;

    async fn list_credentials(&self) -> Result<Vec<PlatformCredential>>;

    /// Where a human can open the given workflow
    fn workflow_url(&self, id: &str) -> String;

    /// Where a human can set up a missing credential of the given type
    fn credential_setup_url(&self, credential_type: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Workflow;
    use std::collections::BTreeMap;

    #[test]
    fn test_payload_serializes_double_nested_connections() {
        let mut connections = ConnectionMap::new();
        let mut ports = BTreeMap::new();
        ports.insert(
            "main".to_string(),
            vec![vec![crate::plan::ConnectionTarget {
                node: "B".to_string(),
                kind: "main".to_string(),
                index: 0,
            }]],
        );
        connections.insert("A".to_string(), ports);

        let plan = Plan {
            title: "t".to_string(),
            summary: String::new(),
            workflow: Workflow {
                name: "w".to_string(),
                nodes: Vec::new(),
                connections,
            },
            credentials_needed: Vec::new(),
            credentials_available: None,
        };

        let payload = WorkflowPayload::from_plan(&plan);
        let json = serde_json::to_value(&payload).unwrap();
        // Double-nested: list of branches, each a list of targets
        assert!(json["connections"]["A"]["main"][0][0]["node"] == "B");
    }
}
