//! Plan entity and protocol-document conversion
//!
//! The planner stage receives a protocol document (a [`serde_json::Value`]
//! tree from [`crate::protocol::parse`]) and turns it into a strongly-typed
//! [`Plan`]. Model output is lenient territory: missing node ids are
//! generated, malformed positions fall back to the origin, and single-nested
//! connection lists are normalized to the platform's double-nested wire
//! convention.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{Error, Result};

/// The converged workflow definition: produced by the planner, checked by the
/// validator, applied by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub title: String,
    pub summary: String,
    pub workflow: Workflow,
    #[serde(default)]
    pub credentials_needed: Vec<CredentialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_available: Option<Vec<CredentialRef>>,
}

/// The workflow body sent to the target platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: ConnectionMap,
}

/// Source node name → output port → double-nested target lists
pub type ConnectionMap = BTreeMap<String, BTreeMap<String, Vec<Vec<ConnectionTarget>>>>;

/// One endpoint of a connection, addressed by node name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub index: u32,
}

/// A single workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_type_version")]
    pub type_version: f64,
    #[serde(default)]
    pub position: (f64, f64),
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, CredentialBinding>>,
}

fn default_type_version() -> f64 {
    1.0
}

/// A credential attached to a node on the platform side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBinding {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// A credential the workflow needs (or that is already available)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRef {
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl Plan {
    /// Build a plan from a parsed protocol document.
    ///
    /// Accepts the plan either at the top level or nested under a `plan` key,
    /// since models vary on which they emit.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let root = doc
            .as_object()
            .ok_or_else(|| Error::PlanDecode("document is not an object".to_string()))?;
        let root = match root.get("plan").and_then(Value::as_object) {
            Some(inner) => inner,
            None => root,
        };

        let workflow_value = root
            .get("workflow")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::PlanDecode("missing workflow section".to_string()))?;

        let workflow = Workflow::from_value(workflow_value)?;

        let title = string_field(root, "title")
            .unwrap_or_else(|| workflow.name.clone());
        let summary = string_field(root, "summary").unwrap_or_default();

        let credentials_needed = credential_list(root, "credentialsNeeded");
        let credentials_available = root
            .get("credentialsAvailable")
            .and_then(Value::as_array)
            .map(|_| credential_list(root, "credentialsAvailable"));

        Ok(Plan {
            title,
            summary,
            workflow,
            credentials_needed,
            credentials_available,
        })
    }

    /// Render the plan as a protocol document for a model turn
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Workflow {
    fn from_value(obj: &Map<String, Value>) -> Result<Self> {
        let name = string_field(obj, "name").unwrap_or_else(|| "Untitled Workflow".to_string());

        let nodes = obj
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::PlanDecode("workflow has no nodes list".to_string()))?
            .iter()
            .map(Node::from_value)
            .collect::<Result<Vec<_>>>()?;

        let connections = match obj.get("connections") {
            Some(v) => normalize_connections(v)?,
            None => ConnectionMap::new(),
        };

        Ok(Workflow {
            name,
            nodes,
            connections,
        })
    }
}

impl Node {
    fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::PlanDecode("node entry is not an object".to_string()))?;

        let name = string_field(obj, "name")
            .ok_or_else(|| Error::PlanDecode("node has no name".to_string()))?;

        let id = string_field(obj, "id")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let kind = string_field(obj, "type").unwrap_or_default();

        let type_version = obj
            .get("typeVersion")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        let position = parse_position(obj.get("position"));

        let parameters = obj
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let credentials = obj
            .get("credentials")
            .and_then(Value::as_object)
            .map(|creds| {
                creds
                    .iter()
                    .filter_map(|(kind, v)| {
                        let binding = match v {
                            Value::String(name) => Some(CredentialBinding {
                                id: String::new(),
                                name: name.clone(),
                            }),
                            Value::Object(o) => Some(CredentialBinding {
                                id: string_field(o, "id").unwrap_or_default(),
                                name: string_field(o, "name").unwrap_or_default(),
                            }),
                            _ => None,
                        };
                        binding.map(|b| (kind.clone(), b))
                    })
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|m| !m.is_empty());

        Ok(Node {
            id,
            name,
            kind,
            type_version,
            position,
            parameters,
            credentials,
        })
    }
}

/// Malformed or missing positions fall back to the origin
fn parse_position(value: Option<&Value>) -> (f64, f64) {
    if let Some(Value::Array(items)) = value {
        if items.len() == 2 {
            if let (Some(x), Some(y)) = (items[0].as_f64(), items[1].as_f64()) {
                return (x, y);
            }
        }
    }
    (0.0, 0.0)
}

/// Normalize a connections value into the platform's double-nested shape.
///
/// Models emit both `main: [{node: X}]` (single-nested) and the platform's
/// `main: [[{node: X}]]`; a bare target list under a source node is treated
/// as the `main` port.
pub fn normalize_connections(value: &Value) -> Result<ConnectionMap> {
    let obj = match value {
        Value::Object(o) => o,
        Value::Null => return Ok(ConnectionMap::new()),
        _ => {
            return Err(Error::PlanDecode(
                "connections section is not an object".to_string(),
            ))
        }
    };

    let mut map = ConnectionMap::new();
    for (source, ports) in obj {
        let mut port_map = BTreeMap::new();
        match ports {
            Value::Object(port_obj) => {
                for (port, targets) in port_obj {
                    port_map.insert(port.clone(), normalize_port(targets)?);
                }
            }
            Value::Array(_) => {
                port_map.insert("main".to_string(), normalize_port(ports)?);
            }
            _ => {
                return Err(Error::PlanDecode(format!(
                    "connections for {} are neither a port map nor a list",
                    source
                )))
            }
        }
        map.insert(source.clone(), port_map);
    }
    Ok(map)
}

fn normalize_port(value: &Value) -> Result<Vec<Vec<ConnectionTarget>>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::PlanDecode("connection port is not a list".to_string()))?;

    if items.is_empty() {
        return Ok(Vec::new());
    }

    // Double-nested already: a list of lists
    if items.iter().all(|i| i.is_array()) {
        return items
            .iter()
            .map(|inner| {
                inner
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(parse_target)
                    .collect::<Result<Vec<_>>>()
            })
            .collect();
    }

    // Single-nested: wrap the whole list as one output branch
    let targets = items.iter().map(parse_target).collect::<Result<Vec<_>>>()?;
    Ok(vec![targets])
}

fn parse_target(value: &Value) -> Result<ConnectionTarget> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::PlanDecode("connection target is not an object".to_string()))?;
    let node = string_field(obj, "node")
        .ok_or_else(|| Error::PlanDecode("connection target has no node".to_string()))?;
    Ok(ConnectionTarget {
        node,
        kind: string_field(obj, "type").unwrap_or_else(|| "main".to_string()),
        index: obj.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
    })
}

fn credential_list(obj: &Map<String, Value>, key: &str) -> Vec<CredentialRef> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(t) => Some(CredentialRef {
                        credential_type: t.clone(),
                        name: None,
                        required_for: None,
                        node_id: None,
                        node_name: None,
                    }),
                    Value::Object(o) => Some(CredentialRef {
                        credential_type: string_field(o, "type")?,
                        name: string_field(o, "name"),
                        required_for: string_field(o, "requiredFor"),
                        node_id: string_field(o, "nodeId"),
                        node_name: string_field(o, "nodeName"),
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one_node_doc() -> Value {
        json!({
            "title": "Daily Report",
            "summary": "Posts a summary every morning",
            "workflow": {
                "name": "Daily Report",
                "nodes": [
                    {"name": "Schedule", "type": "scheduleTrigger", "position": [0, 0]},
                ],
                "connections": {},
            },
        })
    }

    #[test]
    fn test_from_document_basic() {
        let plan = Plan::from_document(&one_node_doc()).unwrap();
        assert_eq!(plan.title, "Daily Report");
        assert_eq!(plan.workflow.nodes.len(), 1);
        assert_eq!(plan.workflow.nodes[0].kind, "scheduleTrigger");
    }

    #[test]
    fn test_missing_node_id_is_generated() {
        let plan = Plan::from_document(&one_node_doc()).unwrap();
        assert!(!plan.workflow.nodes[0].id.is_empty());
    }

    #[test]
    fn test_malformed_position_defaults_to_origin() {
        let doc = json!({
            "workflow": {
                "name": "W",
                "nodes": [{"name": "A", "type": "t", "position": "top-left"}],
            },
        });
        let plan = Plan::from_document(&doc).unwrap();
        assert_eq!(plan.workflow.nodes[0].position, (0.0, 0.0));
    }

    #[test]
    fn test_type_version_defaults_to_one() {
        let plan = Plan::from_document(&one_node_doc()).unwrap();
        assert_eq!(plan.workflow.nodes[0].type_version, 1.0);
    }

    #[test]
    fn test_plan_nested_under_plan_key() {
        let doc = json!({"plan": one_node_doc()});
        let plan = Plan::from_document(&doc).unwrap();
        assert_eq!(plan.title, "Daily Report");
    }

    #[test]
    fn test_missing_workflow_is_a_decode_error() {
        let doc = json!({"title": "x"});
        assert!(matches!(
            Plan::from_document(&doc),
            Err(crate::Error::PlanDecode(_))
        ));
    }

    #[test]
    fn test_single_nested_connections_are_normalized() {
        let value = json!({
            "Webhook": {"main": [{"node": "Slack", "type": "main", "index": 0}]},
        });
        let map = normalize_connections(&value).unwrap();
        let branches = &map["Webhook"]["main"];
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0][0].node, "Slack");
    }

    #[test]
    fn test_double_nested_connections_pass_through() {
        let value = json!({
            "Webhook": {"main": [[{"node": "Slack"}], [{"node": "Email"}]]},
        });
        let map = normalize_connections(&value).unwrap();
        let branches = &map["Webhook"]["main"];
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1][0].node, "Email");
        // Defaults for omitted target fields
        assert_eq!(branches[0][0].kind, "main");
        assert_eq!(branches[0][0].index, 0);
    }

    #[test]
    fn test_bare_target_list_maps_to_main_port() {
        let value = json!({"Webhook": [{"node": "Slack"}]});
        let map = normalize_connections(&value).unwrap();
        assert!(map["Webhook"].contains_key("main"));
    }

    #[test]
    fn test_credentials_needed_parsing() {
        let doc = json!({
            "workflow": {"name": "W", "nodes": [{"name": "A", "type": "t"}]},
            "credentialsNeeded": [
                {"type": "slackApi", "requiredFor": "Slack", "nodeName": "Slack"},
                "githubApi",
            ],
        });
        let plan = Plan::from_document(&doc).unwrap();
        assert_eq!(plan.credentials_needed.len(), 2);
        assert_eq!(plan.credentials_needed[0].credential_type, "slackApi");
        assert_eq!(plan.credentials_needed[1].credential_type, "githubApi");
    }

    #[test]
    fn test_to_document_uses_wire_keys() {
        let plan = Plan::from_document(&one_node_doc()).unwrap();
        let doc = plan.to_document().unwrap();
        let node = &doc["workflow"]["nodes"][0];
        assert!(node.get("type").is_some());
        assert!(node.get("typeVersion").is_some());
    }
}
