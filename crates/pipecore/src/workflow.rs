//! Serialized job request: the graph as a client submits it.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to run one graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub workflow_id: String,
    pub graph: GraphSpec,
    /// Values for workflow input nodes, keyed by the input's `name`
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

impl JobRequest {
    pub fn new(graph: GraphSpec) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeSpec) -> String {
        let id = node.id.clone().unwrap_or_default();
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) {
        self.edges.push(EdgeSpec {
            id: None,
            source: source.into(),
            source_handle: HandleRef::Name(source_handle.into()),
            target: target.into(),
            target_handle: target_handle.into(),
        });
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_edge(
        mut self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.connect(source, source_handle, target, target_handle);
        self
    }
}

/// Node specification in a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_properties: Option<serde_json::Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            node_type: node_type.into(),
            data: HashMap::new(),
            parent_id: None,
            ui_properties: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.ui_properties = Some(serde_json::json!({ "position": { "x": x, "y": y } }));
        self
    }
}

/// An output reference: by name, or by position among the source's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandleRef {
    Index(usize),
    Name(String),
}

/// Connection between nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: HandleRef,
    pub target: String,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_request() {
        let raw = r#"{
            "user_id": "u1",
            "workflow_id": "w1",
            "graph": {
                "nodes": [
                    {"id": "a", "type": "input.Integer", "data": {"name": "x", "value": 0}},
                    {"id": "b", "type": "output.Output", "data": {"name": "y"}, "ui_properties": {"x": 1}}
                ],
                "edges": [
                    {"id": "e1", "source": "a", "sourceHandle": 0, "target": "b", "targetHandle": "value"},
                    {"source": "a", "sourceHandle": "output", "target": "b", "targetHandle": "value"}
                ]
            },
            "params": {"x": 5}
        }"#;
        let request: JobRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.graph.nodes.len(), 2);
        assert_eq!(request.graph.nodes[0].data.get("value"), Some(&Value::Int(0)));
        assert_eq!(request.graph.edges[0].source_handle, HandleRef::Index(0));
        assert_eq!(
            request.graph.edges[1].source_handle,
            HandleRef::Name("output".to_string())
        );
        assert_eq!(request.params.get("x"), Some(&Value::Int(5)));
    }
}
