use crate::{events::EventEmitter, NodeError, TypeMetadata, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Property names owned by the engine; never declared by a node type.
pub const RESERVED_PROPERTIES: &[&str] = &["id", "parent_id", "ui_properties"];

/// Name of the single output produced when a node returns a bare value.
pub const DEFAULT_OUTPUT: &str = "output";

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node against its assigned properties.
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Normalize whatever `process` returned into named output slots.
    fn convert_output(&self, output: NodeOutput) -> Result<HashMap<String, Value>, NodeError> {
        output.into_slots()
    }
}

/// Role a node type plays for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Regular,
    /// Receives a named workflow parameter
    WorkflowInput,
    /// Contributes a named entry to the job result
    WorkflowOutput,
    /// Runs the subgraph downstream of it once per item
    Loop,
    /// Collects one value per loop iteration
    LoopOutput,
}

/// One declared input of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_metadata: TypeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, type_metadata: TypeMetadata) -> Self {
        Self {
            name: name.into(),
            type_metadata,
            default: None,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One declared output of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    #[serde(rename = "type")]
    pub type_metadata: TypeMetadata,
    pub name: String,
    #[serde(default)]
    pub stream: bool,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, type_metadata: TypeMetadata) -> Self {
        Self {
            type_metadata,
            name: name.into(),
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Static description of a node type: ports, role and requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_type: String,
    pub description: String,
    pub category: String,
    pub kind: NodeKind,
    pub properties: Vec<PropertyDef>,
    pub outputs: Vec<OutputSlot>,
    /// External capabilities the environment must provide (e.g. "gpu")
    pub capabilities: Vec<String>,
}

impl NodeDescriptor {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            description: String::new(),
            category: "general".to_string(),
            kind: NodeKind::Regular,
            properties: Vec::new(),
            outputs: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties = merge_properties(&self.properties, &[property]);
        self
    }

    pub fn properties(mut self, properties: &[PropertyDef]) -> Self {
        self.properties = merge_properties(&self.properties, properties);
        self
    }

    pub fn output(mut self, slot: OutputSlot) -> Self {
        self.outputs.push(slot);
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Property values a freshly created node starts with.
    pub fn default_properties(&self) -> HashMap<String, Value> {
        self.properties
            .iter()
            .filter_map(|p| p.default.clone().map(|v| (p.name.clone(), v)))
            .collect()
    }
}

/// Merge a family's base properties with a derived type's own.
///
/// Base properties come first. A derived property with the same name
/// replaces the base one in place. Reserved engine names are dropped.
pub fn merge_properties(base: &[PropertyDef], derived: &[PropertyDef]) -> Vec<PropertyDef> {
    let mut merged: Vec<PropertyDef> = Vec::with_capacity(base.len() + derived.len());
    for property in base.iter().chain(derived) {
        if RESERVED_PROPERTIES.contains(&property.name.as_str()) {
            continue;
        }
        match merged.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property.clone(),
            None => merged.push(property.clone()),
        }
    }
    merged
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: String,
    pub node_type: String,

    /// Property values after upstream results were assigned
    pub properties: HashMap<String, Value>,

    pub user_id: String,
    pub workflow_id: String,

    /// Capabilities the environment declared for this run
    pub capabilities: Arc<HashSet<String>>,

    /// Event emitter for progress updates
    pub events: EventEmitter,

    /// Cancelled when the run is aborted
    pub cancellation: CancellationToken,
}

impl NodeContext {
    /// Get required property or return error
    pub fn require(&self, name: &str) -> Result<&Value, NodeError> {
        match self.properties.get(name) {
            Some(Value::Null) | None => Err(NodeError::MissingInput(name.to_string())),
            Some(value) => Ok(value),
        }
    }

    /// Get property with default
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.properties.get(name).cloned().unwrap_or(default)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| invalid(name, "str", value))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, NodeError> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| invalid(name, "float", value))
    }

    pub fn require_list(&self, name: &str) -> Result<&[Value], NodeError> {
        let value = self.require(name)?;
        value.as_list().ok_or_else(|| invalid(name, "list", value))
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

fn invalid(field: &str, expected: &str, actual: &Value) -> NodeError {
    NodeError::InvalidInputType {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

/// Raw result of `Node::process`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    /// A single value, exposed as the `output` slot
    Single(Value),
    /// Values keyed by output slot name
    Slots(HashMap<String, Value>),
    /// A serialized output bundle; each field becomes a slot
    Bundle(serde_json::Value),
}

impl NodeOutput {
    pub fn new() -> Self {
        NodeOutput::Slots(HashMap::new())
    }

    pub fn single(value: impl Into<Value>) -> Self {
        NodeOutput::Single(value.into())
    }

    /// Serialize a structured bundle into slots.
    pub fn bundle<T: Serialize>(bundle: &T) -> Result<Self, NodeError> {
        serde_json::to_value(bundle)
            .map(NodeOutput::Bundle)
            .map_err(|e| NodeError::ExecutionFailed(format!("Output serialization error: {}", e)))
    }

    pub fn with_output(self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut slots = match self {
            NodeOutput::Slots(slots) => slots,
            NodeOutput::Single(value) => HashMap::from([(DEFAULT_OUTPUT.to_string(), value)]),
            NodeOutput::Bundle(_) => HashMap::new(),
        };
        slots.insert(port.into(), value.into());
        NodeOutput::Slots(slots)
    }

    pub fn into_slots(self) -> Result<HashMap<String, Value>, NodeError> {
        match self {
            NodeOutput::Single(value) => Ok(HashMap::from([(DEFAULT_OUTPUT.to_string(), value)])),
            NodeOutput::Slots(slots) => Ok(slots),
            NodeOutput::Bundle(serde_json::Value::Object(fields)) => Ok(fields
                .into_iter()
                .map(|(name, value)| (name, Value::from(value)))
                .collect()),
            NodeOutput::Bundle(other) => Err(NodeError::ExecutionFailed(format!(
                "Output bundle must serialize to an object, got {}",
                other
            ))),
        }
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::new()
    }
}
