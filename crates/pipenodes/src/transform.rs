use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Parse JSON string to Value
#[derive(Default)]
pub struct JsonParseNode;

#[async_trait]
impl Node for JsonParseNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let input = ctx.require_str("json")?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(NodeOutput::single(Value::from(parsed)))
    }
}

impl BuiltinNode for JsonParseNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "JsonParseNode"))
            .with_description("Parse JSON string")
            .with_category("transform")
            .property(PropertyDef::new("json", TypeMetadata::str()).with_default(""))
            .output(OutputSlot::new("output", TypeMetadata::any()))
    }
}

pub type JsonParseNodeFactory = BuiltinFactory<JsonParseNode>;

/// Stringify Value to JSON
#[derive(Default)]
pub struct JsonStringifyNode;

#[async_trait]
impl Node for JsonStringifyNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.get_or("value", Value::Null);
        let pretty = ctx.properties.get("pretty").and_then(Value::as_bool).unwrap_or(false);

        let json_str = if pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(NodeOutput::single(json_str))
    }
}

impl BuiltinNode for JsonStringifyNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "JsonStringifyNode"))
            .with_description("Convert value to JSON string")
            .with_category("transform")
            .property(PropertyDef::new("value", TypeMetadata::any()))
            .property(PropertyDef::new("pretty", TypeMetadata::bool()).with_default(false))
            .output(OutputSlot::new("output", TypeMetadata::str()))
    }
}

pub type JsonStringifyNodeFactory = BuiltinFactory<JsonStringifyNode>;
