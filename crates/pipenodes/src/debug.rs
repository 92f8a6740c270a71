use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Simple debug node that logs its input and passes it through
#[derive(Default)]
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let label = ctx
            .properties
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or(ctx.node_id.as_str());
        let value = ctx.get_or("value", Value::Null);

        tracing::info!("DEBUG [{}]: {} = {:?}", ctx.workflow_id, label, value);

        Ok(NodeOutput::new()
            .with_output("output", value.clone())
            .with_output("type", value.type_name().to_string()))
    }
}

impl BuiltinNode for DebugNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "DebugNode"))
            .with_description("Logs input values for debugging")
            .with_category("debug")
            .property(PropertyDef::new("value", TypeMetadata::any()))
            .property(PropertyDef::new("label", TypeMetadata::str()).with_default(""))
            .output(OutputSlot::new("output", TypeMetadata::any()))
            .output(OutputSlot::new("type", TypeMetadata::str()))
    }
}

pub type DebugNodeFactory = BuiltinFactory<DebugNode>;
