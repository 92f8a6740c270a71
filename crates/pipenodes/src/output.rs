use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeKind, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Named result of the workflow
#[derive(Default)]
pub struct OutputNode;

#[async_trait]
impl Node for OutputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::single(ctx.get_or("value", Value::Null)))
    }
}

impl BuiltinNode for OutputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "OutputNode"))
            .with_description("Expose a value as a named workflow result")
            .with_category("output")
            .with_kind(NodeKind::WorkflowOutput)
            .property(
                PropertyDef::new("name", TypeMetadata::str())
                    .with_default("")
                    .with_description("Key of this value in the job result"),
            )
            .property(PropertyDef::new("value", TypeMetadata::any()))
            .output(OutputSlot::new("output", TypeMetadata::any()))
    }
}

pub type OutputNodeFactory = BuiltinFactory<OutputNode>;
