use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeKind, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Runs its downstream body once per item of `items`.
///
/// The runner drives iteration itself; each pass sees the current item on
/// the `output` slot. Running the node directly just echoes the list.
#[derive(Default)]
pub struct LoopNode;

#[async_trait]
impl Node for LoopNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let items = ctx.require_list("items")?.to_vec();
        Ok(NodeOutput::single(Value::List(items)))
    }
}

impl BuiltinNode for LoopNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "LoopNode"))
            .with_description("Run the downstream body once per item")
            .with_category("control")
            .with_kind(NodeKind::Loop)
            .property(
                PropertyDef::new("items", TypeMetadata::list(TypeMetadata::any()))
                    .with_default(Value::List(Vec::new())),
            )
            .output(OutputSlot::new("output", TypeMetadata::any()))
    }
}

pub type LoopNodeFactory = BuiltinFactory<LoopNode>;

/// Collects one value per loop iteration
#[derive(Default)]
pub struct LoopOutputNode;

#[async_trait]
impl Node for LoopOutputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::single(ctx.get_or("input", Value::Null)))
    }
}

impl BuiltinNode for LoopOutputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "LoopOutputNode"))
            .with_description("Collect the value of each loop iteration into a list")
            .with_category("control")
            .with_kind(NodeKind::LoopOutput)
            .property(PropertyDef::new("input", TypeMetadata::any()))
            .output(OutputSlot::new("output", TypeMetadata::any()))
    }
}

pub type LoopOutputNodeFactory = BuiltinFactory<LoopOutputNode>;
