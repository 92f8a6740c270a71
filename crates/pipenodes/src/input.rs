use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    merge_properties, Node, NodeContext, NodeDescriptor, NodeError, NodeKind, NodeOutput,
    OutputSlot, PropertyDef, TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Properties every workflow input carries
fn base_properties() -> Vec<PropertyDef> {
    vec![
        PropertyDef::new("name", TypeMetadata::str())
            .with_default("")
            .with_description("Parameter name the job request binds to"),
        PropertyDef::new("description", TypeMetadata::str()).with_default(""),
    ]
}

fn input_descriptor(type_name: &str, description: &str, value: PropertyDef) -> NodeDescriptor {
    let output = OutputSlot::new("output", value.type_metadata.clone());
    NodeDescriptor::new(canonical_node_type(module_path!(), type_name))
        .with_description(description)
        .with_category("input")
        .with_kind(NodeKind::WorkflowInput)
        .properties(&merge_properties(&base_properties(), &[value]))
        .output(output)
}

fn emit_value(ctx: &NodeContext) -> NodeOutput {
    NodeOutput::single(ctx.get_or("value", Value::Null))
}

/// Integer workflow parameter
#[derive(Default)]
pub struct IntegerInputNode;

#[async_trait]
impl Node for IntegerInputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(emit_value(&ctx))
    }
}

impl BuiltinNode for IntegerInputNode {
    fn descriptor() -> NodeDescriptor {
        input_descriptor(
            "IntegerInputNode",
            "Integer parameter of the workflow",
            PropertyDef::new("value", TypeMetadata::int()).with_default(0i64),
        )
    }
}

pub type IntegerInputNodeFactory = BuiltinFactory<IntegerInputNode>;

/// Float workflow parameter
#[derive(Default)]
pub struct FloatInputNode;

#[async_trait]
impl Node for FloatInputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(emit_value(&ctx))
    }
}

impl BuiltinNode for FloatInputNode {
    fn descriptor() -> NodeDescriptor {
        input_descriptor(
            "FloatInputNode",
            "Floating point parameter of the workflow",
            PropertyDef::new("value", TypeMetadata::float()).with_default(0.0),
        )
    }
}

pub type FloatInputNodeFactory = BuiltinFactory<FloatInputNode>;

/// String workflow parameter
#[derive(Default)]
pub struct StringInputNode;

#[async_trait]
impl Node for StringInputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(emit_value(&ctx))
    }
}

impl BuiltinNode for StringInputNode {
    fn descriptor() -> NodeDescriptor {
        input_descriptor(
            "StringInputNode",
            "Text parameter of the workflow",
            PropertyDef::new("value", TypeMetadata::str()).with_default(""),
        )
    }
}

pub type StringInputNodeFactory = BuiltinFactory<StringInputNode>;

/// Boolean workflow parameter
#[derive(Default)]
pub struct BooleanInputNode;

#[async_trait]
impl Node for BooleanInputNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(emit_value(&ctx))
    }
}

impl BuiltinNode for BooleanInputNode {
    fn descriptor() -> NodeDescriptor {
        input_descriptor(
            "BooleanInputNode",
            "Boolean parameter of the workflow",
            PropertyDef::new("value", TypeMetadata::bool()).with_default(false),
        )
    }
}

pub type BooleanInputNodeFactory = BuiltinFactory<BooleanInputNode>;
