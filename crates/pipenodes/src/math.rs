use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

fn number() -> TypeMetadata {
    TypeMetadata::union(vec![TypeMetadata::int(), TypeMetadata::float()])
}

fn binary_descriptor(type_name: &str, description: &str) -> NodeDescriptor {
    NodeDescriptor::new(canonical_node_type(module_path!(), type_name))
        .with_description(description)
        .with_category("math")
        .property(PropertyDef::new("a", number()).with_default(0i64))
        .property(PropertyDef::new("b", number()).with_default(0i64))
        .output(OutputSlot::new("output", number()))
}

enum Operands {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn operands(ctx: &NodeContext) -> Result<Operands, NodeError> {
    match (ctx.require("a")?, ctx.require("b")?) {
        (Value::Int(a), Value::Int(b)) => Ok(Operands::Ints(*a, *b)),
        _ => Ok(Operands::Floats(ctx.require_f64("a")?, ctx.require_f64("b")?)),
    }
}

fn overflow(op: &str) -> NodeError {
    NodeError::ExecutionFailed(format!("Integer overflow in {}", op))
}

/// a + b; integers stay integers
#[derive(Default)]
pub struct AddNode;

#[async_trait]
impl Node for AddNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let sum = match operands(&ctx)? {
            Operands::Ints(a, b) => Value::Int(a.checked_add(b).ok_or_else(|| overflow("add"))?),
            Operands::Floats(a, b) => Value::Float(a + b),
        };
        Ok(NodeOutput::single(sum))
    }
}

impl BuiltinNode for AddNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("AddNode", "Add two numbers")
    }
}

pub type AddNodeFactory = BuiltinFactory<AddNode>;

#[derive(Default)]
pub struct SubtractNode;

#[async_trait]
impl Node for SubtractNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let difference = match operands(&ctx)? {
            Operands::Ints(a, b) => {
                Value::Int(a.checked_sub(b).ok_or_else(|| overflow("subtract"))?)
            }
            Operands::Floats(a, b) => Value::Float(a - b),
        };
        Ok(NodeOutput::single(difference))
    }
}

impl BuiltinNode for SubtractNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("SubtractNode", "Subtract b from a")
    }
}

pub type SubtractNodeFactory = BuiltinFactory<SubtractNode>;

#[derive(Default)]
pub struct MultiplyNode;

#[async_trait]
impl Node for MultiplyNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let product = match operands(&ctx)? {
            Operands::Ints(a, b) => {
                Value::Int(a.checked_mul(b).ok_or_else(|| overflow("multiply"))?)
            }
            Operands::Floats(a, b) => Value::Float(a * b),
        };
        Ok(NodeOutput::single(product))
    }
}

impl BuiltinNode for MultiplyNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("MultiplyNode", "Multiply two numbers")
    }
}

pub type MultiplyNodeFactory = BuiltinFactory<MultiplyNode>;

/// a / b, always a float
#[derive(Default)]
pub struct DivideNode;

#[async_trait]
impl Node for DivideNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let (a, b) = match operands(&ctx)? {
            Operands::Ints(a, b) => (a as f64, b as f64),
            Operands::Floats(a, b) => (a, b),
        };
        if b == 0.0 {
            return Err(NodeError::ExecutionFailed("Division by zero".to_string()));
        }
        Ok(NodeOutput::single(a / b))
    }
}

impl BuiltinNode for DivideNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("DivideNode", "Divide a by b")
    }
}

pub type DivideNodeFactory = BuiltinFactory<DivideNode>;
