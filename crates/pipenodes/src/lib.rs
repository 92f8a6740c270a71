//! Standard node library
//!
//! Collection of built-in nodes: workflow inputs and outputs, loops,
//! arithmetic, text, JSON transforms, debugging and delays.

mod control;
mod debug;
mod input;
mod math;
mod output;
mod text;
mod time;
mod transform;

pub use control::{LoopNode, LoopNodeFactory, LoopOutputNode, LoopOutputNodeFactory};
pub use debug::{DebugNode, DebugNodeFactory};
pub use input::{
    BooleanInputNode, BooleanInputNodeFactory, FloatInputNode, FloatInputNodeFactory,
    IntegerInputNode, IntegerInputNodeFactory, StringInputNode, StringInputNodeFactory,
};
pub use math::{
    AddNode, AddNodeFactory, DivideNode, DivideNodeFactory, MultiplyNode, MultiplyNodeFactory,
    SubtractNode, SubtractNodeFactory,
};
pub use output::{OutputNode, OutputNodeFactory};
pub use text::{ConcatNode, ConcatNodeFactory, SplitNode, SplitNodeFactory, TemplateNode, TemplateNodeFactory};
pub use time::{DelayNode, DelayNodeFactory};
pub use transform::{JsonParseNode, JsonParseNodeFactory, JsonStringifyNode, JsonStringifyNodeFactory};

use pipecore::{Node, NodeDescriptor};
use piperuntime::{NodeFactory, NodeRegistry};
use std::marker::PhantomData;
use std::sync::Arc;

/// A node type whose instances carry no state of their own.
pub trait BuiltinNode: Node + Default + 'static {
    fn descriptor() -> NodeDescriptor;
}

/// Factory for any [`BuiltinNode`]
pub struct BuiltinFactory<N> {
    descriptor: NodeDescriptor,
    _node: PhantomData<fn() -> N>,
}

impl<N: BuiltinNode> BuiltinFactory<N> {
    pub fn new() -> Self {
        Self {
            descriptor: N::descriptor(),
            _node: PhantomData,
        }
    }
}

impl<N: BuiltinNode> Default for BuiltinFactory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: BuiltinNode> NodeFactory for BuiltinFactory<N> {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn create(&self) -> Box<dyn Node> {
        Box::new(N::default())
    }
}

fn builtin<N: BuiltinNode>() -> Arc<dyn NodeFactory> {
    Arc::new(BuiltinFactory::<N>::new())
}

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(builtin::<IntegerInputNode>());
    registry.register(builtin::<FloatInputNode>());
    registry.register(builtin::<StringInputNode>());
    registry.register(builtin::<BooleanInputNode>());
    registry.register(builtin::<OutputNode>());
    registry.register(builtin::<LoopNode>());
    registry.register(builtin::<LoopOutputNode>());
    registry.register(builtin::<AddNode>());
    registry.register(builtin::<SubtractNode>());
    registry.register(builtin::<MultiplyNode>());
    registry.register(builtin::<DivideNode>());
    registry.register(builtin::<ConcatNode>());
    registry.register(builtin::<SplitNode>());
    registry.register(builtin::<TemplateNode>());
    registry.register(builtin::<JsonParseNode>());
    registry.register(builtin::<JsonStringifyNode>());
    registry.register(builtin::<DebugNode>());
    registry.register(builtin::<DelayNode>());
}

/// A registry with every standard node registered
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}
