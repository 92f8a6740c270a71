use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;
use tokio::time::{sleep, Duration};

const STEPS: u64 = 10;

/// Delay execution for a specified duration, reporting progress as it goes
#[derive(Default)]
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = ctx.require("delay_ms")?.as_i64().unwrap_or_default();
        if delay_ms < 0 {
            return Err(NodeError::Configuration(format!(
                "delay_ms must not be negative, got {}",
                delay_ms
            )));
        }

        tracing::debug!("Node {} delaying for {}ms", ctx.node_id, delay_ms);
        let step = Duration::from_millis(delay_ms as u64) / STEPS as u32;
        for done in 1..=STEPS {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                _ = sleep(step) => ctx.events.progress(done, STEPS),
            }
        }

        Ok(NodeOutput::single(ctx.get_or("value", Value::Null)))
    }
}

impl BuiltinNode for DelayNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "DelayNode"))
            .with_description("Delay execution for specified milliseconds")
            .with_category("time")
            .property(PropertyDef::new("delay_ms", TypeMetadata::int()).with_default(1000i64))
            .property(PropertyDef::new("value", TypeMetadata::any()))
            .output(OutputSlot::new("output", TypeMetadata::any()))
    }
}

pub type DelayNodeFactory = BuiltinFactory<DelayNode>;
