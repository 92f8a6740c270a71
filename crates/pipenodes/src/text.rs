use crate::{BuiltinFactory, BuiltinNode};
use async_trait::async_trait;
use pipecore::{
    Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, OutputSlot, PropertyDef,
    TypeMetadata, Value,
};
use piperuntime::canonical_node_type;

/// Join two strings with an optional separator
#[derive(Default)]
pub struct ConcatNode;

#[async_trait]
impl Node for ConcatNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let a = ctx.require_str("a")?;
        let b = ctx.require_str("b")?;
        let separator = ctx.properties.get("separator").and_then(Value::as_str).unwrap_or("");
        Ok(NodeOutput::single(format!("{}{}{}", a, separator, b)))
    }
}

impl BuiltinNode for ConcatNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "ConcatNode"))
            .with_description("Concatenate two strings")
            .with_category("text")
            .property(PropertyDef::new("a", TypeMetadata::str()).with_default(""))
            .property(PropertyDef::new("b", TypeMetadata::str()).with_default(""))
            .property(PropertyDef::new("separator", TypeMetadata::str()).with_default(""))
            .output(OutputSlot::new("output", TypeMetadata::str()))
    }
}

pub type ConcatNodeFactory = BuiltinFactory<ConcatNode>;

/// Split text into a list of parts
#[derive(Default)]
pub struct SplitNode;

#[async_trait]
impl Node for SplitNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let text = ctx.require_str("text")?;
        let separator = ctx.require_str("separator")?;
        if separator.is_empty() {
            return Err(NodeError::Configuration("separator must not be empty".to_string()));
        }

        let parts: Vec<Value> = text.split(separator).map(Value::from).collect();
        Ok(NodeOutput::new()
            .with_output("output", Value::List(parts.clone()))
            .with_output("count", parts.len() as i64))
    }
}

impl BuiltinNode for SplitNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "SplitNode"))
            .with_description("Split text on a separator")
            .with_category("text")
            .property(PropertyDef::new("text", TypeMetadata::str()).with_default(""))
            .property(PropertyDef::new("separator", TypeMetadata::str()).with_default(","))
            .output(OutputSlot::new("output", TypeMetadata::list(TypeMetadata::str())))
            .output(OutputSlot::new("count", TypeMetadata::int()))
    }
}

pub type SplitNodeFactory = BuiltinFactory<SplitNode>;

/// Fill `{key}` placeholders in a template from a dict of values
#[derive(Default)]
pub struct TemplateNode;

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[async_trait]
impl Node for TemplateNode {
    async fn process(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let template = ctx.require_str("template")?;
        let mut text = template.to_string();
        if let Some(values) = ctx.properties.get("values").and_then(Value::as_map) {
            for (key, value) in values {
                text = text.replace(&format!("{{{}}}", key), &render(value));
            }
        }
        Ok(NodeOutput::single(text))
    }
}

impl BuiltinNode for TemplateNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(canonical_node_type(module_path!(), "TemplateNode"))
            .with_description("Render a text template")
            .with_category("text")
            .property(PropertyDef::new("template", TypeMetadata::str()).with_default(""))
            .property(PropertyDef::new(
                "values",
                TypeMetadata::dict(TypeMetadata::str(), TypeMetadata::any()),
            ))
            .output(OutputSlot::new("output", TypeMetadata::str()))
    }
}

pub type TemplateNodeFactory = BuiltinFactory<TemplateNode>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn render_stringifies_non_text() {
        assert_eq!(render(&Value::from("x")), "x");
        assert_eq!(render(&Value::Int(3)), "3");
        assert_eq!(render(&Value::Null), "");
        assert_eq!(
            render(&Value::Map(HashMap::from([("k".to_string(), Value::Bool(true))]))),
            r#"{"k":true}"#
        );
    }
}
