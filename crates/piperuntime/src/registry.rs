use crate::graph::GraphNode;
use pipecore::{GraphError, Node, NodeDescriptor, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Ports, role and requirements of the node type
    fn descriptor(&self) -> &NodeDescriptor;

    /// Create a fresh instance to run one node execution
    fn create(&self) -> Box<dyn Node>;

    /// Get node type identifier
    fn node_type(&self) -> &str {
        &self.descriptor().node_type
    }
}

/// Canonical dotted name of a node type.
///
/// The namespace is the module path without its crate prefix, and the type
/// name loses a trailing `Node`: `("pipenodes::math", "AddNode")` gives
/// `"math.Add"`.
pub fn canonical_node_type(module_path: &str, type_name: &str) -> String {
    let namespace = match module_path.split_once("::") {
        Some((_, rest)) => rest.replace("::", "."),
        None => String::new(),
    };
    let name = match type_name.strip_suffix("Node") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => type_name,
    };
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Registry of available node types
#[derive(Clone)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory. A later registration of the same type
    /// replaces the earlier one, which is returned.
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) -> Option<Arc<dyn NodeFactory>> {
        let node_type = factory.node_type().to_string();
        tracing::debug!("Registering node type: {}", node_type);
        let previous = self.factories.insert(node_type.clone(), factory);
        if previous.is_some() {
            tracing::warn!("Node type {} registered twice, keeping the latest", node_type);
        }
        previous
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeFactory>> {
        self.factories.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get descriptor for a node type
    pub fn descriptor(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.factories.get(node_type).map(|f| f.descriptor())
    }

    /// All registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a graph vertex of the given type with its default properties,
    /// then apply `properties` on top.
    pub fn create_node(
        &self,
        node_id: impl Into<String>,
        node_type: &str,
        properties: &HashMap<String, Value>,
    ) -> Result<GraphNode, GraphError> {
        let node_id = node_id.into();
        let factory = self
            .get(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType {
                node_id: node_id.clone(),
                node_type: node_type.to_string(),
            })?;

        let mut node = GraphNode::new(node_id, factory);
        for (name, value) in properties {
            if node.descriptor().find_property(name).is_none() {
                tracing::warn!(
                    "Ignoring unknown property '{}' on node {} ({})",
                    name,
                    node.id,
                    node_type
                );
                continue;
            }
            node.assign(name, value.clone())
                .map_err(|source| GraphError::InvalidProperty {
                    node_id: node.id.clone(),
                    source,
                })?;
        }
        Ok(node)
    }

    /// Union of the capabilities every node in `nodes` declares.
    pub fn requires_capabilities(&self, nodes: &[GraphNode]) -> BTreeSet<String> {
        nodes
            .iter()
            .flat_map(|node| node.descriptor().capabilities.iter().cloned())
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipecore::{NodeContext, NodeError, NodeOutput, PropertyDef, TypeMetadata};

    struct Noop;

    #[async_trait]
    impl Node for Noop {
        async fn process(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::new())
        }
    }

    struct NoopFactory(NodeDescriptor);

    impl NodeFactory for NoopFactory {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.0
        }

        fn create(&self) -> Box<dyn Node> {
            Box::new(Noop)
        }
    }

    fn factory(node_type: &str, description: &str) -> Arc<dyn NodeFactory> {
        Arc::new(NoopFactory(
            NodeDescriptor::new(node_type)
                .with_description(description)
                .property(PropertyDef::new("count", TypeMetadata::int()).with_default(1i64)),
        ))
    }

    #[test]
    fn canonical_names_strip_crate_and_suffix() {
        assert_eq!(canonical_node_type("pipenodes::math", "AddNode"), "math.Add");
        assert_eq!(canonical_node_type("pipenodes::image::filters", "Blur"), "image.filters.Blur");
        assert_eq!(canonical_node_type("pipenodes", "Node"), "Node");
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register(factory("test.Noop", "first")).is_none());
        let previous = registry.register(factory("test.Noop", "second"));
        assert_eq!(previous.unwrap().descriptor().description, "first");
        assert_eq!(registry.descriptor("test.Noop").unwrap().description, "second");
        assert_eq!(registry.list_node_types(), vec!["test.Noop".to_string()]);
    }

    #[test]
    fn create_node_applies_defaults_and_checks_types() {
        let mut registry = NodeRegistry::new();
        registry.register(factory("test.Noop", ""));

        let node = registry.create_node("n1", "test.Noop", &HashMap::new()).unwrap();
        assert_eq!(node.properties.get("count"), Some(&Value::Int(1)));

        let bad = HashMap::from([("count".to_string(), Value::from("three"))]);
        assert!(matches!(
            registry.create_node("n2", "test.Noop", &bad),
            Err(GraphError::InvalidProperty { .. })
        ));

        assert!(matches!(
            registry.create_node("n3", "test.Missing", &HashMap::new()),
            Err(GraphError::UnknownNodeType { .. })
        ));
    }
}
