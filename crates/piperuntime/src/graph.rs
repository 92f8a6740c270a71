use crate::registry::{NodeFactory, NodeRegistry};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use pipecore::{
    is_connectable, GraphError, GraphSpec, HandleRef, NodeDescriptor, NodeError, NodeKind,
    TypeMetadata, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Fresh random identifier (128-bit, hex).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One vertex of a graph, bound to its node type.
#[derive(Clone)]
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
    pub properties: HashMap<String, Value>,
    pub parent_id: Option<String>,
    /// Editor state; carried through untouched
    pub ui_properties: Option<serde_json::Value>,
    factory: Arc<dyn NodeFactory>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, factory: Arc<dyn NodeFactory>) -> Self {
        let descriptor = factory.descriptor();
        Self {
            id: id.into(),
            node_type: descriptor.node_type.clone(),
            properties: descriptor.default_properties(),
            parent_id: None,
            ui_properties: None,
            factory,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        self.factory.descriptor()
    }

    pub fn factory(&self) -> &Arc<dyn NodeFactory> {
        &self.factory
    }

    pub fn kind(&self) -> NodeKind {
        self.descriptor().kind
    }

    /// The `name` property carried by workflow inputs and outputs.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }

    /// Set a property after checking the value against its declared type.
    /// Integers assigned to `float` properties are widened.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), NodeError> {
        let property = self
            .descriptor()
            .find_property(name)
            .ok_or_else(|| NodeError::UnknownProperty(name.to_string()))?;

        if !property.type_metadata.accepts(&value) {
            return Err(NodeError::InvalidInputType {
                field: name.to_string(),
                expected: property.type_metadata.to_string(),
                actual: value.type_name().to_string(),
            });
        }

        let value = match value {
            Value::Int(n) if property.type_metadata.is(pipecore::types::FLOAT) => {
                Value::Float(n as f64)
            }
            other => other,
        };
        self.properties.insert(name.to_string(), value);
        Ok(())
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("properties", &self.properties)
            .field("parent_id", &self.parent_id)
            .finish()
    }
}

/// Validated connection between an output slot and an input property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    pub target: String,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
}

/// Nodes and edges of one run (or of a loop body)
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from parts that were already validated.
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Build and validate a graph from its serialized form.
    pub fn from_spec(spec: &GraphSpec, registry: &NodeRegistry) -> Result<Self, GraphError> {
        let mut graph = Graph::new();

        for (index, node_spec) in spec.nodes.iter().enumerate() {
            let id = node_spec
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or(GraphError::MissingNodeId { index })?;
            if graph.contains(id) {
                return Err(GraphError::DuplicateNodeId(id.to_string()));
            }

            let mut node = registry.create_node(id, &node_spec.node_type, &node_spec.data)?;
            node.parent_id = node_spec.parent_id.clone();
            node.ui_properties = node_spec.ui_properties.clone();
            graph.nodes.push(node);
        }

        for edge_spec in &spec.edges {
            let source_handle = match &edge_spec.source_handle {
                HandleRef::Name(name) => name.clone(),
                HandleRef::Index(index) => {
                    let source = graph.find_node(&edge_spec.source)?;
                    source
                        .descriptor()
                        .outputs
                        .get(*index)
                        .map(|slot| slot.name.clone())
                        .ok_or_else(|| GraphError::OutputIndexOutOfRange {
                            node_id: edge_spec.source.clone(),
                            index: *index,
                        })?
                }
            };

            graph.check_edge(
                &edge_spec.source,
                &source_handle,
                &edge_spec.target,
                &edge_spec.target_handle,
            )?;
            graph.edges.push(Edge {
                id: edge_spec.id.clone().unwrap_or_else(new_id),
                source: edge_spec.source.clone(),
                source_handle,
                target: edge_spec.target.clone(),
                target_handle: edge_spec.target_handle.clone(),
            });
        }

        graph.validate_loops()?;
        tracing::debug!(
            "Built graph with {} nodes and {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Append a node, generating an id if it has none.
    pub fn add_node(&mut self, mut node: GraphNode) -> Result<String, GraphError> {
        if node.id.is_empty() {
            node.id = new_id();
        }
        if self.contains(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Connect `source.source_handle` to `target.target_handle` after
    /// checking both ports exist and their types are compatible.
    pub fn add_edge(
        &mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Result<&Edge, GraphError> {
        self.check_edge(source, source_handle, target, target_handle)?;
        self.edges.push(Edge {
            id: new_id(),
            source: source.to_string(),
            source_handle: source_handle.to_string(),
            target: target.to_string(),
            target_handle: target_handle.to_string(),
        });
        Ok(&self.edges[self.edges.len() - 1])
    }

    fn check_edge(
        &self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Result<(), GraphError> {
        let source_node = self.find_node(source)?;
        let target_node = self.find_node(target)?;

        let output = source_node
            .descriptor()
            .find_output(source_handle)
            .ok_or_else(|| GraphError::UnknownHandle {
                node_id: source.to_string(),
                node_type: source_node.node_type.clone(),
                direction: "output",
                handle: source_handle.to_string(),
            })?;
        let input = target_node
            .descriptor()
            .find_property(target_handle)
            .ok_or_else(|| GraphError::UnknownHandle {
                node_id: target.to_string(),
                node_type: target_node.node_type.clone(),
                direction: "input",
                handle: target_handle.to_string(),
            })?;

        if let Some(existing) = self.find_input_edge(target, target_handle) {
            return Err(GraphError::InputAlreadyConnected {
                node_id: target.to_string(),
                handle: target_handle.to_string(),
                existing: format!("{}.{}", existing.source, existing.source_handle),
            });
        }

        if !is_connectable(&output.type_metadata, &input.type_metadata) {
            return Err(incompatible(
                source,
                source_handle,
                &output.type_metadata,
                target,
                target_handle,
                &input.type_metadata,
            ));
        }
        Ok(())
    }

    pub fn find_node(&self, id: &str) -> Result<&GraphNode, GraphError> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    pub fn find_node_mut(&mut self, id: &str) -> Result<&mut GraphNode, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Workflow input nodes
    pub fn inputs(&self) -> Vec<&GraphNode> {
        self.nodes_of_kind(NodeKind::WorkflowInput)
    }

    /// Workflow output nodes
    pub fn outputs(&self) -> Vec<&GraphNode> {
        self.nodes_of_kind(NodeKind::WorkflowOutput)
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&GraphNode> {
        self.nodes.iter().filter(|n| n.kind() == kind).collect()
    }

    /// The edge feeding `node_id.handle`, if any
    pub fn find_input_edge(&self, node_id: &str, handle: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.target == node_id && e.target_handle == handle)
    }

    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, GraphError> {
        topological_sort(&self.edges, &self.nodes)
    }

    /// Level sort restricted to nodes whose `parent_id` equals `parent_id`.
    pub fn topological_sort_scoped(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<Vec<String>>, GraphError> {
        let scoped: Vec<GraphNode> = self
            .nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == parent_id)
            .cloned()
            .collect();
        topological_sort(&self.edges, &scoped)
    }

    /// The body of `start` up to and including `stop`.
    pub fn subgraph(&self, start: &str, stop: Option<&str>) -> Result<Graph, GraphError> {
        self.find_node(start)?;
        let (edges, nodes) = subgraph(&self.edges, &self.nodes, start, stop);
        Ok(Graph::from_parts(nodes, edges))
    }

    /// The loop-output node collecting results for `loop_id`, if any.
    pub fn loop_output_for(&self, loop_id: &str) -> Result<Option<&GraphNode>, GraphError> {
        find_loop_output(&self.edges, &self.nodes, loop_id)
    }

    fn validate_loops(&self) -> Result<(), GraphError> {
        for node in self.nodes.iter().filter(|n| n.kind() == NodeKind::Loop) {
            self.loop_output_for(&node.id)?;
        }
        Ok(())
    }
}

fn incompatible(
    source: &str,
    source_handle: &str,
    source_type: &TypeMetadata,
    target: &str,
    target_handle: &str,
    target_type: &TypeMetadata,
) -> GraphError {
    GraphError::IncompatibleEdge {
        source_node: source.to_string(),
        source_handle: source_handle.to_string(),
        source_type: source_type.to_string(),
        target_node: target.to_string(),
        target_handle: target_handle.to_string(),
        target_type: target_type.to_string(),
    }
}

fn index_graph<'a>(
    edges: &'a [Edge],
    nodes: &'a [GraphNode],
) -> (DiGraph<&'a str, ()>, HashMap<&'a str, NodeIndex>) {
    let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut index = HashMap::with_capacity(nodes.len());
    for node in nodes {
        index.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for edge in edges {
        if let (Some(&s), Some(&t)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            graph.add_edge(s, t, ());
        }
    }
    (graph, index)
}

/// Group nodes into levels: every edge goes from an earlier level to a
/// later one, so the nodes of one level can run concurrently.
///
/// Edges whose endpoints are not both in `nodes` are ignored. Within a
/// level, nodes keep their order in `nodes`. A cycle is an error naming the
/// first node (in `nodes` order) that could not be scheduled.
pub fn topological_sort(
    edges: &[Edge],
    nodes: &[GraphNode],
) -> Result<Vec<Vec<String>>, GraphError> {
    let (graph, _) = index_graph(edges, nodes);
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut levels = Vec::new();
    let mut scheduled = 0;
    let mut level: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    while !level.is_empty() {
        let mut next = Vec::new();
        for &idx in &level {
            for target in graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[target.index()] -= 1;
                if in_degree[target.index()] == 0 {
                    next.push(target);
                }
            }
        }
        scheduled += level.len();
        levels.push(level.iter().map(|idx| graph[*idx].to_string()).collect());
        next.sort();
        level = next;
    }

    if scheduled < graph.node_count() {
        if let Some(idx) = graph.node_indices().find(|idx| in_degree[idx.index()] > 0) {
            return Err(GraphError::CyclicDependency {
                node_id: graph[idx].to_string(),
            });
        }
    }
    Ok(levels)
}

/// Nodes reachable from `start` (walking edges forward) and the edges among
/// them. The walk does not continue past `stop`, though `stop` itself is
/// included.
pub fn subgraph(
    edges: &[Edge],
    nodes: &[GraphNode],
    start: &str,
    stop: Option<&str>,
) -> (Vec<Edge>, Vec<GraphNode>) {
    let (graph, index) = index_graph(edges, nodes);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<NodeIndex> = index.get(start).copied().into_iter().collect();

    while let Some(idx) = stack.pop() {
        let id = graph[idx];
        if !visited.insert(id) || Some(id) == stop {
            continue;
        }
        stack.extend(
            graph
                .neighbors_directed(idx, Direction::Outgoing)
                .filter(|next| !visited.contains(graph[*next])),
        );
    }

    let sub_edges = edges
        .iter()
        .filter(|e| visited.contains(e.source.as_str()) && visited.contains(e.target.as_str()))
        .cloned()
        .collect();
    let sub_nodes = nodes
        .iter()
        .filter(|n| visited.contains(n.id.as_str()))
        .cloned()
        .collect();
    (sub_edges, sub_nodes)
}

/// Resolve the loop-output node paired with `loop_id`.
///
/// Candidates are loop-output nodes downstream of the loop. Candidates whose
/// `parent_id` is the loop take precedence; more than one remaining
/// candidate is an error.
pub fn find_loop_output<'a>(
    edges: &[Edge],
    nodes: &'a [GraphNode],
    loop_id: &str,
) -> Result<Option<&'a GraphNode>, GraphError> {
    let (_, reachable) = subgraph(edges, nodes, loop_id, None);
    let reachable: HashSet<&str> = reachable.iter().map(|n| n.id.as_str()).collect();

    let candidates: Vec<&GraphNode> = nodes
        .iter()
        .filter(|n| n.kind() == NodeKind::LoopOutput && reachable.contains(n.id.as_str()))
        .collect();
    let scoped: Vec<&GraphNode> = candidates
        .iter()
        .copied()
        .filter(|n| n.parent_id.as_deref() == Some(loop_id))
        .collect();
    let pool = if scoped.is_empty() { candidates } else { scoped };

    match pool.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        many => Err(GraphError::MultipleLoopOutputs {
            loop_id: loop_id.to_string(),
            candidates: many.iter().map(|n| n.id.clone()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipecore::{
        EdgeSpec, Node, NodeContext, NodeOutput, NodeSpec, OutputSlot, PropertyDef,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct Inert;

    #[async_trait]
    impl Node for Inert {
        async fn process(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::new())
        }
    }

    struct TestFactory(NodeDescriptor);

    impl NodeFactory for TestFactory {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.0
        }

        fn create(&self) -> Box<dyn Node> {
            Box::new(Inert)
        }
    }

    const FAN_IN: usize = 25;

    fn any_descriptor() -> NodeDescriptor {
        let mut descriptor = NodeDescriptor::new("test.Any")
            .property(PropertyDef::new("input", TypeMetadata::any()))
            .output(OutputSlot::new("output", TypeMetadata::any()));
        for i in 1..FAN_IN {
            descriptor = descriptor.property(PropertyDef::new(format!("in{}", i), TypeMetadata::any()));
        }
        descriptor
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        let descriptors = vec![
            any_descriptor(),
            NodeDescriptor::new("test.Int")
                .property(PropertyDef::new("input", TypeMetadata::int()).with_default(0i64))
                .property(PropertyDef::new("scale", TypeMetadata::float()))
                .output(OutputSlot::new("output", TypeMetadata::int()))
                .output(OutputSlot::new("text", TypeMetadata::str())),
            NodeDescriptor::new("test.Text")
                .property(PropertyDef::new("input", TypeMetadata::str()))
                .output(OutputSlot::new("output", TypeMetadata::str())),
            NodeDescriptor::new("test.Loop")
                .with_kind(NodeKind::Loop)
                .property(PropertyDef::new("items", TypeMetadata::list(TypeMetadata::any())))
                .output(OutputSlot::new("output", TypeMetadata::any())),
            NodeDescriptor::new("test.LoopOutput")
                .with_kind(NodeKind::LoopOutput)
                .property(PropertyDef::new("input", TypeMetadata::any()))
                .output(OutputSlot::new("output", TypeMetadata::any())),
        ];
        for descriptor in descriptors {
            registry.register(Arc::new(TestFactory(descriptor)));
        }
        registry
    }

    fn node(registry: &NodeRegistry, id: &str, node_type: &str) -> GraphNode {
        registry.create_node(id, node_type, &HashMap::new()).unwrap()
    }

    fn chain_graph(ids: &[&str], links: &[(&str, &str)]) -> Graph {
        let registry = registry();
        let mut graph = Graph::new();
        for id in ids {
            graph.add_node(node(&registry, id, "test.Any")).unwrap();
        }
        let mut fan_in: HashMap<&str, usize> = HashMap::new();
        for (source, target) in links {
            let seen = fan_in.entry(*target).or_default();
            let handle = if *seen == 0 { "input".to_string() } else { format!("in{}", seen) };
            *seen += 1;
            graph.add_edge(source, "output", target, &handle).unwrap();
        }
        graph
    }

    #[test]
    fn diamond_sorts_into_three_levels() {
        let graph = chain_graph(
            &["1", "2", "3", "4"],
            &[("1", "2"), ("1", "3"), ("2", "4"), ("3", "4")],
        );
        assert_eq!(
            graph.topological_sort().unwrap(),
            vec![vec!["1"], vec!["2", "3"], vec!["4"]]
        );
    }

    #[test]
    fn chain_sorts_one_node_per_level() {
        let graph = chain_graph(&["1", "2", "3"], &[("1", "2"), ("2", "3")]);
        assert_eq!(
            graph.topological_sort().unwrap(),
            vec![vec!["1"], vec!["2"], vec!["3"]]
        );
    }

    #[test]
    fn empty_and_single_node_graphs() {
        assert!(Graph::new().topological_sort().unwrap().is_empty());
        let graph = chain_graph(&["solo"], &[]);
        assert_eq!(graph.topological_sort().unwrap(), vec![vec!["solo"]]);
    }

    #[test]
    fn cycle_is_an_error() {
        let graph = chain_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        match graph.topological_sort() {
            Err(GraphError::CyclicDependency { node_id }) => assert_eq!(node_id, "b"),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = chain_graph(&["a"], &[("a", "a")]);
        assert!(matches!(
            graph.topological_sort(),
            Err(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn random_dags_never_share_a_level_across_an_edge() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let count = rng.gen_range(0..25);
            let ids: Vec<String> = (0..count).map(|i| format!("n{}", i)).collect();
            let mut links = Vec::new();
            for i in 0..count {
                for j in (i + 1)..count {
                    if rng.gen_bool(0.15) {
                        links.push((ids[i].clone(), ids[j].clone()));
                    }
                }
            }
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let link_refs: Vec<(&str, &str)> =
                links.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
            let graph = chain_graph(&id_refs, &link_refs);

            let levels = graph.topological_sort().unwrap();
            let level_of: HashMap<&str, usize> = levels
                .iter()
                .enumerate()
                .flat_map(|(i, level)| level.iter().map(move |id| (id.as_str(), i)))
                .collect();

            assert_eq!(level_of.len(), count, "every node is scheduled exactly once");
            for (source, target) in &links {
                assert!(
                    level_of[source.as_str()] < level_of[target.as_str()],
                    "edge {} -> {} must cross levels forward",
                    source,
                    target
                );
            }
        }
    }

    #[test]
    fn scoped_sort_only_sees_its_children() {
        let registry = registry();
        let mut graph = Graph::new();
        graph.add_node(node(&registry, "top", "test.Any")).unwrap();
        graph
            .add_node(node(&registry, "child1", "test.Any").with_parent("group"))
            .unwrap();
        graph
            .add_node(node(&registry, "child2", "test.Any").with_parent("group"))
            .unwrap();
        graph.add_edge("top", "output", "child1", "input").unwrap();
        graph.add_edge("child1", "output", "child2", "input").unwrap();

        assert_eq!(
            graph.topological_sort_scoped(Some("group")).unwrap(),
            vec![vec!["child1"], vec!["child2"]]
        );
        assert_eq!(graph.topological_sort_scoped(None).unwrap(), vec![vec!["top"]]);
    }

    #[test]
    fn subgraph_stops_at_stop_node() {
        let graph = chain_graph(
            &["start", "a", "stop", "c"],
            &[("start", "a"), ("a", "stop"), ("stop", "c")],
        );
        let body = graph.subgraph("start", Some("stop")).unwrap();
        let ids: Vec<&str> = body.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["start", "a", "stop"]);

        let links: Vec<(&str, &str)> = body
            .edges()
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(links, vec![("start", "a"), ("a", "stop")]);
    }

    #[test]
    fn subgraph_keeps_side_branches() {
        let graph = chain_graph(
            &["start", "a", "side", "stop"],
            &[("start", "a"), ("a", "stop"), ("start", "side")],
        );
        let body = graph.subgraph("start", Some("stop")).unwrap();
        assert_eq!(body.nodes().len(), 4);
        assert!(graph.subgraph("missing", None).is_err());
    }

    #[test]
    fn add_edge_rejects_incompatible_types() {
        let registry = registry();
        let mut graph = Graph::new();
        graph.add_node(node(&registry, "i", "test.Int")).unwrap();
        graph.add_node(node(&registry, "t", "test.Text")).unwrap();

        let err = graph.add_edge("i", "output", "t", "input").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("int") && message.contains("str"), "{}", message);

        graph.add_edge("i", "text", "t", "input").unwrap();
        assert_eq!(graph.find_input_edge("t", "input").unwrap().source_handle, "text");
        assert!(graph.find_input_edge("i", "input").is_none());
    }

    #[test]
    fn add_edge_rejects_unknown_ports_and_nodes() {
        let graph_err = |source: &str, sh: &str, target: &str, th: &str| {
            let mut graph = chain_graph(&["a", "b"], &[]);
            graph.add_edge(source, sh, target, th).unwrap_err()
        };
        assert!(matches!(graph_err("a", "nope", "b", "input"), GraphError::UnknownHandle { direction: "output", .. }));
        assert!(matches!(graph_err("a", "output", "b", "nope"), GraphError::UnknownHandle { direction: "input", .. }));
        assert!(matches!(graph_err("a", "output", "zzz", "input"), GraphError::NodeNotFound(_)));
    }

    #[test]
    fn add_node_generates_ids() {
        let registry = registry();
        let mut graph = Graph::new();
        let id = graph.add_node(node(&registry, "", "test.Any")).unwrap();
        assert_eq!(id.len(), 32);
        assert!(graph.find_node(&id).is_ok());
        assert!(graph.find_node("other").is_err());
    }

    #[test]
    fn from_spec_resolves_index_handles() {
        let spec = GraphSpec {
            nodes: vec![
                NodeSpec::new("i", "test.Int"),
                NodeSpec::new("t", "test.Text"),
            ],
            edges: vec![EdgeSpec {
                id: None,
                source: "i".into(),
                source_handle: HandleRef::Index(1),
                target: "t".into(),
                target_handle: "input".into(),
            }],
        };
        let graph = Graph::from_spec(&spec, &registry()).unwrap();
        assert_eq!(graph.edges()[0].source_handle, "text");

        let mut bad = spec.clone();
        bad.edges[0].source_handle = HandleRef::Index(9);
        assert!(matches!(
            Graph::from_spec(&bad, &registry()),
            Err(GraphError::OutputIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn from_spec_structural_errors() {
        let registry = registry();

        let mut missing_id = GraphSpec::new().with_node(NodeSpec::new("a", "test.Any"));
        missing_id.nodes[0].id = None;
        assert!(matches!(
            Graph::from_spec(&missing_id, &registry),
            Err(GraphError::MissingNodeId { index: 0 })
        ));

        let unknown = GraphSpec::new().with_node(NodeSpec::new("a", "test.Nope"));
        assert!(matches!(
            Graph::from_spec(&unknown, &registry),
            Err(GraphError::UnknownNodeType { .. })
        ));

        let duplicate = GraphSpec::new()
            .with_node(NodeSpec::new("a", "test.Any"))
            .with_node(NodeSpec::new("a", "test.Any"));
        assert!(matches!(
            Graph::from_spec(&duplicate, &registry),
            Err(GraphError::DuplicateNodeId(_))
        ));

        let dangling = GraphSpec::new()
            .with_node(NodeSpec::new("a", "test.Any"))
            .with_edge("a", "output", "ghost", "input");
        assert!(matches!(
            Graph::from_spec(&dangling, &registry),
            Err(GraphError::NodeNotFound(_))
        ));

        let bad_data = GraphSpec::new().with_node(NodeSpec::new("a", "test.Int").with_data("input", "x"));
        assert!(matches!(
            Graph::from_spec(&bad_data, &registry),
            Err(GraphError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn from_spec_rejects_a_second_edge_into_one_input() {
        let spec = GraphSpec::new()
            .with_node(NodeSpec::new("a", "test.Any"))
            .with_node(NodeSpec::new("b", "test.Any"))
            .with_node(NodeSpec::new("out", "test.Any"))
            .with_edge("a", "output", "out", "input")
            .with_edge("b", "output", "out", "input");

        match Graph::from_spec(&spec, &registry()) {
            Err(GraphError::InputAlreadyConnected { node_id, handle, existing }) => {
                assert_eq!(node_id, "out");
                assert_eq!(handle, "input");
                assert_eq!(existing, "a.output");
            }
            other => panic!("expected a duplicate input error, got {:?}", other.map(|_| ())),
        }

        let mut graph = chain_graph(&["a", "b", "out"], &[("a", "out")]);
        assert!(matches!(
            graph.add_edge("b", "output", "out", "input"),
            Err(GraphError::InputAlreadyConnected { .. })
        ));
        assert_eq!(graph.find_input_edge("out", "input").unwrap().source, "a");
    }

    #[test]
    fn assign_widens_ints_for_float_properties() {
        let registry = registry();
        let mut n = node(&registry, "i", "test.Int");
        n.assign("scale", Value::Int(2)).unwrap();
        assert_eq!(n.properties.get("scale"), Some(&Value::Float(2.0)));

        let err = n.assign("input", Value::from("x")).unwrap_err();
        assert_eq!(
            err,
            NodeError::InvalidInputType {
                field: "input".into(),
                expected: "int".into(),
                actual: "str".into(),
            }
        );
        assert!(matches!(
            n.assign("nope", Value::Null),
            Err(NodeError::UnknownProperty(_))
        ));
    }

    #[test]
    fn loop_output_resolution() {
        let registry = registry();
        let spec = GraphSpec::new()
            .with_node(NodeSpec::new("loop", "test.Loop"))
            .with_node(NodeSpec::new("body", "test.Any"))
            .with_node(NodeSpec::new("out", "test.LoopOutput"))
            .with_edge("loop", "output", "body", "input")
            .with_edge("body", "output", "out", "input");
        let graph = Graph::from_spec(&spec, &registry).unwrap();
        assert_eq!(graph.loop_output_for("loop").unwrap().unwrap().id, "out");

        let ambiguous = spec
            .clone()
            .with_node(NodeSpec::new("out2", "test.LoopOutput"))
            .with_edge("body", "output", "out2", "input");
        assert!(matches!(
            Graph::from_spec(&ambiguous, &registry),
            Err(GraphError::MultipleLoopOutputs { .. })
        ));

        let mut scoped = ambiguous.clone();
        scoped.nodes[2].parent_id = Some("loop".into());
        let graph = Graph::from_spec(&scoped, &registry).unwrap();
        assert_eq!(graph.loop_output_for("loop").unwrap().unwrap().id, "out");

        let unrelated = GraphSpec::new()
            .with_node(NodeSpec::new("loop", "test.Loop"))
            .with_node(NodeSpec::new("elsewhere", "test.LoopOutput"));
        let graph = Graph::from_spec(&unrelated, &registry).unwrap();
        assert!(graph.loop_output_for("loop").unwrap().is_none());
    }
}
