use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node {node_id} failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("Missing capabilities: {}", .0.join(", "))]
    MissingCapabilities(Vec<String>),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipeError {
    pub fn node(node_id: impl Into<String>, source: NodeError) -> Self {
        Self::NodeFailed {
            node_id: node_id.into(),
            source,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Invalid value for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid graph: {0}")]
    Invalid(String),

    #[error("Node at position {index} has no id")]
    MissingNodeId { index: usize },

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type '{node_type}' for node {node_id}")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Node {node_id} ({node_type}) has no {direction} named '{handle}'")]
    UnknownHandle {
        node_id: String,
        node_type: String,
        direction: &'static str,
        handle: String,
    },

    #[error("Node {node_id} has no output at index {index}")]
    OutputIndexOutOfRange { node_id: String, index: usize },

    #[error(
        "Cannot connect {source_node}.{source_handle} ({source_type}) \
         to {target_node}.{target_handle} ({target_type})"
    )]
    IncompatibleEdge {
        source_node: String,
        source_handle: String,
        source_type: String,
        target_node: String,
        target_handle: String,
        target_type: String,
    },

    #[error("Input {node_id}.{handle} is already connected from {existing}")]
    InputAlreadyConnected {
        node_id: String,
        handle: String,
        existing: String,
    },

    #[error("Invalid property on node {node_id}: {source}")]
    InvalidProperty {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("No workflow input named '{0}'")]
    UnknownParameter(String),

    #[error("Loop {loop_id} has more than one loop output: {}", .candidates.join(", "))]
    MultipleLoopOutputs {
        loop_id: String,
        candidates: Vec<String>,
    },

    #[error("Cyclic dependency detected at node {node_id}")]
    CyclicDependency { node_id: String },
}
