//! Workflow execution runtime
//!
//! This crate turns a serialized job request into a validated graph and
//! runs it: the node registry, graph construction and level sort, the
//! per-run processing context and the level-parallel runner.

mod context;
mod graph;
mod registry;
mod runner;
mod runtime;

pub use context::{ContextBuilder, NodeResults, ProcessingContext};
pub use graph::{find_loop_output, new_id, subgraph, topological_sort, Edge, Graph, GraphNode};
pub use registry::{canonical_node_type, NodeFactory, NodeRegistry};
pub use runner::{RunnerOptions, RunnerStatus, WorkflowRunner};
pub use runtime::{PipeRuntime, RuntimeConfig};
