//! Core abstractions for the pipeline engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: port values and types, the node trait, the
//! serialized request model, events and errors. It has no scheduler.

mod error;
pub mod events;
mod node;
pub mod types;
mod value;
mod workflow;

pub use error::{GraphError, NodeError, PipeError};
pub use events::*;
pub use node::{
    merge_properties, Node, NodeContext, NodeDescriptor, NodeKind, NodeOutput, OutputSlot,
    PropertyDef, DEFAULT_OUTPUT, RESERVED_PROPERTIES,
};
pub use types::{is_connectable, TypeMetadata};
pub use value::{AssetRef, OpaqueHandle, Value};
pub use workflow::{EdgeSpec, GraphSpec, HandleRef, JobRequest, NodeSpec};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipeError>;
