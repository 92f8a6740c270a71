// crates/pipecore/src/events/mod.rs

mod base;
mod channel;

pub use base::{EventEmitter, ExecutionEvent, JobStatus, NodeStatus, NodeUpdate};
pub use channel::{event_channel, EventReceiver, EventSender};
