use crate::events::EventSender;
use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status carried by a [`NodeUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Completed,
    Error,
}

/// One node lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeUpdate {
    pub fn running(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            status: NodeStatus::Running,
            result: None,
            error: None,
            started_at,
            completed_at: None,
        }
    }

    pub fn completed(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        result: HashMap<String, Value>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: NodeStatus::Completed,
            result: Some(result),
            completed_at: Some(Utc::now()),
            ..Self::running(node_id, node_type, started_at)
        }
    }

    pub fn error(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: NodeStatus::Error,
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
            ..Self::running(node_id, node_type, started_at)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    NodeUpdate(NodeUpdate),
    NodeProgress {
        node_id: String,
        progress: u64,
        total: u64,
    },
    /// Emitted once, after every level of a successful run
    WorkflowUpdate { result: HashMap<String, Value> },
    JobUpdate {
        job_id: String,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn as_node_update(&self) -> Option<&NodeUpdate> {
        match self {
            ExecutionEvent::NodeUpdate(update) => Some(update),
            _ => None,
        }
    }
}

/// Event emitter handed to a node so it can report progress
#[derive(Clone)]
pub struct EventEmitter {
    node_id: String,
    sender: EventSender,
}

impl EventEmitter {
    pub fn new(node_id: impl Into<String>, sender: EventSender) -> Self {
        Self {
            node_id: node_id.into(),
            sender,
        }
    }

    /// Report `progress` out of `total`. Never blocks; dropped when the backlog is full.
    pub fn progress(&self, progress: u64, total: u64) {
        self.sender.try_post(ExecutionEvent::NodeProgress {
            node_id: self.node_id.clone(),
            progress,
            total,
        });
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}
