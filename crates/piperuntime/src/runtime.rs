use crate::context::ProcessingContext;
use crate::graph::{new_id, Graph};
use crate::registry::NodeRegistry;
use crate::runner::{RunnerOptions, WorkflowRunner};
use pipecore::{ExecutionEvent, GraphError, GraphSpec, JobRequest, JobStatus, PipeError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main entry point: a registry plus the limits every run is given
pub struct PipeRuntime {
    registry: Arc<NodeRegistry>,
    config: RuntimeConfig,
}

impl PipeRuntime {
    pub fn new(registry: NodeRegistry) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: NodeRegistry, config: RuntimeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    /// Get access to the node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A root context for `request`, seeded from the configuration.
    /// A job id is generated when the request has none.
    pub fn context_for(&self, request: &JobRequest) -> ProcessingContext {
        let job_id = request.job_id.clone().unwrap_or_else(new_id);
        ProcessingContext::builder(&request.user_id, &request.workflow_id, job_id)
            .capabilities(self.config.capabilities.iter().cloned())
            .event_buffer_size(self.config.event_buffer_size)
            .max_parallel_nodes(self.config.max_parallel_nodes)
            .build()
    }

    /// Execute `request` to completion, then report the job outcome on the
    /// context's event channel.
    pub async fn run(
        &self,
        request: &JobRequest,
        ctx: &mut ProcessingContext,
    ) -> Result<HashMap<String, Value>, PipeError> {
        let mut runner = WorkflowRunner::new(ctx.job_id.clone(), self.registry.clone())
            .with_options(self.config.runner_options());
        let outcome = runner.run(request, ctx).await;

        let (status, error) = match &outcome {
            Ok(_) => (JobStatus::Completed, None),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };
        ctx.post_message(ExecutionEvent::JobUpdate {
            job_id: ctx.job_id.clone(),
            status,
            error,
        })
        .await;
        outcome
    }

    /// Build and level-sort `spec` without running anything.
    pub fn validate(&self, spec: &GraphSpec) -> Result<Vec<Vec<String>>, GraphError> {
        let graph = Graph::from_spec(spec, &self.registry)?;
        graph.topological_sort()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    /// Per-node wall clock limit, none when absent
    pub node_timeout_ms: Option<u64>,
    pub max_error_length: usize,
    /// Capabilities granted to every run
    pub capabilities: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1024,
            node_timeout_ms: None,
            max_error_length: 1000,
            capabilities: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipeError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `PIPE_CAPABILITIES` (comma separated) and `PIPE_MAX_PARALLEL`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var("PIPE_CAPABILITIES").ok().as_deref(),
            std::env::var("PIPE_MAX_PARALLEL").ok().as_deref(),
        )
    }

    fn with_overrides(mut self, capabilities: Option<&str>, max_parallel: Option<&str>) -> Self {
        if let Some(list) = capabilities {
            self.capabilities = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = max_parallel {
            match raw.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => self.max_parallel_nodes = limit,
                _ => tracing::warn!("Ignoring invalid PIPE_MAX_PARALLEL value '{}'", raw),
            }
        }
        self
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            node_timeout: self.node_timeout_ms.map(Duration::from_millis),
            max_error_length: self.max_error_length,
        }
    }
}
