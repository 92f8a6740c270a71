use crate::context::ProcessingContext;
use crate::graph::{Graph, GraphNode};
use crate::registry::NodeRegistry;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use pipecore::{
    ExecutionEvent, GraphError, JobRequest, Node, NodeError, NodeKind, NodeOutput, NodeUpdate,
    PipeError, Value, DEFAULT_OUTPUT,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a runner. A runner executes exactly one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Per-node execution limits
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub node_timeout: Option<Duration>,
    /// Longest error message carried by an error `NodeUpdate`
    pub max_error_length: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            node_timeout: None,
            max_error_length: 1000,
        }
    }
}

/// Executes one job request level by level
pub struct WorkflowRunner {
    job_id: String,
    registry: Arc<NodeRegistry>,
    scheduler: Scheduler,
    status: RunnerStatus,
}

impl WorkflowRunner {
    pub fn new(job_id: impl Into<String>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            job_id: job_id.into(),
            registry,
            scheduler: Scheduler {
                options: Arc::new(RunnerOptions::default()),
            },
            status: RunnerStatus::Pending,
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.scheduler.options = Arc::new(options);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    /// Build the graph, check capabilities, bind parameters, run every level
    /// and collect the workflow outputs keyed by their `name`.
    pub async fn run(
        &mut self,
        request: &JobRequest,
        ctx: &mut ProcessingContext,
    ) -> Result<HashMap<String, Value>, PipeError> {
        if self.status != RunnerStatus::Pending {
            return Err(PipeError::Execution(format!(
                "Runner for job {} was already used",
                self.job_id
            )));
        }
        self.status = RunnerStatus::Running;

        let start = Instant::now();
        let outcome = self.execute(request, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => {
                self.status = RunnerStatus::Completed;
                tracing::info!("Job {} completed in {}ms", self.job_id, duration_ms);
            }
            Err(e) => {
                self.status = RunnerStatus::Failed;
                tracing::error!("Job {} failed after {}ms: {}", self.job_id, duration_ms, e);
            }
        }
        outcome
    }

    async fn execute(
        &self,
        request: &JobRequest,
        ctx: &mut ProcessingContext,
    ) -> Result<HashMap<String, Value>, PipeError> {
        let mut graph = Graph::from_spec(&request.graph, &self.registry)?;
        tracing::info!(
            "Starting job {}: {} nodes, {} edges",
            self.job_id,
            graph.nodes().len(),
            graph.edges().len()
        );

        let missing: Vec<String> = self
            .registry
            .requires_capabilities(graph.nodes())
            .into_iter()
            .filter(|capability| !ctx.has_capability(capability))
            .collect();
        if !missing.is_empty() {
            return Err(PipeError::MissingCapabilities(missing));
        }

        bind_params(&mut graph, &request.params)?;
        ctx.set_graph(graph);

        self.scheduler.process_graph(ctx.clone()).await?;

        let mut result = HashMap::new();
        for node in ctx.graph().outputs() {
            let name = node.name().unwrap_or(&node.id).to_string();
            let value = ctx
                .get_result(&node.id, DEFAULT_OUTPUT)
                .await
                .unwrap_or(Value::Null);
            result.insert(name, value);
        }

        ctx.post_message(ExecutionEvent::WorkflowUpdate {
            result: result.clone(),
        })
        .await;
        Ok(result)
    }

    /// Run every level of the context's graph.
    pub async fn process_graph(&self, ctx: &ProcessingContext) -> Result<(), PipeError> {
        self.scheduler.process_graph(ctx.clone()).await
    }

    /// Run a single node of the context's graph (a no-op once processed).
    pub async fn process_node(&self, ctx: &ProcessingContext, node_id: &str) -> Result<(), PipeError> {
        let node = ctx.graph().find_node(node_id)?.clone();
        self.scheduler.process_node(ctx, node).await
    }
}

/// Assign request parameters to the `value` of the matching input nodes.
fn bind_params(graph: &mut Graph, params: &HashMap<String, Value>) -> Result<(), GraphError> {
    for (name, value) in params {
        let node_id = graph
            .inputs()
            .into_iter()
            .find(|node| node.name() == Some(name.as_str()))
            .map(|node| node.id.clone())
            .ok_or_else(|| GraphError::UnknownParameter(name.clone()))?;

        graph
            .find_node_mut(&node_id)?
            .assign("value", value.clone())
            .map_err(|source| GraphError::InvalidProperty { node_id, source })?;
    }
    Ok(())
}

/// Client-safe projection of a node result: opaque handles dropped,
/// asset references flattened.
fn client_view(result: &HashMap<String, Value>) -> HashMap<String, Value> {
    result
        .iter()
        .filter_map(|(name, value)| value.to_client().map(|v| (name.clone(), v)))
        .collect()
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}

/// The part of the runner that node tasks carry with them.
#[derive(Clone)]
struct Scheduler {
    options: Arc<RunnerOptions>,
}

impl Scheduler {
    fn process_graph(&self, ctx: ProcessingContext) -> BoxFuture<'static, Result<(), PipeError>> {
        let scheduler = self.clone();
        async move {
            let levels = ctx.graph().topological_sort()?;
            tracing::debug!("Processing {} levels for job {}", levels.len(), ctx.job_id);

            for (depth, level) in levels.iter().enumerate() {
                if ctx.is_cancelled() {
                    return Err(PipeError::Cancelled);
                }

                let nodes = level
                    .iter()
                    .map(|id| ctx.graph().find_node(id).cloned())
                    .collect::<Result<Vec<GraphNode>, GraphError>>()?;
                tracing::debug!("Level {}: {:?}", depth, level);

                let handles: Vec<_> = nodes
                    .into_iter()
                    .map(|node| {
                        let scheduler = scheduler.clone();
                        let ctx = ctx.clone();
                        tokio::spawn(async move { scheduler.process_node(&ctx, node).await })
                    })
                    .collect();

                let mut first_error = None;
                for joined in join_all(handles).await {
                    let outcome = joined
                        .map_err(|e| PipeError::Execution(format!("Task join error: {}", e)))
                        .and_then(|result| result);
                    if let Err(e) = outcome {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
            }
            Ok::<(), PipeError>(())
        }
        .boxed()
    }

    async fn process_node(&self, ctx: &ProcessingContext, node: GraphNode) -> Result<(), PipeError> {
        if ctx.is_processed(&node.id).await {
            if node.kind() == NodeKind::Loop {
                let result = ctx.get_results(&node.id).await.unwrap_or_default();
                ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::completed(
                    &node.id,
                    &node.node_type,
                    client_view(&result),
                    Utc::now(),
                )))
                .await;
            }
            tracing::debug!("Skipping already processed node {}", node.id);
            return Ok(());
        }

        match node.kind() {
            NodeKind::Loop => self.run_loop_node(ctx, node).await,
            _ => self.process_regular_node(ctx, node).await,
        }
    }

    async fn assign_inputs(
        &self,
        ctx: &ProcessingContext,
        node: &mut GraphNode,
        started_at: DateTime<Utc>,
    ) -> Result<(), PipeError> {
        for (name, value) in ctx.get_node_inputs(&node.id).await {
            if let Err(e) = node.assign(&name, value) {
                return Err(self.fail(ctx, node, started_at, e).await);
            }
        }
        Ok(())
    }

    async fn process_regular_node(
        &self,
        ctx: &ProcessingContext,
        mut node: GraphNode,
    ) -> Result<(), PipeError> {
        let started_at = Utc::now();
        self.assign_inputs(ctx, &mut node, started_at).await?;

        ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::running(
            &node.id,
            &node.node_type,
            started_at,
        )))
        .await;
        tracing::debug!("Running node {} ({})", node.id, node.node_type);

        let instance = node.factory().create();
        let outcome = {
            let _permit = ctx
                .limiter()
                .acquire()
                .await
                .map_err(|e| PipeError::Execution(format!("Concurrency limiter closed: {}", e)))?;
            self.invoke(instance.as_ref(), ctx.node_context(&node)).await
        };

        let result = match outcome.and_then(|raw| instance.convert_output(raw)) {
            Ok(result) => result,
            Err(e) => return Err(self.fail(ctx, &node, started_at, e).await),
        };

        if node.kind() != NodeKind::LoopOutput {
            ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::completed(
                &node.id,
                &node.node_type,
                client_view(&result),
                started_at,
            )))
            .await;
        }

        ctx.set_result(&node.id, result).await;
        ctx.mark_processed(&node.id).await;
        tracing::debug!("Node {} completed", node.id);
        Ok(())
    }

    async fn invoke(
        &self,
        instance: &dyn Node,
        node_ctx: pipecore::NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let cancellation = node_ctx.cancellation.clone();
        let process = instance.process(node_ctx);
        let limited = async {
            match self.options.node_timeout {
                Some(limit) => tokio::time::timeout(limit, process)
                    .await
                    .unwrap_or_else(|_| {
                        Err(NodeError::Timeout {
                            millis: limit.as_millis() as u64,
                        })
                    }),
                None => process.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(NodeError::Cancelled),
            result = limited => result,
        }
    }

    /// Run the loop body once per item, sequentially, each time in a fresh
    /// child context seeded with the item as the loop node's output.
    async fn run_loop_node(
        &self,
        ctx: &ProcessingContext,
        mut loop_node: GraphNode,
    ) -> Result<(), PipeError> {
        let started_at = Utc::now();
        self.assign_inputs(ctx, &mut loop_node, started_at).await?;

        let items = match loop_node.properties.get("items") {
            Some(Value::List(items)) => items.clone(),
            Some(other) => {
                let error = NodeError::InvalidInputType {
                    field: "items".to_string(),
                    expected: "list".to_string(),
                    actual: other.type_name().to_string(),
                };
                return Err(self.fail(ctx, &loop_node, started_at, error).await);
            }
            None => {
                let error = NodeError::MissingInput("items".to_string());
                return Err(self.fail(ctx, &loop_node, started_at, error).await);
            }
        };

        let loop_output = ctx.graph().loop_output_for(&loop_node.id)?.cloned();
        let body = ctx
            .graph()
            .subgraph(&loop_node.id, loop_output.as_ref().map(|n| n.id.as_str()))?;

        ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::running(
            &loop_node.id,
            &loop_node.node_type,
            started_at,
        )))
        .await;
        tracing::info!(
            "Loop {} over {} items ({} body nodes)",
            loop_node.id,
            items.len(),
            body.nodes().len()
        );

        let mut collected = Vec::with_capacity(items.len());
        for (iteration, item) in items.into_iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(PipeError::Cancelled);
            }

            let child = ctx.child(body.clone());
            child.mark_processed(&loop_node.id).await;
            child
                .set_result(
                    &loop_node.id,
                    HashMap::from([(DEFAULT_OUTPUT.to_string(), item)]),
                )
                .await;

            self.process_graph(child.clone()).await?;

            if let Some(output) = &loop_output {
                let value = child
                    .get_result(&output.id, DEFAULT_OUTPUT)
                    .await
                    .unwrap_or(Value::Null);
                collected.push(value);
            }
            tracing::debug!("Loop {} finished iteration {}", loop_node.id, iteration);
        }

        let aggregate = HashMap::from([(DEFAULT_OUTPUT.to_string(), Value::List(collected))]);
        if let Some(output) = &loop_output {
            ctx.set_result(&output.id, aggregate.clone()).await;
            ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::completed(
                &output.id,
                &output.node_type,
                client_view(&aggregate),
                started_at,
            )))
            .await;
        }

        ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::completed(
            &loop_node.id,
            &loop_node.node_type,
            client_view(&aggregate),
            started_at,
        )))
        .await;
        ctx.set_result(&loop_node.id, aggregate).await;

        for node in body.nodes() {
            ctx.mark_processed(&node.id).await;
        }
        Ok(())
    }

    async fn fail(
        &self,
        ctx: &ProcessingContext,
        node: &GraphNode,
        started_at: DateTime<Utc>,
        error: NodeError,
    ) -> PipeError {
        tracing::error!("Node {} ({}) failed: {}", node.id, node.node_type, error);
        let message = truncate(&error.to_string(), self.options.max_error_length);
        ctx.post_message(ExecutionEvent::NodeUpdate(NodeUpdate::error(
            &node.id,
            &node.node_type,
            message,
            started_at,
        )))
        .await;
        PipeError::node(&node.id, error)
    }
}
