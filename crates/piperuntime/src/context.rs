use crate::graph::{Edge, Graph, GraphNode};
use pipecore::{
    event_channel, EventEmitter, EventReceiver, EventSender, ExecutionEvent, NodeContext, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

pub type NodeResults = HashMap<String, HashMap<String, Value>>;

/// Run-scoped state shared by every node of one job.
///
/// Cloning is cheap and yields a handle to the same run. Use
/// [`ProcessingContext::child`] for an isolated scope over a subgraph.
#[derive(Clone)]
pub struct ProcessingContext {
    pub user_id: String,
    pub workflow_id: String,
    pub job_id: String,
    graph: Arc<Graph>,
    results: Arc<RwLock<NodeResults>>,
    processed: Arc<RwLock<HashSet<String>>>,
    capabilities: Arc<HashSet<String>>,
    sender: EventSender,
    receiver: Arc<Mutex<EventReceiver>>,
    cancellation: CancellationToken,
    limiter: Arc<Semaphore>,
}

impl ProcessingContext {
    pub fn new(
        user_id: impl Into<String>,
        workflow_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        ContextBuilder::new(user_id, workflow_id, job_id).build()
    }

    pub fn builder(
        user_id: impl Into<String>,
        workflow_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> ContextBuilder {
        ContextBuilder::new(user_id, workflow_id, job_id)
    }

    /// A fresh scope over `graph`: empty results and processed set, same
    /// identity, event sink, capabilities, cancellation and concurrency limit.
    pub fn child(&self, graph: Graph) -> Self {
        Self {
            user_id: self.user_id.clone(),
            workflow_id: self.workflow_id.clone(),
            job_id: self.job_id.clone(),
            graph: Arc::new(graph),
            results: Arc::new(RwLock::new(HashMap::new())),
            processed: Arc::new(RwLock::new(HashSet::new())),
            capabilities: self.capabilities.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            cancellation: self.cancellation.clone(),
            limiter: self.limiter.clone(),
        }
    }

    pub fn set_graph(&mut self, graph: Graph) {
        self.graph = Arc::new(graph);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn nodes(&self) -> &[GraphNode] {
        self.graph.nodes()
    }

    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    pub fn capabilities(&self) -> &Arc<HashSet<String>> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub(crate) fn limiter(&self) -> &Arc<Semaphore> {
        &self.limiter
    }

    /// Values arriving over edges for each connected input of `node_id`.
    /// Unconnected inputs are absent so the node keeps its own value.
    pub async fn get_node_inputs(&self, node_id: &str) -> HashMap<String, Value> {
        let results = self.results.read().await;
        let mut inputs = HashMap::new();

        for edge in self.graph.edges().iter().filter(|e| e.target == node_id) {
            match results
                .get(&edge.source)
                .and_then(|slots| slots.get(&edge.source_handle))
            {
                Some(value) => {
                    inputs.insert(edge.target_handle.clone(), value.clone());
                }
                None => tracing::warn!(
                    "No result for {}.{} feeding {}.{}",
                    edge.source,
                    edge.source_handle,
                    node_id,
                    edge.target_handle
                ),
            }
        }
        inputs
    }

    pub async fn set_result(&self, node_id: &str, result: HashMap<String, Value>) {
        self.results
            .write()
            .await
            .insert(node_id.to_string(), result);
    }

    pub async fn get_result(&self, node_id: &str, slot: &str) -> Option<Value> {
        self.results
            .read()
            .await
            .get(node_id)
            .and_then(|slots| slots.get(slot))
            .cloned()
    }

    pub async fn get_results(&self, node_id: &str) -> Option<HashMap<String, Value>> {
        self.results.read().await.get(node_id).cloned()
    }

    /// Snapshot of every stored result
    pub async fn results(&self) -> NodeResults {
        self.results.read().await.clone()
    }

    pub async fn mark_processed(&self, node_id: &str) {
        self.processed.write().await.insert(node_id.to_string());
    }

    pub async fn is_processed(&self, node_id: &str) -> bool {
        self.processed.read().await.contains(node_id)
    }

    pub async fn post_message(&self, event: ExecutionEvent) {
        self.sender.post(event);
    }

    pub fn has_messages(&self) -> bool {
        self.sender.has_pending()
    }

    /// Wait for the next event.
    pub async fn pop_message_async(&self) -> Option<ExecutionEvent> {
        self.receiver.lock().await.recv().await
    }

    pub async fn try_pop_message(&self) -> Option<ExecutionEvent> {
        self.receiver.lock().await.try_recv()
    }

    /// Everything queued so far
    pub async fn drain_messages(&self) -> Vec<ExecutionEvent> {
        let mut receiver = self.receiver.lock().await;
        let mut events = Vec::new();
        while let Some(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn emitter(&self, node_id: &str) -> EventEmitter {
        EventEmitter::new(node_id, self.sender.clone())
    }

    /// Context handed to one node's `process`.
    pub fn node_context(&self, node: &GraphNode) -> NodeContext {
        NodeContext {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            properties: node.properties.clone(),
            user_id: self.user_id.clone(),
            workflow_id: self.workflow_id.clone(),
            capabilities: self.capabilities.clone(),
            events: self.emitter(&node.id),
            cancellation: self.cancellation.child_token(),
        }
    }

    /// Abort the run: in-flight nodes are cancelled, no new level starts.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Builder for a root [`ProcessingContext`]
pub struct ContextBuilder {
    user_id: String,
    workflow_id: String,
    job_id: String,
    capabilities: HashSet<String>,
    event_buffer_size: usize,
    max_parallel_nodes: usize,
}

impl ContextBuilder {
    pub fn new(
        user_id: impl Into<String>,
        workflow_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            workflow_id: workflow_id.into(),
            job_id: job_id.into(),
            capabilities: HashSet::new(),
            event_buffer_size: 1024,
            max_parallel_nodes: Semaphore::MAX_PERMITS,
        }
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn max_parallel_nodes(mut self, limit: usize) -> Self {
        self.max_parallel_nodes = limit.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn build(self) -> ProcessingContext {
        let (sender, receiver) = event_channel(self.event_buffer_size);
        ProcessingContext {
            user_id: self.user_id,
            workflow_id: self.workflow_id,
            job_id: self.job_id,
            graph: Arc::new(Graph::new()),
            results: Arc::new(RwLock::new(HashMap::new())),
            processed: Arc::new(RwLock::new(HashSet::new())),
            capabilities: Arc::new(self.capabilities),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            cancellation: CancellationToken::new(),
            limiter: Arc::new(Semaphore::new(self.max_parallel_nodes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_are_keyed_by_node_and_slot() {
        let ctx = ProcessingContext::new("u", "w", "j");
        ctx.set_result("a", HashMap::from([("output".to_string(), Value::Int(1))]))
            .await;
        assert_eq!(ctx.get_result("a", "output").await, Some(Value::Int(1)));
        assert_eq!(ctx.get_result("a", "other").await, None);
        assert_eq!(ctx.get_result("b", "output").await, None);
    }

    #[tokio::test]
    async fn child_scope_is_isolated_but_shares_events() {
        let ctx = ProcessingContext::builder("u", "w", "j")
            .capability("gpu")
            .build();
        ctx.mark_processed("a").await;

        let child = ctx.child(Graph::new());
        assert!(!child.is_processed("a").await);
        assert!(child.has_capability("gpu"));
        assert_eq!(child.user_id, "u");

        child
            .post_message(ExecutionEvent::WorkflowUpdate {
                result: HashMap::new(),
            })
            .await;
        assert!(ctx.has_messages());
        assert_eq!(ctx.drain_messages().await.len(), 1);
        assert!(!ctx.has_messages());
    }

    #[tokio::test]
    async fn cancel_reaches_node_contexts() {
        let ctx = ProcessingContext::new("u", "w", "j");
        let child = ctx.child(Graph::new());
        ctx.cancel();
        assert!(child.is_cancelled());
    }
}
