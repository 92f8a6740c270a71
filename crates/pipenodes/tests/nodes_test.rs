use pipecore::{
    event_channel, EventEmitter, ExecutionEvent, GraphError, GraphSpec, JobRequest, Node,
    NodeContext, NodeError, NodeSpec, PipeError, Value,
};
use pipenodes::{default_registry, JsonParseNode, SplitNode};
use piperuntime::PipeRuntime;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// Helper function to create a test context
fn create_test_context(properties: HashMap<String, Value>) -> NodeContext {
    let (sender, _receiver) = event_channel(16);
    NodeContext {
        node_id: "node".to_string(),
        node_type: "test".to_string(),
        properties,
        user_id: "user".to_string(),
        workflow_id: "workflow".to_string(),
        capabilities: Arc::new(HashSet::new()),
        events: EventEmitter::new("node", sender),
        cancellation: tokio_util::sync::CancellationToken::new(),
    }
}

async fn run_job(request: JobRequest) -> (Result<HashMap<String, Value>, PipeError>, Vec<ExecutionEvent>) {
    let runtime = PipeRuntime::new(default_registry());
    let mut ctx = runtime.context_for(&request);
    let outcome = runtime.run(&request, &mut ctx).await;
    (outcome, ctx.drain_messages().await)
}

#[tokio::test]
async fn test_json_parse_direct() {
    let ctx = create_test_context(HashMap::from([(
        "json".to_string(),
        Value::from(r#"{"a": [1, 2.5, "x"]}"#),
    )]));

    let output = JsonParseNode.process(ctx).await.unwrap().into_slots().unwrap();
    let parsed = output.get("output").and_then(Value::as_map).unwrap();
    assert_eq!(
        parsed.get("a"),
        Some(&Value::List(vec![Value::Int(1), Value::Float(2.5), Value::from("x")]))
    );
}

#[tokio::test]
async fn test_json_parse_rejects_garbage() {
    let ctx = create_test_context(HashMap::from([("json".to_string(), Value::from("{nope"))]));
    let result = JsonParseNode.process(ctx).await;
    assert!(matches!(result, Err(NodeError::ExecutionFailed(_))));
}

#[tokio::test]
async fn test_split_reports_count() {
    let ctx = create_test_context(HashMap::from([
        ("text".to_string(), Value::from("a-b-c")),
        ("separator".to_string(), Value::from("-")),
    ]));
    let output = SplitNode.process(ctx).await.unwrap().into_slots().unwrap();
    assert_eq!(output.get("count"), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_arithmetic_pipeline() {
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("x", "input.IntegerInput").with_data("name", "x"))
        .with_node(NodeSpec::new("y", "input.IntegerInput").with_data("name", "y"))
        .with_node(NodeSpec::new("scale", "input.FloatInput").with_data("name", "scale"))
        .with_node(NodeSpec::new("add", "math.Add"))
        .with_node(NodeSpec::new("mul", "math.Multiply"))
        .with_node(NodeSpec::new("sum", "output.Output").with_data("name", "sum"))
        .with_node(NodeSpec::new("scaled", "output.Output").with_data("name", "scaled"))
        .with_edge("x", "output", "add", "a")
        .with_edge("y", "output", "add", "b")
        .with_edge("add", "output", "sum", "value")
        .with_edge("add", "output", "mul", "a")
        .with_edge("scale", "output", "mul", "b")
        .with_edge("mul", "output", "scaled", "value");
    let request = JobRequest::new(graph)
        .with_param("x", 2i64)
        .with_param("y", 3i64)
        .with_param("scale", 2i64);

    let (outcome, _) = run_job(request).await;
    let result = outcome.unwrap();

    assert_eq!(result.get("sum"), Some(&Value::Int(5)));
    // the integer parameter is widened by the float input
    assert_eq!(result.get("scaled"), Some(&Value::Float(10.0)));
}

#[tokio::test]
async fn test_loop_over_static_items() {
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("loop", "control.Loop").with_data("items", vec![1i64, 2, 3]))
        .with_node(
            NodeSpec::new("times", "math.Multiply")
                .with_parent("loop")
                .with_data("b", 10i64),
        )
        .with_node(NodeSpec::new("collect", "control.LoopOutput").with_parent("loop"))
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "result"))
        .with_edge("loop", "output", "times", "a")
        .with_edge("times", "output", "collect", "input")
        .with_edge("collect", "output", "out", "value");

    let (outcome, _) = run_job(JobRequest::new(graph)).await;

    assert_eq!(
        outcome.unwrap().get("result"),
        Some(&Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]))
    );
}

#[tokio::test]
async fn test_split_then_loop() {
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("text", "input.StringInput").with_data("name", "text"))
        .with_node(NodeSpec::new("split", "text.Split"))
        .with_node(NodeSpec::new("loop", "control.Loop"))
        .with_node(NodeSpec::new("shout", "text.Concat").with_data("b", "!"))
        .with_node(NodeSpec::new("collect", "control.LoopOutput"))
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "words"))
        .with_edge("text", "output", "split", "text")
        .with_edge("split", "output", "loop", "items")
        .with_edge("loop", "output", "shout", "a")
        .with_edge("shout", "output", "collect", "input")
        .with_edge("collect", "output", "out", "value");
    let request = JobRequest::new(graph).with_param("text", "hi,there");

    let (outcome, _) = run_job(request).await;

    assert_eq!(
        outcome.unwrap().get("words"),
        Some(&Value::List(vec![Value::from("hi!"), Value::from("there!")]))
    );
}

#[tokio::test]
async fn test_json_round_trip_through_graph() {
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("raw", "input.StringInput").with_data("name", "raw"))
        .with_node(NodeSpec::new("parse", "transform.JsonParse"))
        .with_node(NodeSpec::new("debug", "debug.Debug").with_data("label", "parsed"))
        .with_node(NodeSpec::new("stringify", "transform.JsonStringify"))
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "json"))
        .with_edge("raw", "output", "parse", "json")
        .with_edge("parse", "output", "debug", "value")
        .with_edge("debug", "output", "stringify", "value")
        .with_edge("stringify", "output", "out", "value");
    let request = JobRequest::new(graph).with_param("raw", r#"{"a": [1, 2]}"#);

    let (outcome, _) = run_job(request).await;

    assert_eq!(outcome.unwrap().get("json"), Some(&Value::from(r#"{"a":[1,2]}"#)));
}

#[tokio::test]
async fn test_template_fills_placeholders() {
    let values = Value::from(serde_json::json!({"name": "pipe", "count": 2}));
    let graph = GraphSpec::new()
        .with_node(
            NodeSpec::new("tpl", "text.Template")
                .with_data("template", "{name} has {count} stages")
                .with_data("values", values),
        )
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "text"))
        .with_edge("tpl", "output", "out", "value");

    let (outcome, _) = run_job(JobRequest::new(graph)).await;

    assert_eq!(outcome.unwrap().get("text"), Some(&Value::from("pipe has 2 stages")));
}

#[tokio::test]
async fn test_delay_reports_progress() {
    let graph = GraphSpec::new()
        .with_node(
            NodeSpec::new("wait", "time.Delay")
                .with_data("delay_ms", 20i64)
                .with_data("value", "done"),
        )
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "value"))
        .with_edge("wait", "output", "out", "value");

    let (outcome, events) = run_job(JobRequest::new(graph)).await;

    assert_eq!(outcome.unwrap().get("value"), Some(&Value::from("done")));
    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeProgress { node_id, progress, .. } if node_id == "wait" => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_division_by_zero_fails_the_job() {
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("div", "math.Divide").with_data("a", 1i64))
        .with_node(NodeSpec::new("out", "output.Output").with_data("name", "q"))
        .with_edge("div", "output", "out", "value");

    let (outcome, events) = run_job(JobRequest::new(graph)).await;

    assert!(matches!(outcome, Err(PipeError::NodeFailed { ref node_id, .. }) if node_id == "div"));
    assert!(matches!(events.last(), Some(ExecutionEvent::JobUpdate { .. })));
}

#[test]
fn test_incompatible_edge_is_rejected() {
    let runtime = PipeRuntime::new(default_registry());
    let graph = GraphSpec::new()
        .with_node(NodeSpec::new("concat", "text.Concat"))
        .with_node(NodeSpec::new("add", "math.Add"))
        .with_edge("concat", "output", "add", "a");

    assert!(matches!(
        runtime.validate(&graph),
        Err(GraphError::IncompatibleEdge { .. })
    ));
}

#[test]
fn test_catalog_names() {
    let types = default_registry().list_node_types();
    for expected in [
        "input.IntegerInput",
        "input.FloatInput",
        "output.Output",
        "control.Loop",
        "control.LoopOutput",
        "math.Add",
        "text.Concat",
        "transform.JsonParse",
        "debug.Debug",
        "time.Delay",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {}", expected);
    }
}
