use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipecore::{ExecutionEvent, GraphSpec, JobRequest, JobStatus, NodeSpec, NodeStatus, Value};
use piperuntime::{PipeRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipe")]
#[command(about = "Pipeline graph runner", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a job file
    Run {
        /// Path to a job request (or bare graph) JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Workflow parameters as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Grant a capability to this run (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Validate a job file without running it
    Validate {
        /// Path to a job request (or bare graph) JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example job
    Init {
        /// Output file path
        #[arg(short, long, default_value = "job.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            file,
            input,
            config,
            capabilities,
            json,
        } => run_job(&file, input, config, capabilities, json).await,
        Commands::Validate { file } => validate_job(&file),
        Commands::Nodes => {
            list_nodes();
            Ok(())
        }
        Commands::Init { output } => create_example_job(&output),
    }
}

/// Read a job request, accepting a bare graph as well.
fn load_request(file: &Path) -> Result<JobRequest> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)?;

    if json.get("graph").is_some() {
        Ok(serde_json::from_value(json)?)
    } else {
        let graph: GraphSpec = serde_json::from_value(json)?;
        Ok(JobRequest::new(graph))
    }
}

fn load_config(config: Option<PathBuf>, capabilities: Vec<String>) -> Result<RuntimeConfig> {
    let mut config = match config {
        Some(path) => RuntimeConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    }
    .with_env_overrides();
    config.capabilities.extend(capabilities);
    Ok(config)
}

async fn run_job(
    file: &Path,
    input: Option<String>,
    config: Option<PathBuf>,
    capabilities: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut request = load_request(file)?;
    if let Some(input) = input {
        let params: HashMap<String, Value> =
            serde_json::from_str(&input).context("Input must be a JSON object")?;
        request.params.extend(params);
    }

    let runtime = PipeRuntime::with_config(pipenodes::default_registry(), load_config(config, capabilities)?);
    let mut ctx = runtime.context_for(&request);
    tracing::info!(
        "Running job {} ({} nodes, {} edges)",
        ctx.job_id,
        request.graph.nodes.len(),
        request.graph.edges.len()
    );

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling job");
            interrupt.cancel();
        }
    });

    // The runtime always finishes with a job update
    let events = ctx.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.pop_message_async().await {
            let done = matches!(event, ExecutionEvent::JobUpdate { .. });
            print_event(&event, json);
            if done {
                break;
            }
        }
    });

    let outcome = runtime.run(&request, &mut ctx).await;
    printer.await?;

    let result = outcome?;
    if !json {
        println!();
        println!("Outputs:");
        let mut names: Vec<&String> = result.keys().collect();
        names.sort();
        for name in names {
            println!("  {}: {}", name, serde_json::to_string(&result[name])?);
        }
    }
    Ok(())
}

fn print_event(event: &ExecutionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Could not serialize event: {}", e),
        }
        return;
    }

    match event {
        ExecutionEvent::NodeUpdate(update) => match update.status {
            NodeStatus::Running => println!("  > {} ({})", update.node_id, update.node_type),
            NodeStatus::Completed => {
                let elapsed = update
                    .completed_at
                    .map(|at| (at - update.started_at).num_milliseconds())
                    .unwrap_or_default();
                println!("  ok {} in {}ms", update.node_id, elapsed);
            }
            NodeStatus::Error => println!(
                "  FAILED {}: {}",
                update.node_id,
                update.error.as_deref().unwrap_or("unknown error")
            ),
        },
        ExecutionEvent::NodeProgress {
            node_id,
            progress,
            total,
        } => println!("     [{}] {}/{}", node_id, progress, total),
        ExecutionEvent::WorkflowUpdate { .. } => println!("Workflow finished"),
        ExecutionEvent::JobUpdate { job_id, status, error } => match status {
            JobStatus::Completed => println!("Job {} completed", job_id),
            JobStatus::Failed => println!(
                "Job {} failed: {}",
                job_id,
                error.as_deref().unwrap_or("unknown error")
            ),
        },
    }
}

fn validate_job(file: &Path) -> Result<()> {
    println!("Validating job: {}", file.display());

    let request = load_request(file)?;
    let runtime = PipeRuntime::new(pipenodes::default_registry());
    let levels = runtime.validate(&request.graph)?;

    println!("Job is valid:");
    println!("  Nodes: {}", request.graph.nodes.len());
    println!("  Edges: {}", request.graph.edges.len());
    for (depth, level) in levels.iter().enumerate() {
        println!("  Level {}: {}", depth, level.join(", "));
    }
    Ok(())
}

fn list_nodes() {
    println!("Available node types:");
    println!();

    let registry = pipenodes::default_registry();
    for node_type in registry.list_node_types() {
        if let Some(descriptor) = registry.descriptor(&node_type) {
            println!("  {} ({})", node_type, descriptor.category);
            println!("    {}", descriptor.description);
            for property in &descriptor.properties {
                println!("      in  {}: {}", property.name, property.type_metadata);
            }
            for output in &descriptor.outputs {
                println!("      out {}: {}", output.name, output.type_metadata);
            }
        }
    }
}

fn create_example_job(output: &Path) -> Result<()> {
    let mut graph = GraphSpec::new();
    graph.add_node(
        NodeSpec::new("count", "input.IntegerInput")
            .with_data("name", "count")
            .with_position(100.0, 100.0),
    );
    graph.add_node(
        NodeSpec::new("loop", "control.Loop")
            .with_data("items", vec![1i64, 2, 3])
            .with_position(300.0, 100.0),
    );
    graph.add_node(
        NodeSpec::new("add", "math.Add")
            .with_parent("loop")
            .with_data("b", 100i64)
            .with_position(500.0, 100.0),
    );
    graph.add_node(
        NodeSpec::new("collect", "control.LoopOutput")
            .with_parent("loop")
            .with_position(700.0, 100.0),
    );
    graph.add_node(
        NodeSpec::new("totals", "output.Output")
            .with_data("name", "totals")
            .with_position(900.0, 100.0),
    );
    graph.add_node(
        NodeSpec::new("double", "math.Multiply")
            .with_data("b", 2i64)
            .with_position(300.0, 300.0),
    );
    graph.add_node(
        NodeSpec::new("doubled", "output.Output")
            .with_data("name", "doubled")
            .with_position(500.0, 300.0),
    );
    graph.connect("loop", "output", "add", "a");
    graph.connect("add", "output", "collect", "input");
    graph.connect("collect", "output", "totals", "value");
    graph.connect("count", "output", "double", "a");
    graph.connect("double", "output", "doubled", "value");

    let request = JobRequest::new(graph).with_param("count", 10i64);
    std::fs::write(output, serde_json::to_string_pretty(&request)?)?;

    println!("Created example job: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  pipe run --file {}", output.display());
    Ok(())
}
