use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use outcore::algorithms::bfs::run_bfs;
use outcore::algorithms::cc::run_cc;
use outcore::algorithms::cd::{run_cd, DEFAULT_CD_ITERATIONS};
use outcore::algorithms::coloring::run_coloring;
use outcore::algorithms::coloring_hybrid::run_coloring_hybrid;
use outcore::algorithms::pagerank::run_pagerank;
use outcore::algorithms::scc::run_scc;
use outcore::algorithms::AlgorithmRun;
use outcore::config::EdgeType;
use outcore::storage::{read_edge_list, GraphBuilder};
use outcore::types::{ByteEncodable, EdgeRecord, Type1Edge, Type2Edge};
use outcore::util::write_records;
use outcore::{EngineConfig, EngineError, GraphDesc, Result};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Task {
    Bfs,
    Cc,
    Cd,
    Pagerank,
    Coloring,
    ColoringHybrid,
    Scc,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::Bfs => "bfs",
            Task::Cc => "cc",
            Task::Cd => "cd",
            Task::Pagerank => "pagerank",
            Task::Coloring => "coloring",
            Task::ColoringHybrid => "coloring-hybrid",
            Task::Scc => "scc",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Graph description file (`.desc.yaml`).
    #[arg(short, long, conflicts_with = "edges", required_unless_present = "edges")]
    graph: Option<PathBuf>,

    /// Text edge list (`src dst [weight]` per line) to convert into the workspace first.
    #[arg(short, long)]
    edges: Option<PathBuf>,

    /// Store weights when converting an edge list.
    #[arg(long, default_value_t = false)]
    weighted: bool,

    /// The task to be performed.
    #[arg(short, long, value_enum, default_value_t = Task::Bfs)]
    task: Task,

    /// Worker thread count; overrides the configuration file.
    #[arg(short, long)]
    num_threads: Option<usize>,

    /// Vertex slots per attribute segment; overrides the configuration file.
    #[arg(short, long)]
    segment_cap: Option<u32>,

    /// Workspace directory; overrides the configuration file.
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Engine configuration YAML.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BFS source vertex id.
    #[arg(long, default_value_t = 0)]
    bfs_root: u32,

    /// PageRank iterations.
    #[arg(long, default_value_t = 10)]
    niters: usize,

    /// Community detection iteration cap.
    #[arg(long, default_value_t = DEFAULT_CD_ITERATIONS)]
    cd_iterations: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(task = args.task.name(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    // Step 1. Configuration: file, then command-line overrides.
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(thread_num) = args.num_threads {
        config.thread_num = thread_num;
    }
    if let Some(segment_cap) = args.segment_cap {
        config.segment_cap = segment_cap;
    }
    if let Some(workspace) = &args.workspace {
        config.workspace = workspace.clone();
    }
    config.validate()?;
    config.ensure_workspace()?;

    // Step 2. The input graph.
    let desc_path = match (&args.graph, &args.edges) {
        (Some(graph), _) => graph.clone(),
        (None, Some(edges)) => convert_edge_list(&config, edges, args.weighted)?,
        (None, None) => return Err(EngineError::Config("either --graph or --edges is required".to_owned())),
    };
    let desc = GraphDesc::load(&desc_path)?;
    info!(
        graph = %desc_path.display(),
        vertices = desc.vertex_count(),
        edges = desc.num_edges,
        in_edges = desc.has_in_edges(),
        "graph loaded"
    );

    // Step 3. Run the task.
    let start = Instant::now();
    match desc.edge_type {
        EdgeType::Type1 => run_task::<Type1Edge>(args, &config, &desc, &desc_path)?,
        EdgeType::Type2 => run_task::<Type2Edge>(args, &config, &desc, &desc_path)?,
    }
    println!("{} Elapsed Time: {:?} us", args.task.name(), start.elapsed().as_micros());
    Ok(())
}

/// Builds the CSR files of a text edge list inside the workspace, in-edges included.
fn convert_edge_list(config: &EngineConfig, edges: &Path, weighted: bool) -> Result<PathBuf> {
    let name = edges.file_stem().and_then(|s| s.to_str()).unwrap_or("graph");
    let list = read_edge_list(edges)?;
    let builder = GraphBuilder::new(&config.workspace, name).with_in_edges(true);
    if weighted {
        builder.build::<Type2Edge>(&list)?;
    } else {
        builder.build::<Type1Edge>(&list)?;
    }
    Ok(builder.desc_path())
}

fn run_task<E: EdgeRecord>(args: &Args, config: &EngineConfig, desc: &GraphDesc, desc_path: &Path) -> Result<()> {
    let result_path = config.workspace.join(format!("{}.result", args.task.name()));
    match args.task {
        Task::Bfs => {
            let run = run_bfs::<E>(config, desc, args.bfs_root)?;
            let reached = run.values.iter().filter(|&&level| level >= 0).count();
            println!("BFS from {}: {} vertices reached", args.bfs_root, reached);
            save(&result_path, &run)?;
        }
        Task::Cc => save(&result_path, &run_cc::<E>(config, desc, false)?)?,
        Task::Cd => save(&result_path, &run_cd::<E>(config, desc, args.cd_iterations)?)?,
        Task::Pagerank => save(&result_path, &run_pagerank::<E>(config, desc, args.niters)?)?,
        Task::Coloring => save(&result_path, &run_coloring::<E>(config, desc)?)?,
        Task::ColoringHybrid => save(&result_path, &run_coloring_hybrid::<E>(config, desc)?)?,
        // Writes its own result file through the task manifest.
        Task::Scc => {
            let report = run_scc::<E>(config, desc_path)?;
            println!(
                "SCC: {} vertices resolved by {} split and {} coloring tasks, result in {}",
                report.resolved,
                report.fb_tasks,
                report.color_tasks,
                report.result_path.display()
            );
        }
    }
    Ok(())
}

/// Writes per-vertex values and reports the run.
fn save<V: ResultValue>(path: &Path, run: &AlgorithmRun<V>) -> Result<()> {
    let records: Vec<V::Record> = run.values.iter().map(|v| v.to_record()).collect();
    write_records(path, &records)?;
    info!(
        iterations = run.report.iterations,
        restarts = run.report.restarts,
        result = %path.display(),
        "result written"
    );
    Ok(())
}

/// How a per-vertex value lands in a result file.
trait ResultValue {
    type Record: ByteEncodable;
    fn to_record(&self) -> Self::Record;
}

impl ResultValue for u32 {
    type Record = u32;
    fn to_record(&self) -> u32 {
        *self
    }
}

// Unreached vertices (-1) become the no-value marker.
impl ResultValue for i32 {
    type Record = u32;
    fn to_record(&self) -> u32 {
        *self as u32
    }
}

impl ResultValue for f32 {
    type Record = f32;
    fn to_record(&self) -> f32 {
        *self
    }
}
