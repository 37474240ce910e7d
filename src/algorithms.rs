pub mod bfs;
pub mod cc;
pub mod cd;
pub mod coloring;
pub mod coloring_hybrid;
pub mod pagerank;
pub mod scc;

use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::engine::EngineReport;

/// Outcome of a single-task algorithm run.
///
/// # Fields
/// * `report` - Counters of the engine run
/// * `values` - Final per-vertex result, indexed by slot (`vid - min_vert_id`)
#[derive(Debug, Clone)]
pub struct AlgorithmRun<V> {
    pub report: EngineReport,
    pub values: Vec<V>,
}

/// Attribute file of a single-task algorithm inside the workspace.
pub(crate) fn attr_path(config: &EngineConfig, name: &str) -> PathBuf {
    config.workspace.join(format!("{}.attr", name))
}
