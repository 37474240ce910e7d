use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GraphDesc;
use crate::error::{EngineError, Result};
use crate::types::{TaskId, VertexId};
use crate::util::{remove_if_exists, write_records};

/// Marks a vertex without a value in task outputs and result files.
pub const NO_VALUE: u32 = u32::MAX;

/// One job of the decomposition tree: a graph (or bag) to run a program on.
///
/// `ancestors` starts with the root task `0` and ends with the task's own id; every entry
/// after the first names a remap file translating that task's ids to its parent's ids.
/// Only the root may start its ids above zero; bags are always dense from zero.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_id: TaskId,
    pub ancestors: Vec<TaskId>,
    pub desc_path: PathBuf,
    pub min_vert_id: VertexId,
    pub vertex_count: usize,
}

impl Task {
    pub fn root(desc_path: &Path, min_vert_id: VertexId, vertex_count: usize) -> Self {
        Self { task_id: 0, ancestors: vec![0], desc_path: desc_path.to_path_buf(), min_vert_id, vertex_count }
    }

    /// The child task running on `bag`.
    pub fn child(&self, bag: &Bag) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(bag.bag_id);
        Self {
            task_id: bag.bag_id,
            ancestors,
            desc_path: bag.desc_path.clone(),
            min_vert_id: 0,
            vertex_count: bag.vertex_count,
        }
    }

    pub fn is_root(&self) -> bool {
        self.ancestors.len() == 1
    }

    /// Attribute file of this task for one program family.
    pub fn attr_path(&self, workspace: &Path, family: &str) -> PathBuf {
        workspace.join(format!("task{}.{}.attr", self.task_id, family))
    }

    /// Output file of one stage of this task.
    pub fn output_path(&self, workspace: &Path, stage: &str) -> PathBuf {
        workspace.join(format!("task{}.{}.out", self.task_id, stage))
    }
}

/// A compacted sub-graph produced by one filter pass.
///
/// Local ids are dense in `[0, vertex_count)`; the remap file maps each local id to the
/// parent task's vertex id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bag {
    pub bag_id: TaskId,
    pub partition: usize,
    pub vertex_count: usize,
    pub num_edges: u64,
    pub desc_path: PathBuf,
    pub remap_path: PathBuf,
}

/// Per-vertex output of one task stage, kept for result materialization.
///
/// # Fields
/// * `task_id` - Task that produced the output
/// * `ancestors` - The task's ancestor chain
/// * `min_vert_id` - Id of the task's first vertex; slot `i` of `output` is vertex `min_vert_id + i`
/// * `output` - File of one `u32` per vertex slot, [`NO_VALUE`] where the stage decided nothing
/// * `values_are_ids` - Whether values are vertex ids of the task, translated like the vertices
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub ancestors: Vec<TaskId>,
    pub min_vert_id: VertexId,
    pub vertex_count: usize,
    pub output: PathBuf,
    pub values_are_ids: bool,
}

/// Everything result materialization needs, persisted with `bincode`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub root_min_vert_id: u32,
    pub root_vertex_count: usize,
    pub records: Vec<TaskRecord>,
}

impl Manifest {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| EngineError::Serde { path: path.to_path_buf(), reason: e.to_string() })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| EngineError::Serde { path: path.to_path_buf(), reason: e.to_string() })
    }
}

/// FIFO work queue of the decomposition tree, plus the task id allocator and the records
/// of every finished stage.
#[derive(Debug)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    next_id: TaskId,
    records: Vec<TaskRecord>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        // Task 0 is the root.
        Self { pending: VecDeque::new(), next_id: 1, records: Vec::new() }
    }

    /// Reserves a fresh id for a bag.
    pub fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn push(&mut self, task: Task) {
        debug!(task_id = task.task_id, vertices = task.vertex_count, depth = task.ancestors.len(), "task queued");
        self.pending.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes the per-vertex output of one stage of `task` and records it.
    pub fn record_output(&mut self, task: &Task, stage: &str, workspace: &Path, values: &[u32], values_are_ids: bool) -> Result<()> {
        assert_eq!(values.len(), task.vertex_count, "output of task {} has the wrong length", task.task_id);
        let output = task.output_path(workspace, stage);
        write_records(&output, values)?;
        self.records.push(TaskRecord {
            task_id: task.task_id,
            ancestors: task.ancestors.clone(),
            min_vert_id: task.min_vert_id,
            vertex_count: task.vertex_count,
            output,
            values_are_ids,
        });
        Ok(())
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Closes the queue into a manifest over the root graph's id space.
    pub fn into_manifest(self, root_min_vert_id: u32, root_vertex_count: usize) -> Manifest {
        Manifest { root_min_vert_id, root_vertex_count, records: self.records }
    }
}

/// Removes the graph files and description of a bag once its task is done.
///
/// Remap files are kept for materialization.
pub fn remove_bag_files(desc: &GraphDesc, desc_path: &Path) -> Result<()> {
    let files = [Some(&desc.vert_file), Some(&desc.edge_file), desc.in_vert_file.as_ref(), desc.in_edge_file.as_ref()];
    for path in files.into_iter().flatten() {
        remove_if_exists(path)?;
    }
    remove_if_exists(desc_path)
}
