use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use rayon::prelude::*;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::storage::AttrArena;
use crate::types::{TaskId, VertexId};
use crate::util::read_records;

use super::task::{Manifest, NO_VALUE};

/// Remap file of a bag: one `u32` parent id per local id.
pub fn remap_path(workspace: &Path, bag_id: TaskId) -> PathBuf {
    workspace.join(format!("bag{}.remap", bag_id))
}

/// Loads remap tables of a workspace on demand and keeps the recent ones in memory.
///
/// Sibling tasks share their ancestors' tables, so a chain walk usually hits the cache for
/// everything but the leaf.
pub struct RemapChain {
    workspace: PathBuf,
    tables: Cache<TaskId, Arc<Vec<u32>>>,
}

impl RemapChain {
    pub fn new(workspace: &Path, max_tables: u64) -> Self {
        Self { workspace: workspace.to_path_buf(), tables: Cache::new(max_tables) }
    }

    /// The remap table of one bag.
    pub fn table(&self, bag_id: TaskId) -> Result<Arc<Vec<u32>>> {
        match self.tables.get(&bag_id) {
            Some(table) => Ok(table),
            None => {
                let table = Arc::new(read_records::<u32>(&remap_path(&self.workspace, bag_id))?);
                self.tables.insert(bag_id, table.clone());
                Ok(table)
            }
        }
    }

    /// Tables along an ancestor list, deepest first. The root has no table.
    pub fn tables(&self, ancestors: &[TaskId]) -> Result<Vec<Arc<Vec<u32>>>> {
        ancestors.iter().skip(1).rev().map(|&bag_id| self.table(bag_id)).collect()
    }

    /// Translates a local id of the task with `ancestors` into an id of the original graph.
    pub fn translate(&self, ancestors: &[TaskId], local: VertexId) -> Result<VertexId> {
        let tables = self.tables(ancestors)?;
        translate_with(&tables, local).ok_or_else(|| {
            EngineError::format(
                remap_path(&self.workspace, ancestors.last().copied().unwrap_or(0)),
                format!("local id {} falls outside the remap chain", local),
            )
        })
    }
}

fn translate_with(tables: &[Arc<Vec<u32>>], local: VertexId) -> Option<VertexId> {
    tables.iter().try_fold(local, |id, table| table.get(id as usize).copied())
}

/// Composes every recorded task output into one result file over the original graph.
///
/// The result holds one `u32` per original vertex slot, [`NO_VALUE`] where no task wrote.
/// Slot `i` of a record is its vertex `min_vert_id + i`; that id (and the value, when values
/// are vertex ids) is translated through the record's remap chain. Later records overwrite
/// earlier ones.
///
/// # Returns
/// The number of vertices that received a value.
pub fn materialize(manifest: &Manifest, chain: &RemapChain, result_path: &Path) -> Result<usize> {
    let result = AttrArena::<AtomicU32>::create(result_path, manifest.root_vertex_count)?;
    let slots = result.records();
    slots.par_iter().for_each(|slot| slot.store(NO_VALUE, Ordering::Relaxed));

    let root_min = manifest.root_min_vert_id;
    let mut written = 0;
    for record in &manifest.records {
        let values = read_records::<u32>(&record.output)?;
        if values.len() != record.vertex_count {
            return Err(EngineError::format(
                &record.output,
                format!("{} values for a task of {} vertices", values.len(), record.vertex_count),
            ));
        }
        let tables = chain.tables(&record.ancestors)?;
        let broken = |what: &str, id: u32| {
            EngineError::format(&record.output, format!("{} {} of task {} leaves the remap chain", what, id, record.task_id))
        };
        written += values
            .par_iter()
            .enumerate()
            .map(|(local, &value)| -> Result<usize> {
                if value == NO_VALUE {
                    return Ok(0);
                }
                let vid = record.min_vert_id + local as VertexId;
                let original = translate_with(&tables, vid).ok_or_else(|| broken("vertex", vid))?;
                let value = if record.values_are_ids {
                    translate_with(&tables, value).ok_or_else(|| broken("value", value))?
                } else {
                    value
                };
                let slot = original
                    .checked_sub(root_min)
                    .map(|s| s as usize)
                    .filter(|&s| s < slots.len())
                    .ok_or_else(|| broken("vertex", original))?;
                slots[slot].store(value, Ordering::Relaxed);
                Ok(1)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;
    }
    result.flush()?;
    info!(path = %result_path.display(), written, total = manifest.root_vertex_count, "result materialized");
    Ok(written)
}

#[cfg(test)]
mod test_remap {
    use super::*;
    use crate::filter::task::{Bag, Task, TaskQueue};
    use crate::util::write_records;

    fn bag(workspace: &Path, bag_id: TaskId, vertex_count: usize) -> Bag {
        Bag {
            bag_id,
            partition: 0,
            vertex_count,
            num_edges: 0,
            desc_path: workspace.join(format!("bag{}.desc.yaml", bag_id)),
            remap_path: remap_path(workspace, bag_id),
        }
    }

    #[test]
    fn test_chain_translates_deepest_first() {
        let dir = tempfile::tempdir().unwrap();
        // Root has 6 vertices; bag 1 keeps {1, 3, 5}; bag 2 keeps bag 1's {0, 2}.
        write_records(&remap_path(dir.path(), 1), &[1u32, 3, 5]).unwrap();
        write_records(&remap_path(dir.path(), 2), &[0u32, 2]).unwrap();
        let chain = RemapChain::new(dir.path(), 16);
        assert_eq!(chain.translate(&[0, 1, 2], 0).unwrap(), 1);
        assert_eq!(chain.translate(&[0, 1, 2], 1).unwrap(), 5);
        assert_eq!(chain.translate(&[0], 4).unwrap(), 4);
        assert!(chain.translate(&[0, 1, 2], 2).is_err());
    }

    #[test]
    fn test_materialize_composes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        write_records(&remap_path(workspace, 1), &[1u32, 3, 5]).unwrap();
        write_records(&remap_path(workspace, 2), &[0u32, 2]).unwrap();

        let mut queue = TaskQueue::new();
        let root = Task::root(&workspace.join("g.desc.yaml"), 0, 6);
        let child = root.child(&bag(workspace, 1, 3));
        let leaf = child.child(&bag(workspace, 2, 2));
        // Root decides 0 and 4 as plain values; child decides its vertex 1 (original 3);
        // the leaf labels both vertices with its own local id 1 (original 5).
        queue.record_output(&root, "s", workspace, &[7, NO_VALUE, NO_VALUE, NO_VALUE, 9, NO_VALUE], false).unwrap();
        queue.record_output(&child, "s", workspace, &[NO_VALUE, 3, NO_VALUE], false).unwrap();
        queue.record_output(&leaf, "s", workspace, &[1, 1], true).unwrap();

        let manifest = queue.into_manifest(0, 6);
        let chain = RemapChain::new(workspace, 16);
        let result_path = workspace.join("result.bin");
        assert_eq!(materialize(&manifest, &chain, &result_path).unwrap(), 5);
        assert_eq!(read_records::<u32>(&result_path).unwrap(), vec![7, 5, NO_VALUE, 3, 9, 5]);
    }

    #[test]
    fn test_materialize_offset_root() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        // Root ids run 10..=14; bag 1 keeps {11, 14} as absolute parent ids.
        write_records(&remap_path(workspace, 1), &[11u32, 14]).unwrap();

        let mut queue = TaskQueue::new();
        let root = Task::root(&workspace.join("g.desc.yaml"), 10, 5);
        let child = root.child(&bag(workspace, 1, 2));
        // The root labels its slots with absolute ids; the child names its local vertex 0.
        queue.record_output(&root, "s", workspace, &[10, NO_VALUE, 10, 13, NO_VALUE], true).unwrap();
        queue.record_output(&child, "s", workspace, &[0, 0], true).unwrap();

        let manifest = queue.into_manifest(10, 5);
        let chain = RemapChain::new(workspace, 16);
        let result_path = workspace.join("result.bin");
        assert_eq!(materialize(&manifest, &chain, &result_path).unwrap(), 5);
        assert_eq!(read_records::<u32>(&result_path).unwrap(), vec![10, 11, 10, 13, 11]);
    }
}
