pub mod remap;
pub mod task;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::GraphDesc;
use crate::engine::Decomposable;
use crate::error::{EngineError, Result};
use crate::storage::{AdjacencyStore, CsrWriter};
use crate::types::{Direction, EdgeRecord, InEdge, VertexId};
use crate::util::{create_writer, finish_writer, write_record};

pub use remap::{materialize, remap_path, RemapChain};
pub use task::{remove_bag_files, Bag, Manifest, Task, TaskQueue, TaskRecord, NO_VALUE};

/// Open writers of one partition during the second filter pass.
struct BagWriter<E: EdgeRecord> {
    bag_id: u32,
    partition: usize,
    out: CsrWriter<E>,
    inc: Option<CsrWriter<InEdge>>,
    remap: std::io::BufWriter<std::fs::File>,
    remap_path: PathBuf,
    desc: GraphDesc,
}

/// Splits the unresolved vertices of a finished run into compacted, disjoint bags.
///
/// Pass 1 asks `judge_for_filter` for every vertex and hands out dense local ids per
/// partition in scan order. Pass 2 walks the vertices once more and streams, for each
/// non-empty partition, its out-edge CSR, its in-edge CSR when the parent has one, its remap
/// file (`bag<id>.remap`, local id to parent id) and its description. Edges leaving a
/// partition are dropped.
///
/// # Arguments
/// * `adjacency` - The parent task's graph
/// * `attrs` - Final attributes of the run, indexed by slot
/// * `program` - The program deciding partitions
/// * `queue` - Allocates the bag ids
/// * `workspace` - Directory receiving the bag files
///
/// # Returns
/// One bag per non-empty partition, in partition order.
pub fn decompose<E, P>(
    adjacency: &AdjacencyStore<E>,
    attrs: &[P::Attr],
    program: &P,
    queue: &mut TaskQueue,
    workspace: &Path,
) -> Result<Vec<Bag>>
where
    E: EdgeRecord,
    P: Decomposable<E>,
{
    let vertex_count = adjacency.vertex_count();
    assert_eq!(attrs.len(), vertex_count, "attribute array does not cover the graph");
    let min_vert_id = adjacency.min_vert_id();
    let partitions = program.num_of_remain_partitions();

    // Step 1. Verdicts, then dense local ids in scan order.
    let verdicts: Vec<Option<usize>> = (0..vertex_count)
        .into_par_iter()
        .map(|slot| {
            let verdict = program.judge_for_filter(min_vert_id + slot as VertexId, &attrs[slot]);
            if let Some(partition) = verdict {
                assert!(partition < partitions, "partition {} out of [0, {})", partition, partitions);
            }
            verdict
        })
        .collect();
    let mut counts = vec![0u32; partitions];
    let local_ids: Vec<u32> = verdicts
        .iter()
        .map(|verdict| match verdict {
            Some(partition) => {
                let local = counts[*partition];
                counts[*partition] += 1;
                local
            }
            None => NO_VALUE,
        })
        .collect();
    let resolved = vertex_count - counts.iter().map(|&c| c as usize).sum::<usize>();
    debug!(resolved, ?counts, "filter verdicts");

    // Step 2. One writer set per non-empty partition.
    let mut writers: Vec<Option<BagWriter<E>>> = Vec::with_capacity(partitions);
    for (partition, &count) in counts.iter().enumerate() {
        if count == 0 {
            writers.push(None);
            continue;
        }
        let bag_id = queue.allocate_id();
        let name = |suffix: &str| workspace.join(format!("bag{}.{}", bag_id, suffix));
        let out = CsrWriter::<E>::create(&name("index"), &name("edge"))?;
        let inc = if adjacency.has_in_edges() {
            Some(CsrWriter::<InEdge>::create(&name("in-index"), &name("in-edge"))?)
        } else {
            None
        };
        let remap_path = remap_path(workspace, bag_id);
        let desc = GraphDesc {
            min_vert_id: 0,
            max_vert_id: count - 1,
            num_edges: 0,
            edge_type: E::EDGE_TYPE,
            vert_file: name("index"),
            edge_file: name("edge"),
            in_vert_file: inc.as_ref().map(|_| name("in-index")),
            in_edge_file: inc.as_ref().map(|_| name("in-edge")),
        };
        writers.push(Some(BagWriter { bag_id, partition, out, inc, remap: create_writer(&remap_path)?, remap_path, desc }));
    }

    // Step 3. Stream every surviving vertex into its bag.
    let same_bag = |partition: usize, neighbor: VertexId| -> Option<u32> {
        let slot = (neighbor - min_vert_id) as usize;
        (verdicts[slot] == Some(partition)).then_some(local_ids[slot])
    };
    for (slot, verdict) in verdicts.iter().enumerate() {
        let Some(partition) = *verdict else { continue };
        let vid = min_vert_id + slot as VertexId;
        let writer = writers[partition]
            .as_mut()
            .ok_or_else(|| EngineError::Config(format!("partition {} has no writer", partition)))?;
        writer.out.push_vertex(
            adjacency
                .out_edges(vid)
                .filter_map(|edge| same_bag(partition, edge.dest()).map(|local| edge.with_dest(local))),
        )?;
        if let Some(inc) = writer.inc.as_mut() {
            inc.push_vertex(
                adjacency
                    .neighbors(vid, Direction::In)
                    .filter_map(|src| same_bag(partition, src).map(|local| InEdge { src: local })),
            )?;
        }
        write_record(&mut writer.remap, &vid, &writer.remap_path)?;
    }

    // Step 4. Close the files and describe each bag.
    let mut bags = Vec::new();
    for writer in writers.into_iter().flatten() {
        let BagWriter { bag_id, partition, out, inc, remap, remap_path, mut desc } = writer;
        desc.num_edges = out.finish()?;
        if let Some(inc) = inc {
            inc.finish()?;
        }
        finish_writer(remap, &remap_path)?;
        let desc_path = workspace.join(format!("bag{}.desc.yaml", bag_id));
        desc.save(&desc_path)?;
        bags.push(Bag {
            bag_id,
            partition,
            vertex_count: desc.vertex_count(),
            num_edges: desc.num_edges,
            desc_path,
            remap_path,
        });
    }
    info!(
        bags = bags.len(),
        resolved,
        remaining = vertex_count - resolved,
        "filter pass finished"
    );
    Ok(bags)
}

#[cfg(test)]
mod test_filter {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::engine::{VertexContext, VertexProgram};
    use crate::storage::GraphBuilder;
    use crate::types::{EdgeList, Type2Edge};
    use crate::util::read_records;

    /// Partition by `vid % 3`; multiples of 3 are resolved.
    struct ModThree;

    impl VertexProgram<Type2Edge> for ModThree {
        type Attr = AtomicU32;
        const NAME: &'static str = "mod-three";

        fn init(&self, vid: VertexId, attr: &AtomicU32, _ctx: &VertexContext<'_, Type2Edge, AtomicU32>) {
            attr.store(vid, Ordering::Relaxed);
        }
    }

    impl Decomposable<Type2Edge> for ModThree {
        fn num_of_remain_partitions(&self) -> usize {
            2
        }

        fn judge_for_filter(&self, _vid: VertexId, attr: &AtomicU32) -> Option<usize> {
            match attr.load(Ordering::Relaxed) % 3 {
                0 => None,
                r => Some(r as usize - 1),
            }
        }
    }

    #[test]
    fn test_bags_partition_the_unresolved_vertices() {
        let dir = tempfile::tempdir().unwrap();
        let pairs: Vec<(u32, u32)> = (0..10).flat_map(|v| [(v, (v + 3) % 10), (v, (v + 1) % 10)]).collect();
        let desc = GraphBuilder::new(dir.path(), "ring")
            .with_in_edges(true)
            .build::<Type2Edge>(&EdgeList::new(10, &pairs))
            .unwrap();
        let adjacency = AdjacencyStore::<Type2Edge>::open(&desc).unwrap();
        let attrs: Vec<AtomicU32> = (0..10).map(AtomicU32::new).collect();

        let mut queue = TaskQueue::new();
        let bags = decompose(&adjacency, &attrs, &ModThree, &mut queue, dir.path()).unwrap();
        assert_eq!(bags.len(), 2);

        // Every unresolved vertex lands in exactly one bag, in scan order.
        let remaps: Vec<Vec<u32>> = bags.iter().map(|b| read_records::<u32>(&b.remap_path).unwrap()).collect();
        assert_eq!(remaps[0], vec![1, 4, 7]);
        assert_eq!(remaps[1], vec![2, 5, 8]);

        // Only intra-bag edges survive, rewritten to local ids.
        let bag = &bags[0];
        let bag_desc = GraphDesc::load(&bag.desc_path).unwrap();
        let sub = AdjacencyStore::<Type2Edge>::open(&bag_desc).unwrap();
        assert_eq!(sub.vertex_count(), 3);
        let out: Vec<(u32, u32)> = (0..3).flat_map(|v| sub.neighbors(v, Direction::Out).map(move |n| (v, n))).collect();
        assert_eq!(out, vec![(0, 1), (1, 2)]);
        let inc: Vec<(u32, u32)> = (0..3).flat_map(|v| sub.neighbors(v, Direction::In).map(move |n| (n, v))).collect();
        assert_eq!(inc, vec![(0, 1), (1, 2)]);
        assert_eq!(bag.num_edges, 2);
    }

    #[test]
    fn test_offset_root_decomposes_and_materializes() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        let pairs: Vec<(u32, u32)> = (0..10).map(|v| (20 + v, 20 + (v + 1) % 10)).collect();
        let desc = GraphBuilder::new(workspace, "offset")
            .with_in_edges(true)
            .with_min_vert_id(20)
            .build::<Type2Edge>(&EdgeList::new(10, &pairs))
            .unwrap();
        let adjacency = AdjacencyStore::<Type2Edge>::open(&desc).unwrap();
        let attrs: Vec<AtomicU32> = (20..30).map(AtomicU32::new).collect();

        let mut queue = TaskQueue::new();
        let bags = decompose(&adjacency, &attrs, &ModThree, &mut queue, workspace).unwrap();
        let remaps: Vec<Vec<u32>> = bags.iter().map(|b| read_records::<u32>(&b.remap_path).unwrap()).collect();
        assert_eq!(remaps[0], vec![22, 25, 28]);
        assert_eq!(remaps[1], vec![20, 23, 26, 29]);
        let bag_desc = GraphDesc::load(&bags[0].desc_path).unwrap();
        assert_eq!((bag_desc.min_vert_id, bag_desc.max_vert_id), (0, 2));

        // The root resolves the multiples of three as themselves; each bag names its local
        // vertex as the representative of all its members.
        let root = Task::root(&workspace.join("offset.desc.yaml"), 20, 10);
        let own: Vec<u32> = (20..30).map(|vid| if vid % 3 == 0 { vid } else { NO_VALUE }).collect();
        queue.record_output(&root, "s", workspace, &own, true).unwrap();
        queue.record_output(&root.child(&bags[0]), "s", workspace, &[0, 0, 0], true).unwrap();
        queue.record_output(&root.child(&bags[1]), "s", workspace, &[3, 3, 3, 3], true).unwrap();

        let manifest = queue.into_manifest(20, 10);
        let result_path = workspace.join("offset.result");
        assert_eq!(materialize(&manifest, &RemapChain::new(workspace, 4), &result_path).unwrap(), 10);
        assert_eq!(read_records::<u32>(&result_path).unwrap(), vec![29, 21, 22, 29, 24, 22, 29, 27, 22, 29]);
    }

    #[test]
    fn test_fully_resolved_run_yields_no_bags() {
        let dir = tempfile::tempdir().unwrap();
        let desc = GraphBuilder::new(dir.path(), "g").build::<Type2Edge>(&EdgeList::new(3, &[(0, 1)])).unwrap();
        let adjacency = AdjacencyStore::<Type2Edge>::open(&desc).unwrap();
        let attrs: Vec<AtomicU32> = (0..3).map(|_| AtomicU32::new(3)).collect();
        let mut queue = TaskQueue::new();
        assert!(decompose(&adjacency, &attrs, &ModThree, &mut queue, dir.path()).unwrap().is_empty());
        assert_eq!(queue.allocate_id(), 1);
    }
}
