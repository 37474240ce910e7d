use std::ops::Range;

use crate::config::GraphDesc;
use crate::error::{EngineError, Result};
use crate::storage::attr_store::SegmentView;
use crate::storage::mapped::RecordArray;
use crate::types::{Direction, EdgeRecord, InEdge, VertexId};

/// Read-only CSR adjacency of one graph (or bag), mapped from its index and edge files.
///
/// The index file holds one `u64` offset per vertex; a vertex's edges run from its offset to
/// the next vertex's offset, and the last vertex's edges run to the end of the edge file.
/// The reverse adjacency mirrors this layout with `{src}` records when the description
/// carries in-edge files.
pub struct AdjacencyStore<E: EdgeRecord> {
    min_vert_id: VertexId,
    max_vert_id: VertexId,
    out_index: RecordArray<u64>,
    out_edges: RecordArray<E>,
    reverse: Option<(RecordArray<u64>, RecordArray<InEdge>)>,
}

impl<E: EdgeRecord> AdjacencyStore<E> {
    /// Maps every file named by `desc` and validates them against each other.
    ///
    /// # Arguments
    /// * `desc` - A loaded graph description with resolved file paths.
    ///
    /// # Returns
    /// The store, or a `Format`/`Config` error when a file disagrees with the description.
    pub fn open(desc: &GraphDesc) -> Result<Self> {
        if desc.edge_type != E::EDGE_TYPE {
            return Err(EngineError::Config(format!(
                "graph uses {:?} edges, engine was instantiated for {:?}",
                desc.edge_type,
                E::EDGE_TYPE
            )));
        }
        let vertex_count = desc.vertex_count();

        // Step 1. Forward adjacency.
        let out_index = RecordArray::<u64>::open_exact(&desc.vert_file, vertex_count)?;
        let out_edges = RecordArray::<E>::open_exact(&desc.edge_file, desc.num_edges as usize)?;
        check_offsets(&out_index, out_edges.len())?;

        // Step 2. Reverse adjacency, when present.
        let reverse = match (&desc.in_vert_file, &desc.in_edge_file) {
            (Some(in_vert_file), Some(in_edge_file)) => {
                let in_index = RecordArray::<u64>::open_exact(in_vert_file, vertex_count)?;
                let in_edges = RecordArray::<InEdge>::open_exact(in_edge_file, desc.num_edges as usize)?;
                check_offsets(&in_index, in_edges.len())?;
                Some((in_index, in_edges))
            }
            _ => None,
        };

        Ok(Self {
            min_vert_id: desc.min_vert_id,
            max_vert_id: desc.max_vert_id,
            out_index,
            out_edges,
            reverse,
        })
    }

    pub fn min_vert_id(&self) -> VertexId {
        self.min_vert_id
    }

    pub fn max_vert_id(&self) -> VertexId {
        self.max_vert_id
    }

    pub fn vertex_count(&self) -> usize {
        (self.max_vert_id - self.min_vert_id) as usize + 1
    }

    pub fn has_in_edges(&self) -> bool {
        self.reverse.is_some()
    }

    /// Vertex ids covered by this store.
    pub fn vertices(&self) -> std::ops::RangeInclusive<VertexId> {
        self.min_vert_id..=self.max_vert_id
    }

    fn slot(&self, vid: VertexId) -> usize {
        assert!(
            vid >= self.min_vert_id && vid <= self.max_vert_id,
            "vertex {} outside [{}, {}]",
            vid,
            self.min_vert_id,
            self.max_vert_id
        );
        (vid - self.min_vert_id) as usize
    }

    fn edge_range(index: &RecordArray<u64>, total: usize, slot: usize) -> Range<usize> {
        let start = index.get(slot) as usize;
        let end = if slot + 1 < index.len() { index.get(slot + 1) as usize } else { total };
        start..end
    }

    fn out_range(&self, vid: VertexId) -> Range<usize> {
        Self::edge_range(&self.out_index, self.out_edges.len(), self.slot(vid))
    }

    fn in_range(&self, vid: VertexId) -> Range<usize> {
        let slot = self.slot(vid);
        match &self.reverse {
            Some((in_index, in_edges)) => Self::edge_range(in_index, in_edges.len(), slot),
            None => 0..0,
        }
    }

    /// Number of edges of `vid` in direction `dir`.
    ///
    /// Graphs without in-edge files report zero in-edges; engines that need them refuse to
    /// start on such graphs.
    pub fn num_edges(&self, vid: VertexId, dir: Direction) -> usize {
        match dir {
            Direction::Out => self.out_range(vid).len(),
            Direction::In => self.in_range(vid).len(),
        }
    }

    /// The `i`-th out-edge record of `vid`.
    pub fn out_edge(&self, vid: VertexId, i: usize) -> E {
        let range = self.out_range(vid);
        assert!(i < range.len(), "out-edge {} of vertex {} out of range", i, vid);
        self.out_edges.get(range.start + i)
    }

    pub fn out_neighbor(&self, vid: VertexId, i: usize) -> VertexId {
        self.out_edge(vid, i).dest()
    }

    pub fn in_neighbor(&self, vid: VertexId, i: usize) -> VertexId {
        let range = self.in_range(vid);
        assert!(i < range.len(), "in-edge {} of vertex {} out of range", i, vid);
        match &self.reverse {
            Some((_, in_edges)) => in_edges.get(range.start + i).src,
            None => unreachable!("empty in-range without in-edge files"),
        }
    }

    /// The `i`-th neighbor of `vid` in direction `dir`.
    pub fn neighbor(&self, vid: VertexId, dir: Direction, i: usize) -> VertexId {
        match dir {
            Direction::Out => self.out_neighbor(vid, i),
            Direction::In => self.in_neighbor(vid, i),
        }
    }

    pub fn out_edges(&self, vid: VertexId) -> impl Iterator<Item = E> + '_ {
        self.out_edges.iter_range(self.out_range(vid))
    }

    pub fn neighbors(&self, vid: VertexId, dir: Direction) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.num_edges(vid, dir)).map(move |i| self.neighbor(vid, dir, i))
    }

    /// Attribute record of the `i`-th neighbor of `vid`, read through `view`.
    ///
    /// The view picks the segment slice when the neighbor shares the home vertex's segment and
    /// the full array otherwise.
    pub fn neigh_attr<'a, A>(&self, vid: VertexId, dir: Direction, i: usize, view: &SegmentView<'a, A>) -> &'a A {
        view.get(self.neighbor(vid, dir, i))
    }
}

/// Offsets must be non-decreasing and bounded by the edge count.
fn check_offsets(index: &RecordArray<u64>, total: usize) -> Result<()> {
    let mut previous = 0u64;
    for slot in 0..index.len() {
        let offset = index.get(slot);
        if offset < previous || offset as usize > total {
            return Err(EngineError::format(
                index.path(),
                format!("offset {} of slot {} is out of order or beyond {} edges", offset, slot, total),
            ));
        }
        previous = offset;
    }
    Ok(())
}

#[cfg(test)]
mod test_adjacency {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::storage::attr_store::AttrStore;
    use crate::storage::builder::GraphBuilder;
    use crate::types::{AttrRecord, EdgeList, Type1Edge, Type2Edge};

    #[repr(C)]
    struct Mark {
        value: AtomicU32,
    }
    unsafe impl AttrRecord for Mark {}

    #[test]
    fn test_neighbors_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(5, &[(0, 1), (1, 2), (2, 3), (0, 3)]);
        let desc = GraphBuilder::new(dir.path(), "chain").with_in_edges(true).build::<Type1Edge>(&list).unwrap();
        let store = AdjacencyStore::<Type1Edge>::open(&desc).unwrap();

        assert_eq!(store.vertex_count(), 5);
        assert_eq!(store.num_edges(0, Direction::Out), 2);
        assert_eq!(store.neighbors(0, Direction::Out).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(store.neighbors(3, Direction::In).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(store.num_edges(4, Direction::Out), 0);
        assert_eq!(store.num_edges(4, Direction::In), 0);
        assert_eq!(store.in_neighbor(1, 0), 0);
    }

    #[test]
    fn test_neighbor_attr_through_segments() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(6, &[(0, 1), (0, 5), (3, 4)]);
        let desc = GraphBuilder::new(dir.path(), "seg").build::<Type1Edge>(&list).unwrap();
        let store = AdjacencyStore::<Type1Edge>::open(&desc).unwrap();
        let attrs = AttrStore::<Mark>::create(&dir.path().join("mark.attr"), 0, 6, 2).unwrap();
        for (slot, mark) in attrs.records().iter().enumerate() {
            mark.value.store(100 + slot as u32, Ordering::Relaxed);
        }

        let view = attrs.view_for(0);
        // vertex 1 shares segment 0, vertex 5 lives in segment 2.
        assert!(view.is_local(1));
        assert!(!view.is_local(5));
        assert_eq!(store.neigh_attr(0, Direction::Out, 0, &view).value.load(Ordering::Relaxed), 101);
        assert_eq!(store.neigh_attr(0, Direction::Out, 1, &view).value.load(Ordering::Relaxed), 105);
    }

    #[test]
    fn test_rejects_wrong_edge_type() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(2, &[(0, 1)]);
        let desc = GraphBuilder::new(dir.path(), "typed").build::<Type1Edge>(&list).unwrap();
        assert!(matches!(AdjacencyStore::<Type2Edge>::open(&desc), Err(EngineError::Config(_))));
    }

    #[test]
    #[should_panic]
    fn test_edge_index_is_bounds_checked() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(2, &[(0, 1)]);
        let desc = GraphBuilder::new(dir.path(), "bounds").build::<Type1Edge>(&list).unwrap();
        let store = AdjacencyStore::<Type1Edge>::open(&desc).unwrap();
        store.out_neighbor(0, 1);
    }
}
