pub mod graph_serialize;
pub mod attr;

pub use attr::{AtomicF32, AttrRecord};
pub use graph_serialize::{ByteEncodable, EdgeRecord, InEdge, Type1Edge, Type2Edge};

/// Dense vertex identifier. Every id in `[min_vert_id, max_vert_id]` owns one attribute slot.
pub type VertexId = u32;

/// Identifier of one task in the decomposition queue; the root task is `0`.
pub type TaskId = u32;

/// Which adjacency of a vertex to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

/// Traversal direction of a scatter/gather pass.
///
/// `Forward` scatters along out-edges to their destinations. `Backward` scatters along
/// in-edges to their sources, i.e. messages travel against the edge direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    Forward,
    Backward,
}

impl Traversal {
    /// The opposite direction, used when the driver restarts a run.
    pub fn flip(self) -> Self {
        match self {
            Traversal::Forward => Traversal::Backward,
            Traversal::Backward => Traversal::Forward,
        }
    }
}

/// An in-memory edge list, the input of the graph builder.
///
/// Vertex ids are dense in `[0, vertex_count)`. Each edge is `(src, dst, weight)`; the weight
/// is only persisted by the weighted edge layout.
#[derive(Debug, Clone, Default)]
pub struct EdgeList {
    pub vertex_count: u32,
    pub edges: Vec<(VertexId, VertexId, f32)>,
}

impl EdgeList {
    /// Builds an unweighted edge list over `vertex_count` vertices.
    pub fn new(vertex_count: u32, edges: &[(VertexId, VertexId)]) -> Self {
        Self {
            vertex_count,
            edges: edges.iter().map(|&(src, dst)| (src, dst, 1.0)).collect(),
        }
    }

    /// Adds the reverse of every edge, turning a directed list into an undirected one.
    pub fn symmetrize(mut self) -> Self {
        let reversed = self
            .edges
            .iter()
            .filter(|(src, dst, _)| src != dst)
            .map(|&(src, dst, weight)| (dst, src, weight))
            .collect::<Vec<_>>();
        self.edges.extend(reversed);
        self
    }
}
