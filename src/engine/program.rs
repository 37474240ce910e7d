use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::storage::{AdjacencyStore, SegmentView};
use crate::types::{AttrRecord, Direction, EdgeRecord, Traversal, VertexId};

use super::schedule::Schedule;

/// Verdict of `after_iteration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationControl {
    Continue,
    Stop,
}

/// Verdict of `finalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAction {
    /// The run is over.
    EngineStop,
    /// Flip the traversal direction, reset the schedule and run `init` again.
    EngineContinue,
}

/// Which update style an iteration applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Direct,
    ScatterGather(Traversal),
}

/// Counters handed to the iteration hooks.
///
/// # Fields
/// * `iteration` - Zero-based index of the iteration within the current restart
/// * `restart` - How many times `finalize` returned `EngineContinue` so far
/// * `traversal` - Direction of the current restart
/// * `pass` - Update style of the iteration
/// * `active` - Vertices processed by the iteration
/// * `remaining` - After the pass: vertices scheduled for the next iteration, or non-halted
///   vertices under the explicit-halt policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationInfo {
    pub iteration: usize,
    pub restart: usize,
    pub traversal: Traversal,
    pub pass: PassKind,
    pub active: usize,
    pub remaining: usize,
}

/// The part every vertex program implements: its attribute type and lifecycle hooks.
///
/// `init`, updates and gathers run concurrently on the worker pool and take `&self`;
/// the iteration hooks run on the driver thread between passes and may mutate the program.
pub trait VertexProgram<E: EdgeRecord>: Send + Sync {
    /// Per-vertex attribute record stored in the attribute file.
    type Attr: AttrRecord;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Whether the program reads in-edges; the engine refuses graphs without them.
    fn needs_in_edges(&self) -> bool {
        false
    }

    /// Direction of the first run.
    fn traversal(&self) -> Traversal {
        Traversal::Forward
    }

    /// Sets the initial attribute of `vid`; may schedule or halt it.
    fn init(&self, vid: VertexId, attr: &Self::Attr, ctx: &VertexContext<'_, E, Self::Attr>);

    fn before_iteration(&mut self, _info: &IterationInfo) {}

    /// Default: keep going while anything remains.
    fn after_iteration(&mut self, info: &IterationInfo) -> IterationControl {
        if info.remaining == 0 {
            IterationControl::Stop
        } else {
            IterationControl::Continue
        }
    }

    /// Inspects the final attributes (indexed by slot); may request a restart.
    fn finalize(&mut self, _attrs: &[Self::Attr], _info: &IterationInfo) -> Result<FinalizeAction> {
        Ok(FinalizeAction::EngineStop)
    }
}

/// Direct update style: full random access to the vertex's and its neighbors' attributes.
pub trait DirectUpdate<E: EdgeRecord>: VertexProgram<E> {
    fn update_vertex(&self, vid: VertexId, attr: &Self::Attr, ctx: &VertexContext<'_, E, Self::Attr>);
}

/// Scatter/gather update style: state travels as one message per edge.
pub trait ScatterGather<E: EdgeRecord>: VertexProgram<E> {
    /// Message payload; the destination is carried by the engine. Serializable so that
    /// large passes can spill messages to disk.
    type Update: Copy + Send + Sync + Serialize + DeserializeOwned;

    /// Produces the message `src` sends over one edge, or `None` to send nothing.
    ///
    /// # Arguments
    /// * `src` - The scattering vertex
    /// * `attr` - Its attribute
    /// * `edge` - The out-edge record on forward passes, `None` on backward passes
    /// * `dest` - The receiving vertex: the edge's destination forward, the in-neighbor
    ///   backward
    /// * `traversal` - Direction of the pass
    fn scatter_one_edge(
        &self,
        src: VertexId,
        attr: &Self::Attr,
        edge: Option<&E>,
        dest: VertexId,
        traversal: Traversal,
    ) -> Option<Self::Update>;

    /// Consumes one message at its destination. Only `attr` (the destination's own record)
    /// may be mutated, and no other gather for the same vertex runs concurrently.
    fn gather_one_update(
        &self,
        vid: VertexId,
        attr: &Self::Attr,
        update: &Self::Update,
        ctx: &VertexContext<'_, E, Self::Attr>,
    );
}

/// A program alternating both update styles, each owning one schedule lane.
pub trait Hybrid<E: EdgeRecord>: DirectUpdate<E> + ScatterGather<E> {
    fn scatter_gather_lane(&self) -> usize {
        0
    }

    fn update_vertex_lane(&self) -> usize {
        1
    }
}

/// A program whose unresolved vertices can be split into independent sub-problems.
pub trait Decomposable<E: EdgeRecord>: VertexProgram<E> {
    /// Number of partitions `judge_for_filter` may return.
    fn num_of_remain_partitions(&self) -> usize;

    /// Partition of a vertex in `[0, num_of_remain_partitions)`, or `None` when resolved.
    fn judge_for_filter(&self, vid: VertexId, attr: &Self::Attr) -> Option<usize>;
}

/// The engine handle passed to `init`, `update_vertex` and `gather_one_update`.
///
/// Gives read access to the adjacency, two-tier access to attributes of the segment being
/// processed, and the schedule primitives. Schedule writes always target the next iteration.
pub struct VertexContext<'a, E: EdgeRecord, A> {
    adjacency: &'a AdjacencyStore<E>,
    view: SegmentView<'a, A>,
    schedule: &'a Schedule,
    traversal: Traversal,
    iteration: usize,
    restart: usize,
}

impl<'a, E: EdgeRecord, A> VertexContext<'a, E, A> {
    pub(crate) fn new(
        adjacency: &'a AdjacencyStore<E>,
        view: SegmentView<'a, A>,
        schedule: &'a Schedule,
        traversal: Traversal,
        iteration: usize,
        restart: usize,
    ) -> Self {
        Self { adjacency, view, schedule, traversal, iteration, restart }
    }

    fn slot(&self, vid: VertexId) -> usize {
        assert!(
            vid >= self.adjacency.min_vert_id() && vid <= self.adjacency.max_vert_id(),
            "vertex {} outside the task range",
            vid
        );
        (vid - self.adjacency.min_vert_id()) as usize
    }

    /// Activates `vid` in `lane` for the next iteration unless halted or already pending.
    pub fn add_schedule(&self, vid: VertexId, lane: usize) {
        self.schedule.add_schedule(self.slot(vid), lane);
    }

    /// Activates `vid` in `lane` for the next iteration, always writing the membership bit.
    pub fn add_schedule_no_optimize(&self, vid: VertexId, lane: usize) {
        self.schedule.add_schedule_no_optimize(self.slot(vid), lane);
    }

    /// Excludes `vid` from every future activation in `lane`.
    pub fn vote_to_halt(&self, vid: VertexId, lane: usize) {
        self.schedule.vote_to_halt(self.slot(vid), lane);
    }

    pub fn is_halted(&self, vid: VertexId, lane: usize) -> bool {
        self.schedule.is_halted(self.slot(vid), lane)
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn restart(&self) -> usize {
        self.restart
    }

    pub fn min_vert_id(&self) -> VertexId {
        self.adjacency.min_vert_id()
    }

    pub fn max_vert_id(&self) -> VertexId {
        self.adjacency.max_vert_id()
    }

    pub fn num_edges(&self, vid: VertexId, dir: Direction) -> usize {
        self.adjacency.num_edges(vid, dir)
    }

    pub fn out_edge(&self, vid: VertexId, i: usize) -> E {
        self.adjacency.out_edge(vid, i)
    }

    pub fn out_neighbor(&self, vid: VertexId, i: usize) -> VertexId {
        self.adjacency.out_neighbor(vid, i)
    }

    pub fn in_neighbor(&self, vid: VertexId, i: usize) -> VertexId {
        self.adjacency.in_neighbor(vid, i)
    }

    pub fn neighbors(&self, vid: VertexId, dir: Direction) -> impl Iterator<Item = VertexId> + 'a {
        let adjacency = self.adjacency;
        (0..adjacency.num_edges(vid, dir)).map(move |i| adjacency.neighbor(vid, dir, i))
    }

    /// Attribute of the `i`-th out-neighbor of `vid`.
    pub fn out_neigh_attr(&self, vid: VertexId, i: usize) -> &'a A {
        self.adjacency.neigh_attr(vid, Direction::Out, i, &self.view)
    }

    /// Attribute of the `i`-th in-neighbor of `vid`.
    pub fn in_neigh_attr(&self, vid: VertexId, i: usize) -> &'a A {
        self.adjacency.neigh_attr(vid, Direction::In, i, &self.view)
    }

    /// Attribute of an arbitrary vertex of the task.
    pub fn attr(&self, vid: VertexId) -> &'a A {
        self.slot(vid);
        self.view.get(vid)
    }

    /// Iterates `(neighbor id, neighbor attribute)` in direction `dir`.
    pub fn neighbor_attrs(&self, vid: VertexId, dir: Direction) -> impl Iterator<Item = (VertexId, &'a A)> + 'a {
        let adjacency = self.adjacency;
        let view = self.view;
        (0..adjacency.num_edges(vid, dir)).map(move |i| {
            let neighbor = adjacency.neighbor(vid, dir, i);
            (neighbor, view.get(neighbor))
        })
    }
}
