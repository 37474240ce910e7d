use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EngineConfig, GraphDesc};
use crate::error::{EngineError, Result};
use crate::io_status::{IoStats, IoStatsCollector};
use crate::storage::{AdjacencyStore, AttrStore};
use crate::types::{AttrRecord, Direction, EdgeRecord, Traversal, VertexId};

use super::program::{
    DirectUpdate, FinalizeAction, Hybrid, IterationControl, IterationInfo, PassKind, ScatterGather,
    VertexContext, VertexProgram,
};
use super::messages::MessageBuffers;
use super::schedule::{Schedule, NUM_LANES};

/// Lane used by single-style programs.
pub const PRIMARY_LANE: usize = 0;

/// How the driver decides that an iteration loop is over. Chosen per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationPolicy {
    /// The active set is what was scheduled; stop once nothing is scheduled.
    ScheduleExhaustion,
    /// The active set is every non-halted vertex; stop once all have halted.
    ExplicitHalt,
    /// Rotate scatter/gather forward, scatter/gather backward and update-vertex; stop once a
    /// whole rotation processed nothing.
    Hybrid,
}

/// Summary of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub iterations: usize,
    pub restarts: usize,
    pub duration: Duration,
    pub io_stats: IoStats,
}

/// The iteration state machine of one task.
///
/// Owns the task's adjacency, its attribute store, the schedule and a dedicated worker pool.
/// A run goes `init -> iterate -> finalize`, and restarts with the flipped traversal
/// direction for as long as `finalize` asks for it.
pub struct Engine<E: EdgeRecord, A: AttrRecord> {
    adjacency: AdjacencyStore<E>,
    attrs: AttrStore<A>,
    schedule: Schedule,
    pool: ThreadPool,
    policy: TerminationPolicy,
    uv_lane: usize,
    message_cap: usize,
}

impl<E: EdgeRecord, A: AttrRecord> Engine<E, A> {
    /// Maps the task's graph and attribute files and builds the worker pool.
    ///
    /// # Arguments
    /// * `config` - Worker count, segment capacity and message buffer cap
    /// * `desc` - The task's graph description
    /// * `attr_path` - Attribute file; reused when it exists, created zeroed otherwise
    /// * `policy` - Termination policy of the task
    pub fn open(config: &EngineConfig, desc: &GraphDesc, attr_path: &Path, policy: TerminationPolicy) -> Result<Self> {
        config.validate()?;
        let adjacency = AdjacencyStore::<E>::open(desc)?;
        let attrs = AttrStore::<A>::open_or_create(attr_path, desc.min_vert_id, desc.vertex_count(), config.segment_cap)?;
        let pool = ThreadPoolBuilder::new().num_threads(config.thread_num).build()?;
        Ok(Self {
            schedule: Schedule::new(adjacency.vertex_count()),
            adjacency,
            attrs,
            pool,
            policy,
            uv_lane: 1,
            message_cap: config.message_buffer_cap,
        })
    }

    pub fn adjacency(&self) -> &AdjacencyStore<E> {
        &self.adjacency
    }

    pub fn attrs(&self) -> &AttrStore<A> {
        &self.attrs
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    /// Runs a direct-update program under the schedule-exhaustion or explicit-halt policy.
    pub fn run_direct<P>(&mut self, program: &mut P) -> Result<EngineReport>
    where
        P: DirectUpdate<E, Attr = A>,
    {
        self.check_program(program, false)?;
        self.run(program, |engine, program, traversal, restart, total| {
            engine.iterate_single(program, traversal, restart, total, PassKind::Direct, |engine, program, iteration| {
                engine.direct_pass(program, PRIMARY_LANE, engine.active_set(), traversal, iteration, restart);
                Ok(())
            })
        })
    }

    /// Runs a scatter/gather program under the schedule-exhaustion or explicit-halt policy.
    pub fn run_scatter_gather<P>(&mut self, program: &mut P) -> Result<EngineReport>
    where
        P: ScatterGather<E, Attr = A>,
    {
        self.check_program(program, false)?;
        self.run(program, |engine, program, traversal, restart, total| {
            let pass = PassKind::ScatterGather(traversal);
            engine.iterate_single(program, traversal, restart, total, pass, |engine, program, iteration| {
                engine.scatter_gather_pass(program, PRIMARY_LANE, engine.active_set(), traversal, iteration, restart)
            })
        })
    }

    /// Runs a hybrid program under the hybrid rotation policy.
    pub fn run_hybrid<P>(&mut self, program: &mut P) -> Result<EngineReport>
    where
        P: Hybrid<E, Attr = A>,
    {
        self.check_program(program, true)?;
        self.uv_lane = program.update_vertex_lane();
        self.run(program, |engine, program, traversal, restart, total| {
            engine.iterate_hybrid(program, traversal, restart, total)
        })
    }

    fn check_program<P: VertexProgram<E>>(&self, program: &P, hybrid: bool) -> Result<()> {
        if hybrid != (self.policy == TerminationPolicy::Hybrid) {
            return Err(EngineError::Config(format!(
                "{} cannot run under the {:?} policy",
                P::NAME,
                self.policy
            )));
        }
        if program.needs_in_edges() && !self.adjacency.has_in_edges() {
            return Err(EngineError::Config(format!("{} needs in-edge files", P::NAME)));
        }
        Ok(())
    }

    /// The restart loop shared by every mode.
    fn run<P, F>(&mut self, program: &mut P, mut iterate: F) -> Result<EngineReport>
    where
        P: VertexProgram<E, Attr = A>,
        F: FnMut(&mut Self, &mut P, Traversal, usize, &mut usize) -> Result<IterationInfo>,
    {
        let measured = IoStatsCollector::measure(|| -> Result<(usize, usize)> {
            let mut traversal = program.traversal();
            let mut restart = 0usize;
            let mut total_iterations = 0usize;
            loop {
                // Step 1. Init every vertex of the task.
                self.schedule.reset();
                self.init_pass(program, traversal, restart);
                if restart > 0 && !self.has_work() {
                    debug!(program = P::NAME, restart, "restart activated nothing");
                    break;
                }

                // Step 2. Iterate until the policy or the program stops.
                let last = iterate(self, program, traversal, restart, &mut total_iterations)?;

                // Step 3. Finalize; maybe restart in the other direction.
                match program.finalize(self.attrs.records(), &last)? {
                    FinalizeAction::EngineStop => break,
                    FinalizeAction::EngineContinue => {
                        restart += 1;
                        traversal = traversal.flip();
                    }
                }
            }
            self.attrs.flush()?;
            Ok((total_iterations, restart))
        });
        measured.log_summary(P::NAME);
        let (iterations, restarts) = measured.result?;
        info!(program = P::NAME, iterations, restarts, "engine run finished");
        Ok(EngineReport { iterations, restarts, duration: measured.duration, io_stats: measured.io_stats })
    }

    /// Whether the schedule holds any work right after `init`.
    fn has_work(&self) -> bool {
        match self.policy {
            TerminationPolicy::ScheduleExhaustion => self.schedule.pending_count(PRIMARY_LANE) > 0,
            TerminationPolicy::ExplicitHalt => self.schedule.non_halted_count(PRIMARY_LANE) > 0,
            TerminationPolicy::Hybrid => {
                (0..NUM_LANES).any(|lane| self.schedule.pending_count(lane) > 0)
                    || self.schedule.non_halted_count(self.uv_lane) > 0
            }
        }
    }

    /// Active set of the primary lane under a single-style policy.
    fn active_set(&self) -> ActiveSet {
        match self.policy {
            TerminationPolicy::ExplicitHalt => ActiveSet::NonHalted,
            _ => ActiveSet::Scheduled,
        }
    }

    fn active_count(&self, lane: usize, set: ActiveSet) -> usize {
        match set {
            ActiveSet::Scheduled => self.schedule.active_count(lane),
            ActiveSet::NonHalted => self.schedule.non_halted_count(lane),
        }
    }

    /// Active slots of `lane` inside one segment, in increasing order.
    fn segment_active(&self, lane: usize, set: ActiveSet, segment: usize) -> Vec<usize> {
        let slots = self.attrs.segment_slots(segment);
        match set {
            ActiveSet::Scheduled => self.schedule.active_slots_in(lane, slots),
            ActiveSet::NonHalted => self.schedule.non_halted_slots_in(lane, slots),
        }
    }

    /// What is left for the next iteration of `lane` under a single-style policy.
    fn remaining(&self, lane: usize) -> usize {
        match self.policy {
            TerminationPolicy::ExplicitHalt => self.schedule.non_halted_count(lane),
            _ => self.schedule.pending_count(lane),
        }
    }

    /// Iteration loop of the direct and scatter/gather modes.
    fn iterate_single<P, F>(
        &mut self,
        program: &mut P,
        traversal: Traversal,
        restart: usize,
        total: &mut usize,
        pass: PassKind,
        mut run_pass: F,
    ) -> Result<IterationInfo>
    where
        P: VertexProgram<E, Attr = A>,
        F: FnMut(&Self, &P, usize) -> Result<()>,
    {
        let set = self.active_set();
        let mut info = IterationInfo { iteration: 0, restart, traversal, pass, active: 0, remaining: 0 };
        let mut iteration = 0;
        loop {
            self.schedule.promote(PRIMARY_LANE);
            let active = self.active_count(PRIMARY_LANE, set);
            if active == 0 {
                break;
            }
            info = IterationInfo { iteration, restart, traversal, pass, active, remaining: 0 };
            program.before_iteration(&info);
            run_pass(self, program, iteration)?;
            info.remaining = self.remaining(PRIMARY_LANE);
            debug!(program = P::NAME, iteration, active = info.active, remaining = info.remaining, "iteration finished");

            iteration += 1;
            *total += 1;
            if program.after_iteration(&info) == IterationControl::Stop {
                break;
            }
        }
        Ok(info)
    }

    /// Iteration loop of the hybrid mode.
    ///
    /// The scatter/gather lane is promoted once per rotation and its active set serves both
    /// the forward and the backward step. The update-vertex lane follows explicit-halt
    /// semantics. Steps with nothing to do are skipped without calling the hooks.
    fn iterate_hybrid<P>(
        &mut self,
        program: &mut P,
        traversal: Traversal,
        restart: usize,
        total: &mut usize,
    ) -> Result<IterationInfo>
    where
        P: Hybrid<E, Attr = A>,
    {
        let sg_lane = program.scatter_gather_lane();
        let uv_lane = program.update_vertex_lane();
        let mut info = IterationInfo { iteration: 0, restart, traversal, pass: PassKind::Direct, active: 0, remaining: 0 };
        let mut iteration = 0;
        loop {
            let mut rotation_active = 0;

            // Step 1. Scatter/gather forward, then backward, over one promoted lane.
            self.schedule.promote(sg_lane);
            let sg_active = self.active_count(sg_lane, ActiveSet::Scheduled);
            if sg_active > 0 {
                for step in [Traversal::Forward, Traversal::Backward] {
                    info = IterationInfo {
                        iteration,
                        restart,
                        traversal,
                        pass: PassKind::ScatterGather(step),
                        active: sg_active,
                        remaining: 0,
                    };
                    program.before_iteration(&info);
                    self.scatter_gather_pass(program, sg_lane, ActiveSet::Scheduled, step, iteration, restart)?;
                    info.remaining = self.schedule.pending_count(sg_lane) + self.schedule.non_halted_count(uv_lane);
                    debug!(program = P::NAME, iteration, ?step, active = info.active, "scatter/gather step finished");
                    rotation_active += sg_active;
                    iteration += 1;
                    *total += 1;
                    if program.after_iteration(&info) == IterationControl::Stop {
                        return Ok(info);
                    }
                }
            }

            // Step 2. Update-vertex over every non-halted vertex of its lane.
            let uv_active = self.active_count(uv_lane, ActiveSet::NonHalted);
            if uv_active > 0 {
                info = IterationInfo {
                    iteration,
                    restart,
                    traversal,
                    pass: PassKind::Direct,
                    active: uv_active,
                    remaining: 0,
                };
                program.before_iteration(&info);
                self.direct_pass(program, uv_lane, ActiveSet::NonHalted, traversal, iteration, restart);
                info.remaining = self.schedule.pending_count(sg_lane) + self.schedule.non_halted_count(uv_lane);
                debug!(program = P::NAME, iteration, active = info.active, "update-vertex step finished");
                rotation_active += uv_active;
                iteration += 1;
                *total += 1;
                if program.after_iteration(&info) == IterationControl::Stop {
                    return Ok(info);
                }
            }

            if rotation_active == 0 {
                return Ok(info);
            }
        }
    }

    /// Calls `f` on the slots `slots_of(segment)` returns, segment by segment.
    ///
    /// Segments are processed in increasing order; the vertices of one segment run in
    /// parallel on the pool with a context whose view caches that segment.
    fn for_each_segment<S, F>(&self, slots_of: S, traversal: Traversal, iteration: usize, restart: usize, f: F)
    where
        S: Fn(usize) -> Vec<usize>,
        F: Fn(VertexId, &A, &VertexContext<'_, E, A>) + Sync,
    {
        let min_vert_id = self.adjacency.min_vert_id();
        for segment in 0..self.attrs.segment_count() {
            let slots = slots_of(segment);
            if slots.is_empty() {
                continue;
            }
            let view = self.attrs.segment_view(segment);
            let ctx = VertexContext::new(&self.adjacency, view, &self.schedule, traversal, iteration, restart);
            self.pool.install(|| {
                slots.par_iter().for_each(|&slot| {
                    let vid = min_vert_id + slot as VertexId;
                    f(vid, view.get(vid), &ctx);
                })
            });
        }
    }

    fn init_pass<P>(&self, program: &P, traversal: Traversal, restart: usize)
    where
        P: VertexProgram<E, Attr = A>,
    {
        self.for_each_segment(
            |segment| self.attrs.segment_slots(segment).collect(),
            traversal,
            0,
            restart,
            |vid, attr, ctx| program.init(vid, attr, ctx),
        );
    }

    fn direct_pass<P>(&self, program: &P, lane: usize, set: ActiveSet, traversal: Traversal, iteration: usize, restart: usize)
    where
        P: DirectUpdate<E, Attr = A>,
    {
        self.for_each_segment(
            |segment| self.segment_active(lane, set, segment),
            traversal,
            iteration,
            restart,
            |vid, attr, ctx| program.update_vertex(vid, attr, ctx),
        );
    }

    /// One scatter/gather iteration: every active vertex scatters over its edges, then each
    /// message is gathered exactly once at its destination.
    ///
    /// Sources are scattered one segment at a time into buffers keyed by destination
    /// segment, which spill to files next to the attribute file past `message_buffer_cap`.
    /// Gathering then loads and sorts one destination segment at a time.
    fn scatter_gather_pass<P>(
        &self,
        program: &P,
        lane: usize,
        set: ActiveSet,
        traversal: Traversal,
        iteration: usize,
        restart: usize,
    ) -> Result<()>
    where
        P: ScatterGather<E, Attr = A>,
    {
        let min_vert_id = self.adjacency.min_vert_id();
        let max_vert_id = self.adjacency.max_vert_id();
        let records = self.attrs.records();
        let segments = self.attrs.segment_count();
        let cap = self.attrs.segment_cap();
        let segment_of = |dest: VertexId| {
            assert!(dest >= min_vert_id && dest <= max_vert_id, "message to vertex {} outside the task", dest);
            (dest - min_vert_id) as usize / cap
        };
        let empty = || -> Vec<Vec<(VertexId, P::Update)>> { (0..segments).map(|_| Vec::new()).collect() };
        let mut buffers = MessageBuffers::new(segments, self.message_cap, self.attrs.path());

        // Step 1. Scatter; attributes are only read here.
        for segment in 0..segments {
            let active = self.segment_active(lane, set, segment);
            if active.is_empty() {
                continue;
            }
            let batch = self.pool.install(|| {
                active
                    .par_iter()
                    .fold(empty, |mut buckets, &slot| {
                        let src = min_vert_id + slot as VertexId;
                        let attr = &records[slot];
                        let mut send = |dest: VertexId, update: Option<P::Update>| {
                            if let Some(update) = update {
                                buckets[segment_of(dest)].push((dest, update));
                            }
                        };
                        match traversal {
                            Traversal::Forward => {
                                for edge in self.adjacency.out_edges(src) {
                                    let dest = edge.dest();
                                    send(dest, program.scatter_one_edge(src, attr, Some(&edge), dest, traversal));
                                }
                            }
                            Traversal::Backward => {
                                for dest in self.adjacency.neighbors(src, Direction::In) {
                                    send(dest, program.scatter_one_edge(src, attr, None, dest, traversal));
                                }
                            }
                        }
                        buckets
                    })
                    .reduce(empty, |mut left, right| {
                        for (bucket, mut messages) in left.iter_mut().zip(right) {
                            bucket.append(&mut messages);
                        }
                        left
                    })
            });
            buffers.absorb(batch)?;
        }
        if buffers.spilled() > 0 {
            debug!(iteration, spilled = buffers.spilled(), "scatter spilled messages to disk");
        }

        // Step 2. Gather one destination segment at a time; one task per destination keeps a
        // single writer per vertex.
        for segment in 0..segments {
            let mut bucket = buffers.take(segment)?;
            if bucket.is_empty() {
                continue;
            }
            self.pool.install(|| bucket.par_sort_by_key(|&(dest, _)| dest));
            let groups = destination_groups(&bucket);
            let view = self.attrs.segment_view(segment);
            let ctx = VertexContext::new(&self.adjacency, view, &self.schedule, traversal, iteration, restart);
            self.pool.install(|| {
                groups.par_iter().for_each(|range| {
                    let dest = bucket[range.start].0;
                    let attr = view.get(dest);
                    for (_, update) in &bucket[range.clone()] {
                        program.gather_one_update(dest, attr, update, &ctx);
                    }
                })
            });
        }
        Ok(())
    }
}

/// Which slots of a lane a pass visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveSet {
    /// Scheduled in the current buffer and not halted.
    Scheduled,
    /// Every vertex that has not halted.
    NonHalted,
}

/// Ranges of equal destinations in a destination-sorted message slice.
fn destination_groups<U>(bucket: &[(VertexId, U)]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut group_start = 0;
    for i in 1..=bucket.len() {
        if i == bucket.len() || bucket[i].0 != bucket[group_start].0 {
            groups.push(group_start..i);
            group_start = i;
        }
    }
    groups
}

#[cfg(test)]
mod test_engine {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::storage::GraphBuilder;
    use crate::types::{EdgeList, Type1Edge};

    #[repr(C)]
    struct Counter {
        received: AtomicU32,
        sum: AtomicU32,
        touched: AtomicU32,
    }
    unsafe impl AttrRecord for Counter {}

    /// Every vertex with out-edges scatters its id once along each out-edge, for one iteration.
    struct Broadcast;

    impl VertexProgram<Type1Edge> for Broadcast {
        type Attr = Counter;
        const NAME: &'static str = "broadcast";

        fn init(&self, vid: VertexId, attr: &Counter, ctx: &VertexContext<'_, Type1Edge, Counter>) {
            attr.received.store(0, Ordering::Relaxed);
            attr.sum.store(0, Ordering::Relaxed);
            attr.touched.store(0, Ordering::Relaxed);
            ctx.add_schedule(vid, PRIMARY_LANE);
        }
    }

    impl ScatterGather<Type1Edge> for Broadcast {
        type Update = u32;

        fn scatter_one_edge(&self, src: VertexId, _attr: &Counter, edge: Option<&Type1Edge>, dest: VertexId, _traversal: Traversal) -> Option<u32> {
            assert_eq!(edge.map(|e| e.dest), Some(dest));
            Some(src)
        }

        fn gather_one_update(&self, _vid: VertexId, attr: &Counter, update: &u32, _ctx: &VertexContext<'_, Type1Edge, Counter>) {
            attr.received.fetch_add(1, Ordering::Relaxed);
            attr.sum.fetch_add(*update, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_gather_once_per_message() {
        let dir = tempfile::tempdir().unwrap();
        // vertex 4 receives from 0, 1 (twice) and 3.
        let list = EdgeList::new(6, &[(0, 4), (1, 4), (1, 4), (3, 4), (0, 2), (5, 0)]);
        let desc = GraphBuilder::new(dir.path(), "fan").build::<Type1Edge>(&list).unwrap();
        let config = EngineConfig { thread_num: 3, segment_cap: 2, ..EngineConfig::default() };
        let mut engine = Engine::<Type1Edge, Counter>::open(
            &config,
            &desc,
            &dir.path().join("fan.attr"),
            TerminationPolicy::ScheduleExhaustion,
        )
        .unwrap();

        let report = engine.run_scatter_gather(&mut Broadcast).unwrap();
        assert_eq!(report.iterations, 1);
        let received = |vid: u32| engine.attrs().get(vid).received.load(Ordering::Relaxed);
        let sum = |vid: u32| engine.attrs().get(vid).sum.load(Ordering::Relaxed);
        assert_eq!(received(4), 4);
        assert_eq!(sum(4), 1 + 1 + 3);
        assert_eq!((received(2), sum(2)), (1, 0));
        assert_eq!((received(0), sum(0)), (1, 5));
        // Vertices without incoming messages are untouched.
        for vid in [1, 3, 5] {
            assert_eq!(received(vid), 0);
            assert_eq!(engine.attrs().get(vid).touched.load(Ordering::Relaxed), 0);
        }
    }

    #[test]
    fn test_spilled_messages_gather_like_buffered_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let edges: Vec<(u32, u32)> = (0..200).map(|_| (rng.gen_range(0..40), rng.gen_range(0..40))).collect();
        let list = EdgeList::new(40, &edges);
        let desc = GraphBuilder::new(dir.path(), "spill").build::<Type1Edge>(&list).unwrap();

        let gathered = |message_buffer_cap: usize, attr: &str| {
            let config = EngineConfig { thread_num: 4, segment_cap: 7, message_buffer_cap, ..EngineConfig::default() };
            let mut engine = Engine::<Type1Edge, Counter>::open(
                &config,
                &desc,
                &dir.path().join(attr),
                TerminationPolicy::ScheduleExhaustion,
            )
            .unwrap();
            engine.run_scatter_gather(&mut Broadcast).unwrap();
            (0..40)
                .map(|vid| {
                    let attr = engine.attrs().get(vid);
                    (attr.received.load(Ordering::Relaxed), attr.sum.load(Ordering::Relaxed))
                })
                .collect::<Vec<_>>()
        };

        let buffered = gathered(1 << 20, "buffered.attr");
        let spilled = gathered(1, "spilled.attr");
        assert_eq!(buffered, spilled);
        assert_eq!(spilled.iter().map(|&(received, _)| received as usize).sum::<usize>(), edges.len());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().extension().map_or(false, |ext| ext == "msg"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_segment_active_splits_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(10, &[(0, 1)]);
        let desc = GraphBuilder::new(dir.path(), "split").build::<Type1Edge>(&list).unwrap();
        let config = EngineConfig { thread_num: 1, segment_cap: 4, ..EngineConfig::default() };
        let mut engine =
            Engine::<Type1Edge, Counter>::open(&config, &desc, &dir.path().join("split.attr"), TerminationPolicy::ExplicitHalt)
                .unwrap();
        for vid in [1, 5, 6, 9] {
            engine.schedule.add_schedule(vid as usize, PRIMARY_LANE);
        }
        engine.schedule.vote_to_halt(6, PRIMARY_LANE);
        engine.schedule.promote(PRIMARY_LANE);

        assert_eq!(engine.segment_active(PRIMARY_LANE, ActiveSet::Scheduled, 0), vec![1]);
        assert_eq!(engine.segment_active(PRIMARY_LANE, ActiveSet::Scheduled, 1), vec![5]);
        assert_eq!(engine.segment_active(PRIMARY_LANE, ActiveSet::Scheduled, 2), vec![9]);
        assert_eq!(engine.segment_active(PRIMARY_LANE, ActiveSet::NonHalted, 1), vec![4, 5, 7]);
        assert_eq!(engine.active_count(PRIMARY_LANE, ActiveSet::Scheduled), 3);
        assert_eq!(engine.active_count(PRIMARY_LANE, ActiveSet::NonHalted), 9);
    }

    /// Counts down a per-vertex budget and halts at zero.
    struct Countdown;

    impl VertexProgram<Type1Edge> for Countdown {
        type Attr = Counter;
        const NAME: &'static str = "countdown";

        fn init(&self, vid: VertexId, attr: &Counter, _ctx: &VertexContext<'_, Type1Edge, Counter>) {
            attr.received.store(vid, Ordering::Relaxed);
            attr.touched.store(0, Ordering::Relaxed);
        }
    }

    impl DirectUpdate<Type1Edge> for Countdown {
        fn update_vertex(&self, vid: VertexId, attr: &Counter, ctx: &VertexContext<'_, Type1Edge, Counter>) {
            attr.touched.fetch_add(1, Ordering::Relaxed);
            let left = attr.received.load(Ordering::Relaxed);
            if left <= 1 {
                ctx.vote_to_halt(vid, PRIMARY_LANE);
            } else {
                attr.received.store(left - 1, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn test_explicit_halt_runs_until_all_halt() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(4, &[(0, 1)]);
        let desc = GraphBuilder::new(dir.path(), "halt").build::<Type1Edge>(&list).unwrap();
        let config = EngineConfig { thread_num: 2, segment_cap: 3, ..EngineConfig::default() };
        let mut engine =
            Engine::<Type1Edge, Counter>::open(&config, &desc, &dir.path().join("halt.attr"), TerminationPolicy::ExplicitHalt)
                .unwrap();

        let report = engine.run_direct(&mut Countdown).unwrap();
        // vertex 3 needs three updates before halting.
        assert_eq!(report.iterations, 3);
        let touched = (0..4).map(|vid| engine.attrs().get(vid).touched.load(Ordering::Relaxed)).collect::<Vec<_>>();
        assert_eq!(touched, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_policy_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(2, &[(0, 1)]);
        let desc = GraphBuilder::new(dir.path(), "mismatch").build::<Type1Edge>(&list).unwrap();
        let mut engine = Engine::<Type1Edge, Counter>::open(
            &EngineConfig::default(),
            &desc,
            &dir.path().join("mismatch.attr"),
            TerminationPolicy::Hybrid,
        )
        .unwrap();
        assert!(matches!(engine.run_direct(&mut Countdown), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_destination_groups() {
        let bucket = [(1u32, ()), (1, ()), (4, ()), (7, ()), (7, ())];
        assert_eq!(destination_groups(&bucket), vec![0..2, 2..3, 3..5]);
        assert!(destination_groups::<()>(&[]).is_empty());
    }
}
