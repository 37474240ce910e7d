use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use tracing::{debug, info};

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    Decomposable, Engine, EngineReport, FinalizeAction, IterationInfo, ScatterGather, TerminationPolicy, VertexContext,
    VertexProgram, PRIMARY_LANE,
};
use crate::error::{EngineError, Result};
use crate::filter::{decompose, materialize, remove_bag_files, Bag, RemapChain, Task, TaskQueue, NO_VALUE};
use crate::io_status::IoStats;
use crate::storage::AdjacencyStore;
use crate::types::{AttrRecord, Direction, EdgeRecord, Traversal, VertexId};
use crate::util::remove_if_exists;

/// Remap tables kept in memory while materializing the result.
const REMAP_CACHE_TABLES: u64 = 1024;

/// Labels of the forward/backward reachability program.
pub mod fb_label {
    /// The pivot during the forward run.
    pub const START: u8 = 0;
    /// Reached forward from the pivot.
    pub const FORWARD: u8 = 1;
    /// Reached backward; together with `found`, a member of the pivot's component.
    pub const BACKWARD: u8 = 2;
    /// No in- or no out-edges: a component of its own.
    pub const TRIMMED: u8 = 3;
    /// Not reached at all.
    pub const REMAIN: u8 = 8;
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct FbAttr {
    pub fw_bw_label: AtomicU8,
    pub found: AtomicU8,
}

unsafe impl AttrRecord for FbAttr {}

impl FbAttr {
    pub fn label(&self) -> u8 {
        self.fw_bw_label.load(Ordering::Relaxed)
    }

    pub fn is_found(&self) -> bool {
        self.found.load(Ordering::Relaxed) != 0
    }

    fn set(&self, label: u8, found: bool) {
        self.fw_bw_label.store(label, Ordering::Relaxed);
        self.found.store(found as u8, Ordering::Relaxed);
    }
}

/// Attribute of the trimming and min-label coloring programs.
///
/// Trimming keeps its remaining-degree counter in `component_root` until the vertex is found.
#[repr(C)]
#[derive(Debug, Default)]
pub struct ColorAttr {
    pub prev_root: AtomicU32,
    pub component_root: AtomicU32,
    pub found: AtomicU8,
}

unsafe impl AttrRecord for ColorAttr {}

impl ColorAttr {
    pub fn root(&self) -> u32 {
        self.component_root.load(Ordering::Relaxed)
    }

    pub fn prev(&self) -> u32 {
        self.prev_root.load(Ordering::Relaxed)
    }

    pub fn is_found(&self) -> bool {
        self.found.load(Ordering::Relaxed) != 0
    }

    fn set_found(&self, found: bool) {
        self.found.store(found as u8, Ordering::Relaxed);
    }

    /// Marks the vertex as a component rooted at itself.
    fn settle_as_root(&self, vid: VertexId) {
        self.prev_root.store(vid, Ordering::Relaxed);
        self.component_root.store(vid, Ordering::Relaxed);
        self.set_found(true);
    }
}

fn is_trivial<E: EdgeRecord, A>(vid: VertexId, ctx: &VertexContext<'_, E, A>) -> bool {
    ctx.num_edges(vid, Direction::Out) == 0 || ctx.num_edges(vid, Direction::In) == 0
}

/// The vertex maximizing `in_degree * out_degree`, the first one on ties.
pub fn select_pivot<E: EdgeRecord>(adjacency: &AdjacencyStore<E>) -> VertexId {
    let mut pivot = adjacency.min_vert_id();
    let mut best = 0u64;
    for vid in adjacency.vertices() {
        let score = adjacency.num_edges(vid, Direction::In) as u64 * adjacency.num_edges(vid, Direction::Out) as u64;
        if score > best {
            pivot = vid;
            best = score;
        }
    }
    pivot
}

/// Forward then backward reachability from a pivot.
///
/// After the backward run, the pivot's component is every vertex labeled `BACKWARD` and
/// found. The rest splits into three independent sub-problems: reached only forward, reached
/// only backward, and not reached.
pub struct SccFbProgram {
    pivot: VertexId,
}

impl SccFbProgram {
    pub fn new(pivot: VertexId) -> Self {
        Self { pivot }
    }

    pub fn pivot(&self) -> VertexId {
        self.pivot
    }

    /// Component representative per slot: the pivot for its component, the vertex itself for
    /// trimmed vertices, [`NO_VALUE`] for vertices left to the sub-problems.
    pub fn outputs(&self, attrs: &[FbAttr], min_vert_id: VertexId) -> Vec<u32> {
        attrs
            .iter()
            .enumerate()
            .map(|(slot, attr)| match attr.label() {
                fb_label::BACKWARD if attr.is_found() => self.pivot,
                fb_label::TRIMMED => min_vert_id + slot as VertexId,
                _ => NO_VALUE,
            })
            .collect()
    }
}

impl<E: EdgeRecord> VertexProgram<E> for SccFbProgram {
    type Attr = FbAttr;
    const NAME: &'static str = "scc-fb";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &FbAttr, ctx: &VertexContext<'_, E, FbAttr>) {
        if ctx.restart() == 0 && ctx.traversal() == Traversal::Forward {
            if is_trivial(vid, ctx) {
                attr.set(fb_label::TRIMMED, true);
            } else if vid == self.pivot {
                attr.set(fb_label::START, false);
                ctx.add_schedule(vid, PRIMARY_LANE);
            } else {
                attr.set(fb_label::REMAIN, false);
            }
        } else {
            assert_eq!(ctx.traversal(), Traversal::Backward, "scc-fb restarts only once");
            if vid == self.pivot {
                attr.set(fb_label::BACKWARD, true);
                ctx.add_schedule(vid, PRIMARY_LANE);
            } else if attr.label() == fb_label::START {
                attr.fw_bw_label.store(fb_label::FORWARD, Ordering::Relaxed);
            }
        }
    }

    fn finalize(&mut self, attrs: &[FbAttr], info: &IterationInfo) -> Result<FinalizeAction> {
        if info.restart == 0 {
            return Ok(FinalizeAction::EngineContinue);
        }
        let members = attrs.iter().filter(|a| a.label() == fb_label::BACKWARD && a.is_found()).count();
        debug!(pivot = self.pivot, members, "pivot component found");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> ScatterGather<E> for SccFbProgram {
    type Update = u8;

    fn scatter_one_edge(&self, _src: VertexId, attr: &FbAttr, _edge: Option<&E>, _dest: VertexId, _traversal: Traversal) -> Option<u8> {
        Some(attr.label())
    }

    fn gather_one_update(&self, vid: VertexId, attr: &FbAttr, update: &u8, ctx: &VertexContext<'_, E, FbAttr>) {
        match ctx.traversal() {
            Traversal::Forward => {
                assert_eq!(*update, fb_label::START, "forward message with label {}", update);
                if attr.label() == fb_label::REMAIN {
                    attr.fw_bw_label.store(fb_label::START, Ordering::Relaxed);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
            Traversal::Backward => {
                assert_eq!(*update, fb_label::BACKWARD, "backward message with label {}", update);
                let label = attr.label();
                if label == fb_label::REMAIN {
                    attr.fw_bw_label.store(fb_label::BACKWARD, Ordering::Relaxed);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                } else if label == fb_label::FORWARD && !attr.is_found() {
                    attr.set(fb_label::BACKWARD, true);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
        }
    }
}

impl<E: EdgeRecord> Decomposable<E> for SccFbProgram {
    fn num_of_remain_partitions(&self) -> usize {
        3
    }

    fn judge_for_filter(&self, _vid: VertexId, attr: &FbAttr) -> Option<usize> {
        match attr.label() {
            fb_label::FORWARD => Some(0),
            fb_label::BACKWARD if !attr.is_found() => Some(1),
            fb_label::REMAIN => Some(2),
            _ => None,
        }
    }
}

/// Peels vertices that cannot lie on a cycle: first those whose in-degree drops to zero
/// (forward run), then those whose out-degree is zero (backward run).
#[derive(Default)]
pub struct SccTrimProgram;

impl SccTrimProgram {
    /// `component_root` (the vertex itself) for trimmed vertices, [`NO_VALUE`] otherwise.
    pub fn outputs(attrs: &[ColorAttr]) -> Vec<u32> {
        attrs.iter().map(|a| if a.is_found() { a.root() } else { NO_VALUE }).collect()
    }
}

impl<E: EdgeRecord> VertexProgram<E> for SccTrimProgram {
    type Attr = ColorAttr;
    const NAME: &'static str = "scc-trim";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &ColorAttr, ctx: &VertexContext<'_, E, ColorAttr>) {
        if ctx.restart() == 0 {
            let in_degree = ctx.num_edges(vid, Direction::In) as u32;
            if in_degree == 0 {
                attr.settle_as_root(vid);
                ctx.add_schedule(vid, PRIMARY_LANE);
            } else {
                attr.component_root.store(in_degree, Ordering::Relaxed);
                attr.prev_root.store(NO_VALUE, Ordering::Relaxed);
                attr.set_found(false);
            }
        } else if !attr.is_found() {
            let out_degree = ctx.num_edges(vid, Direction::Out) as u32;
            if out_degree == 0 {
                attr.settle_as_root(vid);
                ctx.add_schedule(vid, PRIMARY_LANE);
            } else {
                attr.component_root.store(out_degree, Ordering::Relaxed);
            }
        }
    }

    fn finalize(&mut self, attrs: &[ColorAttr], info: &IterationInfo) -> Result<FinalizeAction> {
        if info.restart == 0 {
            return Ok(FinalizeAction::EngineContinue);
        }
        let trimmed = attrs.iter().filter(|a| a.is_found()).count();
        debug!(trimmed, total = attrs.len(), "trim finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> ScatterGather<E> for SccTrimProgram {
    type Update = ();

    fn scatter_one_edge(&self, _src: VertexId, _attr: &ColorAttr, _edge: Option<&E>, _dest: VertexId, _traversal: Traversal) -> Option<()> {
        Some(())
    }

    fn gather_one_update(&self, vid: VertexId, attr: &ColorAttr, _update: &(), ctx: &VertexContext<'_, E, ColorAttr>) {
        if attr.is_found() {
            assert_eq!(attr.root(), vid, "trimmed vertex {} lost its root", vid);
            return;
        }
        let counter = attr.root();
        assert!(counter > 0, "degree counter of vertex {} underflows", vid);
        if counter == 1 {
            attr.settle_as_root(vid);
            ctx.add_schedule(vid, PRIMARY_LANE);
        } else {
            attr.component_root.store(counter - 1, Ordering::Relaxed);
        }
    }
}

impl<E: EdgeRecord> Decomposable<E> for SccTrimProgram {
    fn num_of_remain_partitions(&self) -> usize {
        1
    }

    fn judge_for_filter(&self, _vid: VertexId, attr: &ColorAttr) -> Option<usize> {
        (!attr.is_found()).then_some(0)
    }
}

/// Components by rounds of min-label coloring.
///
/// A forward run floods every unfound vertex with the smallest id reaching it (its color).
/// The next backward run starts at each color's root, the vertex whose id is the color,
/// and collects the vertices of the same color it reaches: the root's component. Rounds
/// repeat over the unfound vertices until a restart schedules nothing.
///
/// With `has_trim`, vertices already found by [`SccTrimProgram`] in the same attribute file
/// are kept.
pub struct SccColorProgram {
    has_trim: bool,
}

impl SccColorProgram {
    pub fn new(has_trim: bool) -> Self {
        Self { has_trim }
    }

    /// `component_root` of found vertices, [`NO_VALUE`] otherwise.
    pub fn outputs(attrs: &[ColorAttr]) -> Vec<u32> {
        SccTrimProgram::outputs(attrs)
    }
}

impl<E: EdgeRecord> VertexProgram<E> for SccColorProgram {
    type Attr = ColorAttr;
    const NAME: &'static str = "scc-color";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &ColorAttr, ctx: &VertexContext<'_, E, ColorAttr>) {
        if ctx.restart() == 0 {
            if self.has_trim && attr.is_found() {
                assert_eq!(attr.root(), vid, "trimmed vertex {} is not its own root", vid);
                attr.settle_as_root(vid);
            } else if is_trivial(vid, ctx) {
                attr.settle_as_root(vid);
            } else {
                attr.set_found(false);
                attr.component_root.store(vid, Ordering::Relaxed);
                attr.prev_root.store(NO_VALUE, Ordering::Relaxed);
                ctx.add_schedule(vid, PRIMARY_LANE);
            }
            return;
        }

        let (root, prev) = (attr.root(), attr.prev());
        match ctx.traversal() {
            // Start a new coloring round from scratch.
            Traversal::Forward => {
                if root != prev {
                    attr.prev_root.store(root, Ordering::Relaxed);
                    attr.component_root.store(vid, Ordering::Relaxed);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
            // Remember the color in `prev_root`; color roots seed the backward search.
            Traversal::Backward => {
                if root != prev {
                    attr.prev_root.store(root, Ordering::Relaxed);
                    attr.component_root.store(vid, Ordering::Relaxed);
                    if root == vid {
                        attr.set_found(true);
                        ctx.add_schedule(vid, PRIMARY_LANE);
                    }
                } else if !attr.is_found() {
                    attr.set_found(true);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
        }
    }

    fn finalize(&mut self, attrs: &[ColorAttr], info: &IterationInfo) -> Result<FinalizeAction> {
        let found = attrs.iter().filter(|a| a.is_found()).count();
        debug!(round = info.restart, found, total = attrs.len(), "coloring round finished");
        Ok(FinalizeAction::EngineContinue)
    }
}

impl<E: EdgeRecord> ScatterGather<E> for SccColorProgram {
    type Update = u32;

    fn scatter_one_edge(&self, _src: VertexId, attr: &ColorAttr, _edge: Option<&E>, _dest: VertexId, _traversal: Traversal) -> Option<u32> {
        Some(attr.root())
    }

    fn gather_one_update(&self, vid: VertexId, attr: &ColorAttr, update: &u32, ctx: &VertexContext<'_, E, ColorAttr>) {
        if attr.is_found() {
            return;
        }
        match ctx.traversal() {
            Traversal::Forward => {
                if *update < attr.root() {
                    attr.component_root.store(*update, Ordering::Relaxed);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
            Traversal::Backward => {
                if *update == attr.prev() {
                    attr.component_root.store(*update, Ordering::Relaxed);
                    attr.set_found(true);
                    ctx.add_schedule(vid, PRIMARY_LANE);
                }
            }
        }
    }
}

/// Summary of a whole SCC pipeline.
///
/// # Fields
/// * `fb_tasks` - Tasks split by forward/backward reachability
/// * `color_tasks` - Tasks solved by trimming and coloring
/// * `resolved` - Vertices with a component in the result file
/// * `iterations` - Engine iterations summed over every task
/// * `io_stats` - I/O counters summed over every task's engine runs
/// * `result_path` - One `u32` component representative per original vertex
/// * `manifest_path` - The task manifest the result was composed from
#[derive(Debug, Clone)]
pub struct SccReport {
    pub fb_tasks: usize,
    pub color_tasks: usize,
    pub resolved: usize,
    pub iterations: usize,
    pub io_stats: IoStats,
    pub result_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Strongly connected components of the graph behind `desc_path`.
///
/// Tasks are drained from a FIFO queue. Tasks above `in_mem_vertices` are split by
/// forward/backward reachability from a pivot into up to three bags; smaller ones are
/// trimmed and then colored, the untrimmed rest moving into a bag of its own when trimming
/// removed at least half of the task. Every task records which of its vertices it resolved,
/// and the records are composed through the remap chains into `scc.result`.
///
/// Two vertices share a value in the result file iff they are mutually reachable; the value
/// is an original vertex id of their component.
pub fn run_scc<E: EdgeRecord>(config: &EngineConfig, desc_path: &Path) -> Result<SccReport> {
    config.validate()?;
    config.ensure_workspace()?;
    let root_desc = GraphDesc::load(desc_path)?;
    if !root_desc.has_in_edges() {
        return Err(EngineError::Config(format!("{}: scc needs in-edge files", desc_path.display())));
    }

    let mut queue = TaskQueue::new();
    queue.push(Task::root(desc_path, root_desc.min_vert_id, root_desc.vertex_count()));
    let (mut fb_tasks, mut color_tasks) = (0, 0);
    let mut totals = RunTotals::default();
    while let Some(task) = queue.pop() {
        let desc = GraphDesc::load(&task.desc_path)?;
        if task.vertex_count <= config.in_mem_vertices {
            color_route::<E>(config, &task, &desc, &mut queue, &mut totals)?;
            color_tasks += 1;
        } else {
            fb_route::<E>(config, &task, &desc, &mut queue, &mut totals)?;
            fb_tasks += 1;
        }
        if !task.is_root() {
            remove_bag_files(&desc, &task.desc_path)?;
        }
    }

    let manifest = queue.into_manifest(root_desc.min_vert_id, root_desc.vertex_count());
    let manifest_path = config.workspace.join("scc.manifest");
    manifest.save(&manifest_path)?;
    let result_path = config.workspace.join("scc.result");
    let chain = RemapChain::new(&config.workspace, REMAP_CACHE_TABLES);
    let resolved = materialize(&manifest, &chain, &result_path)?;
    info!(
        fb_tasks,
        color_tasks,
        resolved,
        total = root_desc.vertex_count(),
        iterations = totals.iterations,
        io = %totals.io_stats,
        "scc finished"
    );
    Ok(SccReport {
        fb_tasks,
        color_tasks,
        resolved,
        iterations: totals.iterations,
        io_stats: totals.io_stats,
        result_path,
        manifest_path,
    })
}

/// Engine counters accumulated across the tasks of one pipeline.
#[derive(Debug, Default)]
struct RunTotals {
    iterations: usize,
    io_stats: IoStats,
}

impl RunTotals {
    fn add(&mut self, report: &EngineReport) {
        self.iterations += report.iterations;
        self.io_stats = self.io_stats.merge(&report.io_stats);
    }
}

fn fb_route<E: EdgeRecord>(
    config: &EngineConfig,
    task: &Task,
    desc: &GraphDesc,
    queue: &mut TaskQueue,
    totals: &mut RunTotals,
) -> Result<()> {
    let workspace = &config.workspace;
    let attr_path = task.attr_path(workspace, "fb");
    {
        let mut engine = Engine::<E, FbAttr>::open(config, desc, &attr_path, TerminationPolicy::ScheduleExhaustion)?;
        let mut program = SccFbProgram::new(select_pivot(engine.adjacency()));
        totals.add(&engine.run_scatter_gather(&mut program)?);

        let attrs = engine.attrs().records();
        let bags = decompose(engine.adjacency(), attrs, &program, queue, workspace)?;
        queue.record_output(task, "fb", workspace, &program.outputs(attrs, desc.min_vert_id), true)?;
        info!(task_id = task.task_id, pivot = program.pivot(), bags = bags.len(), "fb task split");
        for bag in &bags {
            queue.push(task.child(bag));
        }
    }
    remove_if_exists(&attr_path)
}

fn color_route<E: EdgeRecord>(
    config: &EngineConfig,
    task: &Task,
    desc: &GraphDesc,
    queue: &mut TaskQueue,
    totals: &mut RunTotals,
) -> Result<()> {
    let workspace = &config.workspace;
    let attr_path = task.attr_path(workspace, "color");
    {
        let mut engine = Engine::<E, ColorAttr>::open(config, desc, &attr_path, TerminationPolicy::ScheduleExhaustion)?;
        let mut trim = SccTrimProgram;
        totals.add(&engine.run_scatter_gather(&mut trim)?);
        let bags = decompose(engine.adjacency(), engine.attrs().records(), &trim, queue, workspace)?;

        match bags.into_iter().next() {
            Some(bag) if 2 * bag.vertex_count > task.vertex_count => {
                // Too little was trimmed to be worth a smaller bag; color in place.
                discard_bag(&bag)?;
                let mut color = SccColorProgram::new(true);
                totals.add(&engine.run_scatter_gather(&mut color)?);
                let outputs = SccColorProgram::outputs(engine.attrs().records());
                queue.record_output(task, "color", workspace, &outputs, true)?;
                debug!(task_id = task.task_id, "task colored in place");
            }
            rest => {
                let outputs = SccTrimProgram::outputs(engine.attrs().records());
                queue.record_output(task, "trim", workspace, &outputs, true)?;
                if let Some(bag) = rest {
                    debug!(task_id = task.task_id, bag_id = bag.bag_id, remaining = bag.vertex_count, "untrimmed rest queued");
                    queue.push(task.child(&bag));
                }
            }
        }
    }
    remove_if_exists(&attr_path)
}

fn discard_bag(bag: &Bag) -> Result<()> {
    let desc = GraphDesc::load(&bag.desc_path)?;
    remove_bag_files(&desc, &bag.desc_path)?;
    remove_if_exists(&bag.remap_path)
}

#[cfg(test)]
mod test_scc {
    use std::collections::VecDeque;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::algorithms::test_support::{build, build_offset, small_config};
    use crate::types::Type1Edge;
    use crate::util::read_records;

    fn reachable(n: u32, edges: &[(u32, u32)]) -> Vec<Vec<bool>> {
        let mut adj = vec![Vec::new(); n as usize];
        for &(a, b) in edges {
            adj[a as usize].push(b);
        }
        (0..n)
            .map(|s| {
                let mut seen = vec![false; n as usize];
                let mut queue = VecDeque::from([s]);
                seen[s as usize] = true;
                while let Some(v) = queue.pop_front() {
                    for &w in &adj[v as usize] {
                        if !seen[w as usize] {
                            seen[w as usize] = true;
                            queue.push_back(w);
                        }
                    }
                }
                seen
            })
            .collect()
    }

    fn assert_components(n: u32, edges: &[(u32, u32)], result: &[u32]) {
        assert_eq!(result.len(), n as usize);
        assert!(result.iter().all(|&c| c != NO_VALUE), "unresolved vertex in {:?}", result);
        let reach = reachable(n, edges);
        for a in 0..n as usize {
            for b in 0..n as usize {
                let mutual = reach[a][b] && reach[b][a];
                assert_eq!(result[a] == result[b], mutual, "vertices {} and {}", a, b);
            }
        }
    }

    fn random_graph(seed: u64, n: u32, m: usize) -> Vec<(u32, u32)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..m).map(|_| (rng.gen_range(0..n), rng.gen_range(0..n))).collect()
    }

    #[test]
    fn test_select_pivot_prefers_hub() {
        let dir = tempfile::tempdir().unwrap();
        let desc = build(dir.path(), "hub", 4, &[(0, 2), (1, 2), (2, 3), (3, 2), (2, 1)]);
        let adjacency = AdjacencyStore::<Type1Edge>::open(&desc).unwrap();
        assert_eq!(select_pivot(&adjacency), 2);
    }

    #[test]
    fn test_scc_two_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let edges = [(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 3)];
        build(dir.path(), "cycles", 6, &edges);
        let config = small_config(dir.path());
        let report = run_scc::<Type1Edge>(&config, &dir.path().join("cycles.desc.yaml")).unwrap();

        assert_eq!(report.fb_tasks, 0);
        assert_eq!(report.resolved, 6);
        let result = read_records::<u32>(&report.result_path).unwrap();
        assert_components(6, &edges, &result);
        assert_eq!(result[5], 5);
    }

    #[test]
    fn test_scc_dag_is_fully_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let edges = [(0, 1), (1, 2), (0, 2), (2, 3)];
        build(dir.path(), "dag", 4, &edges);
        let report = run_scc::<Type1Edge>(&small_config(dir.path()), &dir.path().join("dag.desc.yaml")).unwrap();
        assert_eq!(read_records::<u32>(&report.result_path).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_scc_color_route_on_random_graph() {
        let dir = tempfile::tempdir().unwrap();
        let edges = random_graph(11, 50, 90);
        build(dir.path(), "random", 50, &edges);
        let report = run_scc::<Type1Edge>(&small_config(dir.path()), &dir.path().join("random.desc.yaml")).unwrap();
        assert_eq!(report.fb_tasks, 0);
        assert_components(50, &edges, &read_records::<u32>(&report.result_path).unwrap());
    }

    #[test]
    fn test_scc_decomposition_route_on_random_graph() {
        let dir = tempfile::tempdir().unwrap();
        let edges = random_graph(5, 60, 110);
        build(dir.path(), "random", 60, &edges);
        let config = EngineConfig { in_mem_vertices: 6, ..small_config(dir.path()) };
        let report = run_scc::<Type1Edge>(&config, &dir.path().join("random.desc.yaml")).unwrap();

        assert!(report.fb_tasks > 0);
        assert_eq!(report.resolved, 60);
        assert_components(60, &edges, &read_records::<u32>(&report.result_path).unwrap());

        // Intermediate bag graphs are gone; remap files stay for materialization.
        let leftovers: Vec<_> = std::fs::read_dir(&config.workspace)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".edge") || name.ends_with(".attr"))
            .collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }

    #[test]
    fn test_scc_on_offset_ids_both_routes() {
        // Cycle 10 -> 11 -> 12 -> 10 and the sink 13.
        let edges = [(10, 11), (11, 12), (12, 10), (12, 13)];
        for in_mem_vertices in [1 << 20, 1] {
            let dir = tempfile::tempdir().unwrap();
            build_offset(dir.path(), "offset", 10, 4, &edges);
            let config = EngineConfig { in_mem_vertices, ..small_config(dir.path()) };
            let report = run_scc::<Type1Edge>(&config, &dir.path().join("offset.desc.yaml")).unwrap();

            assert_eq!(report.fb_tasks > 0, in_mem_vertices == 1);
            assert_eq!(report.resolved, 4);
            assert!(report.iterations > 0);
            let result = read_records::<u32>(&report.result_path).unwrap();
            assert_eq!(result[0], result[1]);
            assert_eq!(result[1], result[2]);
            assert!((10..=12).contains(&result[0]), "{:?}", result);
            assert_eq!(result[3], 13);
        }
    }

    #[test]
    fn test_scc_decomposition_route_on_offset_random_graph() {
        let dir = tempfile::tempdir().unwrap();
        let min = 1000;
        let edges = random_graph(23, 40, 70);
        let shifted: Vec<(u32, u32)> = edges.iter().map(|&(a, b)| (a + min, b + min)).collect();
        build_offset(dir.path(), "random", min, 40, &shifted);
        let config = EngineConfig { in_mem_vertices: 5, ..small_config(dir.path()) };
        let report = run_scc::<Type1Edge>(&config, &dir.path().join("random.desc.yaml")).unwrap();

        assert!(report.fb_tasks > 0);
        let result = read_records::<u32>(&report.result_path).unwrap();
        assert_components(40, &edges, &result);
        // Representatives are ids of the graph, members of their own component.
        for &rep in &result {
            assert!((min..min + 40).contains(&rep));
            assert_eq!(result[(rep - min) as usize], rep);
        }
    }

    #[test]
    fn test_scc_requires_in_edges() {
        let dir = tempfile::tempdir().unwrap();
        crate::storage::GraphBuilder::new(dir.path(), "plain")
            .build::<Type1Edge>(&crate::types::EdgeList::new(2, &[(0, 1)]))
            .unwrap();
        let result = run_scc::<Type1Edge>(&small_config(dir.path()), &dir.path().join("plain.desc.yaml"));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
