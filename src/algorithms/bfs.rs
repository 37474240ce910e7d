use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, info};

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, IterationInfo, TerminationPolicy, VertexContext, VertexProgram, PRIMARY_LANE,
};
use crate::error::{EngineError, Result};
use crate::types::{AttrRecord, Direction, EdgeRecord, VertexId};

use super::{attr_path, AlgorithmRun};

/// Level of a vertex; `-1` until reached.
#[repr(C)]
#[derive(Debug, Default)]
pub struct BfsAttr {
    pub level: AtomicI32,
}

unsafe impl AttrRecord for BfsAttr {}

/// Level-synchronous breadth-first search from one root.
///
/// Iteration `k` assigns level `k` to every vertex it visits for the first time and
/// schedules their out-neighbors.
pub struct BfsProgram {
    root: VertexId,
    curr_level: i32,
}

impl BfsProgram {
    pub fn new(root: VertexId) -> Self {
        Self { root, curr_level: -1 }
    }
}

impl<E: EdgeRecord> VertexProgram<E> for BfsProgram {
    type Attr = BfsAttr;
    const NAME: &'static str = "bfs";

    fn init(&self, vid: VertexId, attr: &BfsAttr, ctx: &VertexContext<'_, E, BfsAttr>) {
        if vid == self.root {
            attr.level.store(0, Ordering::Relaxed);
            ctx.add_schedule_no_optimize(vid, PRIMARY_LANE);
        } else {
            attr.level.store(-1, Ordering::Relaxed);
        }
    }

    fn before_iteration(&mut self, info: &IterationInfo) {
        self.curr_level += 1;
        debug!(level = self.curr_level, frontier = info.active, "bfs level");
    }

    fn finalize(&mut self, attrs: &[BfsAttr], _info: &IterationInfo) -> Result<FinalizeAction> {
        let reached = attrs.iter().filter(|a| a.level.load(Ordering::Relaxed) >= 0).count();
        info!(root = self.root, reached, depth = self.curr_level, "bfs finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for BfsProgram {
    fn update_vertex(&self, vid: VertexId, attr: &BfsAttr, ctx: &VertexContext<'_, E, BfsAttr>) {
        let first_visit = attr.level.load(Ordering::Relaxed) == -1;
        let root_start = vid == self.root && self.curr_level == 0;
        if !first_visit && !root_start {
            return;
        }
        attr.level.store(self.curr_level, Ordering::Relaxed);
        for neighbor in ctx.neighbors(vid, Direction::Out) {
            ctx.add_schedule(neighbor, PRIMARY_LANE);
        }
    }
}

/// Runs BFS from `root` over the graph of `desc`.
///
/// # Returns
/// The level of every vertex, `-1` for unreachable ones.
pub fn run_bfs<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc, root: VertexId) -> Result<AlgorithmRun<i32>> {
    if root < desc.min_vert_id || root > desc.max_vert_id {
        return Err(EngineError::Config(format!(
            "bfs root {} outside [{}, {}]",
            root, desc.min_vert_id, desc.max_vert_id
        )));
    }
    config.ensure_workspace()?;
    let mut engine = Engine::<E, BfsAttr>::open(config, desc, &attr_path(config, "bfs"), TerminationPolicy::ScheduleExhaustion)?;
    let mut program = BfsProgram::new(root);
    let report = engine.run_direct(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.level.load(Ordering::Relaxed)).collect();
    Ok(AlgorithmRun { report, values })
}
