use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashSet;
use tracing::info;

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, IterationInfo, TerminationPolicy, VertexContext, VertexProgram, PRIMARY_LANE,
};
use crate::error::Result;
use crate::types::{AttrRecord, Direction, EdgeRecord, VertexId};

use super::{attr_path, AlgorithmRun};

#[repr(C)]
#[derive(Debug, Default)]
pub struct CcAttr {
    pub label: AtomicU32,
}

unsafe impl AttrRecord for CcAttr {}

/// Weakly connected components by minimum-label propagation over both edge directions.
///
/// With `resume` set, `init` keeps the labels already in the attribute file and only
/// re-schedules, so a converged file stays unchanged.
pub struct CcProgram {
    resume: bool,
}

impl CcProgram {
    pub fn new(resume: bool) -> Self {
        Self { resume }
    }
}

fn degree<E: EdgeRecord>(vid: VertexId, ctx: &VertexContext<'_, E, CcAttr>) -> usize {
    ctx.num_edges(vid, Direction::In) + ctx.num_edges(vid, Direction::Out)
}

impl<E: EdgeRecord> VertexProgram<E> for CcProgram {
    type Attr = CcAttr;
    const NAME: &'static str = "cc";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &CcAttr, ctx: &VertexContext<'_, E, CcAttr>) {
        if !self.resume {
            attr.label.store(vid, Ordering::Relaxed);
        }
        if degree(vid, ctx) > 0 {
            ctx.add_schedule_no_optimize(vid, PRIMARY_LANE);
        }
    }

    fn finalize(&mut self, attrs: &[CcAttr], _info: &IterationInfo) -> Result<FinalizeAction> {
        let components = attrs.iter().map(|a| a.label.load(Ordering::Relaxed)).collect::<FxHashSet<_>>().len();
        info!(components, "cc finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for CcProgram {
    fn update_vertex(&self, vid: VertexId, attr: &CcAttr, ctx: &VertexContext<'_, E, CcAttr>) {
        if degree(vid, ctx) == 0 {
            ctx.vote_to_halt(vid, PRIMARY_LANE);
            return;
        }
        let own = attr.label.load(Ordering::Relaxed);
        let min_label = ctx
            .neighbor_attrs(vid, Direction::In)
            .chain(ctx.neighbor_attrs(vid, Direction::Out))
            .map(|(_, neighbor)| neighbor.label.load(Ordering::Relaxed))
            .fold(own, u32::min);
        assert!(min_label <= own, "label of vertex {} grew", vid);
        if min_label == own {
            return;
        }
        attr.label.store(min_label, Ordering::Relaxed);
        for dir in [Direction::In, Direction::Out] {
            for neighbor in ctx.neighbors(vid, dir) {
                ctx.add_schedule_no_optimize(neighbor, PRIMARY_LANE);
            }
        }
    }
}

/// Runs connected components over the graph of `desc`, which must carry in-edges.
///
/// # Arguments
/// * `resume` - Continue from the labels of a previous run instead of resetting them
///
/// # Returns
/// The component label of every vertex: the smallest id of its component.
pub fn run_cc<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc, resume: bool) -> Result<AlgorithmRun<u32>> {
    config.ensure_workspace()?;
    let mut engine = Engine::<E, CcAttr>::open(config, desc, &attr_path(config, "cc"), TerminationPolicy::ScheduleExhaustion)?;
    let mut program = CcProgram::new(resume);
    let report = engine.run_direct(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.label.load(Ordering::Relaxed)).collect();
    Ok(AlgorithmRun { report, values })
}
