use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;
use tracing::info;

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, IterationControl, IterationInfo, TerminationPolicy, VertexContext,
    VertexProgram, PRIMARY_LANE,
};
use crate::error::Result;
use crate::types::{AttrRecord, Direction, EdgeRecord, VertexId};

use super::{attr_path, AlgorithmRun};

/// Iteration cap of label propagation, which need not converge.
pub const DEFAULT_CD_ITERATIONS: usize = 200;

#[repr(C)]
#[derive(Debug, Default)]
pub struct CdAttr {
    pub label: AtomicU32,
}

unsafe impl AttrRecord for CdAttr {}

/// Community detection by label propagation: each vertex adopts the most frequent label
/// among its in- and out-neighbors, ties going to the larger label.
pub struct CdProgram {
    max_iterations: usize,
}

impl CdProgram {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl<E: EdgeRecord> VertexProgram<E> for CdProgram {
    type Attr = CdAttr;
    const NAME: &'static str = "cd";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &CdAttr, ctx: &VertexContext<'_, E, CdAttr>) {
        attr.label.store(vid, Ordering::Relaxed);
        ctx.add_schedule_no_optimize(vid, PRIMARY_LANE);
    }

    fn after_iteration(&mut self, info: &IterationInfo) -> IterationControl {
        if info.iteration + 1 >= self.max_iterations || info.remaining == 0 {
            IterationControl::Stop
        } else {
            IterationControl::Continue
        }
    }

    fn finalize(&mut self, attrs: &[CdAttr], info: &IterationInfo) -> Result<FinalizeAction> {
        let mut sizes = FxHashMap::<u32, usize>::default();
        for attr in attrs {
            *sizes.entry(attr.label.load(Ordering::Relaxed)).or_default() += 1;
        }
        let largest = sizes.values().copied().max().unwrap_or(0);
        info!(communities = sizes.len(), largest, unsettled = info.remaining, "cd finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for CdProgram {
    fn update_vertex(&self, vid: VertexId, attr: &CdAttr, ctx: &VertexContext<'_, E, CdAttr>) {
        let mut counts = FxHashMap::<u32, u32>::default();
        for (_, neighbor) in ctx.neighbor_attrs(vid, Direction::In).chain(ctx.neighbor_attrs(vid, Direction::Out)) {
            *counts.entry(neighbor.label.load(Ordering::Relaxed)).or_default() += 1;
        }
        // Trivial vertices keep their own label.
        let Some((best, _)) = counts.into_iter().max_by_key(|&(label, count)| (count, label)) else {
            return;
        };
        if best != attr.label.load(Ordering::Relaxed) {
            attr.label.store(best, Ordering::Relaxed);
            ctx.add_schedule_no_optimize(vid, PRIMARY_LANE);
        }
    }
}

/// Runs label propagation for at most `max_iterations` iterations.
///
/// # Returns
/// The community label of every vertex.
pub fn run_cd<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc, max_iterations: usize) -> Result<AlgorithmRun<u32>> {
    config.ensure_workspace()?;
    let mut engine = Engine::<E, CdAttr>::open(config, desc, &attr_path(config, "cd"), TerminationPolicy::ScheduleExhaustion)?;
    let mut program = CdProgram::new(max_iterations.max(1));
    let report = engine.run_direct(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.label.load(Ordering::Relaxed)).collect();
    Ok(AlgorithmRun { report, values })
}
