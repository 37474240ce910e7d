use tracing::{debug, info};

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, IterationControl, IterationInfo, TerminationPolicy, VertexContext,
    VertexProgram, PRIMARY_LANE,
};
use crate::error::{EngineError, Result};
use crate::types::{AtomicF32, AttrRecord, Direction, EdgeRecord, VertexId};

use super::{attr_path, AlgorithmRun};

pub const DAMPING_FACTOR: f32 = 0.85;

/// `for_neigh_rank` is the share each out-neighbor pulls: `rank / out_degree` once the vertex
/// has been updated, and the whole initial rank before that.
#[repr(C)]
#[derive(Debug, Default)]
pub struct PageRankAttr {
    pub rank: AtomicF32,
    pub for_neigh_rank: AtomicF32,
}

unsafe impl AttrRecord for PageRankAttr {}

/// Pull-style PageRank for a fixed number of iterations.
///
/// Vertices without in-edges keep the initial rank and halt at `init`; everyone else is
/// updated every iteration. Shares start at `1.0` for every vertex, so a halted source hands
/// its full initial rank to each out-neighbor.
pub struct PageRankProgram {
    niters: usize,
}

impl PageRankProgram {
    pub fn new(niters: usize) -> Self {
        Self { niters }
    }
}

impl<E: EdgeRecord> VertexProgram<E> for PageRankProgram {
    type Attr = PageRankAttr;
    const NAME: &'static str = "pagerank";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &PageRankAttr, ctx: &VertexContext<'_, E, PageRankAttr>) {
        attr.rank.store(1.0);
        attr.for_neigh_rank.store(1.0);
        if ctx.num_edges(vid, Direction::In) == 0 {
            ctx.vote_to_halt(vid, PRIMARY_LANE);
        }
    }

    fn after_iteration(&mut self, info: &IterationInfo) -> IterationControl {
        debug!(iteration = info.iteration, active = info.active, "pagerank iteration");
        if info.iteration + 1 >= self.niters || info.remaining == 0 {
            IterationControl::Stop
        } else {
            IterationControl::Continue
        }
    }

    fn finalize(&mut self, attrs: &[PageRankAttr], info: &IterationInfo) -> Result<FinalizeAction> {
        let total: f64 = attrs.iter().map(|a| a.rank.load() as f64).sum();
        info!(iterations = info.iteration + 1, total_rank = total, "pagerank finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for PageRankProgram {
    fn update_vertex(&self, vid: VertexId, attr: &PageRankAttr, ctx: &VertexContext<'_, E, PageRankAttr>) {
        let sum: f32 = ctx.neighbor_attrs(vid, Direction::In).map(|(_, n)| n.for_neigh_rank.load()).sum();
        let rank = sum * DAMPING_FACTOR + 1.0 - DAMPING_FACTOR;
        attr.rank.store(rank);
        let out_degree = ctx.num_edges(vid, Direction::Out);
        // Sinks have no reader of their share.
        attr.for_neigh_rank.store(if out_degree > 0 { rank / out_degree as f32 } else { rank });
    }
}

/// Runs `niters` iterations of PageRank.
///
/// # Returns
/// The rank of every vertex.
pub fn run_pagerank<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc, niters: usize) -> Result<AlgorithmRun<f32>> {
    if niters == 0 {
        return Err(EngineError::Config("pagerank needs at least one iteration".to_owned()));
    }
    config.ensure_workspace()?;
    let mut engine =
        Engine::<E, PageRankAttr>::open(config, desc, &attr_path(config, "pagerank"), TerminationPolicy::ExplicitHalt)?;
    let mut program = PageRankProgram::new(niters);
    let report = engine.run_direct(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.rank.load()).collect();
    Ok(AlgorithmRun { report, values })
}

#[cfg(test)]
mod test_pagerank {
    use super::*;
    use crate::algorithms::test_support::{build, chain, small_config};
    use crate::types::Type1Edge;

    #[test]
    fn test_pagerank_runs_configured_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let desc = build(dir.path(), "ring", 4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        let run = run_pagerank::<Type1Edge>(&small_config(dir.path()), &desc, 5).unwrap();
        assert_eq!(run.report.iterations, 5);
        // A ring is already at the fixpoint.
        for rank in run.values {
            assert!((rank - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_pagerank_sources_keep_initial_rank() {
        let dir = tempfile::tempdir().unwrap();
        let desc = chain(dir.path());
        let run = run_pagerank::<Type1Edge>(&small_config(dir.path()), &desc, 10).unwrap();
        // Only the source and the isolated vertex halt; the rest run to the cap.
        assert_eq!(run.report.iterations, 10);
        assert_eq!(run.values[0], 1.0);
        assert_eq!(run.values[4], 1.0);
        // 0.85 * 1.0 + 0.15 along the chain.
        assert!((run.values[1] - 1.0).abs() < 1e-5);
        assert!(run.values[3] > 0.0);
    }

    #[test]
    fn test_pagerank_source_shares_start_undivided() {
        let dir = tempfile::tempdir().unwrap();
        let desc = build(dir.path(), "fan", 3, &[(0, 1), (0, 2)]);
        let run = run_pagerank::<Type1Edge>(&small_config(dir.path()), &desc, 3).unwrap();
        assert_eq!(run.report.iterations, 3);
        // The halted source never divides its share: 0.85 * 1.0 + 0.15.
        for rank in &run.values {
            assert!((rank - 1.0).abs() < 1e-5, "{:?}", run.values);
        }
    }

    #[test]
    fn test_pagerank_rejects_zero_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let desc = chain(dir.path());
        assert!(run_pagerank::<Type1Edge>(&small_config(dir.path()), &desc, 0).is_err());
    }
}
