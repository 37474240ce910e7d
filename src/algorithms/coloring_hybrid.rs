use std::sync::atomic::Ordering;

use tracing::info;

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, Hybrid, IterationInfo, ScatterGather, TerminationPolicy, VertexContext,
    VertexProgram,
};
use crate::error::Result;
use crate::types::{EdgeRecord, Traversal, VertexId};

use super::coloring::{check_colors, init_coloring, try_color, ColoringAttr};
use super::{attr_path, AlgorithmRun};

const SCATTER_GATHER_LANE: usize = 0;
const UPDATE_VERTEX_LANE: usize = 1;

/// Coloring as a hybrid program: the independent-set step runs as an update-vertex pass,
/// and newly colored vertices notify their neighbors through scatter/gather, which keeps
/// `degree` equal to the number of uncolored neighbors without a recount pass.
#[derive(Default)]
pub struct ColoringHybridProgram;

impl<E: EdgeRecord> VertexProgram<E> for ColoringHybridProgram {
    type Attr = ColoringAttr;
    const NAME: &'static str = "coloring-hybrid";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &ColoringAttr, ctx: &VertexContext<'_, E, ColoringAttr>) {
        init_coloring(vid, attr, ctx, UPDATE_VERTEX_LANE);
    }

    fn finalize(&mut self, attrs: &[ColoringAttr], _info: &IterationInfo) -> Result<FinalizeAction> {
        let colors = check_colors(<Self as VertexProgram<E>>::NAME, attrs)?;
        info!(colors, "coloring-hybrid finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for ColoringHybridProgram {
    fn update_vertex(&self, vid: VertexId, attr: &ColoringAttr, ctx: &VertexContext<'_, E, ColoringAttr>) {
        if try_color(vid, attr, ctx) {
            ctx.vote_to_halt(vid, UPDATE_VERTEX_LANE);
            ctx.add_schedule_no_optimize(vid, SCATTER_GATHER_LANE);
        }
    }
}

impl<E: EdgeRecord> ScatterGather<E> for ColoringHybridProgram {
    type Update = ();

    fn scatter_one_edge(
        &self,
        _src: VertexId,
        _attr: &ColoringAttr,
        _edge: Option<&E>,
        _dest: VertexId,
        _traversal: Traversal,
    ) -> Option<()> {
        Some(())
    }

    fn gather_one_update(&self, vid: VertexId, attr: &ColoringAttr, _update: &(), _ctx: &VertexContext<'_, E, ColoringAttr>) {
        let degree = attr.degree.load(Ordering::Relaxed);
        assert!(degree > 0, "vertex {} lost more neighbors than it has", vid);
        attr.degree.store(degree - 1, Ordering::Relaxed);
    }
}

impl<E: EdgeRecord> Hybrid<E> for ColoringHybridProgram {
    fn scatter_gather_lane(&self) -> usize {
        SCATTER_GATHER_LANE
    }

    fn update_vertex_lane(&self) -> usize {
        UPDATE_VERTEX_LANE
    }
}

/// Colors the graph of `desc` with the hybrid program.
pub fn run_coloring_hybrid<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc) -> Result<AlgorithmRun<u32>> {
    config.ensure_workspace()?;
    let mut engine =
        Engine::<E, ColoringAttr>::open(config, desc, &attr_path(config, "coloring-hybrid"), TerminationPolicy::Hybrid)?;
    let mut program = ColoringHybridProgram;
    let report = engine.run_hybrid(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.color.load(Ordering::Relaxed)).collect();
    Ok(AlgorithmRun { report, values })
}

#[cfg(test)]
mod test_coloring_hybrid {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::algorithms::coloring::assert_proper_coloring;
    use crate::algorithms::test_support::{build, small_config};
    use crate::types::Type1Edge;

    #[test]
    fn test_hybrid_coloring_is_proper() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let n = 64u32;
        let edges: Vec<(u32, u32)> = (0..200)
            .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
            .filter(|(a, b)| a != b)
            .collect();
        let desc = build(dir.path(), "random", n, &edges);
        let run = run_coloring_hybrid::<Type1Edge>(&small_config(dir.path()), &desc).unwrap();
        assert_proper_coloring(&edges, &run.values);
    }

    #[test]
    fn test_hybrid_triangle_uses_three_colors() {
        let dir = tempfile::tempdir().unwrap();
        let edges = [(0, 1), (1, 2), (2, 0), (2, 3)];
        let desc = build(dir.path(), "triangle", 5, &edges);
        let run = run_coloring_hybrid::<Type1Edge>(&small_config(dir.path()), &desc).unwrap();
        assert_proper_coloring(&edges, &run.values);

        let mut triangle = run.values[..3].to_vec();
        triangle.sort_unstable();
        assert_eq!(triangle, vec![1, 2, 3]);
        assert_eq!(run.values[4], 1);
    }
}
