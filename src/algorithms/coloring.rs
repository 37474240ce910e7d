use std::sync::atomic::{AtomicU32, Ordering};

use tracing::info;

use crate::config::{EngineConfig, GraphDesc};
use crate::engine::{
    DirectUpdate, Engine, FinalizeAction, IterationInfo, TerminationPolicy, VertexContext, VertexProgram, PRIMARY_LANE,
};
use crate::error::{EngineError, Result};
use crate::types::{AttrRecord, Direction, EdgeRecord, VertexId};

use super::{attr_path, AlgorithmRun};

/// `degree` counts edges to still uncolored neighbors; `color` is `0` while uncolored.
#[repr(C)]
#[derive(Debug, Default)]
pub struct ColoringAttr {
    pub degree: AtomicU32,
    pub color: AtomicU32,
}

unsafe impl AttrRecord for ColoringAttr {}

const DIRECTIONS: [Direction; 2] = [Direction::In, Direction::Out];

/// Sets up `degree` and `color`; isolated vertices take color 1 and halt in `lane`.
pub(crate) fn init_coloring<E: EdgeRecord>(
    vid: VertexId,
    attr: &ColoringAttr,
    ctx: &VertexContext<'_, E, ColoringAttr>,
    lane: usize,
) {
    let degree = (ctx.num_edges(vid, Direction::In) + ctx.num_edges(vid, Direction::Out)) as u32;
    attr.degree.store(degree, Ordering::Relaxed);
    if degree == 0 {
        attr.color.store(1, Ordering::Relaxed);
        ctx.vote_to_halt(vid, lane);
    } else {
        attr.color.store(0, Ordering::Relaxed);
    }
}

/// The independent-set step: colors `vid` if it beats every uncolored neighbor on
/// `(degree, id)`, with the smallest color no neighbor uses.
///
/// # Returns
/// Whether the vertex was colored.
pub(crate) fn try_color<E: EdgeRecord>(vid: VertexId, attr: &ColoringAttr, ctx: &VertexContext<'_, E, ColoringAttr>) -> bool {
    let degree = attr.degree.load(Ordering::Relaxed);
    for dir in DIRECTIONS {
        for (neighbor, n_attr) in ctx.neighbor_attrs(vid, dir) {
            if n_attr.color.load(Ordering::Relaxed) != 0 {
                continue;
            }
            let n_degree = n_attr.degree.load(Ordering::Relaxed);
            if n_degree > degree || (n_degree == degree && neighbor > vid) {
                return false;
            }
        }
    }

    let mut used: Vec<u32> = DIRECTIONS
        .iter()
        .flat_map(|&dir| ctx.neighbor_attrs(vid, dir))
        .map(|(_, n_attr)| n_attr.color.load(Ordering::Relaxed))
        .filter(|&color| color != 0)
        .collect();
    used.sort_unstable();
    used.dedup();
    let mut candidate = 1;
    for color in used {
        if color > candidate {
            break;
        }
        candidate += 1;
    }
    attr.color.store(candidate, Ordering::Relaxed);
    true
}

/// Fails when some vertex stayed uncolored; otherwise returns the number of colors used.
pub(crate) fn check_colors(algorithm: &'static str, attrs: &[ColoringAttr]) -> Result<u32> {
    if let Some(slot) = attrs.iter().position(|a| a.color.load(Ordering::Relaxed) == 0) {
        return Err(EngineError::Algorithm { algorithm, reason: format!("vertex slot {} has no color", slot) });
    }
    Ok(attrs.iter().map(|a| a.color.load(Ordering::Relaxed)).max().unwrap_or(0))
}

/// Greedy parallel coloring alternating two direct steps: recount the uncolored degree,
/// then color the local maxima.
pub struct ColoringProgram {
    step_switch: u8,
}

impl Default for ColoringProgram {
    fn default() -> Self {
        // The first iteration flips this to the recount step.
        Self { step_switch: 1 }
    }
}

impl<E: EdgeRecord> VertexProgram<E> for ColoringProgram {
    type Attr = ColoringAttr;
    const NAME: &'static str = "coloring";

    fn needs_in_edges(&self) -> bool {
        true
    }

    fn init(&self, vid: VertexId, attr: &ColoringAttr, ctx: &VertexContext<'_, E, ColoringAttr>) {
        init_coloring(vid, attr, ctx, PRIMARY_LANE);
    }

    fn before_iteration(&mut self, _info: &IterationInfo) {
        self.step_switch = 1 - self.step_switch;
    }

    fn finalize(&mut self, attrs: &[ColoringAttr], _info: &IterationInfo) -> Result<FinalizeAction> {
        let colors = check_colors(<Self as VertexProgram<E>>::NAME, attrs)?;
        info!(colors, "coloring finished");
        Ok(FinalizeAction::EngineStop)
    }
}

impl<E: EdgeRecord> DirectUpdate<E> for ColoringProgram {
    fn update_vertex(&self, vid: VertexId, attr: &ColoringAttr, ctx: &VertexContext<'_, E, ColoringAttr>) {
        if self.step_switch == 0 {
            let uncolored = DIRECTIONS
                .iter()
                .flat_map(|&dir| ctx.neighbor_attrs(vid, dir))
                .filter(|(_, n_attr)| n_attr.color.load(Ordering::Relaxed) == 0)
                .count();
            attr.degree.store(uncolored as u32, Ordering::Relaxed);
        } else if try_color(vid, attr, ctx) {
            ctx.vote_to_halt(vid, PRIMARY_LANE);
        }
    }
}

/// Colors the graph of `desc` with the direct two-step program.
///
/// # Returns
/// The color of every vertex, all nonzero.
pub fn run_coloring<E: EdgeRecord>(config: &EngineConfig, desc: &GraphDesc) -> Result<AlgorithmRun<u32>> {
    config.ensure_workspace()?;
    let mut engine =
        Engine::<E, ColoringAttr>::open(config, desc, &attr_path(config, "coloring"), TerminationPolicy::ExplicitHalt)?;
    let mut program = ColoringProgram::default();
    let report = engine.run_direct(&mut program)?;
    let values = engine.attrs().records().iter().map(|a| a.color.load(Ordering::Relaxed)).collect();
    Ok(AlgorithmRun { report, values })
}

/// Checks that no edge joins two vertices of the same color. Test helper shared with the
/// hybrid program.
#[cfg(test)]
pub(crate) fn assert_proper_coloring(edges: &[(u32, u32)], colors: &[u32]) {
    for &(a, b) in edges {
        if a != b {
            assert_ne!(colors[a as usize], colors[b as usize], "edge ({}, {}) is monochrome", a, b);
        }
    }
    assert!(colors.iter().all(|&c| c != 0));
}

#[cfg(test)]
mod test_coloring {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::algorithms::test_support::{build, chain, small_config};
    use crate::types::Type1Edge;

    #[test]
    fn test_coloring_chain() {
        let dir = tempfile::tempdir().unwrap();
        let desc = chain(dir.path());
        let run = run_coloring::<Type1Edge>(&small_config(dir.path()), &desc).unwrap();
        assert_proper_coloring(&[(0, 1), (1, 2), (2, 3)], &run.values);
        assert_eq!(run.values[4], 1);
    }

    #[test]
    fn test_coloring_random_graph_is_proper() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 80u32;
        let edges: Vec<(u32, u32)> = (0..240)
            .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
            .filter(|(a, b)| a != b)
            .collect();
        let desc = build(dir.path(), "random", n, &edges);
        let run = run_coloring::<Type1Edge>(&small_config(dir.path()), &desc).unwrap();
        assert_proper_coloring(&edges, &run.values);
    }
}
