pub mod driver;
pub mod messages;
pub mod program;
pub mod schedule;

pub use driver::{Engine, EngineReport, TerminationPolicy, PRIMARY_LANE};
pub use messages::MessageBuffers;
pub use program::{
    Decomposable, DirectUpdate, FinalizeAction, Hybrid, IterationControl, IterationInfo, PassKind, ScatterGather,
    VertexContext, VertexProgram,
};
pub use schedule::{Schedule, NUM_LANES};
