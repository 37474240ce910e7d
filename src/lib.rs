//! Out-of-core, vertex-centric graph processing.
//!
//! Graphs live in memory-mapped CSR files; per-vertex attributes live in a memory-mapped
//! arena processed segment by segment. Programs run in direct, scatter/gather or hybrid
//! mode, and may split their unresolved vertices into compacted sub-graphs that are solved
//! as further tasks.

pub mod algorithms;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod io_status;
pub mod storage;
pub mod types;
pub mod util;

pub use config::{EngineConfig, GraphDesc};
pub use error::{EngineError, Result};
