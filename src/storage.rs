pub mod adjacency;
pub mod attr_store;
pub mod builder;
pub mod mapped;

pub use adjacency::AdjacencyStore;
pub use attr_store::{AttrStore, SegmentView};
pub use builder::{read_edge_list, CsrWriter, GraphBuilder};
pub use mapped::{AttrArena, MappedFile, RecordArray};
