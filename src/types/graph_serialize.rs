use std::fmt::Debug;

use crate::config::EdgeType;

/// Defines a generic trait for types that can be encoded to and decoded from bytes.
/// Every on-disk record of the engine (offsets, edges, remap entries, results) goes through it.
pub trait ByteEncodable: Sized {
    /// Converts the implementing type to a vector of little-endian bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Creates an instance of the implementing type from a byte slice.
    ///
    /// # Parameters
    /// * `bytes` - The byte slice containing the encoded value.
    ///
    /// # Returns
    /// `Some(Self)` if decoding was successful, `None` if the slice is too short.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Returns the number of bytes required to encode this type.
    fn byte_size() -> usize;
}

/// Implementation of ByteEncodable for u32, the vertex id type.
impl ByteEncodable for u32 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(array))
    }

    fn byte_size() -> usize {
        4
    }
}

/// Implementation of ByteEncodable for u64, the edge offset type.
impl ByteEncodable for u64 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.get(0..8)?.try_into().ok()?;
        Some(u64::from_le_bytes(array))
    }

    fn byte_size() -> usize {
        8
    }
}

/// Implementation of ByteEncodable for f32, the edge weight type.
impl ByteEncodable for f32 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
        Some(f32::from_le_bytes(array))
    }

    fn byte_size() -> usize {
        4
    }
}

/// An out-edge record as stored in an edge file.
///
/// The engine is generic over this trait; the concrete layout is chosen once per run from
/// the graph description's `edge_type`.
pub trait EdgeRecord: ByteEncodable + Copy + Debug + Send + Sync + 'static {
    /// Layout tag written into graph descriptions.
    const EDGE_TYPE: EdgeType;

    /// Builds a record from its destination and weight; layouts without a weight drop it.
    fn from_parts(dest: u32, weight: f32) -> Self;

    /// Destination vertex id.
    fn dest(&self) -> u32;

    /// Edge weight; unweighted layouts report 1.0.
    fn weight(&self) -> f32;

    /// Same record with its destination replaced, used when compacting bags.
    fn with_dest(&self, dest: u32) -> Self;
}

/// Unweighted edge record: `{dest: u32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type1Edge {
    pub dest: u32,
}

impl ByteEncodable for Type1Edge {
    fn to_bytes(&self) -> Vec<u8> {
        self.dest.to_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Type1Edge { dest: u32::from_bytes(bytes)? })
    }

    fn byte_size() -> usize {
        u32::byte_size()
    }
}

impl EdgeRecord for Type1Edge {
    const EDGE_TYPE: EdgeType = EdgeType::Type1;

    fn from_parts(dest: u32, _weight: f32) -> Self {
        Type1Edge { dest }
    }

    fn dest(&self) -> u32 {
        self.dest
    }

    fn weight(&self) -> f32 {
        1.0
    }

    fn with_dest(&self, dest: u32) -> Self {
        Type1Edge { dest }
    }
}

/// Weighted edge record: `{dest: u32, weight: f32}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Type2Edge {
    pub dest: u32,
    pub weight: f32,
}

impl ByteEncodable for Type2Edge {
    fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(Self::byte_size());
        result.extend_from_slice(&self.dest.to_bytes());
        result.extend_from_slice(&self.weight.to_bytes());
        result
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let dest = u32::from_bytes(bytes)?;
        let weight = f32::from_bytes(bytes.get(u32::byte_size()..)?)?;
        Some(Type2Edge { dest, weight })
    }

    fn byte_size() -> usize {
        u32::byte_size() + f32::byte_size()
    }
}

impl EdgeRecord for Type2Edge {
    const EDGE_TYPE: EdgeType = EdgeType::Type2;

    fn from_parts(dest: u32, weight: f32) -> Self {
        Type2Edge { dest, weight }
    }

    fn dest(&self) -> u32 {
        self.dest
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn with_dest(&self, dest: u32) -> Self {
        Type2Edge { dest, weight: self.weight }
    }
}

/// In-edge record: `{src: u32}`, the reverse adjacency of one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InEdge {
    pub src: u32,
}

impl ByteEncodable for InEdge {
    fn to_bytes(&self) -> Vec<u8> {
        self.src.to_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(InEdge { src: u32::from_bytes(bytes)? })
    }

    fn byte_size() -> usize {
        u32::byte_size()
    }
}
