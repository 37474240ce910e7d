use std::sync::atomic::{AtomicU32, Ordering};

/// A fixed-size vertex attribute record that can live directly inside a memory-mapped file.
///
/// Attribute records are shared between worker threads for a whole iteration: a vertex's
/// owner writes its fields while neighbors read them. Every field must therefore provide
/// torn-free concurrent access on its own, which in practice means every field is an atomic
/// accessed with `Ordering::Relaxed`. There is no atomicity across fields: a reader may see
/// one field from before an update and another from after it. Algorithms built on this engine
/// are monotone or convergent and tolerate such stale reads.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` structs composed only of atomic integer types (or
/// wrappers such as [`AtomicF32`]) so that:
/// * every bit pattern, including all zeroes, is a valid value;
/// * the alignment does not exceed the page size of a memory map;
/// * the type has no `Drop` glue and holds no pointers.
pub unsafe trait AttrRecord: Send + Sync + Sized + 'static {}

// A bare label, also the record of materialized result files.
unsafe impl AttrRecord for AtomicU32 {}

/// A relaxed atomic `f32`, stored as its bit pattern.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}
