use std::ops::Range;
use std::path::Path;

use crate::error::Result;
use crate::storage::mapped::AttrArena;
use crate::types::{AttrRecord, VertexId};

/// Id-addressed vertex attribute store over one mapped attribute file.
///
/// Slot `vid - min_vert_id` holds the record of `vid`. The slot space is cut into segments of
/// `segment_cap` slots; a [`SegmentView`] serves the segment currently being processed and
/// falls back to the full array for everything else. Both are slices of the same arena.
pub struct AttrStore<A: AttrRecord> {
    arena: AttrArena<A>,
    min_vert_id: VertexId,
    segment_cap: usize,
}

impl<A: AttrRecord> AttrStore<A> {
    /// Creates a zeroed attribute file for `vertex_count` vertices starting at `min_vert_id`.
    pub fn create(path: &Path, min_vert_id: VertexId, vertex_count: usize, segment_cap: u32) -> Result<Self> {
        Ok(Self {
            arena: AttrArena::create(path, vertex_count)?,
            min_vert_id,
            segment_cap: segment_cap.max(1) as usize,
        })
    }

    /// Maps an existing attribute file; its content seeds the next run.
    pub fn open(path: &Path, min_vert_id: VertexId, vertex_count: usize, segment_cap: u32) -> Result<Self> {
        Ok(Self {
            arena: AttrArena::open(path, vertex_count)?,
            min_vert_id,
            segment_cap: segment_cap.max(1) as usize,
        })
    }

    /// Opens `path` when it already exists, otherwise creates it zeroed.
    pub fn open_or_create(path: &Path, min_vert_id: VertexId, vertex_count: usize, segment_cap: u32) -> Result<Self> {
        if path.exists() {
            Self::open(path, min_vert_id, vertex_count, segment_cap)
        } else {
            Self::create(path, min_vert_id, vertex_count, segment_cap)
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn min_vert_id(&self) -> VertexId {
        self.min_vert_id
    }

    pub fn segment_cap(&self) -> usize {
        self.segment_cap
    }

    /// The full view of all records, indexed by slot.
    pub fn records(&self) -> &[A] {
        self.arena.records()
    }

    /// Record of vertex `vid`.
    ///
    /// # Panics
    /// If `vid` lies outside the store's id range.
    pub fn get(&self, vid: VertexId) -> &A {
        &self.records()[self.slot(vid)]
    }

    pub fn slot(&self, vid: VertexId) -> usize {
        assert!(
            vid >= self.min_vert_id && ((vid - self.min_vert_id) as usize) < self.len(),
            "vertex {} outside attribute range starting at {}",
            vid,
            self.min_vert_id
        );
        (vid - self.min_vert_id) as usize
    }

    pub fn segment_count(&self) -> usize {
        self.len().div_ceil(self.segment_cap)
    }

    /// Slot range covered by segment `segment`.
    pub fn segment_slots(&self, segment: usize) -> Range<usize> {
        let start = (segment * self.segment_cap).min(self.len());
        let end = (start + self.segment_cap).min(self.len());
        start..end
    }

    /// The view used while processing the vertices of `segment`.
    pub fn segment_view(&self, segment: usize) -> SegmentView<'_, A> {
        let slots = self.segment_slots(segment);
        SegmentView {
            full: self.records(),
            segment: &self.records()[slots.clone()],
            segment_idx: segment,
            segment_cap: self.segment_cap,
            min_vert_id: self.min_vert_id,
        }
    }

    /// The view for the segment holding `vid`.
    pub fn view_for(&self, vid: VertexId) -> SegmentView<'_, A> {
        self.segment_view(self.slot(vid) / self.segment_cap)
    }

    pub fn flush(&self) -> Result<()> {
        self.arena.flush()
    }

    pub fn path(&self) -> &Path {
        self.arena.path()
    }
}

/// Two-tier attribute access for the vertices of one segment.
///
/// Records whose slot falls into the current segment are read through the segment slice;
/// all others go through the full array. Both slices alias the same mapping, so the choice
/// never changes the bytes observed.
pub struct SegmentView<'a, A> {
    full: &'a [A],
    segment: &'a [A],
    segment_idx: usize,
    segment_cap: usize,
    min_vert_id: VertexId,
}

impl<A> Clone for SegmentView<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for SegmentView<'_, A> {}

impl<'a, A> SegmentView<'a, A> {
    /// Whether `vid` shares the segment of this view.
    pub fn is_local(&self, vid: VertexId) -> bool {
        (vid - self.min_vert_id) as usize / self.segment_cap == self.segment_idx
    }

    /// Record of `vid`, from the segment slice when local, from the full array otherwise.
    pub fn get(&self, vid: VertexId) -> &'a A {
        let slot = (vid - self.min_vert_id) as usize;
        if slot / self.segment_cap == self.segment_idx {
            &self.segment[slot % self.segment_cap]
        } else {
            &self.full[slot]
        }
    }
}

#[cfg(test)]
mod test_attr_store {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[repr(C)]
    struct Label {
        value: AtomicU32,
    }
    unsafe impl AttrRecord for Label {}

    #[test]
    fn test_segment_and_full_views_agree() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttrStore::<Label>::create(&dir.path().join("label.attr"), 10, 23, 4).unwrap();
        assert_eq!(store.segment_count(), 6);
        assert_eq!(store.segment_slots(5), 20..23);

        for (slot, record) in store.records().iter().enumerate() {
            record.value.store(slot as u32 * 3, Ordering::Relaxed);
        }
        for segment in 0..store.segment_count() {
            let view = store.segment_view(segment);
            for vid in 10..33 {
                let via_view = view.get(vid).value.load(Ordering::Relaxed);
                let via_full = store.get(vid).value.load(Ordering::Relaxed);
                assert_eq!(via_view, via_full);
                assert_eq!(view.is_local(vid), (vid - 10) / 4 == segment as u32);
            }
        }

        // A write through the segment slice is visible through the full array.
        let view = store.view_for(17);
        view.get(17).value.store(999, Ordering::Relaxed);
        assert_eq!(store.records()[7].value.load(Ordering::Relaxed), 999);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_vertex_panics() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttrStore::<Label>::create(&dir.path().join("label.attr"), 0, 3, 2).unwrap();
        store.get(3);
    }
}
