use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of independent schedule lanes; hybrid programs use one per update style.
pub const NUM_LANES: usize = 2;

/// A fixed-size concurrent bitmap over slots.
struct Bitmap {
    words: Vec<AtomicU64>,
    len: usize,
}

impl Bitmap {
    fn new(len: usize) -> Self {
        Self { words: (0..len.div_ceil(64)).map(|_| AtomicU64::new(0)).collect(), len }
    }

    /// Sets `slot`; returns whether it was clear before.
    fn set(&self, slot: usize) -> bool {
        let mask = 1u64 << (slot % 64);
        self.words[slot / 64].fetch_or(mask, Ordering::Relaxed) & mask == 0
    }

    fn test(&self, slot: usize) -> bool {
        self.words[slot / 64].load(Ordering::Relaxed) & (1u64 << (slot % 64)) != 0
    }

    fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word.get_mut() = 0;
        }
    }

    fn word(&self, idx: usize) -> u64 {
        self.words[idx].load(Ordering::Relaxed)
    }

    fn count_excluding(&self, mask: &Bitmap) -> usize {
        (0..self.words.len()).map(|idx| (self.word(idx) & !mask.word(idx)).count_ones() as usize).sum()
    }

    fn count(&self) -> usize {
        self.words.iter().map(|w| w.load(Ordering::Relaxed).count_ones() as usize).sum()
    }
}

/// Slots of `range` whose bit is set in `word(idx)`, in increasing order.
///
/// Only the words overlapping `range` are read.
fn slots_in(range: Range<usize>, word: impl Fn(usize) -> u64) -> Vec<usize> {
    let mut result = Vec::new();
    if range.is_empty() {
        return result;
    }
    for idx in range.start / 64..=(range.end - 1) / 64 {
        let mut bits = word(idx);
        while bits != 0 {
            let slot = idx * 64 + bits.trailing_zeros() as usize;
            if range.contains(&slot) {
                result.push(slot);
            }
            bits &= bits - 1;
        }
    }
    result
}

/// One schedule lane: two membership bitmaps selected by a toggling context, plus halts.
struct Lane {
    buffers: [Bitmap; 2],
    halted: Bitmap,
    context: usize,
}

impl Lane {
    fn new(len: usize) -> Self {
        Self { buffers: [Bitmap::new(len), Bitmap::new(len)], halted: Bitmap::new(len), context: 0 }
    }

    fn current(&self) -> &Bitmap {
        &self.buffers[self.context]
    }

    fn next(&self) -> &Bitmap {
        &self.buffers[1 - self.context]
    }
}

/// Double-buffered active-vertex membership with sticky per-vertex halt flags.
///
/// Slots are vertex ids minus the task's `min_vert_id`. During a pass, programs write only
/// into the *next* buffer of a lane (through [`add_schedule`](Self::add_schedule) and friends)
/// and the *current* buffer is read-only. [`promote`](Self::promote) makes the next buffer
/// current between iterations. A halted slot never becomes active again in its lane.
pub struct Schedule {
    lanes: [Lane; NUM_LANES],
    len: usize,
}

impl Schedule {
    pub fn new(len: usize) -> Self {
        Self { lanes: [Lane::new(len), Lane::new(len)], len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Activates `slot` for the next iteration of `lane`.
    ///
    /// Skips the write when the slot is halted or already pending.
    pub fn add_schedule(&self, slot: usize, lane: usize) {
        let lane = &self.lanes[lane];
        if lane.halted.test(slot) || lane.next().test(slot) {
            return;
        }
        lane.next().set(slot);
    }

    /// Activates `slot` for the next iteration of `lane`, always performing the write.
    ///
    /// The halt flag still wins when the active set is computed.
    pub fn add_schedule_no_optimize(&self, slot: usize, lane: usize) {
        self.lanes[lane].next().set(slot);
    }

    pub fn vote_to_halt(&self, slot: usize, lane: usize) {
        self.lanes[lane].halted.set(slot);
    }

    pub fn is_halted(&self, slot: usize, lane: usize) -> bool {
        self.lanes[lane].halted.test(slot)
    }

    /// Whether `slot` is in the current iteration's active buffer of `lane`.
    pub fn is_active_now(&self, slot: usize, lane: usize) -> bool {
        let lane = &self.lanes[lane];
        lane.current().test(slot) && !lane.halted.test(slot)
    }

    /// Makes the next buffer of `lane` current and clears the new next buffer.
    pub fn promote(&mut self, lane: usize) {
        let lane = &mut self.lanes[lane];
        let old = lane.context;
        lane.buffers[old].clear();
        lane.context = 1 - old;
    }

    /// Scheduled, non-halted slots of `range` in the current buffer of `lane`.
    pub fn active_slots_in(&self, lane: usize, range: Range<usize>) -> Vec<usize> {
        let lane = &self.lanes[lane];
        slots_in(range, |idx| lane.current().word(idx) & !lane.halted.word(idx))
    }

    /// Non-halted slots of `range`, the active set under the explicit-halt policy.
    pub fn non_halted_slots_in(&self, lane: usize, range: Range<usize>) -> Vec<usize> {
        let lane = &self.lanes[lane];
        slots_in(range, |idx| !lane.halted.word(idx))
    }

    /// Scheduled, non-halted slots of the current buffer of `lane`.
    pub fn active_count(&self, lane: usize) -> usize {
        let lane = &self.lanes[lane];
        lane.current().count_excluding(&lane.halted)
    }

    /// Scheduled, non-halted slots waiting in the next buffer of `lane`.
    pub fn pending_count(&self, lane: usize) -> usize {
        let lane = &self.lanes[lane];
        lane.next().count_excluding(&lane.halted)
    }

    pub fn non_halted_count(&self, lane: usize) -> usize {
        self.len - self.lanes[lane].halted.count()
    }

    /// Clears every buffer and halt flag of every lane, used when a run restarts.
    pub fn reset(&mut self) {
        for lane in self.lanes.iter_mut() {
            lane.buffers[0].clear();
            lane.buffers[1].clear();
            lane.halted.clear();
            lane.context = 0;
        }
    }
}

#[cfg(test)]
mod test_schedule {
    use super::*;

    #[test]
    fn test_writes_land_in_next_buffer() {
        let mut schedule = Schedule::new(130);
        schedule.add_schedule(3, 0);
        schedule.add_schedule(129, 0);
        assert!(!schedule.is_active_now(3, 0));
        assert_eq!(schedule.pending_count(0), 2);

        schedule.promote(0);
        assert!(schedule.is_active_now(3, 0));
        assert_eq!(schedule.active_slots_in(0, 0..130), vec![3, 129]);
        assert_eq!(schedule.active_slots_in(0, 64..130), vec![129]);
        assert_eq!(schedule.active_count(0), 2);
        assert_eq!(schedule.pending_count(0), 0);

        // The other lane is untouched.
        assert!(schedule.active_slots_in(1, 0..130).is_empty());

        schedule.promote(0);
        assert_eq!(schedule.active_count(0), 0);
    }

    #[test]
    fn test_halt_is_sticky() {
        let mut schedule = Schedule::new(8);
        schedule.vote_to_halt(5, 0);
        schedule.add_schedule(5, 0);
        assert_eq!(schedule.pending_count(0), 0);

        schedule.add_schedule_no_optimize(5, 0);
        schedule.add_schedule_no_optimize(6, 0);
        schedule.promote(0);
        assert_eq!(schedule.active_slots_in(0, 0..8), vec![6]);
        assert_eq!(schedule.non_halted_count(0), 7);
        assert_eq!(schedule.non_halted_slots_in(0, 4..8), vec![4, 6, 7]);
        assert!(!schedule.is_halted(5, 1));

        schedule.reset();
        assert!(!schedule.is_halted(5, 0));
        assert_eq!(schedule.active_count(0), 0);
    }

    #[test]
    fn test_concurrent_schedule_deduplicates() {
        use rayon::prelude::*;
        let mut schedule = Schedule::new(1000);
        (0..10_000usize).into_par_iter().for_each(|i| schedule.add_schedule(i % 1000, 1));
        assert_eq!(schedule.pending_count(1), 1000);
        schedule.promote(1);
        assert_eq!(schedule.active_count(1), 1000);
        assert_eq!(schedule.non_halted_slots_in(1, 990..1000).len(), 10);
    }
}
