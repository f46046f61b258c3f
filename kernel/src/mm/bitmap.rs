//! Lock-free bitmap frame allocator.
//!
//! Tracks one bit per physical frame over a contiguous, page-aligned
//! range. A **set** bit means the frame is free. All mutation happens
//! through compare-and-swap on the containing word, so any number of CPUs
//! may allocate and free concurrently without a lock; callers that need
//! atomicity across *several* frames must layer their own serialization
//! on top.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::kassert;
use crate::mm::{PhysAddr, PAGE_SIZE};

/// Number of frames tracked per bitmap word.
pub const BITS_PER_WORD: usize = usize::BITS as usize;

/// A frame allocator over borrowed bitmap storage.
///
/// The storage and the rotating allocation hint live with the owner (the
/// watermark allocator or a test fixture); this type is a cheap view that
/// carries the indexing arithmetic.
#[derive(Debug)]
pub struct PmmBitmapAllocator<'a> {
    /// Bit set = frame free.
    words: &'a [AtomicUsize],
    /// Word index where the last successful allocation happened; the next
    /// search starts here.
    hint: &'a AtomicUsize,
    /// Frame number of bit 0 of word 0.
    base_frame: usize,
}

impl<'a> PmmBitmapAllocator<'a> {
    /// Create a view over `words`, managing frames starting at `base`.
    ///
    /// `base` must be page aligned.
    pub fn new(words: &'a [AtomicUsize], hint: &'a AtomicUsize, base: PhysAddr) -> Self {
        kassert!(
            base.as_usize() % PAGE_SIZE == 0,
            "bitmap base must be page aligned"
        );
        Self {
            words,
            hint,
            base_frame: base.as_usize() / PAGE_SIZE,
        }
    }

    /// Total number of frames this bitmap can track.
    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.words.len() * BITS_PER_WORD
    }

    /// Mark every frame allocated (all bits clear).
    pub fn mark_all_allocated(&self) {
        for word in self.words {
            word.store(0, Ordering::SeqCst);
        }
        self.hint.store(0, Ordering::SeqCst);
    }

    /// Allocate one free frame, preferring frames whose low-order bits
    /// match `color_hint`.
    ///
    /// The search rotates through the bitmap starting at the word of the
    /// most recent allocation. Returns `None` when every frame is taken.
    /// The hint only influences *which* free frame is chosen, never
    /// whether allocation succeeds.
    pub fn allocate(&self, color_hint: Option<PhysAddr>) -> Option<PhysAddr> {
        let word_count = self.words.len();
        if word_count == 0 {
            return None;
        }
        let preferred_bit =
            color_hint.map(|addr| (addr.as_usize() / PAGE_SIZE) % BITS_PER_WORD);
        let start = self.hint.load(Ordering::SeqCst) % word_count;

        for offset in 0..word_count {
            let index = (start + offset) % word_count;
            let word = &self.words[index];

            loop {
                let value = word.load(Ordering::SeqCst);
                if value == 0 {
                    break;
                }
                let bit = match preferred_bit {
                    Some(b) if value & (1 << b) != 0 => b,
                    _ => value.trailing_zeros() as usize,
                };
                let cleared = value & !(1 << bit);
                if word
                    .compare_exchange(value, cleared, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.hint.store(index, Ordering::SeqCst);
                    return Some(self.slot_address(index, bit));
                }
                // Lost the race for this word; re-read and retry.
            }
        }
        None
    }

    /// Allocate exactly the frame at `frame`.
    ///
    /// Returns `None` if the frame is already allocated.
    pub fn allocate_specific(&self, frame: PhysAddr) -> Option<PhysAddr> {
        let (index, bit) = self.slot_of(frame);
        let word = &self.words[index];
        let mask = 1 << bit;

        loop {
            let value = word.load(Ordering::SeqCst);
            if value & mask == 0 {
                return None;
            }
            if word
                .compare_exchange(value, value & !mask, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(frame);
            }
        }
    }

    /// Return `frame` to the free pool.
    ///
    /// Freeing a frame that is already free is a programmer bug.
    pub fn free(&self, frame: PhysAddr) {
        let (index, bit) = self.slot_of(frame);
        let word = &self.words[index];
        let mask = 1 << bit;

        loop {
            let value = word.load(Ordering::SeqCst);
            kassert!(value & mask == 0, "freeing a frame that is already free");
            if word
                .compare_exchange(value, value | mask, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Is the frame at `frame` currently free?
    pub fn is_free(&self, frame: PhysAddr) -> bool {
        let (index, bit) = self.slot_of(frame);
        self.words[index].load(Ordering::SeqCst) & (1 << bit) != 0
    }

    /// Map a frame address to its word index and bit position.
    fn slot_of(&self, frame: PhysAddr) -> (usize, usize) {
        kassert!(
            frame.as_usize() % PAGE_SIZE == 0,
            "frame address must be page aligned"
        );
        let frame_number = frame.as_usize() / PAGE_SIZE;
        kassert!(frame_number >= self.base_frame, "frame below bitmap range");
        let slot = frame_number - self.base_frame;
        let index = slot / BITS_PER_WORD;
        kassert!(index < self.words.len(), "frame above bitmap range");
        (index, slot % BITS_PER_WORD)
    }

    /// Map a word index and bit position back to a frame address.
    fn slot_address(&self, index: usize, bit: usize) -> PhysAddr {
        kassert!(index < self.words.len(), "word index out of range");
        let frame_number = self.base_frame + index * BITS_PER_WORD + bit;
        PhysAddr::new(frame_number * PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: usize = 2;

    struct Fixture {
        words: [AtomicUsize; WORDS],
        hint: AtomicUsize,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                words: [AtomicUsize::new(0), AtomicUsize::new(0)],
                hint: AtomicUsize::new(0),
            }
        }

        fn bitmap(&self, base: usize) -> PmmBitmapAllocator<'_> {
            PmmBitmapAllocator::new(&self.words, &self.hint, PhysAddr::new(base))
        }
    }

    #[test_case]
    fn test_allocate_exhausts_every_frame() {
        let fixture = Fixture::new();
        let bitmap = fixture.bitmap(0);
        bitmap.mark_all_allocated();
        for frame in 0..bitmap.capacity_frames() {
            bitmap.free(PhysAddr::new(frame * PAGE_SIZE));
        }

        let mut allocated = 0;
        while bitmap.allocate(None).is_some() {
            allocated += 1;
        }
        assert_eq!(allocated, WORDS * BITS_PER_WORD);
        assert!(bitmap.allocate(None).is_none());
    }

    #[test_case]
    fn test_allocate_returns_unique_frames() {
        let fixture = Fixture::new();
        let bitmap = fixture.bitmap(0x10000);
        bitmap.mark_all_allocated();
        bitmap.free(PhysAddr::new(0x10000));
        bitmap.free(PhysAddr::new(0x11000));

        let a = bitmap.allocate(None).unwrap();
        let b = bitmap.allocate(None).unwrap();
        assert_ne!(a, b);
        assert!(bitmap.allocate(None).is_none());
    }

    #[test_case]
    fn test_allocate_specific() {
        let fixture = Fixture::new();
        let bitmap = fixture.bitmap(0);
        bitmap.mark_all_allocated();
        bitmap.free(PhysAddr::new(0x3000));

        assert_eq!(
            bitmap.allocate_specific(PhysAddr::new(0x3000)),
            Some(PhysAddr::new(0x3000))
        );
        // Second claim on the same frame fails.
        assert_eq!(bitmap.allocate_specific(PhysAddr::new(0x3000)), None);
    }

    #[test_case]
    fn test_free_makes_frame_allocatable_again() {
        let fixture = Fixture::new();
        let bitmap = fixture.bitmap(0);
        bitmap.mark_all_allocated();
        bitmap.free(PhysAddr::new(0));

        let frame = bitmap.allocate(None).unwrap();
        assert!(!bitmap.is_free(frame));
        bitmap.free(frame);
        assert!(bitmap.is_free(frame));
        assert_eq!(bitmap.allocate(None), Some(frame));
    }

    #[test_case]
    fn test_color_hint_prefers_matching_frame() {
        let fixture = Fixture::new();
        let bitmap = fixture.bitmap(0);
        bitmap.mark_all_allocated();
        bitmap.free(PhysAddr::new(0x1000));
        bitmap.free(PhysAddr::new(0x5000));

        // Both frames are free; the hint steers the choice to frame 5.
        let frame = bitmap.allocate(Some(PhysAddr::new(0x5000))).unwrap();
        assert_eq!(frame, PhysAddr::new(0x5000));

        // With the preferred frame gone the other one is still returned.
        let frame = bitmap.allocate(Some(PhysAddr::new(0x5000))).unwrap();
        assert_eq!(frame, PhysAddr::new(0x1000));
    }

    #[test_case]
    fn test_base_offset_addressing() {
        let fixture = Fixture::new();
        let base = 0x0020_0000;
        let bitmap = fixture.bitmap(base);
        bitmap.mark_all_allocated();
        bitmap.free(PhysAddr::new(base + 7 * PAGE_SIZE));

        assert_eq!(
            bitmap.allocate(None),
            Some(PhysAddr::new(base + 7 * PAGE_SIZE))
        );
    }
}
