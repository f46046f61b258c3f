//! Bootstrap watermark frame allocator.
//!
//! Slides a fixed-size window across the physical address space, tracking
//! the frames inside the window with a [`PmmBitmapAllocator`]. Frames are
//! handed out low-to-high and never come back: the allocator exists only
//! to get the real physical memory manager off the ground, after which
//! whatever it allocated is intentionally leaked.
//!
//! The window size is chosen so it divides the address space exactly,
//! making a window transition a pure address increment.

use core::cell::UnsafeCell;
use core::sync::atomic::AtomicUsize;

use crate::kassert;
use crate::mm::bitmap::{PmmBitmapAllocator, BITS_PER_WORD};
use crate::mm::iter::RegionIterator;
use crate::mm::region::PmmRegion;
use crate::mm::{PmmAllocator, PhysAddr, PAGE_SIZE};
use crate::sync::Lock;

/// Words of bitmap backing storage; sized so one window is 2 MiB.
pub const BOOTSTRAP_BITMAP_WORDS: usize = 8;

/// Frames tracked per window.
pub const WINDOW_FRAMES: usize = BOOTSTRAP_BITMAP_WORDS * BITS_PER_WORD;

/// Bytes covered by one window.
pub const WINDOW_SIZE: usize = WINDOW_FRAMES * PAGE_SIZE;

/// State mutated under the allocator's lock.
struct WatermarkInner<R, U> {
    /// The slice of physical address space the bitmap currently tracks.
    window: PmmRegion,
    /// Usable memory as reported by firmware.
    ram: R,
    /// Reserved ranges concatenated with RAM already in use.
    used: U,
    /// Whether the current window's bitmap has been built.
    primed: bool,
    /// Set once no usable RAM remains at or above the window.
    exhausted: bool,
}

/// Sequential, non-freeing allocator over a sliding bitmap window.
pub struct PmmWatermarkAllocator<R, U> {
    lock: Lock,
    /// Bitmap backing storage, reused as the window slides. The bits are
    /// atomics so the bitmap view stays lock-free; the lock above only
    /// serializes window rebuilds.
    words: [AtomicUsize; BOOTSTRAP_BITMAP_WORDS],
    hint: AtomicUsize,
    inner: UnsafeCell<WatermarkInner<R, U>>,
}

// SAFETY: `inner` is only touched while `lock` is held, and the bitmap
// words are atomics. `R` and `U` never leave the critical section, so
// Send on them is all that sharing the allocator requires.
unsafe impl<R: Send, U: Send> Sync for PmmWatermarkAllocator<R, U> {}

impl<R: RegionIterator, U: RegionIterator> PmmWatermarkAllocator<R, U> {
    /// Create an allocator whose window starts at the bottom of the
    /// physical address space.
    ///
    /// `ram` yields usable memory; `used` yields every range that must
    /// not be handed out (firmware-reserved plus already-occupied RAM).
    pub fn new(ram: R, used: U) -> Self {
        const ZERO: AtomicUsize = AtomicUsize::new(0);
        let window = match PmmRegion::new(PhysAddr::new(0), WINDOW_SIZE) {
            Ok(w) => w,
            // WINDOW_SIZE is a non-zero constant well below the address
            // space limit; construction cannot fail.
            Err(_) => unreachable!(),
        };
        Self {
            lock: Lock::new(),
            words: [ZERO; BOOTSTRAP_BITMAP_WORDS],
            hint: AtomicUsize::new(0),
            inner: UnsafeCell::new(WatermarkInner {
                window,
                ram,
                used,
                primed: false,
                exhausted: false,
            }),
        }
    }

    /// Rebuild the bitmap for `window`.
    ///
    /// Starts with every frame allocated, frees the frames covered by RAM,
    /// then re-claims the frames covered by used ranges and the null
    /// sentinel frame 0. Returns `false` when no RAM region intersects or
    /// lies above the window -- the signal that memory is exhausted.
    fn populate_window(
        &self,
        window: PmmRegion,
        ram: &mut R,
        used: &mut U,
    ) -> bool {
        let bitmap = self.bitmap(window);
        bitmap.mark_all_allocated();

        let mut ram_remaining = false;
        ram.reset();
        while ram.move_next() {
            let region = ram.current();
            if region.below(window.base()) {
                continue;
            }
            ram_remaining = true;
            let mut clipped = region;
            if clipped.clip(&window) {
                for frame in clipped.frames() {
                    bitmap.free(frame);
                }
            }
        }
        if !ram_remaining {
            return false;
        }

        used.reset();
        while used.move_next() {
            let mut clipped = used.current();
            if clipped.clip(&window) {
                for frame in clipped.frames() {
                    let _ = bitmap.allocate_specific(frame);
                }
            }
        }

        // Frame 0 is the null sentinel and is never handed out.
        if window.contains(PhysAddr::new(0)) {
            let _ = bitmap.allocate_specific(PhysAddr::new(0));
        }
        true
    }

    fn bitmap(&self, window: PmmRegion) -> PmmBitmapAllocator<'_> {
        PmmBitmapAllocator::new(&self.words, &self.hint, window.base())
    }
}

impl<R, U> PmmAllocator for PmmWatermarkAllocator<R, U>
where
    R: RegionIterator + Send,
    U: RegionIterator + Send,
{
    /// Allocate the next free frame at or above the watermark.
    ///
    /// Takes the allocator's lock for the whole operation: a miss in the
    /// current window triggers a window rebuild, which must not interleave
    /// with other allocators of the same window.
    fn allocate(&self, color_hint: Option<PhysAddr>) -> Option<PhysAddr> {
        let _guard = self.lock.acquire();
        // SAFETY: the lock is held; no other reference to `inner` exists.
        let inner = unsafe { &mut *self.inner.get() };

        if inner.exhausted {
            return None;
        }
        if !inner.primed {
            if !self.populate_window(inner.window, &mut inner.ram, &mut inner.used) {
                inner.exhausted = true;
                return None;
            }
            inner.primed = true;
        }

        loop {
            if let Some(frame) = self.bitmap(inner.window).allocate(color_hint) {
                return Some(frame);
            }

            kassert!(
                inner.window.length() == WINDOW_SIZE,
                "watermark window length drifted from its canonical size"
            );
            let mut next = inner.window;
            if !next.advance() {
                inner.exhausted = true;
                return None;
            }
            inner.window = next;
            if !self.populate_window(inner.window, &mut inner.ram, &mut inner.used) {
                inner.exhausted = true;
                return None;
            }
        }
    }

    /// The watermark allocator never frees.
    ///
    /// Calling this is a programmer bug: debug builds assert, release
    /// builds deliberately leak the frame.
    fn free(&self, _frame: PhysAddr) {
        kassert!(false, "the bootstrap frame allocator cannot free");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::iter::{ConcatIterator, SliceRegionIterator};

    type TestAllocator<'a> = PmmWatermarkAllocator<
        SliceRegionIterator<'a>,
        ConcatIterator<SliceRegionIterator<'a>, SliceRegionIterator<'a>>,
    >;

    fn allocator<'a>(
        ram: &'a [PmmRegion],
        reserved: &'a [PmmRegion],
        modules: &'a [PmmRegion],
    ) -> TestAllocator<'a> {
        PmmWatermarkAllocator::new(
            SliceRegionIterator::new(ram),
            ConcatIterator::new(
                SliceRegionIterator::new(reserved),
                SliceRegionIterator::new(modules),
            ),
        )
    }

    fn region(base: usize, length: usize) -> PmmRegion {
        PmmRegion::new(PhysAddr::new(base), length).unwrap()
    }

    #[test_case]
    fn test_first_frame_is_not_the_null_sentinel() {
        let ram = [region(0, PAGE_SIZE * 8)];
        let alloc = allocator(&ram, &[], &[]);

        assert_eq!(alloc.allocate(None), Some(PhysAddr::new(PAGE_SIZE)));
        assert_eq!(alloc.allocate(None), Some(PhysAddr::new(2 * PAGE_SIZE)));
    }

    #[test_case]
    fn test_reserved_and_module_holes_are_skipped() {
        // Modeled on a classic PC layout, scaled to the test: RAM below
        // 640K and from 1M up, video hole reserved, one module image.
        let ram = [region(0, 0xA0000), region(0x100000, 0x100000)];
        let reserved = [region(0xA0000, 0x60000)];
        let modules = [region(0x100000, 0x30000)];
        let alloc = allocator(&ram, &reserved, &modules);

        let mut previous = PhysAddr::new(0);
        while let Some(frame) = alloc.allocate(None) {
            assert!(frame > previous, "frames must be handed out ascending");
            previous = frame;
            assert!(
                !(0xA0000..0x100000).contains(&frame.as_usize()),
                "allocated from the reserved hole"
            );
            assert!(
                !(0x100000..0x130000).contains(&frame.as_usize()),
                "allocated from the module image"
            );
        }

        // Every usable frame was produced: 640K minus the sentinel, plus
        // the megabyte above the module image.
        assert_eq!(previous.as_usize(), 0x200000 - PAGE_SIZE);
    }

    #[test_case]
    fn test_exhaustion_count() {
        let windows = 2;
        let ram = [region(0, windows * WINDOW_SIZE)];
        let alloc = allocator(&ram, &[], &[]);

        let mut count = 0;
        while alloc.allocate(None).is_some() {
            count += 1;
        }
        assert_eq!(count, windows * WINDOW_FRAMES - 1);
        // Exhaustion is sticky.
        assert_eq!(alloc.allocate(None), None);
    }

    #[test_case]
    fn test_window_advances_to_distant_ram() {
        let base = 5 * WINDOW_SIZE;
        let ram = [region(base, 2 * PAGE_SIZE)];
        let alloc = allocator(&ram, &[], &[]);

        assert_eq!(alloc.allocate(None), Some(PhysAddr::new(base)));
        assert_eq!(alloc.allocate(None), Some(PhysAddr::new(base + PAGE_SIZE)));
        assert_eq!(alloc.allocate(None), None);
    }

    #[test_case]
    fn test_allocations_are_page_aligned_and_unique() {
        let ram = [region(0x1800, 5 * PAGE_SIZE)];
        let alloc = allocator(&ram, &[], &[]);

        let mut seen = [None; 8];
        let mut count = 0;
        while let Some(frame) = alloc.allocate(None) {
            assert_eq!(frame.as_usize() % PAGE_SIZE, 0);
            assert!(!seen[..count].contains(&Some(frame)));
            seen[count] = Some(frame);
            count += 1;
        }
        assert!(count > 0);
    }

    #[test_case]
    fn test_color_hint_does_not_change_outcome() {
        let ram = [region(0, PAGE_SIZE * 4)];
        let plain = allocator(&ram, &[], &[]);
        let hinted = allocator(&ram, &[], &[]);

        let mut plain_count = 0;
        while plain.allocate(None).is_some() {
            plain_count += 1;
        }
        let mut hinted_count = 0;
        while hinted.allocate(Some(PhysAddr::new(0x3000))).is_some() {
            hinted_count += 1;
        }
        assert_eq!(plain_count, hinted_count);
    }
}
