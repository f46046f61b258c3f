//! Physical memory management.
//!
//! At this stage of the kernel the only allocator is the bootstrap
//! watermark allocator; [`PhysicalMemoryManager`] is the façade the rest
//! of the kernel reaches it through. Stage one wires the watermark
//! allocator to the boot-loader memory map and reports how much storage
//! the stage-two page-frame database will need; stage two itself is a
//! contract waiting on that design.

pub mod bitmap;
pub mod iter;
pub mod region;
pub mod watermark;

use core::fmt;

use spin::Once;

use crate::arch::x86_64::multiboot::{ModuleRegions, RamRegions, ReservedRegions};
use crate::error::{KernelError, KernelResult};
use crate::mm::iter::{ConcatIterator, RegionIterator};
use crate::mm::watermark::PmmWatermarkAllocator;

/// Size of a physical frame.
pub const PAGE_SIZE: usize = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: usize = 12;

/// Bytes the stage-two frame database needs per physical frame.
pub const FRAME_DESCRIPTOR_BYTES: usize = 32;

/// Byte lengths of physical regions.
pub type PhysSize = usize;

/// A physical memory address.
///
/// Wide enough for any address the architecture can emit. Arithmetic
/// helpers saturate rather than wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// The highest addressable byte.
    pub const MAX: PhysAddr = PhysAddr(usize::MAX);

    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Add an offset, stopping at the top of the address space.
    #[inline]
    pub const fn saturating_add(self, offset: usize) -> Self {
        Self(self.0.saturating_add(offset))
    }

    /// The number of the frame containing this address.
    #[inline]
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Is this address on a frame boundary?
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The frame allocation capability.
///
/// `allocate` hands out one page-aligned frame, or `None` when no frame
/// is available. The color hint may steer the choice toward a frame whose
/// low-order address bits match, but never changes whether allocation
/// succeeds.
pub trait PmmAllocator: Sync {
    fn allocate(&self, color_hint: Option<PhysAddr>) -> Option<PhysAddr>;
    fn free(&self, frame: PhysAddr);
}

/// Used-region view handed to the bootstrap allocator: reserved ranges
/// followed by loaded-module extents.
pub type BootUsedRegions = ConcatIterator<ReservedRegions<'static>, ModuleRegions<'static>>;

/// The concrete bootstrap allocator type.
pub type BootFrameAllocator = PmmWatermarkAllocator<RamRegions<'static>, BootUsedRegions>;

static BOOT_ALLOCATOR: Once<BootFrameAllocator> = Once::new();
static PMM: Once<PhysicalMemoryManager> = Once::new();

/// Storage the stage-two frame database will need for `frame_count`
/// physical frames.
pub fn stage_two_size_for(frame_count: usize) -> usize {
    frame_count.saturating_mul(FRAME_DESCRIPTOR_BYTES)
}

/// Process-wide façade over the current frame allocator.
pub struct PhysicalMemoryManager {
    allocator: &'static dyn PmmAllocator,
    stage_two_bytes: usize,
}

impl PhysicalMemoryManager {
    /// Bring up the bootstrap allocator from the boot-loader's view of
    /// memory.
    ///
    /// Walks `ram` once to size the eventual frame database, then hands
    /// all three iterators to the watermark allocator. Returns the number
    /// of bytes stage two will need.
    pub fn init_stage_one(
        mut ram: RamRegions<'static>,
        reserved: ReservedRegions<'static>,
        modules: ModuleRegions<'static>,
    ) -> KernelResult<usize> {
        if PMM.is_completed() {
            return Err(KernelError::AlreadyInitialized {
                subsystem: "physical memory manager",
            });
        }

        let mut highest_frame = 0;
        ram.reset();
        while ram.move_next() {
            let last = ram.current().last().frame_number();
            if last > highest_frame {
                highest_frame = last;
            }
        }
        let stage_two_bytes = stage_two_size_for(highest_frame + 1);

        let used = ConcatIterator::new(reserved, modules);
        let allocator = BOOT_ALLOCATOR.call_once(|| PmmWatermarkAllocator::new(ram, used));
        let pmm = PMM.call_once(|| PhysicalMemoryManager {
            allocator,
            stage_two_bytes,
        });
        Ok(pmm.stage_two_bytes)
    }

    /// The façade singleton, if stage one has run.
    pub fn instance() -> Option<&'static PhysicalMemoryManager> {
        PMM.get()
    }

    /// The kernel-wide frame allocation capability.
    pub fn allocator(&self) -> &'static dyn PmmAllocator {
        self.allocator
    }

    /// Bytes of storage [`init_stage_two`](Self::init_stage_two) expects.
    pub fn stage_two_size(&self) -> usize {
        self.stage_two_bytes
    }

    /// Replace the bootstrap allocator with the full frame database.
    ///
    /// `storage` must be at least [`stage_two_size`](Self::stage_two_size)
    /// bytes. The database design is still open, so this currently only
    /// validates the contract.
    pub fn init_stage_two(&self, storage: &'static mut [u8]) -> KernelResult<()> {
        if storage.len() < self.stage_two_bytes {
            return Err(KernelError::InvalidArgument {
                name: "storage",
                value: "smaller than the stage-two requirement",
            });
        }
        Err(KernelError::NotImplemented {
            feature: "stage-two page frame database",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x86_64::multiboot::{
        BootInfo, BootInfoStorage, MultibootTranslator, MULTIBOOT_BOOTLOADER_MAGIC,
    };
    use crate::mm::region::PmmRegion;

    struct SyncCell<T>(core::cell::UnsafeCell<T>);

    // SAFETY: the test runner is single-threaded; each cell is touched by
    // exactly one test.
    unsafe impl<T> Sync for SyncCell<T> {}

    static STORAGE: SyncCell<BootInfoStorage> = SyncCell(core::cell::UnsafeCell::new(
        BootInfoStorage::new(),
    ));
    static IMAGE: SyncCell<[u8; 512]> = SyncCell(core::cell::UnsafeCell::new([0; 512]));

    fn put_u32(image: &mut [u8], offset: usize, value: u32) {
        image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_mmap_entry(image: &mut [u8], offset: usize, base: u64, length: u64, kind: u32) -> usize {
        put_u32(image, offset, 20);
        image[offset + 4..offset + 12].copy_from_slice(&base.to_le_bytes());
        image[offset + 12..offset + 20].copy_from_slice(&length.to_le_bytes());
        put_u32(image, offset + 20, kind);
        offset + 24
    }

    static INFO: spin::Once<BootInfo<'static>> = spin::Once::new();

    /// The classic PC boot picture: RAM below 640K and from 1M to 128M,
    /// the video hole reserved, the kernel image loaded at 1M. Translated
    /// once; every caller shares the snapshot.
    fn boot_picture() -> &'static BootInfo<'static> {
        INFO.call_once(|| {
            // SAFETY: see SyncCell; the image and storage are written
            // only here, before any shared borrow escapes.
            let image = unsafe { &mut *IMAGE.0.get() };
            put_u32(image, 0, 1 << 6);
            let mut next = put_mmap_entry(image, 128, 0, 0xA_0000, 1);
            next = put_mmap_entry(image, next, 0xA_0000, 0x6_0000, 2);
            next = put_mmap_entry(image, next, 0x10_0000, 0x07F0_0000, 1);
            put_u32(image, 44, (next - 128) as u32);
            put_u32(image, 48, 128);

            let translator = MultibootTranslator::new(image.as_ptr() as usize, 0, image.len());
            let kernel = PmmRegion::new(PhysAddr::new(0x10_0000), 0x3_0000).unwrap();
            // SAFETY: see SyncCell; sole mutable access, ending here.
            let storage = unsafe { &mut *STORAGE.0.get() };
            translator
                .translate(storage, 0, MULTIBOOT_BOOTLOADER_MAGIC, kernel)
                .unwrap()
        })
    }

    #[test_case]
    fn test_stage_one_brings_up_the_boot_allocator() {
        let info = boot_picture();
        let bytes = PhysicalMemoryManager::init_stage_one(
            info.ram_regions(),
            info.reserved_regions(),
            info.module_regions(),
        )
        .unwrap();
        assert_eq!(
            bytes,
            ((0x07FF_FFFF >> PAGE_SHIFT) + 1) * FRAME_DESCRIPTOR_BYTES
        );

        let pmm = PhysicalMemoryManager::instance().unwrap();
        assert_eq!(pmm.stage_two_size(), bytes);

        // Frame 0 is withheld; allocation starts at frame 1 and walks
        // upward without touching the reserved hole or the kernel image.
        let allocator = pmm.allocator();
        assert_eq!(allocator.allocate(None), Some(PhysAddr::new(0x1000)));
        assert_eq!(allocator.allocate(None), Some(PhysAddr::new(0x2000)));

        let mut frame = allocator.allocate(None).unwrap();
        while frame.as_usize() < 0x20_0000 {
            assert!(
                !(0xA_0000..0x10_0000).contains(&frame.as_usize()),
                "allocated from the reserved hole"
            );
            assert!(
                !(0x10_0000..0x13_0000).contains(&frame.as_usize()),
                "allocated from the kernel image"
            );
            frame = allocator.allocate(None).unwrap();
        }

        // A second bring-up must be refused.
        let info = boot_picture();
        assert!(matches!(
            PhysicalMemoryManager::init_stage_one(
                info.ram_regions(),
                info.reserved_regions(),
                info.module_regions(),
            ),
            Err(KernelError::AlreadyInitialized { .. })
        ));

        // Stage two is a contract only; handing it storage reports so.
        static mut STAGE_TWO: [u8; 64] = [0; 64];
        // SAFETY: single-threaded test, sole access to the buffer.
        let stage_two = unsafe { &mut *core::ptr::addr_of_mut!(STAGE_TWO) };
        assert!(matches!(
            pmm.init_stage_two(stage_two),
            Err(KernelError::InvalidArgument { .. })
        ));
    }

    #[test_case]
    fn test_stage_two_size_scales_with_frames() {
        // 128 MiB of RAM topping out at 0x07FF_FFFF.
        let frame_count = (0x07FF_FFFF >> PAGE_SHIFT) + 1;
        assert_eq!(
            stage_two_size_for(frame_count),
            frame_count * FRAME_DESCRIPTOR_BYTES
        );
    }

    #[test_case]
    fn test_phys_addr_helpers() {
        let addr = PhysAddr::new(0x3A7F);
        assert_eq!(addr.frame_number(), 3);
        assert!(!addr.is_page_aligned());
        assert!(PhysAddr::new(0x4000).is_page_aligned());
        assert_eq!(PhysAddr::MAX.saturating_add(5), PhysAddr::MAX);
    }
}
