//! Kernel entry orchestration.
//!
//! [`run`] is the first Rust code executed after the assembly stub. The
//! order below is load-bearing: the display must exist before anything
//! can fail visibly, the shutdown coordinator before the dispatchers
//! that route into it, and both dispatchers before boot-information
//! translation can afford to trap.

use core::cell::UnsafeCell;

use spin::Once;

use crate::arch;
use crate::arch::x86_64::kernel_image_extents;
use crate::arch::x86_64::multiboot::{BootInfo, BootInfoStorage, MultibootTranslator};
use crate::mm::iter::RegionIterator;
use crate::mm::PhysicalMemoryManager;
use crate::shutdown::kshutdown;
use crate::text::format::FormatArg;
use crate::trap::exceptions::ExceptionDispatcher;
use crate::trap::interrupts::InterruptDispatcher;
use crate::{kprintln, logger};

const BOOT_FAILURE_FMT: &str = "SYSTEM FAILURE\n\
An unrecoverable error has occurred and the system must be shut down.\n\
We apologize for the inconvenience.\n\n\
Reason: %s\n";

struct StorageCell(UnsafeCell<BootInfoStorage>);

// SAFETY: the cell is written exactly once, on the boot CPU, before
// interrupts are enabled and before any other CPU runs kernel code.
unsafe impl Sync for StorageCell {}

static BOOT_INFO_STORAGE: StorageCell = StorageCell(UnsafeCell::new(BootInfoStorage::new()));

static BOOT_INFO: Once<BootInfo<'static>> = Once::new();

/// The translated boot information, once [`run`] has produced it.
pub fn boot_info() -> Option<&'static BootInfo<'static>> {
    BOOT_INFO.get()
}

/// Bring the kernel core up and idle.
///
/// `magic` and `boot_info_addr` arrive verbatim from the boot loader via
/// the entry stub.
pub fn run(magic: u32, boot_info_addr: usize) -> ! {
    crate::text::display::init();
    logger::init();
    log::info!("display and logging online");

    kshutdown().init();
    ExceptionDispatcher::init_for_current_processor();
    InterruptDispatcher::init_for_current_processor();
    log::info!("trap dispatch installed");

    if boot_info_addr == 0 {
        kshutdown().fail(
            BOOT_FAILURE_FMT,
            &[FormatArg::Str(
                "failed to read the boot loader information.",
            )],
        );
    }

    kprintln!("ObsidianOS {} (x86_64)", env!("CARGO_PKG_VERSION"));
    kprintln!();

    let translator = MultibootTranslator::for_boot();
    // SAFETY: single-threaded early boot; this is the only access to the
    // staging storage until BOOT_INFO is published.
    let storage = unsafe { &mut *BOOT_INFO_STORAGE.0.get() };
    let info = match translator.translate(storage, boot_info_addr, magic, kernel_image_extents()) {
        Ok(info) => BOOT_INFO.call_once(|| info),
        Err(err) => {
            log::error!("boot information translation failed: {}", err);
            kshutdown().fail(
                BOOT_FAILURE_FMT,
                &[FormatArg::Str(
                    "failed to read the boot loader information.",
                )],
            );
        }
    };

    print_boot_report(info);

    match PhysicalMemoryManager::init_stage_one(
        info.ram_regions(),
        info.reserved_regions(),
        info.module_regions(),
    ) {
        Ok(bytes) => {
            kprintln!();
            kprintln!("Physical memory manager: stage two needs {} bytes", bytes);
        }
        Err(err) => {
            log::error!("physical memory manager bring-up failed: {}", err);
            kshutdown().fail(
                BOOT_FAILURE_FMT,
                &[FormatArg::Str(
                    "failed to initialize the physical memory manager.",
                )],
            );
        }
    }

    arch::enable_interrupts();
    log::info!("kernel core is up; idling");

    loop {
        arch::wait_for_interrupt();
    }
}

/// Report what the boot loader handed us, one list at a time.
fn print_boot_report(info: &BootInfo<'_>) {
    kprintln!("Command line: {}", info.command_line());

    let count = info.module_count();
    kprintln!();
    kprintln!("{} module{}:", count, if count == 1 { "" } else { "s" });
    for index in 0..count {
        let module = info.module(index);
        kprintln!(
            "  {:#x} to {:#x}  {}",
            module.extents.base().as_usize(),
            module.extents.last().as_usize(),
            module.name
        );
    }

    kprintln!();
    kprintln!("RAM regions:");
    print_region_list(&mut info.ram_regions());

    kprintln!();
    kprintln!("Reserved physical address regions:");
    print_region_list(&mut info.reserved_regions());

    kprintln!();
    kprintln!("RAM already in use:");
    print_region_list(&mut info.module_regions());
}

fn print_region_list(list: &mut dyn RegionIterator) {
    list.reset();
    while list.move_next() {
        let region = list.current();
        kprintln!(
            "  {:#x} to {:#x}",
            region.base().as_usize(),
            region.last().as_usize()
        );
    }
}
