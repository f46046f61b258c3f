//! x86_64 architecture support.
//!
//! Provides the per-CPU [`Processor`] capability, interrupt flag control,
//! halt and hard-reset, the 8259A interrupt controller, VGA text output,
//! and the Multiboot boot-information translator. The assembly entry stub
//! and the descriptor tables it loads live outside this crate; the
//! contract between them and the kernel is the `kernel_main` entry point
//! and the `trap_dispatch` function in [`crate::trap`].

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::kassert;
use crate::trap::{InterruptHandler, SystemResetHandler};

pub mod multiboot;
pub mod pic;
pub mod trap_frame;
pub mod vectors;
pub mod vga;

const DEFAULT_HANDLER: &'static dyn InterruptHandler = &SystemResetHandler;

/// Per-CPU state.
///
/// Exactly one instance exists on uniprocessor targets. The dispatch
/// table maps every trap vector to its handler; unregistered vectors keep
/// the system-reset handler so a stray trap fails loudly instead of
/// hanging silently.
pub struct Processor {
    id: usize,
    /// Top of the stack the CPU switches to on a user-to-kernel trap.
    ring0_stack_top: AtomicUsize,
    handlers: UnsafeCell<[&'static dyn InterruptHandler; vectors::VECTOR_COUNT]>,
}

// SAFETY: the dispatch table is written only through `register_handler`,
// which requires interrupts disabled on the owning CPU, and read only
// from that CPU's trap path. There is no cross-CPU access to a
// Processor's table.
unsafe impl Sync for Processor {}

static BOOT_PROCESSOR: Processor = Processor::new(0);

impl Processor {
    const fn new(id: usize) -> Self {
        Self {
            id,
            ring0_stack_top: AtomicUsize::new(0),
            handlers: UnsafeCell::new([DEFAULT_HANDLER; vectors::VECTOR_COUNT]),
        }
    }

    /// The processor executing the caller.
    pub fn current() -> &'static Processor {
        &BOOT_PROCESSOR
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Install `handler` for `vector` on this CPU.
    ///
    /// Interrupts must be disabled on the current CPU while the table is
    /// written.
    pub fn register_handler(&self, vector: usize, handler: &'static dyn InterruptHandler) {
        kassert!(
            !crate::arch::interrupts_enabled(),
            "handler registration requires interrupts disabled"
        );
        kassert!(vector < vectors::VECTOR_COUNT, "trap vector out of range");
        // SAFETY: interrupts are disabled on this CPU, so the trap path
        // cannot observe the table mid-update, and no other CPU reads it.
        unsafe {
            (*self.handlers.get())[vector] = handler;
        }
    }

    /// The handler registered for `vector`.
    pub fn handler(&self, vector: usize) -> &'static dyn InterruptHandler {
        kassert!(vector < vectors::VECTOR_COUNT, "trap vector out of range");
        // SAFETY: reads race only with `register_handler` on the same
        // CPU, which runs with interrupts disabled; a whole-word pointer
        // pair read here always observes a fully written entry.
        unsafe { (*self.handlers.get())[vector] }
    }

    /// Publish the kernel stack pointer to load on the next
    /// user-to-kernel transition. The descriptor-table layer mirrors
    /// this value into the hardware task state.
    pub fn set_ring0_stack_top(&self, top: usize) {
        self.ring0_stack_top.store(top, Ordering::SeqCst);
    }

    pub fn ring0_stack_top(&self) -> usize {
        self.ring0_stack_top.load(Ordering::SeqCst)
    }
}

/// Extent of the loaded kernel image, from the linker-provided symbols.
#[cfg(target_os = "none")]
pub fn kernel_image_extents() -> crate::mm::region::PmmRegion {
    extern "C" {
        static __kernel_start: u8;
        static __kernel_end: u8;
    }
    // SAFETY: the linker script defines both symbols at the image
    // boundaries; only their addresses are taken, never their values.
    let (start, end) = unsafe {
        (
            &__kernel_start as *const u8 as usize,
            &__kernel_end as *const u8 as usize,
        )
    };
    match crate::mm::region::PmmRegion::from_extents(
        crate::mm::PhysAddr::new(start),
        crate::mm::PhysAddr::new(end.saturating_sub(1)),
    ) {
        Ok(region) => region,
        // A kernel image with inverted bounds cannot have been loaded.
        Err(_) => unreachable!(),
    }
}

#[cfg(target_os = "none")]
pub fn interrupts_enabled() -> bool {
    x86_64::instructions::interrupts::are_enabled()
}

#[cfg(target_os = "none")]
pub fn enable_interrupts() {
    x86_64::instructions::interrupts::enable();
}

#[cfg(target_os = "none")]
pub fn disable_interrupts() {
    x86_64::instructions::interrupts::disable();
}

/// Sleep until the next interrupt is delivered.
#[cfg(target_os = "none")]
pub fn wait_for_interrupt() {
    x86_64::instructions::hlt();
}

/// Stop this CPU for good.
#[cfg(target_os = "none")]
pub fn halt() -> ! {
    disable_interrupts();
    loop {
        x86_64::instructions::hlt();
    }
}

/// On uniprocessor targets there is nobody else to stop.
#[cfg(target_os = "none")]
pub fn halt_all_other_processors() {}

/// Reset the machine through the keyboard controller's reset line.
///
/// Falls through to a halt loop on hardware that ignores the pulse.
#[cfg(target_os = "none")]
pub fn hard_reset() -> ! {
    use x86_64::instructions::port::Port;

    disable_interrupts();
    // SAFETY: writing 0xFE to the keyboard controller command port
    // pulses the CPU reset line; the machine restarts before any further
    // side effect matters.
    unsafe {
        Port::<u8>::new(0x64).write(0xFE);
    }
    loop {
        x86_64::instructions::hlt();
    }
}

/// Iterations of a pause loop that take roughly one second.
///
/// Calibrated for the QEMU targets the kernel is developed on; the
/// shutdown path only needs "about a second", never an exact one.
#[cfg(target_os = "none")]
const SPINS_PER_SECOND: usize = 500_000_000;

/// Busy-wait for approximately one second.
#[cfg(target_os = "none")]
pub fn busy_wait_one_second() {
    for _ in 0..SPINS_PER_SECOND {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap::TrapFrame;
    use core::ptr::NonNull;

    struct CountingHandler(AtomicUsize);

    impl InterruptHandler for CountingHandler {
        fn on_trap(&self, _frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    static COUNTER: CountingHandler = CountingHandler(AtomicUsize::new(0));

    #[test_case]
    fn test_register_and_look_up_handler() {
        crate::arch::disable_interrupts();
        let processor = Processor::current();
        processor.register_handler(0xF0, &COUNTER);

        let mut frame = TrapFrame::sample(0xF0, true);
        let outcome = processor.handler(0xF0).on_trap(&mut frame);
        assert!(outcome.is_none());
        assert_eq!(COUNTER.0.load(Ordering::SeqCst), 1);
        crate::arch::enable_interrupts();
    }

    #[test_case]
    fn test_ring0_stack_top_round_trip() {
        let processor = Processor::current();
        processor.set_ring0_stack_top(0xDEAD_0000);
        assert_eq!(processor.ring0_stack_top(), 0xDEAD_0000);
    }
}
