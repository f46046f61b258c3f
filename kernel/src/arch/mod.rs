//! Architecture support layer.
//!
//! Everything the architecture-neutral core needs from the hardware flows
//! through this module: interrupt flag control, the per-CPU [`Processor`]
//! capability, halting and resetting the machine, and the boot-loader
//! information translator.
//!
//! On bare metal the x86_64 implementation is used. When the crate is
//! compiled for a hosted target (the unit-test build on the development
//! machine), the interrupt flag is simulated with a process-local atomic so
//! that lock and allocator tests can run without ring-0 privileges; the
//! bare-metal code paths are otherwise identical.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::x86_64::{
    busy_wait_one_second, disable_interrupts, enable_interrupts, halt,
    halt_all_other_processors, hard_reset, interrupts_enabled, wait_for_interrupt,
};

#[cfg(not(target_os = "none"))]
pub use self::hosted::{
    busy_wait_one_second, disable_interrupts, enable_interrupts, halt,
    halt_all_other_processors, hard_reset, interrupts_enabled, wait_for_interrupt,
};

/// Interrupt-flag and shutdown shims for hosted builds.
///
/// The simulated flag starts enabled, matching the state a kernel thread
/// would observe outside any critical section.
#[cfg(not(target_os = "none"))]
mod hosted {
    use core::sync::atomic::{AtomicBool, Ordering};

    static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(true);

    pub fn interrupts_enabled() -> bool {
        INTERRUPT_FLAG.load(Ordering::SeqCst)
    }

    pub fn enable_interrupts() {
        INTERRUPT_FLAG.store(true, Ordering::SeqCst);
    }

    pub fn disable_interrupts() {
        INTERRUPT_FLAG.store(false, Ordering::SeqCst);
    }

    pub fn wait_for_interrupt() {
        core::hint::spin_loop();
    }

    pub fn halt_all_other_processors() {}

    pub fn busy_wait_one_second() {}

    /// Never invoked by the unit suite; present so shutdown paths link.
    pub fn halt() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Never invoked by the unit suite; present so shutdown paths link.
    pub fn hard_reset() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}
