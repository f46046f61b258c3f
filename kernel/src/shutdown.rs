//! Orderly kernel termination.
//!
//! [`KShutdown`] owns the one-way transition into shutdown mode. Several
//! CPUs may fault at once; a compare-and-swap on the initiator field
//! elects exactly one of them to run the diagnostic path while the rest
//! halt. The elected CPU silences its peers *before* touching the
//! display, which is what makes the display stream's shutdown-mode lock
//! bypass sound.

use crate::sync::AtomicWord;
use crate::text::format::FormatArg;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use crate::text::TextWriter;

use crate::arch;

/// Milliseconds to wait before a reboot, unless reconfigured.
pub const DEFAULT_REBOOT_DELAY_MS: usize = 10_000;

/// Initiator-field sentinel: no CPU has begun shutdown.
const NO_INITIATOR: usize = usize::MAX;

/// Message printed by [`KShutdown::halt`].
const HALT_MESSAGE: &str = "\nSystem halted. It is now safe to turn off the machine.\n";

/// Message printed by [`KShutdown::reboot`].
const REBOOT_MESSAGE: &str = "\nRebooting...\n";

/// How a CPU's attempt to enter shutdown mode resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEntry {
    /// This CPU won the election and runs the diagnostic path.
    Initiator,
    /// This CPU is already the initiator: the diagnostic path itself
    /// faulted.
    ReEntry,
    /// Another CPU is the initiator; this one must park.
    Bystander,
}

/// The shutdown coordinator.
///
/// All three fields are pointer-wide atomics. The initiator field is
/// written once, by compare-and-swap; the configuration fields are racy
/// by contract (no ordering between mutator and observer is promised).
pub struct KShutdown {
    initiator: AtomicWord,
    reboot_on_fail: AtomicWord,
    reboot_delay_ms: AtomicWord,
}

static KSHUTDOWN: KShutdown = KShutdown::new();

/// The process-wide shutdown coordinator.
pub fn kshutdown() -> &'static KShutdown {
    &KSHUTDOWN
}

/// Has any CPU begun shutting the system down?
pub fn in_shutdown_mode() -> bool {
    KSHUTDOWN.is_in_shutdown_mode()
}

impl KShutdown {
    const fn new() -> Self {
        Self {
            initiator: AtomicWord::new(NO_INITIATOR),
            reboot_on_fail: AtomicWord::new(1),
            reboot_delay_ms: AtomicWord::new(DEFAULT_REBOOT_DELAY_MS),
        }
    }

    /// Restore the boot-time defaults. Called once during kernel entry.
    pub fn init(&self) {
        self.reboot_on_fail.store(1);
        self.reboot_delay_ms.store(DEFAULT_REBOOT_DELAY_MS);
    }

    /// Once true, forever true.
    pub fn is_in_shutdown_mode(&self) -> bool {
        self.initiator.load() != NO_INITIATOR
    }

    /// Should a failure reboot the machine instead of halting it?
    pub fn reboot_on_fail(&self) -> bool {
        self.reboot_on_fail.load() != 0
    }

    pub fn set_reboot_on_fail(&self, enabled: bool) {
        self.reboot_on_fail.store(enabled as usize);
    }

    pub fn reboot_delay_ms(&self) -> usize {
        self.reboot_delay_ms.load()
    }

    pub fn set_reboot_delay_ms(&self, delay: usize) {
        self.reboot_delay_ms.store(delay);
    }

    /// Attempt the shutdown election on behalf of `cpu`.
    fn try_enter(&self, cpu: usize) -> ShutdownEntry {
        if self.initiator.compare_and_swap(NO_INITIATOR, cpu) {
            return ShutdownEntry::Initiator;
        }
        // The field is monotonic, so this read is stable.
        if self.initiator.load() == cpu {
            ShutdownEntry::ReEntry
        } else {
            ShutdownEntry::Bystander
        }
    }

    /// Enter shutdown mode; returns only on the initiating CPU.
    ///
    /// The initiator halts every other CPU and then seizes the display,
    /// discarding whatever output was in flight. A re-entering initiator
    /// means the diagnostic path itself faulted: the only safe move left
    /// is a hard reset. Losers of the election wait for the halt they
    /// have been sent.
    fn enter_shutdown_mode(&self) {
        match self.try_enter(arch::x86_64::Processor::current().id()) {
            ShutdownEntry::Initiator => {
                arch::halt_all_other_processors();
                #[cfg(all(target_arch = "x86_64", target_os = "none"))]
                crate::text::display::display().reset();
            }
            ShutdownEntry::ReEntry => arch::hard_reset(),
            ShutdownEntry::Bystander => loop {
                arch::wait_for_interrupt();
            },
        }
    }

    /// Terminate the system with a diagnostic.
    ///
    /// Formats `fmt` with `args` onto the seized display, then reboots or
    /// halts according to the reboot-on-fail flag.
    pub fn fail(&self, fmt: &str, args: &[FormatArg<'_>]) -> ! {
        self.enter_shutdown_mode();
        self.print(fmt, args);
        if self.reboot_on_fail() {
            self.finish_reboot()
        } else {
            self.finish_halt()
        }
    }

    /// Enter shutdown mode and halt every CPU.
    pub fn halt(&self) -> ! {
        self.enter_shutdown_mode();
        self.print(HALT_MESSAGE, &[]);
        self.finish_halt()
    }

    /// Enter shutdown mode, wait the configured delay, and reboot.
    pub fn reboot(&self) -> ! {
        self.enter_shutdown_mode();
        self.print(REBOOT_MESSAGE, &[]);
        self.finish_reboot()
    }

    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    fn print(&self, fmt: &str, args: &[FormatArg<'_>]) {
        let display = crate::text::display::display();
        let mut handle = display.handle();
        let mut writer = TextWriter::new(&mut handle);
        // A malformed diagnostic must not mask the shutdown itself; the
        // partial output is the best we can do.
        let _ = crate::text::format::format(&mut writer, fmt, args);
    }

    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    fn print(&self, fmt: &str, args: &[FormatArg<'_>]) {
        let _ = (fmt, args);
    }

    fn finish_halt(&self) -> ! {
        arch::halt()
    }

    fn finish_reboot(&self) -> ! {
        let seconds = self.reboot_delay_ms().div_ceil(1000);
        for _ in 0..seconds {
            arch::busy_wait_one_second();
        }
        arch::hard_reset()
    }
}
