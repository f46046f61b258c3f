//! Interrupt-disabling scoped lock.
//!
//! Acquiring a [`Lock`] records whether interrupts were enabled on the
//! current CPU and disables them; dropping the returned guard restores
//! exactly the recorded state. On multiprocessor builds (`smp` feature) an
//! atomic test-and-set on a shared word is layered underneath the masking.
//!
//! The lock is **not** reentrant. Acquiring a lock already held by the
//! current CPU hangs the machine (interrupts stay off forever on a
//! uniprocessor, and the test-and-set spins forever with `smp`). Holding
//! several distinct locks at once is fine.

use crate::arch;

#[cfg(feature = "smp")]
use core::sync::atomic::{AtomicBool, Ordering};

/// Mutual exclusion by interrupt masking.
#[derive(Debug, Default)]
pub struct Lock {
    #[cfg(feature = "smp")]
    taken: AtomicBool,
}

impl Lock {
    /// Create an unlocked lock.
    pub const fn new() -> Self {
        Self {
            #[cfg(feature = "smp")]
            taken: AtomicBool::new(false),
        }
    }

    /// Disable interrupts on the current CPU and take the lock.
    ///
    /// The returned guard restores the previous interrupt state when it is
    /// dropped.
    pub fn acquire(&self) -> LockGuard<'_> {
        let was_enabled = arch::interrupts_enabled();
        arch::disable_interrupts();

        #[cfg(feature = "smp")]
        while self
            .taken
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        LockGuard {
            lock: self,
            was_enabled,
        }
    }
}

/// Guard returned by [`Lock::acquire`]; releases on drop.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    was_enabled: bool,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        #[cfg(feature = "smp")]
        self.lock.taken.store(false, Ordering::Release);

        #[cfg(not(feature = "smp"))]
        let _ = &self.lock;

        if self.was_enabled {
            arch::enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_acquire_disables_interrupts() {
        let lock = Lock::new();
        arch::enable_interrupts();

        {
            let _guard = lock.acquire();
            assert!(!arch::interrupts_enabled());
        }

        assert!(arch::interrupts_enabled());
    }

    #[test_case]
    fn test_release_restores_disabled_state() {
        let lock = Lock::new();
        arch::disable_interrupts();

        {
            let _guard = lock.acquire();
            assert!(!arch::interrupts_enabled());
        }

        // Interrupts were off before acquire; release must leave them off.
        assert!(!arch::interrupts_enabled());
        arch::enable_interrupts();
    }

    #[test_case]
    fn test_distinct_locks_nest() {
        let outer = Lock::new();
        let inner = Lock::new();
        arch::enable_interrupts();

        {
            let _a = outer.acquire();
            {
                let _b = inner.acquire();
                assert!(!arch::interrupts_enabled());
            }
            // The inner release restores "disabled", the state it saw.
            assert!(!arch::interrupts_enabled());
        }

        assert!(arch::interrupts_enabled());
    }
}
