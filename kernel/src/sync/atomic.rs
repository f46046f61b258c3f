//! Pointer-wide atomic cell.
//!
//! Wraps a single aligned machine word and exposes the four operations the
//! rest of the kernel builds on: load, store, compare-and-swap, and swap.
//! Every operation is a full memory barrier (`SeqCst`); callers never need
//! to reason about weaker orderings.

use core::sync::atomic::{AtomicUsize, Ordering};

/// A machine-word-sized cell supporting atomic access with sequentially
/// consistent ordering.
///
/// Alignment is guaranteed by construction; the cell is exactly one
/// `usize` wide.
#[repr(transparent)]
#[derive(Debug)]
pub struct AtomicWord(AtomicUsize);

impl AtomicWord {
    /// Create a new cell holding `value`.
    pub const fn new(value: usize) -> Self {
        Self(AtomicUsize::new(value))
    }

    /// Atomically read the cell.
    #[inline]
    pub fn load(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Atomically overwrite the cell.
    #[inline]
    pub fn store(&self, value: usize) {
        self.0.store(value, Ordering::SeqCst)
    }

    /// Atomically replace the cell's value with `update` if it currently
    /// holds `expected`. Returns `true` on success.
    #[inline]
    pub fn compare_and_swap(&self, expected: usize, update: usize) -> bool {
        self.0
            .compare_exchange(expected, update, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Atomically replace the cell's value with `update`, returning the
    /// previous value.
    #[inline]
    pub fn swap(&self, update: usize) -> usize {
        self.0.swap(update, Ordering::SeqCst)
    }
}

impl Default for AtomicWord {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_compare_and_swap() {
        let target = AtomicWord::new(777);

        assert!(target.compare_and_swap(777, 555));
        assert_eq!(target.load(), 555);

        // A stale comparand must leave the cell untouched.
        assert!(!target.compare_and_swap(777, 444));
        assert_eq!(target.load(), 555);
    }

    #[test_case]
    fn test_swap_returns_previous() {
        let cell = AtomicWord::new(555);

        let old = cell.swap(555);
        assert_eq!(old, 555);
        assert_eq!(cell.load(), 555);

        let old = cell.swap(444);
        assert_eq!(old, 555);
        assert_eq!(cell.load(), 444);
    }

    #[test_case]
    fn test_store_load() {
        let cell = AtomicWord::new(0);
        cell.store(usize::MAX);
        assert_eq!(cell.load(), usize::MAX);
    }
}
