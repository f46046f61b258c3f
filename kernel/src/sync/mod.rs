//! Synchronization primitives for the kernel core.
//!
//! Two building blocks live here: a pointer-wide atomic cell with
//! full-barrier semantics, and the interrupt-disabling scoped [`Lock`]
//! every mutable shared structure in the core is guarded by.

pub mod atomic;
pub mod lock;

pub use atomic::AtomicWord;
pub use lock::{Lock, LockGuard};
