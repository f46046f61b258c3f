//! Error types for the ObsidianOS kernel core.
//!
//! Operational failures are reported through [`KernelResult`]; there is no
//! unwinding or out-of-band propagation in the kernel. Unrecoverable
//! conditions never surface here -- they go straight to the shutdown
//! coordinator.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Boot-loader hand-off errors
    BadBootMagic {
        found: u32,
    },
    BootInfoOutOfWindow {
        addr: usize,
        len: usize,
    },
    BootInfoStorageFull {
        needed: usize,
        capacity: usize,
    },
    MalformedBootInfo {
        reason: &'static str,
    },
    TooManyBootModules {
        count: usize,
        max: usize,
    },

    /// Memory-related errors
    OutOfMemory {
        requested: usize,
    },
    InvalidRegion {
        base: usize,
        length: usize,
    },

    /// Generic errors
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    AlreadyInitialized {
        subsystem: &'static str,
    },
    NotInitialized {
        subsystem: &'static str,
    },
    NotImplemented {
        feature: &'static str,
    },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBootMagic { found } => {
                write!(f, "Unrecognized boot loader magic value 0x{:x}", found)
            }
            Self::BootInfoOutOfWindow { addr, len } => {
                write!(
                    f,
                    "Boot information at 0x{:x} ({} bytes) lies outside the mapped boot window",
                    addr, len
                )
            }
            Self::BootInfoStorageFull { needed, capacity } => {
                write!(
                    f,
                    "Boot information needs {} bytes but only {} are reserved",
                    needed, capacity
                )
            }
            Self::MalformedBootInfo { reason } => {
                write!(f, "Malformed boot information: {}", reason)
            }
            Self::TooManyBootModules { count, max } => {
                write!(f, "Boot loader supplied {} modules, limit is {}", count, max)
            }
            Self::OutOfMemory { requested } => {
                write!(f, "Out of memory: requested {} bytes", requested)
            }
            Self::InvalidRegion { base, length } => {
                write!(
                    f,
                    "Invalid physical region: base 0x{:x}, length 0x{:x}",
                    base, length
                )
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "Invalid argument '{}': {}", name, value)
            }
            Self::AlreadyInitialized { subsystem } => {
                write!(f, "Subsystem already initialized: {}", subsystem)
            }
            Self::NotInitialized { subsystem } => {
                write!(f, "Subsystem not initialized: {}", subsystem)
            }
            Self::NotImplemented { feature } => {
                write!(f, "Feature not implemented: {}", feature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_error_display() {
        let err = KernelError::BadBootMagic { found: 0x1234 };
        let mut buf = [0u8; 64];
        let mut cursor = Cursor { buf: &mut buf, pos: 0 };
        use core::fmt::Write;
        write!(cursor, "{}", err).unwrap();
        let text = core::str::from_utf8(&cursor.buf[..cursor.pos]).unwrap();
        assert!(text.contains("0x1234"));
    }

    struct Cursor<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl fmt::Write for Cursor<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let bytes = s.as_bytes();
            if self.pos + bytes.len() > self.buf.len() {
                return Err(fmt::Error);
            }
            self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
            self.pos += bytes.len();
            Ok(())
        }
    }
}
