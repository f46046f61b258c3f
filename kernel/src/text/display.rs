//! The shared kernel display stream.
//!
//! [`DisplayTextStream`] buffers up to one screen of characters in front
//! of the real display and guards itself with an interrupt-disabling
//! lock. Once the shutdown coordinator reports shutdown mode the lock is
//! bypassed entirely: the failure path may re-enter the stream from a
//! fault inside a diagnostic, and blocking on our own lock would deadlock
//! the machine before any message appeared. The bypass is sound because
//! entering shutdown mode halts every other CPU first.

use core::cell::UnsafeCell;
use core::fmt;

use crate::shutdown;
use crate::sync::Lock;
use crate::text::{CharSink, Color};

/// Text cells per display row.
pub const DISPLAY_COLUMNS: usize = 80;

/// Display rows.
pub const DISPLAY_ROWS: usize = 25;

/// The stream buffers at most one full screen.
const BUFFER_CAPACITY: usize = DISPLAY_COLUMNS * DISPLAY_ROWS;

struct StreamInner<D> {
    sink: D,
    buffered: [u8; BUFFER_CAPACITY],
    len: usize,
}

impl<D: CharSink> StreamInner<D> {
    fn flush(&mut self) {
        for i in 0..self.len {
            self.sink.put(self.buffered[i]);
        }
        self.len = 0;
    }

    fn put(&mut self, byte: u8) {
        match byte {
            b'\t' => {
                self.flush();
                self.sink.tab();
            }
            b'\n' => {
                self.flush();
                self.sink.new_line();
            }
            0 => self.flush(),
            _ => {
                if self.len == BUFFER_CAPACITY {
                    self.flush();
                }
                self.buffered[self.len] = byte;
                self.len += 1;
            }
        }
    }
}

/// A buffered, lock-guarded character stream over a display.
pub struct DisplayTextStream<D> {
    lock: Lock,
    inner: UnsafeCell<StreamInner<D>>,
}

// SAFETY: `inner` is reached only through `with_inner`, which either
// holds the interrupt-disabling lock or runs in shutdown mode where
// exactly one CPU executes.
unsafe impl<D: Send> Sync for DisplayTextStream<D> {}

impl<D: CharSink> DisplayTextStream<D> {
    /// Wrap `sink` in an empty stream.
    pub const fn new(sink: D) -> Self {
        Self {
            lock: Lock::new(),
            inner: UnsafeCell::new(StreamInner {
                sink,
                buffered: [0; BUFFER_CAPACITY],
                len: 0,
            }),
        }
    }

    /// Run `f` on the stream state under the normal locking regime, or
    /// without the lock once the kernel is shutting down.
    fn with_inner<T>(&self, f: impl FnOnce(&mut StreamInner<D>) -> T) -> T {
        if shutdown::in_shutdown_mode() {
            // SAFETY: shutdown mode means all other CPUs are halted; this
            // CPU is the only possible accessor.
            f(unsafe { &mut *self.inner.get() })
        } else {
            let _guard = self.lock.acquire();
            // SAFETY: the lock is held.
            f(unsafe { &mut *self.inner.get() })
        }
    }

    /// Accept one byte. Tabs, newlines, and NUL flush the buffer; other
    /// bytes are buffered, flushing first if the buffer is full.
    pub fn put(&self, byte: u8) {
        self.with_inner(|inner| inner.put(byte));
    }

    /// Push everything buffered to the display.
    pub fn flush(&self) {
        self.with_inner(|inner| inner.flush());
    }

    /// Drop buffered output and blank the display.
    pub fn clear(&self) {
        self.with_inner(|inner| {
            inner.len = 0;
            inner.sink.clear();
        });
    }

    /// Drop buffered output and restore the display to its power-on
    /// state. The shutdown coordinator uses this to seize the screen.
    pub fn reset(&self) {
        self.with_inner(|inner| {
            inner.len = 0;
            inner.sink.reset();
        });
    }

    pub fn set_foreground(&self, color: Color) {
        self.with_inner(|inner| {
            inner.flush();
            inner.sink.set_foreground(color);
        });
    }

    pub fn set_background(&self, color: Color) {
        self.with_inner(|inner| {
            inner.flush();
            inner.sink.set_background(color);
        });
    }

    /// A [`CharSink`] view of this stream, for handing to a
    /// [`TextWriter`](crate::text::TextWriter).
    pub fn handle(&self) -> DisplayStreamHandle<'_, D> {
        DisplayStreamHandle { stream: self }
    }
}

/// Borrowed [`CharSink`] adapter over a shared [`DisplayTextStream`].
pub struct DisplayStreamHandle<'s, D> {
    stream: &'s DisplayTextStream<D>,
}

impl<D: CharSink> CharSink for DisplayStreamHandle<'_, D> {
    fn put(&mut self, byte: u8) {
        self.stream.put(byte);
    }

    fn tab(&mut self) {
        self.stream.put(b'\t');
    }

    fn new_line(&mut self) {
        self.stream.put(b'\n');
    }

    fn clear(&mut self) {
        self.stream.clear();
    }

    fn reset(&mut self) {
        self.stream.reset();
    }

    fn set_foreground(&mut self, color: Color) {
        self.stream.set_foreground(color);
    }

    fn set_background(&mut self, color: Color) {
        self.stream.set_background(color);
    }
}

impl<D: CharSink> fmt::Write for DisplayStreamHandle<'_, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.stream.put(byte);
        }
        Ok(())
    }
}

/// The kernel-wide display stream over the VGA text cells.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod global {
    use super::DisplayTextStream;
    use crate::arch::x86_64::vga::VgaDisplay;

    static DISPLAY: DisplayTextStream<VgaDisplay> = DisplayTextStream::new(VgaDisplay::new());

    /// The process-wide display stream singleton.
    pub fn display() -> &'static DisplayTextStream<VgaDisplay> {
        &DISPLAY
    }

    /// Bring the display to a known state. Called once, first thing at
    /// boot.
    pub fn init() {
        DISPLAY.reset();
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use global::{display, init};
