//! Kernel text output.
//!
//! The display hardware is reached through the [`CharSink`] capability;
//! [`TextWriter`](writer::TextWriter) renders values into a sink, the
//! [`format`](format::format) machine drives a writer from a format
//! string, and [`DisplayTextStream`](display::DisplayTextStream) is the
//! buffered, lock-guarded sink the whole kernel shares.

pub mod display;
pub mod format;
pub mod writer;

pub use display::DisplayTextStream;
pub use writer::TextWriter;

/// The 16 colors a text cell can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    DarkBlue = 1,
    DarkGreen = 2,
    DarkCyan = 3,
    DarkRed = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

/// A character-cell output device.
///
/// Implemented by the VGA display on bare metal and by capture sinks in
/// the unit suite. [`DisplayTextStream`] implements it too, so a stream
/// can stand wherever a raw display is expected.
pub trait CharSink {
    /// Emit one byte. Control bytes (tab, newline, NUL) may receive
    /// special treatment from buffering sinks.
    fn put(&mut self, byte: u8);

    /// Advance to the next tab stop.
    fn tab(&mut self);

    /// Move to the start of the next line.
    fn new_line(&mut self);

    /// Blank the display.
    fn clear(&mut self);

    /// Restore default colors and blank the display.
    fn reset(&mut self);

    fn set_foreground(&mut self, color: Color);

    fn set_background(&mut self, color: Color);
}

/// Objects that can render themselves through a [`TextWriter`].
///
/// The formatted printer dispatches `%O` specifiers here.
pub trait TextWritable {
    fn write_to(&self, out: &mut TextWriter<'_>);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{CharSink, Color};

    /// Sink that records everything it is handed.
    pub struct CaptureSink {
        pub bytes: [u8; 8192],
        pub len: usize,
        pub nul_count: usize,
        pub tabs: usize,
        pub new_lines: usize,
        pub clears: usize,
        pub resets: usize,
        pub foreground: Option<Color>,
        pub background: Option<Color>,
    }

    impl CaptureSink {
        pub fn new() -> Self {
            Self {
                bytes: [0; 8192],
                len: 0,
                nul_count: 0,
                tabs: 0,
                new_lines: 0,
                clears: 0,
                resets: 0,
                foreground: None,
                background: None,
            }
        }

        /// Everything received so far, as text.
        pub fn text(&self) -> &str {
            core::str::from_utf8(&self.bytes[..self.len]).unwrap()
        }
    }

    impl CharSink for CaptureSink {
        fn put(&mut self, byte: u8) {
            if byte == 0 {
                self.nul_count += 1;
                return;
            }
            self.bytes[self.len] = byte;
            self.len += 1;
        }

        fn tab(&mut self) {
            self.tabs += 1;
            self.bytes[self.len] = b'\t';
            self.len += 1;
        }

        fn new_line(&mut self) {
            self.new_lines += 1;
            self.bytes[self.len] = b'\n';
            self.len += 1;
        }

        fn clear(&mut self) {
            self.clears += 1;
            self.len = 0;
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.len = 0;
        }

        fn set_foreground(&mut self, color: Color) {
            self.foreground = Some(color);
        }

        fn set_background(&mut self, color: Color) {
            self.background = Some(color);
        }
    }
}
