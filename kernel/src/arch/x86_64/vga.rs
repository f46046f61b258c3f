//! VGA text-mode display.
//!
//! Implements the [`CharSink`] capability over the 80x25 text cells at
//! physical `0xB8000`, identity-mapped in kernel space. All cell access
//! is volatile; the buffer is memory-mapped hardware.

use core::ptr::{read_volatile, write_volatile};

use crate::text::{CharSink, Color};

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;
const TAB_STOP: usize = 8;

const VGA_BUFFER: *mut ScreenChar = 0xB8000 as *mut ScreenChar;

const DEFAULT_FOREGROUND: Color = Color::LightGrey;
const DEFAULT_BACKGROUND: Color = Color::Black;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode(((background as u8) << 4) | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

/// Cursor and color state for the VGA text cells.
pub struct VgaDisplay {
    row: usize,
    column: usize,
    foreground: Color,
    background: Color,
}

impl VgaDisplay {
    pub const fn new() -> Self {
        Self {
            row: 0,
            column: 0,
            foreground: DEFAULT_FOREGROUND,
            background: DEFAULT_BACKGROUND,
        }
    }

    fn color_code(&self) -> ColorCode {
        ColorCode::new(self.foreground, self.background)
    }

    fn write_cell(&self, row: usize, column: usize, cell: ScreenChar) {
        // SAFETY: row and column are bounded by the callers; the VGA
        // buffer is memory-mapped I/O, so the write must be volatile.
        unsafe {
            write_volatile(VGA_BUFFER.add(row * BUFFER_WIDTH + column), cell);
        }
    }

    fn blank(&self) -> ScreenChar {
        ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code(),
        }
    }

    fn scroll_up(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for column in 0..BUFFER_WIDTH {
                // SAFETY: indices are bounded by the loop ranges; volatile
                // because the cells are hardware-backed.
                let cell =
                    unsafe { read_volatile(VGA_BUFFER.add(row * BUFFER_WIDTH + column)) };
                self.write_cell(row - 1, column, cell);
            }
        }
        for column in 0..BUFFER_WIDTH {
            self.write_cell(BUFFER_HEIGHT - 1, column, self.blank());
        }
    }

    fn advance_line(&mut self) {
        self.column = 0;
        if self.row + 1 == BUFFER_HEIGHT {
            self.scroll_up();
        } else {
            self.row += 1;
        }
    }
}

impl CharSink for VgaDisplay {
    fn put(&mut self, byte: u8) {
        if self.column == BUFFER_WIDTH {
            self.advance_line();
        }
        let shown = match byte {
            0x20..=0x7E => byte,
            _ => 0xFE,
        };
        let cell = ScreenChar {
            ascii_character: shown,
            color_code: self.color_code(),
        };
        self.write_cell(self.row, self.column, cell);
        self.column += 1;
    }

    fn tab(&mut self) {
        let next_stop = ((self.column / TAB_STOP) + 1) * TAB_STOP;
        let stop = next_stop.min(BUFFER_WIDTH);
        while self.column < stop {
            self.put(b' ');
        }
    }

    fn new_line(&mut self) {
        self.advance_line();
    }

    fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            for column in 0..BUFFER_WIDTH {
                self.write_cell(row, column, self.blank());
            }
        }
        self.row = 0;
        self.column = 0;
    }

    fn reset(&mut self) {
        self.foreground = DEFAULT_FOREGROUND;
        self.background = DEFAULT_BACKGROUND;
        self.clear();
    }

    fn set_foreground(&mut self, color: Color) {
        self.foreground = color;
    }

    fn set_background(&mut self, color: Color) {
        self.background = color;
    }
}
