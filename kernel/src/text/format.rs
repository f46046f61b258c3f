//! Formatted printing.
//!
//! Drives a [`TextWriter`] from a format string with the grammar
//! `%[-][*][b|h|l]{c,d,i,u,x,s,p,O}` plus `%%`. Arguments arrive as a
//! typed slice instead of C-style varargs; a specifier whose argument has
//! the wrong type fails the same way a malformed specifier does.
//!
//! A malformed format string aborts the whole operation: the bytes
//! already rendered stay emitted, the remainder of the string is dropped,
//! and the function returns `false`. Success and failure both finish by
//! writing a NUL to the sink, which buffering sinks treat as a flush.

use crate::text::writer::TextWriter;
use crate::text::TextWritable;

/// One argument for [`format`].
pub enum FormatArg<'a> {
    /// Matches `%c`.
    Char(u8),
    /// Matches `%d`/`%i` at any size modifier, and supplies `*` widths.
    Int(i64),
    /// Matches `%u`/`%x` at any size modifier, and supplies `*` widths.
    Uint(u64),
    /// Matches `%s`.
    Str(&'a str),
    /// Matches `%p`.
    Ptr(usize),
    /// Matches `%O`.
    Writable(&'a dyn TextWritable),
}

/// Operand size selected by the `b`/`h`/`l` modifiers; pointer-sized when
/// absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Size {
    Byte,
    Half,
    Long,
    Pointer,
}

/// Parser states. The machine is closed: every (state, class) pair either
/// appears below or aborts the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Copying literal bytes.
    Literal,
    /// Consumed `%`.
    Percent,
    /// Consumed the `-` flag.
    Flagged,
    /// Consumed the `*` width.
    Starred,
    /// Consumed a size modifier.
    Sized,
}

/// Character classes the parser distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Percent,
    Minus,
    Star,
    Modifier,
    Conversion,
    Nul,
    Other,
}

fn classify(byte: u8) -> CharClass {
    match byte {
        b'%' => CharClass::Percent,
        b'-' => CharClass::Minus,
        b'*' => CharClass::Star,
        b'b' | b'h' | b'l' => CharClass::Modifier,
        b'c' | b'd' | b'i' | b'u' | b'x' | b's' | b'p' | b'O' => CharClass::Conversion,
        0 => CharClass::Nul,
        _ => CharClass::Other,
    }
}

/// Accumulated description of the specifier being parsed.
struct Specifier {
    left_align: bool,
    width: Option<usize>,
    size: Size,
}

impl Specifier {
    fn new() -> Self {
        Self {
            left_align: false,
            width: None,
            size: Size::Pointer,
        }
    }
}

/// Render `fmt` with `args` substituted into `out`.
///
/// Returns `false` if the format string is malformed or an argument is
/// missing or of the wrong type. The writer's width, alignment, and hex
/// mode are restored to their entry values after every specifier.
pub fn format(out: &mut TextWriter<'_>, fmt: &str, args: &[FormatArg<'_>]) -> bool {
    let entry_width = out.width();
    let entry_align = out.is_left_aligned();
    let entry_hex = out.hex_mode();

    let mut args = args.iter();
    let mut state = State::Literal;
    let mut spec = Specifier::new();
    let mut ok = true;

    for &byte in fmt.as_bytes() {
        let class = classify(byte);
        state = match (state, class) {
            (State::Literal, CharClass::Percent) => {
                spec = Specifier::new();
                State::Percent
            }
            (State::Literal, _) => {
                out.put_raw(byte);
                State::Literal
            }

            // `%%` emits a literal percent sign.
            (State::Percent, CharClass::Percent) => {
                out.put_raw(b'%');
                State::Literal
            }
            (State::Percent, CharClass::Minus) => {
                spec.left_align = true;
                State::Flagged
            }
            (State::Percent, CharClass::Star) | (State::Flagged, CharClass::Star) => {
                match take_width(&mut args) {
                    Some(width) => {
                        spec.width = Some(width);
                        State::Starred
                    }
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            (State::Percent, CharClass::Modifier)
            | (State::Flagged, CharClass::Modifier)
            | (State::Starred, CharClass::Modifier) => {
                spec.size = match byte {
                    b'b' => Size::Byte,
                    b'h' => Size::Half,
                    _ => Size::Long,
                };
                State::Sized
            }
            (
                State::Percent | State::Flagged | State::Starred | State::Sized,
                CharClass::Conversion,
            ) => {
                if !apply_specifier(out, &spec, byte, &mut args) {
                    ok = false;
                    break;
                }
                out.set_width(entry_width);
                out.set_left_aligned(entry_align);
                out.set_hex_mode(entry_hex);
                State::Literal
            }

            // Everything else is an illegal transition.
            _ => {
                ok = false;
                break;
            }
        };
    }

    // A specifier cut off by the end of the string is malformed too.
    if state != State::Literal {
        ok = false;
    }

    out.set_width(entry_width);
    out.set_left_aligned(entry_align);
    out.set_hex_mode(entry_hex);

    // The trailing NUL asks buffering sinks to flush what we emitted,
    // successful or not.
    out.put_raw(0);
    ok
}

/// Pull the `*` width from the argument list.
fn take_width<'a, 'f>(args: &mut core::slice::Iter<'f, FormatArg<'a>>) -> Option<usize> {
    match args.next()? {
        FormatArg::Uint(v) => Some(*v as usize),
        FormatArg::Int(v) if *v >= 0 => Some(*v as usize),
        _ => None,
    }
}

/// Configure the writer for one specifier and emit its argument.
fn apply_specifier<'a, 'f>(
    out: &mut TextWriter<'_>,
    spec: &Specifier,
    conversion: u8,
    args: &mut core::slice::Iter<'f, FormatArg<'a>>,
) -> bool {
    out.set_left_aligned(spec.left_align);
    if let Some(width) = spec.width {
        out.set_width(width);
    }

    match conversion {
        b'c' => match args.next() {
            Some(FormatArg::Char(c)) => {
                out.write_char(*c);
                true
            }
            _ => false,
        },
        b'd' | b'i' => match args.next() {
            Some(FormatArg::Int(v)) => {
                out.set_hex_mode(false);
                match spec.size {
                    Size::Byte => out.write_i8(*v as i8),
                    Size::Half => out.write_i16(*v as i16),
                    Size::Long => out.write_i32(*v as i32),
                    Size::Pointer => out.write_isize(*v as isize),
                }
                true
            }
            _ => false,
        },
        b'u' => match args.next() {
            Some(FormatArg::Uint(v)) => {
                out.set_hex_mode(false);
                match spec.size {
                    Size::Byte => out.write_u8(*v as u8),
                    Size::Half => out.write_u16(*v as u16),
                    Size::Long => out.write_u32(*v as u32),
                    Size::Pointer => out.write_usize(*v as usize),
                }
                true
            }
            _ => false,
        },
        b'x' => match args.next() {
            Some(FormatArg::Uint(v)) => {
                out.set_hex_mode(true);
                match spec.size {
                    Size::Byte => out.write_u8(*v as u8),
                    Size::Half => out.write_u16(*v as u16),
                    Size::Long => out.write_u32(*v as u32),
                    Size::Pointer => out.write_usize(*v as usize),
                }
                true
            }
            _ => false,
        },
        b's' => match args.next() {
            Some(FormatArg::Str(s)) => {
                out.write_str(s);
                true
            }
            _ => false,
        },
        b'p' => match args.next() {
            Some(FormatArg::Ptr(p)) => {
                out.write_pointer(*p);
                true
            }
            _ => false,
        },
        b'O' => match args.next() {
            Some(FormatArg::Writable(w)) => {
                out.write_object(*w);
                true
            }
            _ => false,
        },
        _ => false,
    }
}
