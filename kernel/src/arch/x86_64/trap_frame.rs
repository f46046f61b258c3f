//! The CPU state captured on kernel entry.
//!
//! The entry stub pushes the general registers on top of what the
//! hardware delivered, producing this layout on the interrupted kernel
//! stack. The layout is shared with the stub and with the diagnostic
//! formatter below; everything else in the kernel treats the frame as
//! opaque and uses only [`vector`](TrapFrame::vector),
//! [`error_code`](TrapFrame::error_code), and
//! [`is_kernel_interrupted`](TrapFrame::is_kernel_interrupted).

use bitflags::bitflags;

use crate::arch::x86_64::vectors;
use crate::kassert;
use crate::text::{TextWritable, TextWriter};

/// Registers as the entry stub saved them, lowest address first.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct TrapFrame {
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    r11: u64,
    r10: u64,
    r9: u64,
    r8: u64,
    rbp: u64,
    rdi: u64,
    rsi: u64,
    rdx: u64,
    rcx: u64,
    rbx: u64,
    rax: u64,
    /// Stored by the per-vector stub before the common path.
    vector: u64,
    /// Hardware error code, or zero for vectors that push none.
    error_code: u64,
    // Pushed by the CPU on delivery.
    rip: u64,
    cs: u64,
    rflags: u64,
    rsp: u64,
    ss: u64,
}

impl TrapFrame {
    /// The vector this trap arrived on.
    #[inline]
    pub fn vector(&self) -> usize {
        self.vector as usize
    }

    /// The hardware error code (zero when the vector pushes none).
    #[inline]
    pub fn error_code(&self) -> u64 {
        self.error_code
    }

    /// Was the CPU in kernel mode when the trap hit?
    #[inline]
    pub fn is_kernel_interrupted(&self) -> bool {
        self.cs & 0x3 == 0
    }

    /// The interrupted user stack pointer.
    ///
    /// Only meaningful for traps out of user mode.
    pub fn user_stack_pointer(&self) -> u64 {
        kassert!(
            !self.is_kernel_interrupted(),
            "user stack pointer read from a kernel-mode frame"
        );
        self.rsp
    }

    /// The interrupted user stack segment.
    ///
    /// Only meaningful for traps out of user mode.
    pub fn user_stack_segment(&self) -> u64 {
        kassert!(
            !self.is_kernel_interrupted(),
            "user stack segment read from a kernel-mode frame"
        );
        self.ss
    }

    /// The address just past this frame. A dispatcher switching to a
    /// user-mode frame publishes this as the ring-0 stack top so the next
    /// trap builds its frame in the right place.
    pub fn end_address(&self) -> usize {
        self as *const TrapFrame as usize + core::mem::size_of::<TrapFrame>()
    }

    #[cfg(test)]
    pub(crate) fn sample(vector: u64, kernel_mode: bool) -> TrapFrame {
        TrapFrame {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            vector,
            error_code: 0,
            rip: 0xFFFF_8000_0010_2030,
            cs: if kernel_mode { 0x08 } else { 0x33 },
            rflags: 0x202,
            rsp: 0x0000_7FFF_F000_0000,
            ss: if kernel_mode { 0x10 } else { 0x2B },
        }
    }
}

bitflags! {
    /// RFLAGS bits worth naming in a failure dump.
    #[derive(Debug, Clone, Copy)]
    pub struct RFlags: u64 {
        const CARRY = 1 << 0;
        const PARITY = 1 << 2;
        const ADJUST = 1 << 4;
        const ZERO = 1 << 6;
        const SIGN = 1 << 7;
        const TRAP = 1 << 8;
        const INTERRUPT = 1 << 9;
        const DIRECTION = 1 << 10;
        const OVERFLOW = 1 << 11;
    }
}

bitflags! {
    /// Page-fault error code bits.
    #[derive(Debug, Clone, Copy)]
    pub struct PageFaultCode: u64 {
        const PROTECTION = 1 << 0;
        const WRITE = 1 << 1;
        const USER = 1 << 2;
        const RESERVED_WRITE = 1 << 3;
        const INSTRUCTION_FETCH = 1 << 4;
    }
}

/// Renders a [`TrapFrame`] as the multi-line register dump shown on a
/// system failure.
pub struct WritableTrapFrame<'a> {
    frame: &'a TrapFrame,
}

impl<'a> WritableTrapFrame<'a> {
    pub fn new(frame: &'a TrapFrame) -> Self {
        Self { frame }
    }

    fn write_register(out: &mut TextWriter<'_>, name: &str, value: u64) {
        out.write_str(name);
        out.write_str(": ");
        out.write_pointer(value as usize);
    }
}

impl TextWritable for WritableTrapFrame<'_> {
    fn write_to(&self, out: &mut TextWriter<'_>) {
        let f = self.frame;

        out.write_str("Vector ");
        out.write_usize(f.vector());
        out.write_str(" (");
        out.write_str(vectors::name(f.vector()));
        out.write_str("), error code ");
        out.set_hex_mode(true);
        out.write_usize(f.error_code as usize);
        out.set_hex_mode(false);
        if f.vector() == vectors::PAGE_FAULT {
            out.write_str(" [");
            let code = PageFaultCode::from_bits_truncate(f.error_code);
            let mut first = true;
            for (name, _) in code.iter_names() {
                if !first {
                    out.write_char(b' ');
                }
                out.write_str(name);
                first = false;
            }
            out.write_char(b']');
        }
        out.write_char(b'\n');

        Self::write_register(out, "RIP", f.rip);
        out.write_str("  CS: ");
        out.set_hex_mode(true);
        out.write_u16(f.cs as u16);
        out.set_hex_mode(false);
        out.write_char(b'\n');

        Self::write_register(out, "RAX", f.rax);
        Self::write_register(out, "  RBX", f.rbx);
        Self::write_register(out, "  RCX", f.rcx);
        out.write_char(b'\n');
        Self::write_register(out, "RDX", f.rdx);
        Self::write_register(out, "  RSI", f.rsi);
        Self::write_register(out, "  RDI", f.rdi);
        out.write_char(b'\n');
        Self::write_register(out, "RBP", f.rbp);
        Self::write_register(out, "  R8 ", f.r8);
        Self::write_register(out, "  R9 ", f.r9);
        out.write_char(b'\n');
        Self::write_register(out, "R10", f.r10);
        Self::write_register(out, "  R11", f.r11);
        Self::write_register(out, "  R12", f.r12);
        out.write_char(b'\n');
        Self::write_register(out, "R13", f.r13);
        Self::write_register(out, "  R14", f.r14);
        Self::write_register(out, "  R15", f.r15);
        out.write_char(b'\n');

        out.write_str("RFLAGS: ");
        out.write_pointer(f.rflags as usize);
        out.write_str(" [");
        let flags = RFlags::from_bits_truncate(f.rflags);
        let mut first = true;
        for (name, _) in flags.iter_names() {
            if !first {
                out.write_char(b' ');
            }
            out.write_str(name);
            first = false;
        }
        out.write_str("]\n");

        if !f.is_kernel_interrupted() {
            Self::write_register(out, "User RSP", f.user_stack_pointer());
            out.write_str("  SS: ");
            out.set_hex_mode(true);
            out.write_u16(f.user_stack_segment() as u16);
            out.set_hex_mode(false);
            out.write_char(b'\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::testing::CaptureSink;

    fn dump(frame: &TrapFrame) -> CaptureSink {
        let mut sink = CaptureSink::new();
        {
            let mut writer = TextWriter::new(&mut sink);
            WritableTrapFrame::new(frame).write_to(&mut writer);
        }
        sink
    }

    #[test_case]
    fn test_mode_detection() {
        assert!(TrapFrame::sample(14, true).is_kernel_interrupted());
        assert!(!TrapFrame::sample(14, false).is_kernel_interrupted());
    }

    #[test_case]
    fn test_end_address_is_past_the_frame() {
        let frame = TrapFrame::sample(3, true);
        assert_eq!(
            frame.end_address(),
            &frame as *const TrapFrame as usize + core::mem::size_of::<TrapFrame>()
        );
    }

    #[test_case]
    fn test_kernel_dump_names_the_vector() {
        let frame = TrapFrame::sample(13, true);
        let sink = dump(&frame);
        assert!(sink.text().contains("General Protection Fault"));
        assert!(sink.text().contains("RIP: 0xffff800000102030"));
        // Kernel frames carry no user stack fields.
        assert!(!sink.text().contains("User RSP"));
    }

    #[test_case]
    fn test_user_dump_includes_user_stack() {
        let frame = TrapFrame::sample(14, false);
        let sink = dump(&frame);
        assert!(sink.text().contains("Page Fault"));
        assert!(sink.text().contains("User RSP: 0x00007ffff0000000"));
    }

    #[test_case]
    fn test_interrupt_flag_is_decoded() {
        let frame = TrapFrame::sample(0, true);
        let sink = dump(&frame);
        assert!(sink.text().contains("INTERRUPT"));
    }
}
