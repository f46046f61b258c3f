//! Trap vector numbering for x86_64.

/// Size of the per-CPU dispatch table.
pub const VECTOR_COUNT: usize = 256;

pub const DIVIDE_ERROR: usize = 0;
pub const DEBUG: usize = 1;
pub const NON_MASKABLE_INTERRUPT: usize = 2;
pub const BREAKPOINT: usize = 3;
pub const OVERFLOW: usize = 4;
pub const BOUND_RANGE_EXCEEDED: usize = 5;
pub const INVALID_OPCODE: usize = 6;
pub const DEVICE_NOT_AVAILABLE: usize = 7;
pub const DOUBLE_FAULT: usize = 8;
pub const COPROCESSOR_SEGMENT_OVERRUN: usize = 9;
pub const INVALID_TSS: usize = 10;
pub const SEGMENT_NOT_PRESENT: usize = 11;
pub const STACK_SEGMENT_FAULT: usize = 12;
pub const GENERAL_PROTECTION_FAULT: usize = 13;
pub const PAGE_FAULT: usize = 14;
pub const X87_FLOATING_POINT: usize = 16;
pub const ALIGNMENT_CHECK: usize = 17;
pub const MACHINE_CHECK: usize = 18;
pub const SIMD_FLOATING_POINT: usize = 19;

/// First CPU exception vector that is architecturally reserved.
pub const FIRST_EXCEPTION: usize = 0;

/// One past the last CPU exception vector.
pub const EXCEPTION_LIMIT: usize = 32;

/// Vector the first hardware IRQ is delivered on.
pub const HARDWARE_VECTOR_BASE: usize = 0x20;

/// Number of legacy hardware IRQ lines.
pub const HARDWARE_IRQ_COUNT: usize = 16;

/// IRQ line of the programmable interval timer.
pub const TIMER_IRQ: u8 = 0;

/// Vector reserved for the system-call gate.
pub const SYSTEM_CALL: usize = 0x80;

/// The architectural name of a vector, for failure dumps.
pub fn name(vector: usize) -> &'static str {
    match vector {
        DIVIDE_ERROR => "Divide Error",
        DEBUG => "Debug",
        NON_MASKABLE_INTERRUPT => "Non-Maskable Interrupt",
        BREAKPOINT => "Breakpoint",
        OVERFLOW => "Overflow",
        BOUND_RANGE_EXCEEDED => "BOUND Range Exceeded",
        INVALID_OPCODE => "Invalid Opcode",
        DEVICE_NOT_AVAILABLE => "Device Not Available",
        DOUBLE_FAULT => "Double Fault",
        COPROCESSOR_SEGMENT_OVERRUN => "Coprocessor Segment Overrun",
        INVALID_TSS => "Invalid TSS",
        SEGMENT_NOT_PRESENT => "Segment Not Present",
        STACK_SEGMENT_FAULT => "Stack Segment Fault",
        GENERAL_PROTECTION_FAULT => "General Protection Fault",
        PAGE_FAULT => "Page Fault",
        X87_FLOATING_POINT => "x87 Floating-Point Error",
        ALIGNMENT_CHECK => "Alignment Check",
        MACHINE_CHECK => "Machine Check",
        SIMD_FLOATING_POINT => "SIMD Floating-Point Exception",
        SYSTEM_CALL => "System Call",
        v if (FIRST_EXCEPTION..EXCEPTION_LIMIT).contains(&v) => "Reserved Exception",
        v if (HARDWARE_VECTOR_BASE..HARDWARE_VECTOR_BASE + HARDWARE_IRQ_COUNT).contains(&v) => {
            "Hardware Interrupt"
        }
        _ => "Unknown Vector",
    }
}

/// Exception vectors whose canonical treatment, once user mode exists, is
/// delivery to the faulting thread. The system-call vector rides along
/// until it grows a handler of its own.
pub const DELIVERABLE_VECTORS: &[usize] = &[
    DIVIDE_ERROR,
    BREAKPOINT,
    OVERFLOW,
    BOUND_RANGE_EXCEEDED,
    INVALID_OPCODE,
    DEVICE_NOT_AVAILABLE,
    SEGMENT_NOT_PRESENT,
    STACK_SEGMENT_FAULT,
    GENERAL_PROTECTION_FAULT,
    PAGE_FAULT,
    X87_FLOATING_POINT,
    ALIGNMENT_CHECK,
    SIMD_FLOATING_POINT,
    SYSTEM_CALL,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_names_cover_the_exception_range() {
        for vector in FIRST_EXCEPTION..EXCEPTION_LIMIT {
            assert!(!name(vector).is_empty());
        }
        assert_eq!(name(PAGE_FAULT), "Page Fault");
        assert_eq!(name(15), "Reserved Exception");
        assert_eq!(name(HARDWARE_VECTOR_BASE + 1), "Hardware Interrupt");
    }

    #[test_case]
    fn test_deliverable_set_excludes_unrecoverable_vectors() {
        for v in [
            NON_MASKABLE_INTERRUPT,
            DOUBLE_FAULT,
            MACHINE_CHECK,
            INVALID_TSS,
            COPROCESSOR_SEGMENT_OVERRUN,
        ] {
            assert!(!DELIVERABLE_VECTORS.contains(&v));
        }
        assert!(DELIVERABLE_VECTORS.contains(&SYSTEM_CALL));
    }
}
