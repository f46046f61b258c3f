//! 8259A programmable interrupt controller.
//!
//! The legacy chained PICs deliver the 16 hardware IRQ lines. The
//! controller is remapped at initialization so IRQ 0 arrives on
//! [`vectors::HARDWARE_VECTOR_BASE`], clear of the CPU exception range.
//! All lines start masked; the interrupt dispatcher unmasks what it has
//! handlers for.

use pic8259::ChainedPics;
use spin::Mutex;

use crate::arch::x86_64::vectors;
use crate::kassert;

const PIC1_VECTOR_OFFSET: u8 = vectors::HARDWARE_VECTOR_BASE as u8;
const PIC2_VECTOR_OFFSET: u8 = PIC1_VECTOR_OFFSET + 8;

// SAFETY: the chosen offsets place all 16 IRQs above the exception
// vectors and below every software-assigned vector.
static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC1_VECTOR_OFFSET, PIC2_VECTOR_OFFSET) });

/// Capability handle over the current CPU's interrupt controller.
///
/// The legacy PIC pair is shared machine-wide; per-CPU distinction
/// arrives with the APIC.
#[derive(Debug, Clone, Copy)]
pub struct InterruptController;

impl InterruptController {
    /// Remap the controller and mask every line. Must run with
    /// interrupts disabled, before any line is unmasked.
    pub fn init_for_current() {
        kassert!(
            !crate::arch::interrupts_enabled(),
            "controller initialization requires interrupts disabled"
        );
        let mut pics = PICS.lock();
        // SAFETY: the initialization sequence (ICW1-ICW4) writes only the
        // PIC command/data ports; interrupts are disabled so no IRQ can
        // arrive mid-sequence.
        unsafe {
            pics.initialize();
            pics.write_masks(0xFF, 0xFF);
        }
    }

    /// The controller serving the current CPU.
    pub fn current() -> InterruptController {
        InterruptController
    }

    /// Prevent `irq` from being delivered.
    pub fn mask(&self, irq: u8) {
        kassert!(
            (irq as usize) < vectors::HARDWARE_IRQ_COUNT,
            "IRQ line out of range"
        );
        let mut pics = PICS.lock();
        // SAFETY: mask register reads and writes touch only the PIC data
        // ports; the mutex serializes access.
        unsafe {
            let [mut mask1, mut mask2] = pics.read_masks();
            if irq < 8 {
                mask1 |= 1 << irq;
            } else {
                mask2 |= 1 << (irq - 8);
            }
            pics.write_masks(mask1, mask2);
        }
    }

    /// Allow `irq` to be delivered.
    pub fn unmask(&self, irq: u8) {
        kassert!(
            (irq as usize) < vectors::HARDWARE_IRQ_COUNT,
            "IRQ line out of range"
        );
        let mut pics = PICS.lock();
        // SAFETY: mask register reads and writes touch only the PIC data
        // ports; the mutex serializes access.
        unsafe {
            let [mut mask1, mut mask2] = pics.read_masks();
            if irq < 8 {
                mask1 &= !(1 << irq);
            } else {
                mask2 &= !(1 << (irq - 8));
            }
            pics.write_masks(mask1, mask2);
        }
    }

    /// Acknowledge delivery of `irq` so the controller can raise the
    /// next one.
    pub fn end_of_interrupt(&self, irq: u8) {
        kassert!(
            (irq as usize) < vectors::HARDWARE_IRQ_COUNT,
            "IRQ line out of range"
        );
        let mut pics = PICS.lock();
        // SAFETY: notifies the PIC pair for the vector this IRQ was
        // remapped to; writes only the PIC command ports.
        unsafe {
            pics.notify_end_of_interrupt(PIC1_VECTOR_OFFSET + irq);
        }
    }
}
