//! Hardware interrupt routing.
//!
//! Programs the interrupt controller and installs a timer handler on the
//! timer IRQ and a generic handler on the other lines. Both acknowledge
//! the interrupt and resume the interrupted context; the timer handler
//! is where the scheduler will eventually produce a switch frame, and
//! real device drivers will displace the generic handler line by line.

use core::ptr::NonNull;

use crate::arch::x86_64::pic::InterruptController;
use crate::arch::x86_64::{vectors, Processor};
use crate::kassert;
use crate::trap::{InterruptHandler, TrapFrame};

/// Installs the hardware interrupt handlers on the current CPU.
pub struct InterruptDispatcher;

static TIMER: TimerInterruptHandler = TimerInterruptHandler;
static DEVICE: DeviceInterruptHandler = DeviceInterruptHandler;

impl InterruptDispatcher {
    /// Program the interrupt controller and register a handler for every
    /// hardware IRQ line on the calling CPU.
    ///
    /// Must run with interrupts disabled. Only the timer line is
    /// unmasked; drivers unmask their own lines as they come up.
    pub fn init_for_current_processor() {
        InterruptController::init_for_current();

        let processor = Processor::current();
        for irq in 0..vectors::HARDWARE_IRQ_COUNT {
            let vector = vectors::HARDWARE_VECTOR_BASE + irq;
            if irq == vectors::TIMER_IRQ as usize {
                processor.register_handler(vector, &TIMER);
            } else {
                processor.register_handler(vector, &DEVICE);
            }
        }

        InterruptController::current().unmask(vectors::TIMER_IRQ);
    }
}

/// The IRQ line a hardware vector was delivered on.
fn irq_of_vector(vector: usize) -> u8 {
    kassert!(
        (vectors::HARDWARE_VECTOR_BASE
            ..vectors::HARDWARE_VECTOR_BASE + vectors::HARDWARE_IRQ_COUNT)
            .contains(&vector),
        "vector is not a hardware interrupt"
    );
    (vector - vectors::HARDWARE_VECTOR_BASE) as u8
}

/// Timer tick. Acknowledges the interrupt and resumes; the scheduler
/// hook that will hand back a switch frame is not built yet.
struct TimerInterruptHandler;

impl InterruptHandler for TimerInterruptHandler {
    fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
        InterruptController::current().end_of_interrupt(irq_of_vector(frame.vector()));
        None
    }
}

/// Any other device line: acknowledge and resume.
struct DeviceInterruptHandler;

impl InterruptHandler for DeviceInterruptHandler {
    fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
        InterruptController::current().end_of_interrupt(irq_of_vector(frame.vector()));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_vector_to_irq_decoding() {
        assert_eq!(irq_of_vector(vectors::HARDWARE_VECTOR_BASE), 0);
        assert_eq!(irq_of_vector(vectors::HARDWARE_VECTOR_BASE + 1), 1);
        assert_eq!(irq_of_vector(vectors::HARDWARE_VECTOR_BASE + 15), 15);
    }
}
