//! Trap dispatch.
//!
//! Hardware events enter the kernel through per-vector stubs in the
//! assembly entry layer. Each stub saves the interrupted CPU state as a
//! [`TrapFrame`] on the current kernel stack and calls [`trap_dispatch`],
//! which routes the frame to the handler registered for its vector. The
//! handler either resumes the interrupted context or names another frame
//! to switch to; the stub restores registers from whichever frame comes
//! back and returns from the interrupt.

pub mod exceptions;
pub mod interrupts;

use core::ptr::NonNull;

pub use crate::arch::x86_64::trap_frame::{TrapFrame, WritableTrapFrame};

use crate::arch::x86_64::Processor;

/// A per-vector trap handler.
///
/// Returning `None` resumes the interrupted context. Returning a frame
/// requests a context switch to it; the frame must stay valid until the
/// switch completes.
pub trait InterruptHandler: Sync {
    fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>>;
}

/// Default entry for every vector before registration.
///
/// An unregistered vector is a kernel bug; resetting the machine turns
/// it into a loud failure instead of a silent hang.
pub struct SystemResetHandler;

impl InterruptHandler for SystemResetHandler {
    fn on_trap(&self, _frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
        crate::arch::hard_reset()
    }
}

/// Central dispatch, called by the assembly stubs with the frame they
/// just built.
///
/// Returns the frame the stub must restore from. When the handler
/// switches to a user-mode frame, the per-CPU ring-0 stack pointer is
/// moved just past that frame first, so the next user-to-kernel trap
/// lands on the correct kernel stack.
#[no_mangle]
pub extern "C" fn trap_dispatch(frame: *mut TrapFrame) -> *mut TrapFrame {
    // SAFETY: the stub passes the frame it built on this CPU's kernel
    // stack; it is valid and ours for the duration of the dispatch.
    let frame_ref = unsafe { &mut *frame };
    let processor = Processor::current();
    let handler = processor.handler(frame_ref.vector());

    match handler.on_trap(frame_ref) {
        None => frame,
        Some(next) => {
            // SAFETY: a handler returning a frame guarantees it stays
            // valid until the switch completes.
            let next_ref = unsafe { next.as_ref() };
            if !next_ref.is_kernel_interrupted() {
                processor.set_ring0_stack_top(next_ref.end_address());
            }
            next.as_ptr()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ResumeHandler;

    impl InterruptHandler for ResumeHandler {
        fn on_trap(&self, _frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
            None
        }
    }

    struct SwitchBackHandler;

    impl InterruptHandler for SwitchBackHandler {
        fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
            Some(NonNull::from(frame))
        }
    }

    static RESUME: ResumeHandler = ResumeHandler;
    static SWITCH_BACK: SwitchBackHandler = SwitchBackHandler;

    #[test_case]
    fn test_resume_returns_the_same_frame() {
        crate::arch::disable_interrupts();
        Processor::current().register_handler(0xE0, &RESUME);
        crate::arch::enable_interrupts();

        let mut frame = TrapFrame::sample(0xE0, true);
        let frame_ptr = &mut frame as *mut TrapFrame;
        assert_eq!(trap_dispatch(frame_ptr), frame_ptr);
    }

    #[test_case]
    fn test_kernel_switch_leaves_ring0_stack_alone() {
        crate::arch::disable_interrupts();
        Processor::current().register_handler(0xE1, &SWITCH_BACK);
        crate::arch::enable_interrupts();

        let processor = Processor::current();
        processor.set_ring0_stack_top(0x1111_0000);

        let mut frame = TrapFrame::sample(0xE1, true);
        let frame_ptr = &mut frame as *mut TrapFrame;
        assert_eq!(trap_dispatch(frame_ptr), frame_ptr);
        assert_eq!(processor.ring0_stack_top(), 0x1111_0000);
    }

    #[test_case]
    fn test_user_switch_updates_ring0_stack() {
        crate::arch::disable_interrupts();
        Processor::current().register_handler(0xE2, &SWITCH_BACK);
        crate::arch::enable_interrupts();

        let processor = Processor::current();
        processor.set_ring0_stack_top(0);

        let mut frame = TrapFrame::sample(0xE2, false);
        let end = frame.end_address();
        let frame_ptr = &mut frame as *mut TrapFrame;
        assert_eq!(trap_dispatch(frame_ptr), frame_ptr);
        assert_eq!(processor.ring0_stack_top(), end);
    }
}
