//! CPU exception routing.
//!
//! Two handlers cover the exception range. The *deliverable* handler
//! owns the faults that will one day be delivered to user threads; until
//! user mode exists, a kernel-mode hit on one of them is a system
//! failure -- with one exception: in debug builds a kernel breakpoint is
//! the second half of a failed [`kassert!`](crate::kassert), and the
//! recorded message, file, and line become the failure diagnostic. The
//! *unrecoverable* handler owns everything that can never be attributed
//! to a single thread and fails outright.

use core::ptr::NonNull;

use crate::arch::x86_64::{vectors, Processor};
use crate::kassert;
use crate::kdebug;
use crate::shutdown::kshutdown;
use crate::text::format::FormatArg;
use crate::trap::{InterruptHandler, TrapFrame, WritableTrapFrame};

const KERNEL_FAULT_FMT: &str = "SYSTEM FAILURE\n\
An unrecoverable error has occurred and the system must be shut down.\n\
We apologize for the inconvenience.\n\n\
Reason: %s in kernel mode.\n\n%O\n";

const DEBUG_CHECK_FMT: &str = "SYSTEM FAILURE (DEBUG CHECK)\n\
A kernel consistency check has failed and the system must be shut down.\n\n\
%s\n%s, Line %u\n\n%O\n";

const UNRECOVERABLE_FMT: &str = "SYSTEM FAILURE\n\
An unrecoverable error has occurred and the system must be shut down.\n\
We apologize for the inconvenience.\n\n\
Reason: %s.\n\n%O\n";

/// Installs the exception handlers on the current CPU.
pub struct ExceptionDispatcher;

static DELIVERABLE: DeliverableExceptionHandler = DeliverableExceptionHandler;
static UNRECOVERABLE: UnrecoverableExceptionHandler = UnrecoverableExceptionHandler;

impl ExceptionDispatcher {
    /// Register both exception handlers on the calling CPU.
    ///
    /// Must run with interrupts disabled, before the first trap can
    /// possibly arrive.
    pub fn init_for_current_processor() {
        let processor = Processor::current();
        for vector in vectors::FIRST_EXCEPTION..vectors::EXCEPTION_LIMIT {
            if is_deliverable(vector) {
                processor.register_handler(vector, &DELIVERABLE);
            } else {
                processor.register_handler(vector, &UNRECOVERABLE);
            }
        }
        processor.register_handler(vectors::SYSTEM_CALL, &DELIVERABLE);
    }
}

fn is_deliverable(vector: usize) -> bool {
    vectors::DELIVERABLE_VECTORS.contains(&vector)
}

/// Faults whose canonical treatment, once user mode exists, is delivery
/// to the faulting thread.
struct DeliverableExceptionHandler;

impl InterruptHandler for DeliverableExceptionHandler {
    fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
        if frame.is_kernel_interrupted() {
            if cfg!(debug_assertions) && frame.vector() == vectors::BREAKPOINT {
                if let Some(record) = kdebug::take_assertion_record() {
                    kshutdown().fail(
                        DEBUG_CHECK_FMT,
                        &[
                            FormatArg::Str(record.message),
                            FormatArg::Str(record.file),
                            FormatArg::Uint(record.line as u64),
                            FormatArg::Writable(&WritableTrapFrame::new(frame)),
                        ],
                    );
                }
            }
            kshutdown().fail(
                KERNEL_FAULT_FMT,
                &[
                    FormatArg::Str(vectors::name(frame.vector())),
                    FormatArg::Writable(&WritableTrapFrame::new(frame)),
                ],
            );
        }

        // The hook for user-mode delivery exists; the policy does not.
        kassert!(false, "user-mode exception delivery is not implemented yet");
        kshutdown().fail(
            KERNEL_FAULT_FMT,
            &[
                FormatArg::Str(vectors::name(frame.vector())),
                FormatArg::Writable(&WritableTrapFrame::new(frame)),
            ],
        );
    }
}

/// Faults that cannot be attributed to a single thread.
struct UnrecoverableExceptionHandler;

impl InterruptHandler for UnrecoverableExceptionHandler {
    fn on_trap(&self, frame: &mut TrapFrame) -> Option<NonNull<TrapFrame>> {
        kshutdown().fail(
            UNRECOVERABLE_FMT,
            &[
                FormatArg::Str(vectors::name(frame.vector())),
                FormatArg::Writable(&WritableTrapFrame::new(frame)),
            ],
        );
    }
}
