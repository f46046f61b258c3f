//! Test harness for the kernel's unit suite.
//!
//! On bare metal the suite runs under QEMU: results go out over serial
//! and the debug exit device reports the outcome. On the host target the
//! same runner prints through std and returns, letting `cargo test`
//! drive the suite directly.

/// Trait all testable functions implement.
pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        #[cfg(target_os = "none")]
        crate::serial_print!("{}...\t", core::any::type_name::<T>());
        #[cfg(not(target_os = "none"))]
        std::print!("{}...\t", core::any::type_name::<T>());

        self();

        #[cfg(target_os = "none")]
        crate::serial_println!("[ok]");
        #[cfg(not(target_os = "none"))]
        std::println!("[ok]");
    }
}

/// Runner the `#[test_case]` attribute hands the collected tests to.
pub fn test_runner(tests: &[&dyn Testable]) {
    #[cfg(target_os = "none")]
    crate::serial_println!("Running {} tests", tests.len());
    #[cfg(not(target_os = "none"))]
    std::println!("Running {} tests", tests.len());

    for test in tests {
        test.run();
    }

    #[cfg(target_os = "none")]
    exit_qemu(QemuExitCode::Success);
}

#[cfg(target_os = "none")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Exit QEMU through the debug exit device.
#[cfg(target_os = "none")]
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    use x86_64::instructions::port::Port;

    // SAFETY: port 0xF4 is the QEMU isa-debug-exit device; writing the
    // code terminates the VM before the next instruction runs.
    unsafe {
        let mut port = Port::new(0xF4);
        port.write(exit_code as u32);
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Panic handler for the bare-metal test build.
#[cfg(target_os = "none")]
pub fn test_panic_handler(info: &core::panic::PanicInfo) -> ! {
    crate::serial_println!("[failed]\n");
    crate::serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed)
}
