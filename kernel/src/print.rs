// Print macros for kernel output

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}

// Stub implementations for hosted builds
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {};
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {};
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;

    let mut handle = crate::text::display::display().handle();
    handle.write_fmt(args).expect("display write_fmt failed");
}
