//! Console output macros
//!
//! Bare-metal builds print to the MIPS serial backend; host builds (used by
//! `#[test]`) fall back to `std::println!` so test output shows up on the
//! runner's terminal.

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::arch::mips::serial::_print(format_args!($($arg)*)));
}

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(not(target_os = "none"))]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => (std::print!($($arg)*));
}

#[cfg(not(target_os = "none"))]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => (std::println!($($arg)*));
}

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::arch::mips::serial::_print(format_args!($($arg)*)));
}

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

#[cfg(not(target_os = "none"))]
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => (std::eprint!($($arg)*));
}

#[cfg(not(target_os = "none"))]
#[macro_export]
macro_rules! serial_println {
    ($($arg:tt)*) => (std::eprintln!($($arg)*));
}
