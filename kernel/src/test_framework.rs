//! no_std test framework for bare-metal builds
//!
//! On the host target, plain `#[test]` functions run under the standard
//! harness instead — see each module's own `#[cfg(test)] mod tests`. This
//! framework only matters for `target_os = "none"`, where there is no
//! process exit status to report through; QEMU's semihosting exit call
//! stands in for it.

use core::panic::PanicInfo;

use crate::error::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub trait Testable {
    fn run(&self) -> Result<(), VmError>;
}

impl<T> Testable for T
where
    T: Fn() -> Result<(), VmError>,
{
    fn run(&self) -> Result<(), VmError> {
        serial_println!("{}...", core::any::type_name::<T>());
        self()
    }
}

#[cfg(test)]
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("running {} tests", tests.len());
    let mut passed = 0;
    let mut failed = 0;
    for test in tests {
        match test.run() {
            Ok(()) => passed += 1,
            Err(e) => {
                failed += 1;
                serial_println!("[failed]: {e}");
            }
        }
    }
    serial_println!("test result: {passed} passed, {failed} failed");
    if failed == 0 {
        exit_qemu(QemuExitCode::Success);
    } else {
        exit_qemu(QemuExitCode::Failed);
    }
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n{info}");
    exit_qemu(QemuExitCode::Failed);
}

/// Exit QEMU via its `-semihosting` debug exit convention on MIPS, carrying
/// `exit_code` out through register `$a0`.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    #[cfg(target_arch = "mips")]
    {
        // SAFETY: SYS_EXIT (0x18) is a standard ARM/MIPS semihosting call
        // QEMU honors for `-semihosting`; this is noreturn since QEMU
        // terminates the process before the instruction after the trap.
        unsafe {
            core::arch::asm!(
                "move $a0, {code}",
                "li $v0, 0x18",
                "syscall",
                code = in(reg) exit_code as u32,
                options(noreturn)
            );
        }
    }

    #[cfg(not(target_arch = "mips"))]
    {
        let _ = exit_code;
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Declare a single bare-metal kernel test.
#[macro_export]
macro_rules! kernel_test {
    ($name:ident, $test:expr) => {
        #[test_case]
        const $name: &dyn $crate::test_framework::Testable =
            &|| -> Result<(), $crate::error::VmError> { $test };
    };
}
