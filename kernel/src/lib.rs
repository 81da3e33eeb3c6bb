//! Software-managed-TLB virtual memory subsystem
//!
//! A teaching kernel's VM subsystem for a 32-bit MIPS-like machine: a
//! physical frame allocator, per-process address spaces, and a process-wide
//! hashed inverted page table driven by the TLB-miss fault handler.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![cfg_attr(target_os = "none", feature(custom_test_frameworks))]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_framework::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

extern crate alloc;

#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

/// Size of the static region backing the bare-metal heap.
#[cfg(target_os = "none")]
const HEAP_SIZE: usize = 256 * 1024;

#[cfg(target_os = "none")]
static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Initialize the bare-metal heap. Must run before anything that allocates
/// (including `mm::bootstrap::vm_bootstrap`, whose page table is a `Vec`).
///
/// # Safety
///
/// Must be called exactly once, before any other code touches the global
/// allocator, and `HEAP_MEMORY` must not be accessed by anything else.
#[cfg(target_os = "none")]
pub unsafe fn init_heap() {
    // SAFETY: HEAP_MEMORY is a private static only ever referenced here;
    // the caller's contract guarantees this runs exactly once before the
    // allocator is used.
    unsafe {
        ALLOCATOR
            .lock()
            .init(HEAP_MEMORY.as_mut_ptr(), HEAP_SIZE);
    }
}

#[macro_use]
pub mod print;

pub mod arch;
pub mod error;
pub mod log_service;
pub mod logger;
pub mod mm;
mod test_framework;

pub use test_framework::{exit_qemu, test_panic_handler, QemuExitCode, Testable};

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    // SAFETY: this is the kernel's single entry point in test builds, run
    // before any other code touches the allocator.
    unsafe {
        init_heap();
    }
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Panic is intentional: heap allocation failure in a no_std kernel is
/// unrecoverable.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {layout:?}");
}

#[cfg(all(test, target_os = "none"))]
mod bare_metal_smoke {
    use crate::kernel_test;

    kernel_test!(vm_bootstrap_does_not_panic, {
        crate::mm::bootstrap::vm_bootstrap();
        Ok(())
    });
}
