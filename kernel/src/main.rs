#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

use swtlb_kernel::arch::{self, FaultType};
use swtlb_kernel::mm::address_space::{as_activate, as_create, as_define_region, as_define_stack};
use swtlb_kernel::mm::{bootstrap::vm_bootstrap, fault::vm_fault, VirtualAddress};
use swtlb_kernel::{logger, println};

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("[KERNEL PANIC] {info}");
    arch::halt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    swtlb_kernel::test_panic_handler(info)
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    // SAFETY: this is the kernel's single entry point, and nothing else
    // touches the allocator before this call.
    unsafe {
        swtlb_kernel::init_heap();
    }

    logger::init(log::LevelFilter::Info);
    println!("swtlb-kernel v{}", env!("CARGO_PKG_VERSION"));

    vm_bootstrap();

    // Bring up an initial address space as a smoke test of the pieces this
    // kernel owns; loading an ELF image into it is the loader's job
    // (out of scope here).
    let mut as_ = as_create();
    as_define_region(&mut as_, VirtualAddress::new(0x0040_0000), 0x1000, true, true, true)
        .expect("initial code region fits below the stack");
    let mut sp = VirtualAddress::new(0);
    as_define_stack(&as_, &mut sp);
    as_activate();

    vm_fault(FaultType::Write, VirtualAddress::new(0x0040_0000), &as_)
        .expect("initial page fault resolves");

    #[cfg(test)]
    test_main();

    println!("swtlb-kernel initialized successfully");
    arch::halt();
}
