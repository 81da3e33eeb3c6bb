//! Bare-metal MIPS32 backend
//!
//! Talks to coprocessor 0 for TLB management and to a fixed boot-info block
//! left by the bootloader for RAM sizing. Serial output is memory-mapped, so
//! it is hand-rolled here the same way this kernel hand-rolls MMIO access
//! for other architectures that have no applicable port-based crate.

pub mod serial;

use core::arch::asm;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::mm::{PhysicalAddress, VirtualAddress, PAGE_SHIFT};

use super::NUM_TLB;

/// Physical address of the boot info block the bootloader leaves behind,
/// describing installed RAM.
const BOOT_INFO_ADDR: usize = 0x8000_1000;

#[repr(C)]
struct BootInfo {
    ram_size: u32,
    ram_first_free: u32,
}

fn boot_info() -> &'static BootInfo {
    // SAFETY: the bootloader contract guarantees a valid, immutable
    // BootInfo struct is resident at BOOT_INFO_ADDR before the kernel entry
    // point runs.
    unsafe { &*(BOOT_INFO_ADDR as *const BootInfo) }
}

pub fn ram_size() -> usize {
    boot_info().ram_size as usize
}

/// Boundary between memory already claimed (by the kernel image, and by
/// `ram_stealmem` calls so far) and memory still available to the frame
/// table. Lazily seeded from the boot info block, then advanced upward by
/// every `ram_stealmem` call.
static FIRST_FREE: AtomicUsize = AtomicUsize::new(0);
static FIRST_FREE_INIT: AtomicUsize = AtomicUsize::new(0);

fn ensure_first_free_init() {
    if FIRST_FREE_INIT.swap(1, Ordering::AcqRel) == 0 {
        FIRST_FREE.store(boot_info().ram_first_free as usize, Ordering::Release);
    }
}

pub fn ram_first_free() -> PhysicalAddress {
    ensure_first_free_init();
    PhysicalAddress::new(FIRST_FREE.load(Ordering::Acquire))
}

pub fn ram_stealmem(bytes: usize) -> Option<PhysicalAddress> {
    ensure_first_free_init();
    let page_size = 1usize << PAGE_SHIFT;
    let aligned = (bytes + page_size - 1) & !(page_size - 1);
    loop {
        let current = FIRST_FREE.load(Ordering::Acquire);
        if current + aligned > ram_size() {
            return None;
        }
        let new_first_free = current + aligned;
        if FIRST_FREE
            .compare_exchange(current, new_first_free, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Some(PhysicalAddress::new(current));
        }
    }
}

/// Coprocessor 0 status register bit that gates interrupts.
const STATUS_IE: u32 = 1 << 0;

pub fn raise_ipl() {
    // SAFETY: mtc0/mfc0 against the Status register ($12) only affects this
    // CPU's interrupt-enable bit; clearing it is reversible by `lower_ipl`.
    unsafe {
        let mut status: u32;
        asm!("mfc0 {0}, $12", out(reg) status);
        status &= !STATUS_IE;
        asm!("mtc0 {0}, $12", in(reg) status);
    }
}

pub fn lower_ipl() {
    // SAFETY: see raise_ipl; this only ever re-enables a bit this module
    // itself cleared.
    unsafe {
        let mut status: u32;
        asm!("mfc0 {0}, $12", out(reg) status);
        status |= STATUS_IE;
        asm!("mtc0 {0}, $12", in(reg) status);
    }
}

const TLBHI_INVALID_BASE: u32 = 0x8000_0000;
const TLBLO_VALID: u32 = 1 << 1;
const TLBLO_DIRTY: u32 = 1 << 2;

pub fn tlb_invalidate_all() {
    for index in 0..NUM_TLB {
        // SAFETY: writes index `index`, well within the hardware's fixed
        // NUM_TLB-entry array; mtc0/tlbwi is the standard MIPS32 idiom for
        // programming one TLB slot directly.
        unsafe {
            let entryhi = TLBHI_INVALID_BASE.wrapping_add((index as u32) << PAGE_SHIFT);
            asm!("mtc0 {0}, $10", in(reg) entryhi); // EntryHi
            asm!("mtc0 {0}, $2", in(reg) 0u32); // EntryLo0
            asm!("mtc0 {0}, $0", in(reg) index as u32); // Index
            asm!("tlbwi");
        }
    }
}

pub fn tlb_write_random(vaddr: VirtualAddress, paddr: PhysicalAddress, writable: bool) {
    let entryhi = vaddr.page_floor().as_usize() as u32;
    let mut entrylo = (paddr.as_usize() as u32) | TLBLO_VALID;
    if writable {
        entrylo |= TLBLO_DIRTY;
    }
    // SAFETY: tlbwr lets the hardware pick the replaced slot; EntryHi/Lo0
    // are fully specified above before the write, matching the MIPS32
    // software-refill contract.
    unsafe {
        asm!("mtc0 {0}, $10", in(reg) entryhi); // EntryHi
        asm!("mtc0 {0}, $2", in(reg) entrylo); // EntryLo0
        asm!("tlbwr");
    }
}
