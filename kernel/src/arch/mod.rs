//! Hardware boundary for the VM subsystem
//!
//! Everything the VM subsystem needs from the machine layer — RAM sizing,
//! the boot-time stealing allocator, and the TLB register interface — is
//! collected behind the small set of free functions re-exported here. Two
//! backends provide them: [`mips`] is the real bare-metal implementation,
//! [`sim`] is a host-side double used by `#[test]`s, matching the way the
//! rest of this kernel gates bare-metal-only code behind `target_os = "none"`.

#[cfg(target_os = "none")]
pub mod mips;
#[cfg(target_os = "none")]
pub use mips as backend;

#[cfg(not(target_os = "none"))]
pub mod sim;
#[cfg(not(target_os = "none"))]
pub use sim as backend;

use crate::mm::{PhysicalAddress, VirtualAddress};

/// Number of hardware TLB entries. Mirrors OS/161's `NUM_TLB`.
pub const NUM_TLB: usize = 64;

/// Fault classification handed to `vm_fault` by the trap dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Read,
    Write,
    ReadOnly,
}

/// Total installed RAM, in bytes.
pub fn ram_size() -> usize {
    backend::ram_size()
}

/// Physical address of the first byte of RAM not already claimed by the
/// kernel image and other fixed reservations.
pub fn ram_first_free() -> PhysicalAddress {
    backend::ram_first_free()
}

/// Boot-time allocator used before the frame table is bootstrapped. Steals
/// `n` contiguous bytes from the top of free RAM and returns their physical
/// address, or `None` if RAM is exhausted.
pub fn ram_stealmem(bytes: usize) -> Option<PhysicalAddress> {
    backend::ram_stealmem(bytes)
}

/// Raise this CPU's interrupt priority level to block all interrupts,
/// returning a token that restores the previous level when dropped.
///
/// Mirrors `splhigh()`/`splx()`: every TLB operation in this subsystem runs
/// with interrupts masked, and the guard makes it impossible to forget to
/// lower the level again on an early return.
#[must_use]
pub fn raise_ipl() -> IplGuard {
    backend::raise_ipl();
    IplGuard { _private: () }
}

/// RAII token returned by [`raise_ipl`]; lowers the interrupt priority level
/// back down when dropped.
pub struct IplGuard {
    _private: (),
}

impl Drop for IplGuard {
    fn drop(&mut self) {
        backend::lower_ipl();
    }
}

/// Invalidate every hardware TLB entry. Used by `as_activate`.
pub fn tlb_invalidate_all() {
    backend::tlb_invalidate_all();
}

/// Install a mapping for `vaddr -> paddr` into a hardware-chosen (random
/// replacement) TLB slot. `writable` sets the dirty bit so that subsequent
/// writes to the page do not themselves fault.
pub fn tlb_write_random(vaddr: VirtualAddress, paddr: PhysicalAddress, writable: bool) {
    backend::tlb_write_random(vaddr, paddr, writable);
}

/// Panics: SMP TLB shootdown is not supported by this uniprocessor kernel.
pub fn tlb_shootdown() -> ! {
    panic!("vm_tlbshootdown: SMP is not supported");
}

/// Park this CPU forever. Used by the panic handler once diagnostics have
/// been printed.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
