//! Host-side double for the machine layer
//!
//! Stands in for real MIPS hardware when the crate is built for the host
//! target (`not(target_os = "none")`), so the frame table, address space,
//! page table, and fault handler can be exercised end to end by ordinary
//! `#[test]`s. A boxed byte arena stands in for RAM; a fixed-size array
//! stands in for the hardware TLB.

use spin::Mutex;

use crate::mm::{PhysicalAddress, VirtualAddress, PAGE_SIZE};

use super::NUM_TLB;

/// Total amount of simulated RAM. Sized so that `vm_bootstrap`'s
/// `num_pages = 2 * ram_size / PAGE_SIZE` produces the `num_pages = 8`
/// configuration used throughout the test scenarios this subsystem is
/// validated against.
const SIM_RAM_BYTES: usize = 4 * PAGE_SIZE;

/// Bytes reserved at the bottom of RAM before `ram_first_free()`, standing
/// in for the kernel image and boot structures.
const SIM_RESERVED_BYTES: usize = PAGE_SIZE;

struct RamSim {
    /// Boundary between memory already claimed (by the kernel image, and by
    /// `ram_stealmem` calls so far) and memory still available to the frame
    /// table. Advances upward, mirroring the real allocator.
    first_free: usize,
}

static RAM: Mutex<RamSim> = Mutex::new(RamSim {
    first_free: SIM_RESERVED_BYTES,
});

pub fn ram_size() -> usize {
    SIM_RAM_BYTES
}

pub fn ram_first_free() -> PhysicalAddress {
    PhysicalAddress::new(RAM.lock().first_free)
}

pub fn ram_stealmem(bytes: usize) -> Option<PhysicalAddress> {
    let mut ram = RAM.lock();
    let aligned = (bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    if ram.first_free + aligned > SIM_RAM_BYTES {
        return None;
    }
    let addr = ram.first_free;
    ram.first_free += aligned;
    Some(PhysicalAddress::new(addr))
}

/// Test-only: reset RAM and TLB state so successive tests do not exhaust
/// the simulated RAM arena or see a stale TLB.
#[cfg(test)]
pub fn reset() {
    RAM.lock().first_free = SIM_RESERVED_BYTES;
    *TLB.lock() = [None; NUM_TLB];
}

static IPL_DEPTH: Mutex<u32> = Mutex::new(0);

pub fn raise_ipl() {
    *IPL_DEPTH.lock() += 1;
}

pub fn lower_ipl() {
    let mut depth = IPL_DEPTH.lock();
    *depth = depth.saturating_sub(1);
}

#[derive(Clone, Copy)]
struct TlbEntry {
    vaddr: VirtualAddress,
    paddr: PhysicalAddress,
    writable: bool,
}

static TLB: Mutex<[Option<TlbEntry>; NUM_TLB]> = Mutex::new([None; NUM_TLB]);
static TLB_NEXT_VICTIM: Mutex<usize> = Mutex::new(0);

pub fn tlb_invalidate_all() {
    *TLB.lock() = [None; NUM_TLB];
}

pub fn tlb_write_random(vaddr: VirtualAddress, paddr: PhysicalAddress, writable: bool) {
    let mut tlb = TLB.lock();
    let mut victim = TLB_NEXT_VICTIM.lock();
    tlb[*victim] = Some(TlbEntry {
        vaddr,
        paddr,
        writable,
    });
    *victim = (*victim + 1) % NUM_TLB;
}

/// Test-only: look up the current TLB translation for a virtual address, as
/// the fault-handler tests use it to assert the installed mapping.
#[cfg(test)]
pub fn tlb_lookup(vaddr: VirtualAddress) -> Option<(PhysicalAddress, bool)> {
    TLB.lock()
        .iter()
        .flatten()
        .find(|e| e.vaddr == vaddr)
        .map(|e| (e.paddr, e.writable))
}
