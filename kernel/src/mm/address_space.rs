//! Per-process address space: region list, stack top, and load-time
//! permission relaxation.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::arch;
use crate::error::{VmError, VmResult};

use super::{VirtualAddress, USERSTACK};

/// Stable identity of an address space, used as the process key by the page
/// table. Minted from a monotonic counter rather than reusing the
/// `AddressSpace`'s own memory address, so a freed-and-reused allocation can
/// never alias a still-live identity in the hash table.
///
/// `0` is reserved to mean "empty slot" in the page table, so the counter
/// starts at `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

static NEXT_PROCESS_ID: AtomicU32 = AtomicU32::new(1);

fn next_process_id() -> ProcessId {
    ProcessId(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
}

bitflags! {
    /// Permission bits stored on a [`Region`]. The executable bit is
    /// accepted by `as_define_region` for interface compatibility but this
    /// subsystem never tests it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// A single mapped region of an address space.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub base: VirtualAddress,
    pub size: usize,
    pub flags: RegionFlags,
    /// Set by `prepare_load` when this region's write permission was
    /// temporarily relaxed; cleared by `complete_load` once reverted.
    modified: bool,
}

impl Region {
    fn end(&self) -> usize {
        self.base.as_usize() + self.size
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(RegionFlags::WRITE)
    }

    pub fn is_readable(&self) -> bool {
        self.flags.contains(RegionFlags::READ)
    }
}

/// A process's virtual address space.
pub struct AddressSpace {
    id: ProcessId,
    regions: Vec<Region>,
    stack_end: VirtualAddress,
}

impl AddressSpace {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn stack_end(&self) -> VirtualAddress {
        self.stack_end
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Find the region containing `vaddr`, if any.
    pub fn region_containing(&self, vaddr: VirtualAddress) -> Option<&Region> {
        let addr = vaddr.as_usize();
        self.regions
            .iter()
            .find(|r| addr >= r.base.as_usize() && addr < r.end())
    }

    /// The end of the highest-based region, used by the fault handler's
    /// stack-growth heuristic.
    pub fn highest_region_end(&self) -> Option<usize> {
        self.regions.iter().map(Region::end).max()
    }
}

/// Create a fresh, empty address space.
pub fn as_create() -> AddressSpace {
    AddressSpace {
        id: next_process_id(),
        regions: Vec::new(),
        stack_end: VirtualAddress::new(USERSTACK),
    }
}

/// Deep-copy `src`'s region list into a new address space with its own
/// identity. Page contents are not copied here; that is the page table's
/// job (`page_table::vm_cloneproc`), which the caller is expected to invoke
/// with the two identities once both address spaces exist.
pub fn as_copy(src: &AddressSpace) -> AddressSpace {
    AddressSpace {
        id: next_process_id(),
        regions: src.regions.clone(),
        stack_end: src.stack_end,
    }
}

/// Release `as_`'s resources. Does not touch the page table; callers must
/// also invoke `page_table::vm_freeproc(as_.id())` to release mapped frames.
pub fn as_destroy(as_: AddressSpace) {
    drop(as_);
}

/// Define a new region. Rejects regions that would reach or exceed
/// `stack_end`. `executable` is accepted for interface compatibility but
/// has no effect: this subsystem does not enforce the executable bit.
pub fn as_define_region(
    as_: &mut AddressSpace,
    vaddr: VirtualAddress,
    size: usize,
    read: bool,
    write: bool,
    executable: bool,
) -> VmResult<()> {
    if vaddr.as_usize() + size >= as_.stack_end.as_usize() {
        return Err(VmError::OutOfMemory { requested_pages: 0 });
    }

    let mut flags = RegionFlags::empty();
    flags.set(RegionFlags::READ, read);
    flags.set(RegionFlags::WRITE, write);
    flags.set(RegionFlags::EXEC, executable);

    let region = Region {
        base: vaddr,
        size,
        flags,
        modified: false,
    };

    match as_.regions.first() {
        Some(first) if region.base.as_usize() > first.base.as_usize() => {
            as_.regions.insert(0, region);
        }
        Some(_) => {
            as_.regions.insert(1.min(as_.regions.len()), region);
        }
        None => as_.regions.push(region),
    }

    Ok(())
}

/// Temporarily make every read-only region writable, so the loader can copy
/// segment contents in. Tracks which regions it touched via `modified` so
/// `as_complete_load` knows exactly what to revert.
pub fn as_prepare_load(as_: &mut AddressSpace) {
    for region in &mut as_.regions {
        if !region.is_writable() {
            region.flags.insert(RegionFlags::WRITE);
            region.modified = true;
        }
    }
}

/// Revert the write permission on every region `as_prepare_load` relaxed.
pub fn as_complete_load(as_: &mut AddressSpace) {
    for region in &mut as_.regions {
        if region.is_writable() && region.modified {
            region.flags.remove(RegionFlags::WRITE);
            region.modified = false;
        }
    }
}

/// Write the address space's stack top into `*stackptr`. Does not create a
/// region; stack pages are faulted in lazily via the stack heuristic.
pub fn as_define_stack(as_: &AddressSpace, stackptr: &mut VirtualAddress) {
    *stackptr = as_.stack_end;
}

/// Install `as_` as the CPU's current address space by invalidating every
/// TLB entry. Runs with interrupts masked, since a partially-flushed TLB
/// must never be observed by a fault.
pub fn as_activate() {
    let _ipl = arch::raise_ipl();
    arch::tlb_invalidate_all();
}

/// No-op: this design keeps no per-CPU state that needs saving when an
/// address space stops being current.
pub fn as_deactivate() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_region_rejects_stack_collision() {
        let mut as_ = as_create();
        let result = as_define_region(
            &mut as_,
            VirtualAddress::new(USERSTACK - 4),
            4096,
            true,
            true,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn prepare_then_complete_load_round_trips_write_bit() {
        let mut as_ = as_create();
        as_define_region(&mut as_, VirtualAddress::new(0x1000), 4096, true, false, true).unwrap();
        as_prepare_load(&mut as_);
        assert!(as_.regions()[0].is_writable());
        as_complete_load(&mut as_);
        assert!(!as_.regions()[0].is_writable());
    }

    #[test]
    fn complete_load_leaves_originally_writable_regions_alone() {
        let mut as_ = as_create();
        as_define_region(&mut as_, VirtualAddress::new(0x1000), 4096, true, true, false).unwrap();
        as_prepare_load(&mut as_);
        as_complete_load(&mut as_);
        assert!(as_.regions()[0].is_writable());
    }

    #[test]
    fn copy_preserves_region_list_independently() {
        let mut as_ = as_create();
        as_define_region(&mut as_, VirtualAddress::new(0x1000), 4096, true, true, false).unwrap();
        let mut cloned = as_copy(&as_);
        assert_ne!(as_.id(), cloned.id());
        as_define_region(&mut cloned, VirtualAddress::new(0x2000), 4096, true, false, false)
            .unwrap();
        assert_eq!(as_.regions().len(), 1);
        assert_eq!(cloned.regions().len(), 2);
    }

    #[test]
    fn region_containing_finds_correct_region() {
        let mut as_ = as_create();
        as_define_region(&mut as_, VirtualAddress::new(0x1000), 4096, true, false, false).unwrap();
        assert!(as_.region_containing(VirtualAddress::new(0x1500)).is_some());
        assert!(as_.region_containing(VirtualAddress::new(0x500)).is_none());
    }
}
