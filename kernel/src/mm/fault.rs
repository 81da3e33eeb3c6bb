//! TLB-miss fault handler
//!
//! The entry point the trap dispatcher calls whenever a user-mode memory
//! reference misses in the hardware TLB.

use crate::arch::{self, FaultType};
use crate::error::{VmError, VmResult};

use super::address_space::AddressSpace;
use super::page_table;
use super::VirtualAddress;

/// Resolve a TLB miss at `fault_address` in `as_`, installing a TLB entry
/// on success.
///
/// `fault_type` is already restricted to `Read`/`Write`/`ReadOnly` by its
/// type, so the "fault type not recognized" branch of the original
/// algorithm has no code path here: it is ruled out at compile time instead
/// of checked at run time.
pub fn vm_fault(
    fault_type: FaultType,
    fault_address: VirtualAddress,
    as_: &AddressSpace,
) -> VmResult<()> {
    if fault_type == FaultType::ReadOnly {
        return Err(VmError::PermissionDenied {
            addr: fault_address.as_usize(),
        });
    }

    let page_address = fault_address.page_floor();

    let write = match as_.region_containing(page_address) {
        Some(region) => region.is_writable(),
        None => {
            if is_stack_growth(as_, page_address) {
                true
            } else {
                return Err(VmError::InvalidAddress {
                    addr: fault_address.as_usize(),
                });
            }
        }
    };

    let frame = page_table::lookup_or_insert(as_.id(), page_address.page_number(), write)?;

    {
        let _ipl = arch::raise_ipl();
        arch::tlb_write_random(page_address, super::kvaddr_to_paddr(frame), write);
    }

    Ok(())
}

/// A fault below `stack_end` and above the end of the highest-based region
/// is treated as stack growth rather than an invalid access.
fn is_stack_growth(as_: &AddressSpace, page_address: VirtualAddress) -> bool {
    let addr = page_address.as_usize();
    match as_.highest_region_end() {
        Some(highest_end) => addr < as_.stack_end().as_usize() && addr > highest_end,
        None => addr < as_.stack_end().as_usize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address_space::{as_create, as_define_region};
    use crate::mm::{frame_table, page_table, USERSTACK};

    fn with_fresh_vm(num_pages: usize, f: impl FnOnce()) {
        crate::arch::sim::reset();
        page_table::bootstrap(num_pages);
        frame_table::bootstrap();
        f();
    }

    #[test]
    fn write_fault_in_rw_region_succeeds() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            assert!(vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &as_).is_ok());
        });
    }

    #[test]
    fn write_fault_in_readonly_region_installs_non_dirty_mapping() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, false, false)
                .unwrap();
            // A WRITE-type miss against a read-only region is not itself a
            // permission violation: it installs a non-dirty PTE, and only a
            // later READONLY-classified fault against that mapping is denied.
            assert!(vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &as_).is_ok());
            let result = vm_fault(FaultType::ReadOnly, VirtualAddress::new(0x1000), &as_);
            assert!(matches!(result, Err(VmError::PermissionDenied { .. })));
        });
    }

    #[test]
    fn readonly_fault_type_is_always_denied() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            let result = vm_fault(FaultType::ReadOnly, VirtualAddress::new(0x1000), &as_);
            assert!(matches!(result, Err(VmError::PermissionDenied { .. })));
        });
    }

    #[test]
    fn stack_growth_below_userstack_is_writable() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, false, false)
                .unwrap();
            let stack_addr = VirtualAddress::new(USERSTACK - 0x2000);
            assert!(vm_fault(FaultType::Write, stack_addr, &as_).is_ok());
        });
    }

    #[test]
    fn address_outside_any_region_or_stack_is_invalid() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            let result = vm_fault(FaultType::Read, VirtualAddress::new(0x500), &as_);
            assert!(matches!(result, Err(VmError::InvalidAddress { .. })));
        });
    }

    #[test]
    fn repeated_fault_on_same_page_reuses_mapping() {
        with_fresh_vm(8, || {
            let mut as_ = as_create();
            as_define_region(&mut as_, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &as_).unwrap();
            let frame_before =
                page_table::lookup_or_insert(as_.id(), VirtualAddress::new(0x1000).page_number(), true)
                    .unwrap();
            vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &as_).unwrap();
            let frame_after =
                page_table::lookup_or_insert(as_.id(), VirtualAddress::new(0x1000).page_number(), true)
                    .unwrap();
            assert_eq!(frame_before, frame_after);
        });
    }

    #[test]
    fn table_full_surfaces_as_out_of_memory_to_caller() {
        with_fresh_vm(1, || {
            let mut first = as_create();
            as_define_region(&mut first, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &first).unwrap();

            let mut second = as_create();
            as_define_region(&mut second, VirtualAddress::new(0x1000), 0x1000, true, true, false)
                .unwrap();
            let result = vm_fault(FaultType::Write, VirtualAddress::new(0x1000), &second);
            assert!(result.is_err());
        });
    }
}
