//! Process-wide hashed inverted page table
//!
//! A single open-addressing hash table, keyed by `(address-space identity,
//! virtual page)`, shared by every process. Collisions resolve by linear
//! probing with wraparound. Every operation runs under a single spinlock
//! (`pt_lock`); the fault handler additionally calls into the frame table
//! (`ft_lock`) while holding it, so callers must never acquire the two
//! locks in the opposite order.

use spin::{Mutex, MutexGuard};

use crate::error::{VmError, VmResult};

use super::address_space::ProcessId;
use super::frame_table;
use super::{VirtualAddress, PAGE_SHIFT};

/// One occupied slot of the page table.
#[derive(Debug, Clone, Copy)]
struct Pte {
    pid: ProcessId,
    vpage: usize,
    /// Kernel virtual address of the backing frame.
    frame: VirtualAddress,
    write: bool,
}

/// `hash(pid, vpage) = (pid XOR (vpage >> PAGE_SHIFT)) mod num_pages`.
fn hash(pid: ProcessId, vpage: usize, num_pages: usize) -> usize {
    ((pid.as_u32() as usize) ^ (vpage >> PAGE_SHIFT)) % num_pages
}

struct PageTable {
    entries: alloc::vec::Vec<Option<Pte>>,
}

impl PageTable {
    fn num_pages(&self) -> usize {
        self.entries.len()
    }

    /// Locate the slot for `(pid, vpage)`: an existing match, or the first
    /// empty slot on the probe sequence starting at `hash(pid, vpage)`.
    /// Returns `None` if the whole table was probed without finding either.
    ///
    /// The original C implementation detected a full table with a
    /// self-comparison (`if index == index`) that could never be true; this
    /// tracks the probe's starting index separately so wraparound is
    /// actually detected.
    fn index_of(&self, pid: ProcessId, vpage: usize) -> Option<usize> {
        let num_pages = self.num_pages();
        let start = hash(pid, vpage, num_pages);
        let mut index = start;
        loop {
            match self.entries[index] {
                None => return Some(index),
                Some(pte) if pte.pid == pid && pte.vpage == vpage => return Some(index),
                Some(_) => {}
            }
            index = (index + 1) % num_pages;
            if index == start {
                return None;
            }
        }
    }
}

enum PageTableState {
    Uninitialized,
    Ready(PageTable),
}

static PAGE_TABLE: Mutex<PageTableState> = Mutex::new(PageTableState::Uninitialized);

/// Allocate and zero an empty table sized `num_pages` entries. Must run
/// before the frame table is bootstrapped, per `mm::bootstrap`'s ordering
/// requirement.
pub fn bootstrap(num_pages: usize) {
    let entries = alloc::vec![None; num_pages];
    *PAGE_TABLE.lock() = PageTableState::Ready(PageTable { entries });
}

fn locked() -> MutexGuard<'static, PageTableState> {
    PAGE_TABLE.lock()
}

/// Look up the existing translation for `(pid, vpage)`, or install a new
/// one by allocating a fresh frame. Returns the physical/kernel frame
/// address and whether the mapping is writable.
///
/// Acquires `pt_lock` for the duration of the lookup and, on a miss, while
/// allocating the frame from the frame table (`ft_lock`) — this is the
/// `pt_lock -> ft_lock` ordering the rest of the subsystem must never
/// reverse.
pub fn lookup_or_insert(
    pid: ProcessId,
    vpage: usize,
    write: bool,
) -> VmResult<VirtualAddress> {
    let mut guard = locked();
    let table = match &mut *guard {
        PageTableState::Uninitialized => {
            return Err(VmError::NotInitialized {
                subsystem: "page_table",
            })
        }
        PageTableState::Ready(table) => table,
    };

    let index = table.index_of(pid, vpage).ok_or(VmError::TableFull)?;

    if let Some(pte) = table.entries[index] {
        return Ok(pte.frame);
    }

    let frame = frame_table::alloc_kpages(1)?;
    table.entries[index] = Some(Pte {
        pid,
        vpage,
        frame,
        write,
    });
    Ok(frame)
}

/// Release every entry owned by `pid`, repairing the probe chains left
/// behind so lookups for other processes still terminate correctly.
pub fn vm_freeproc(pid: ProcessId) {
    let mut guard = locked();
    let table = match &mut *guard {
        PageTableState::Uninitialized => return,
        PageTableState::Ready(table) => table,
    };
    free_entries_for(table, pid);
}

fn free_entries_for(table: &mut PageTable, pid: ProcessId) {
    let num_pages = table.num_pages();
    let mut i = 0;
    while i < num_pages {
        if matches!(table.entries[i], Some(pte) if pte.pid == pid) {
            if let Some(pte) = table.entries[i].take() {
                frame_table::free_kpages(pte.frame);
            }
            repair_chain_from(table, i);
            // `repair_chain_from` may have slid a later entry belonging to
            // the same pid back into slot `i`; recheck it before advancing.
            continue;
        }
        i += 1;
    }
}

/// After clearing slot `gap`, slide any entries that were only reachable
/// through it back into place, following OS/161's repair loop: walk forward
/// from the gap, and for every occupied slot whose natural hash lies at or
/// before the gap (i.e. it was displaced past its home by the entry that
/// used to sit there), move it into the gap and treat its old slot as the
/// new gap. Stops at the first slot that is already empty.
fn repair_chain_from(table: &mut PageTable, mut gap: usize) {
    let num_pages = table.num_pages();
    let mut j = (gap + 1) % num_pages;
    while let Some(pte) = table.entries[j] {
        let home = hash(pte.pid, pte.vpage, num_pages);
        // Does the gap lie on this entry's probe path from its home to j?
        let displaced = if home <= j {
            home <= gap && gap < j
        } else {
            gap >= home || gap < j
        };
        if displaced {
            table.entries[gap] = table.entries[j].take();
            gap = j;
        }
        j = (j + 1) % num_pages;
        if j == gap {
            break;
        }
    }
}

/// Copy every PTE owned by `old` into `new`, duplicating frame contents.
/// Rolls back (freeing everything written so far via `vm_freeproc`) and
/// returns an error if the table fills up partway through, leaving `old`
/// untouched.
pub fn vm_cloneproc(old: ProcessId, new: ProcessId) -> VmResult<()> {
    let mut guard = locked();

    // Re-derive a fresh borrow of the table for each step below instead of
    // holding one across the loop: a borrow held across `alloc_kpages`'s
    // own locking of the frame table must not also span the mutable
    // re-borrow used to write the new entry back in.
    let source: alloc::vec::Vec<Pte> = match &*guard {
        PageTableState::Uninitialized => {
            return Err(VmError::NotInitialized {
                subsystem: "page_table",
            })
        }
        PageTableState::Ready(table) => table
            .entries
            .iter()
            .filter_map(|slot| *slot)
            .filter(|pte| pte.pid == old)
            .collect(),
    };

    for pte in source {
        let index = match &*guard {
            PageTableState::Ready(table) => table.index_of(new, pte.vpage),
            PageTableState::Uninitialized => unreachable!("checked above"),
        };
        let Some(index) = index else {
            drop(guard);
            vm_freeproc(new);
            return Err(VmError::TableFull);
        };

        let new_frame = match frame_table::alloc_kpages(1) {
            Ok(f) => f,
            Err(e) => {
                drop(guard);
                vm_freeproc(new);
                return Err(e);
            }
        };

        // SAFETY: pte.frame and new_frame are each exactly PAGE_SIZE bytes
        // of kernel memory owned respectively by the old and newly
        // allocated frame, and do not overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(
                pte.frame.as_usize() as *const u8,
                new_frame.as_usize() as *mut u8,
                super::PAGE_SIZE,
            );
        }

        match &mut *guard {
            PageTableState::Ready(table) => {
                table.entries[index] = Some(Pte {
                    pid: new,
                    vpage: pte.vpage,
                    frame: new_frame,
                    write: pte.write,
                });
            }
            PageTableState::Uninitialized => unreachable!("checked above"),
        }
    }

    Ok(())
}

/// Return the kernel virtual address backing `(pid, vpage)` if mapped,
/// without installing anything on a miss. Used by tests to assert
/// post-teardown/clone invariants without triggering new allocations.
#[cfg(test)]
fn lookup(pid: ProcessId, vpage: usize) -> Option<VirtualAddress> {
    let guard = locked();
    match &*guard {
        PageTableState::Ready(table) => table
            .index_of(pid, vpage)
            .and_then(|i| table.entries[i])
            .filter(|pte| pte.pid == pid)
            .map(|pte| pte.frame),
        PageTableState::Uninitialized => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address_space::as_create;

    fn with_fresh_table(num_pages: usize, f: impl FnOnce()) {
        crate::arch::sim::reset();
        bootstrap(num_pages);
        crate::mm::frame_table::bootstrap();
        f();
    }

    #[test]
    fn insert_then_lookup_is_stable() {
        with_fresh_table(8, || {
            let as_ = as_create();
            let frame = lookup_or_insert(as_.id(), 3, true).unwrap();
            assert_eq!(lookup_or_insert(as_.id(), 3, true).unwrap(), frame);
        });
    }

    #[test]
    fn freeproc_removes_all_entries_for_pid() {
        with_fresh_table(8, || {
            let as_ = as_create();
            lookup_or_insert(as_.id(), 1, true).unwrap();
            lookup_or_insert(as_.id(), 2, true).unwrap();
            vm_freeproc(as_.id());
            assert!(lookup(as_.id(), 1).is_none());
            assert!(lookup(as_.id(), 2).is_none());
        });
    }

    #[test]
    fn freeproc_preserves_other_processes_entries() {
        with_fresh_table(8, || {
            let a = as_create();
            let b = as_create();
            lookup_or_insert(a.id(), 0, true).unwrap();
            let b_frame = lookup_or_insert(b.id(), 0, true).unwrap();
            vm_freeproc(a.id());
            assert_eq!(lookup(b.id(), 0), Some(b_frame));
        });
    }

    #[test]
    fn table_full_reports_error_not_panic() {
        with_fresh_table(2, || {
            let as_ = as_create();
            lookup_or_insert(as_.id(), 0, true).unwrap();
            lookup_or_insert(as_.id(), 1, true).unwrap();
            let another = as_create();
            assert!(matches!(
                lookup_or_insert(another.id(), 0, true),
                Err(VmError::TableFull)
            ));
        });
    }

    #[test]
    fn cloneproc_copies_entries_and_contents() {
        with_fresh_table(8, || {
            let old = as_create();
            let frame = lookup_or_insert(old.id(), 5, true).unwrap();
            // SAFETY: frame is a full PAGE_SIZE frame owned by this test.
            unsafe {
                core::ptr::write(frame.as_usize() as *mut u8, 0xAB);
            }

            let new = as_create();
            vm_cloneproc(old.id(), new.id()).unwrap();

            let new_frame = lookup(new.id(), 5).expect("clone installed entry");
            assert_ne!(new_frame, frame, "clone must not alias the source frame");
            // SAFETY: new_frame is a full PAGE_SIZE frame owned by this test.
            let byte = unsafe { core::ptr::read(new_frame.as_usize() as *const u8) };
            assert_eq!(byte, 0xAB);
        });
    }

    #[test]
    fn cloneproc_failure_leaves_source_untouched() {
        with_fresh_table(2, || {
            let old = as_create();
            lookup_or_insert(old.id(), 0, true).unwrap();

            let occupier = as_create();
            lookup_or_insert(occupier.id(), 1, true).unwrap();

            let new = as_create();
            assert!(vm_cloneproc(old.id(), new.id()).is_err());
            assert!(lookup(old.id(), 0).is_some(), "source entry must survive a failed clone");
        });
    }
}
