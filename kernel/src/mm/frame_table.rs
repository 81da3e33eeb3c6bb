//! Physical frame allocator
//!
//! A dense array of frame states guarded by a single spinlock (`ft_lock`).
//! Frames below the first free physical address are permanently reserved;
//! the rest start free. `free_cursor` is a hint for where to resume
//! scanning on the next allocation, not an authoritative "lowest free"
//! pointer.

use alloc::vec::Vec;

use spin::Mutex;

use crate::arch;
use crate::error::{VmError, VmResult};

use super::{paddr_to_kvaddr, PhysicalAddress, VirtualAddress, PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Reserved,
    Free,
    Used,
}

enum FrameTableState {
    /// Frame table array not yet allocated; `alloc_kpages` falls back to
    /// the boot-time stealing allocator.
    Uninitialized,
    Ready(FrameTable),
}

struct FrameTable {
    frames: Vec<FrameState>,
    /// Hint: index of a frame believed to be free, or `frames.len()` if
    /// none is known to be free.
    free_cursor: usize,
}

impl FrameTable {
    fn alloc_one(&mut self) -> Option<usize> {
        if self.free_cursor >= self.frames.len() {
            return None;
        }
        let index = self.free_cursor;
        self.frames[index] = FrameState::Used;

        // Scan forward from the consumed slot looking for the next free
        // frame; leaves free_cursor == len() when none remain.
        let mut cursor = index + 1;
        while cursor < self.frames.len() && self.frames[cursor] != FrameState::Free {
            cursor += 1;
        }
        self.free_cursor = cursor;

        Some(index)
    }

    fn free_one(&mut self, index: usize) {
        if index >= self.frames.len() || self.frames[index] != FrameState::Used {
            return;
        }
        self.frames[index] = FrameState::Free;
        if index < self.free_cursor {
            self.free_cursor = index;
        }
    }
}

static FRAME_TABLE: Mutex<FrameTableState> = Mutex::new(FrameTableState::Uninitialized);

/// Build the frame table from the current RAM layout. Must run after the
/// page table has taken whatever boot-time memory it needs via
/// `ram_stealmem`, so that those frames land below `first_free` and are
/// marked reserved rather than handed out again.
pub fn bootstrap() {
    let num_frames = arch::ram_size() / PAGE_SIZE;
    let first_free_index = arch::ram_first_free().as_usize() / PAGE_SIZE;

    let mut frames = Vec::with_capacity(num_frames);
    for index in 0..num_frames {
        frames.push(if index < first_free_index {
            FrameState::Reserved
        } else {
            FrameState::Free
        });
    }

    *FRAME_TABLE.lock() = FrameTableState::Ready(FrameTable {
        frames,
        free_cursor: first_free_index,
    });
}

fn zero_fill(vaddr: VirtualAddress) {
    // SAFETY: the caller has just taken ownership of the frame backing
    // `vaddr` from either the stealing allocator or the frame table, and it
    // is exactly PAGE_SIZE bytes of writable kernel memory.
    unsafe {
        core::ptr::write_bytes(vaddr.as_usize() as *mut u8, 0, PAGE_SIZE);
    }
}

/// Allocate `num_pages` contiguous frames, returning their kernel virtual
/// address. Only `num_pages == 1` is supported once the frame table has
/// been bootstrapped; before bootstrap, requests are forwarded to the
/// boot-time stealing allocator, which may satisfy larger requests.
pub fn alloc_kpages(num_pages: usize) -> VmResult<VirtualAddress> {
    let mut guard = FRAME_TABLE.lock();
    match &mut *guard {
        FrameTableState::Uninitialized => arch::ram_stealmem(num_pages * PAGE_SIZE)
            .map(paddr_to_kvaddr)
            .ok_or(VmError::OutOfMemory {
                requested_pages: num_pages,
            }),
        FrameTableState::Ready(table) => {
            if num_pages != 1 {
                return Err(VmError::OutOfMemory {
                    requested_pages: num_pages,
                });
            }
            let index = table.alloc_one().ok_or(VmError::OutOfMemory {
                requested_pages: num_pages,
            })?;
            let vaddr = paddr_to_kvaddr(PhysicalAddress::new(index * PAGE_SIZE));
            drop(guard);
            zero_fill(vaddr);
            Ok(vaddr)
        }
    }
}

/// Free the single frame backing `vaddr`. A no-op if the frame is not
/// currently in the used state (double free, or a frame that was never
/// handed out by the frame table).
pub fn free_kpages(vaddr: VirtualAddress) {
    let mut guard = FRAME_TABLE.lock();
    if let FrameTableState::Ready(table) = &mut *guard {
        let index = super::kvaddr_to_paddr(vaddr).as_usize() / PAGE_SIZE;
        table.free_one(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_fresh_table<R>(f: impl FnOnce() -> R) -> R {
        crate::arch::sim::reset();
        bootstrap();
        f()
    }

    #[test]
    fn alloc_then_free_restores_state() {
        with_fresh_table(|| {
            let a = alloc_kpages(1).expect("first alloc succeeds");
            free_kpages(a);
            let b = alloc_kpages(1).expect("alloc after free succeeds");
            assert_eq!(a, b, "freed frame should be reused");
        });
    }

    #[test]
    fn distinct_allocations_never_alias() {
        with_fresh_table(|| {
            let a = alloc_kpages(1).unwrap();
            let b = alloc_kpages(1).unwrap();
            assert_ne!(a, b);
        });
    }

    #[test]
    fn multi_page_alloc_rejected_after_bootstrap() {
        with_fresh_table(|| {
            assert!(alloc_kpages(2).is_err());
        });
    }

    #[test]
    fn double_free_is_silent_noop() {
        with_fresh_table(|| {
            let a = alloc_kpages(1).unwrap();
            free_kpages(a);
            free_kpages(a);
            let b = alloc_kpages(1).unwrap();
            assert_eq!(a, b);
        });
    }

    #[test]
    fn exhaustion_then_recovery() {
        with_fresh_table(|| {
            let mut allocated = Vec::new();
            loop {
                match alloc_kpages(1) {
                    Ok(va) => allocated.push(va),
                    Err(VmError::OutOfMemory { .. }) => break,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert!(alloc_kpages(1).is_err());
            let freed = allocated.pop().unwrap();
            free_kpages(freed);
            assert!(alloc_kpages(1).is_ok());
        });
    }
}
