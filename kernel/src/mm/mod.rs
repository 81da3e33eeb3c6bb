//! Virtual memory subsystem
//!
//! Ties together the frame table, address spaces, the hashed inverted page
//! table, and the TLB-miss fault handler.

pub mod address_space;
pub mod bootstrap;
pub mod fault;
pub mod frame_table;
pub mod page_table;

/// Size of a single page/frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// `log2(PAGE_SIZE)`, used to split an address into page number and offset.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the frame-aligned portion of an address.
pub const PAGE_FRAME: usize = !(PAGE_SIZE - 1);

/// Top of the user stack. Addresses below this and above the highest-based
/// region are treated as stack growth by the fault handler's stack
/// heuristic.
pub const USERSTACK: usize = 0x8000_0000;

/// A physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(pub usize);

impl PhysicalAddress {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Frame number this address falls within.
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }
}

/// A virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(pub usize);

impl VirtualAddress {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Virtual page number (address shifted right by the page size).
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Round down to the start of the containing page.
    pub const fn page_floor(self) -> Self {
        Self(self.0 & PAGE_FRAME)
    }

    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }
}

/// Convert a physical address to its identity-mapped kernel virtual address.
///
/// The simulated and real MIPS backends both identity-map physical memory
/// into kernel space, so this is a straight pass-through; it exists as a
/// named conversion so call sites read the same way the original `PADDR_TO_KVADDR`
/// macro did.
pub const fn paddr_to_kvaddr(paddr: PhysicalAddress) -> VirtualAddress {
    VirtualAddress(paddr.0)
}

/// Convert a kernel virtual address back to its physical address.
pub const fn kvaddr_to_paddr(vaddr: VirtualAddress) -> PhysicalAddress {
    PhysicalAddress(vaddr.0)
}
